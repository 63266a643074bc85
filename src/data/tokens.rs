use super::StoreError;
use crate::validator::Validator;
use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime};

/// Plaintext tokens are 16 random bytes rendered as unpadded base32.
pub const PLAINTEXT_LEN: usize = 26;
const RANDOM_BYTES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

/// A freshly issued token. The plaintext exists only here and in the
/// response that hands it to the caller; stores keep the hash.
#[derive(Debug, Clone)]
pub struct Token {
    pub plaintext: String,
    pub hash: [u8; 32],
    pub owner: i64,
    pub expiry: SystemTime,
    pub scope: Scope,
}

/// What a successful lookup yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenRecord {
    pub owner: i64,
    pub expiry: SystemTime,
}

impl Token {
    pub fn generate(owner: i64, ttl: Duration, scope: Scope) -> Result<Self, StoreError> {
        let mut random = [0u8; RANDOM_BYTES];
        rand::rngs::OsRng
            .try_fill_bytes(&mut random)
            .map_err(|e| StoreError::Backend(format!("token entropy: {}", e)))?;

        let plaintext = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &random);
        let hash = hash_plaintext(&plaintext);

        Ok(Self {
            plaintext,
            hash,
            owner,
            expiry: SystemTime::now() + ttl,
            scope,
        })
    }
}

pub fn hash_plaintext(plaintext: &str) -> [u8; 32] {
    Sha256::digest(plaintext.as_bytes()).into()
}

pub fn validate_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == PLAINTEXT_LEN,
        "token",
        "must be 26 bytes long",
    );
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> Result<(), StoreError>;

    /// Resolve a hash within `scope`. Unknown and expired hashes are both
    /// `RecordNotFound`.
    async fn lookup(&self, hash: &[u8; 32], scope: Scope) -> Result<TokenRecord, StoreError>;

    async fn delete_all_for_owner(&self, scope: Scope, owner: i64) -> Result<(), StoreError>;
}

/// Generate a token for `owner` and persist its hash.
pub async fn issue(
    store: &dyn TokenStore,
    owner: i64,
    ttl: Duration,
    scope: Scope,
) -> Result<Token, StoreError> {
    let token = Token::generate(owner, ttl, scope)?;
    store.insert(&token).await?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_plaintext_has_fixed_shape() {
        let token = Token::generate(7, Duration::from_secs(60), Scope::Authentication).unwrap();
        assert_eq!(token.plaintext.len(), PLAINTEXT_LEN);
        assert!(token
            .plaintext
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        assert_eq!(token.hash, hash_plaintext(&token.plaintext));
        assert_eq!(token.owner, 7);
    }

    #[test]
    fn tokens_are_unique() {
        let a = Token::generate(1, Duration::from_secs(60), Scope::Activation).unwrap();
        let b = Token::generate(1, Duration::from_secs(60), Scope::Activation).unwrap();
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn hash_is_sha256() {
        // sha256("abc")
        let expected: [u8; 32] = [
            0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
            0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
            0xf2, 0x00, 0x15, 0xad,
        ];
        assert_eq!(hash_plaintext("abc"), expected);
    }

    #[test]
    fn plaintext_shape_check() {
        let mut v = Validator::new();
        validate_plaintext(&mut v, &"A".repeat(26));
        assert!(v.valid());

        for bad in ["", "A".repeat(25).as_str(), "A".repeat(27).as_str()] {
            let mut v = Validator::new();
            validate_plaintext(&mut v, bad);
            assert!(!v.valid(), "{:?} should fail the shape check", bad);
        }
    }
}
