use super::StoreError;
use crate::validator::{self, Validator};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use rand::RngCore;
use std::time::SystemTime;

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub created_at: SystemTime,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
    pub version: i32,
}

impl User {
    /// A not-yet-stored user. The store assigns `id`.
    pub fn new(name: &str, email: &str, password: &str, activated: bool) -> Result<Self, StoreError> {
        Ok(Self {
            id: 0,
            created_at: SystemTime::now(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            activated,
            version: 1,
        })
    }

    pub fn set_password(&mut self, plaintext: &str) -> Result<(), StoreError> {
        self.password_hash = hash_password(plaintext)?;
        Ok(())
    }

    /// `Ok(false)` on a wrong password; `Err` only when the stored hash is unusable.
    pub fn password_matches(&self, plaintext: &str) -> Result<bool, StoreError> {
        let parsed = PasswordHash::new(&self.password_hash)
            .map_err(|e| StoreError::Backend(format!("stored password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }
}

fn hash_password(plaintext: &str) -> Result<String, StoreError> {
    let mut salt_bytes = [0u8; 16];
    rand::rngs::OsRng
        .try_fill_bytes(&mut salt_bytes)
        .map_err(|e| StoreError::Backend(format!("password salt: {}", e)))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| StoreError::Backend(format!("password salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| StoreError::Backend(format!("password hash: {}", e)))?;
    Ok(hash.to_string())
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(
        validator::matches(email, validator::email_rx()),
        "email",
        "must be a valid email address",
    );
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

pub fn validate_user(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, email);
    validate_password_plaintext(v, password);
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Store a new user and return it with its assigned id.
    async fn insert(&self, user: User) -> Result<User, StoreError>;

    async fn get(&self, id: i64) -> Result<User, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;
}
