use crate::api::Principal;
use crate::data::{tokens, with_deadline, Scope, StoreError, TokenStore, UserStore};
use crate::error::ApiError;
use crate::validator::Validator;
use http::header::{AUTHORIZATION, VARY};
use http::{HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

/// Resolves the `Authorization` header into a [`Principal`].
#[derive(Clone)]
pub struct Authenticator {
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
    store_timeout: Duration,
}

impl Authenticator {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            users,
            store_timeout,
        }
    }

    /// No header is a valid anonymous caller. A header must read exactly
    /// `Bearer <token>`; a badly shaped header or token is
    /// `InvalidCredentialFormat`, an unknown or expired token is
    /// `InvalidCredentials`, and any store failure is a server fault.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        let Some(raw) = headers.get(AUTHORIZATION) else {
            return Ok(Principal::Anonymous);
        };
        if raw.is_empty() {
            return Ok(Principal::Anonymous);
        }

        let plaintext = bearer_token(raw).ok_or(ApiError::InvalidCredentialFormat)?;

        let mut v = Validator::new();
        tokens::validate_plaintext(&mut v, plaintext);
        if !v.valid() {
            return Err(ApiError::InvalidCredentialFormat);
        }

        let hash = tokens::hash_plaintext(plaintext);
        let record = with_deadline(
            self.store_timeout,
            self.tokens.lookup(&hash, Scope::Authentication),
        )
        .await
        .map_err(|e| match e {
            StoreError::RecordNotFound => ApiError::InvalidCredentials,
            other => ApiError::server_fault(format!("token lookup: {}", other)),
        })?;

        let user = with_deadline(self.store_timeout, self.users.get(record.owner))
            .await
            .map_err(|e| match e {
                StoreError::RecordNotFound => ApiError::InvalidCredentials,
                other => ApiError::server_fault(format!("user lookup: {}", other)),
            })?;

        Ok(Principal::User(Arc::new(user)))
    }
}

fn bearer_token(raw: &HeaderValue) -> Option<&str> {
    let value = raw.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token),
        _ => None,
    }
}

/// Responses differ per credential; caches must key on it.
pub fn vary_authorization(headers: &mut HeaderMap) {
    headers.append(VARY, HeaderValue::from_static("Authorization"));
}
