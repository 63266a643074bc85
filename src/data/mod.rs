pub mod memory;
pub mod movies;
pub mod permissions;
pub mod tokens;
pub mod users;

pub use memory::{MemoryMovies, MemoryPermissions, MemoryTokens, MemoryUsers};
pub use movies::{Movie, MovieFilter, MovieStore, Runtime};
pub use permissions::{PermissionStore, Permissions};
pub use tokens::{Scope, Token, TokenRecord, TokenStore};
pub use users::{User, UserStore};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    RecordNotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("store backend: {0}")]
    Backend(String),
}

/// Bound a collaborator call. An elapsed deadline becomes `StoreError::Timeout`.
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// The collaborator stores the request pipeline and handlers talk to.
#[derive(Clone)]
pub struct Models {
    pub movies: Arc<dyn MovieStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
}

impl Models {
    /// In-process stores backed by concurrent maps.
    pub fn in_memory() -> Self {
        Self {
            movies: Arc::new(MemoryMovies::new()),
            users: Arc::new(MemoryUsers::new()),
            tokens: Arc::new(MemoryTokens::new()),
            permissions: Arc::new(MemoryPermissions::new()),
        }
    }
}
