use super::StoreError;
use async_trait::async_trait;

pub const MOVIES_READ: &str = "movies:read";
pub const MOVIES_WRITE: &str = "movies:write";

/// Permission codes granted to one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn new(codes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(codes.into_iter().map(Into::into).collect())
    }

    pub fn includes(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }

    pub fn codes(&self) -> &[String] {
        &self.0
    }
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permissions_for(&self, user_id: i64) -> Result<Permissions, StoreError>;

    /// Add codes to a user's set. Codes already held are ignored.
    async fn grant(&self, user_id: i64, codes: &[String]) -> Result<(), StoreError>;
}
