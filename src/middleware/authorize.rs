use crate::api::Principal;
use crate::data::{with_deadline, PermissionStore};
use crate::error::ApiError;
use std::sync::Arc;
use std::time::Duration;

/// What a route demands of its caller. Each level implies the ones before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Public,
    /// Any non-anonymous caller, activated or not.
    Authenticated,
    Activated,
    /// An activated caller holding this permission code.
    Permission(&'static str),
}

pub fn require_authenticated(principal: &Principal) -> Result<(), ApiError> {
    if principal.is_anonymous() {
        return Err(ApiError::AuthenticationRequired);
    }
    Ok(())
}

pub fn require_activated(principal: &Principal) -> Result<(), ApiError> {
    require_authenticated(principal)?;
    if !principal.activated() {
        return Err(ApiError::AuthenticationRequired);
    }
    Ok(())
}

/// Permission gate backed by the permission store.
#[derive(Clone)]
pub struct Authorizer {
    permissions: Arc<dyn PermissionStore>,
    store_timeout: Duration,
}

impl Authorizer {
    pub fn new(permissions: Arc<dyn PermissionStore>, store_timeout: Duration) -> Self {
        Self {
            permissions,
            store_timeout,
        }
    }

    pub async fn require_permission(
        &self,
        principal: &Principal,
        code: &str,
    ) -> Result<(), ApiError> {
        require_activated(principal)?;
        let Some(id) = principal.id() else {
            return Err(ApiError::AuthenticationRequired);
        };

        let granted = with_deadline(self.store_timeout, self.permissions.permissions_for(id))
            .await
            .map_err(|e| ApiError::server_fault(format!("permission lookup: {}", e)))?;

        if !granted.includes(code) {
            tracing::debug!(
                "middleware: authorize: denied, user={}, permission={}",
                id,
                code
            );
            return Err(ApiError::NotPermitted);
        }
        Ok(())
    }

    /// Run the gates `access` calls for, in order.
    pub async fn authorize(&self, access: &Access, principal: &Principal) -> Result<(), ApiError> {
        match access {
            Access::Public => Ok(()),
            Access::Authenticated => require_authenticated(principal),
            Access::Activated => require_activated(principal),
            Access::Permission(code) => self.require_permission(principal, code).await,
        }
    }
}
