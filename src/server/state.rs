use crate::config::{ApiConfig, SeedUser};
use crate::data::{Models, User};
use crate::handlers;
use crate::metrics::Metrics;
use crate::middleware::{Authenticator, Authorizer, Cors, RateLimiter};
use crate::routing::Router;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Shared server state, cheaply cloneable.
///
/// Everything a request needs is built once here: the middleware stages
/// hold their own store handles so the pipeline never reaches back into
/// `models` directly.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    pub models: Models,
    pub limiter: Arc<RateLimiter>,
    pub authenticator: Authenticator,
    pub authorizer: Authorizer,
    pub cors: Cors,
    pub router: Arc<Router>,
    pub metrics: Option<Metrics>,
}

impl AppState {
    pub fn new(config: ApiConfig, models: Models) -> Self {
        let store_timeout = config.auth.store_timeout;
        Self {
            limiter: Arc::new(RateLimiter::new(config.limiter.clone())),
            authenticator: Authenticator::new(
                models.tokens.clone(),
                models.users.clone(),
                store_timeout,
            ),
            authorizer: Authorizer::new(models.permissions.clone(), store_timeout),
            cors: Cors::new(config.cors.trusted_origins.clone()),
            router: Arc::new(handlers::routes()),
            config: Arc::new(config),
            models,
            metrics: None,
        }
    }

    /// Attach the Prometheus handle rendered by the admin listener.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the route table.
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Arc::new(router);
        self
    }

    /// Create the configured seed accounts and grant their permissions.
    pub async fn seed_users(&self) -> Result<()> {
        for seed in &self.config.users {
            let user = self.seed_one(seed).await?;
            info!(
                "data: seeded user, id={}, email={}, activated={}, permissions={:?}",
                user.id, user.email, user.activated, seed.permissions
            );
        }
        Ok(())
    }

    async fn seed_one(&self, seed: &SeedUser) -> Result<User> {
        let user = User::new(&seed.name, &seed.email, &seed.password, seed.activated)
            .with_context(|| format!("hash password for seed user {}", seed.email))?;
        let user = self
            .models
            .users
            .insert(user)
            .await
            .with_context(|| format!("insert seed user {}", seed.email))?;
        if !seed.permissions.is_empty() {
            self.models
                .permissions
                .grant(user.id, &seed.permissions)
                .await
                .with_context(|| format!("grant permissions to {}", seed.email))?;
        }
        Ok(user)
    }
}
