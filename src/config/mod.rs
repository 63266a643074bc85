pub mod types;


pub use types::*;

use crate::data::users;
use crate::validator::{self, Validator};
use anyhow::Result;
use std::path::Path;

/// Values supplied on the command line. They win over both the file and
/// the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub env: Option<String>,
    pub limiter_rps: Option<f64>,
    pub limiter_burst: Option<u32>,
    pub limiter_enabled: Option<bool>,
    pub trusted_origins: Option<Vec<String>>,
    pub admin_listen: Option<String>,
}

impl ApiConfig {
    /// Load configuration from a file (if it exists), then layer
    /// `MARQUEE_*` environment variables and command line overrides on top.
    /// A missing file means built-in defaults, so the server starts with zero
    /// configuration for local development.
    pub fn load(path: &Path, cli: &Overrides) -> Result<Self> {
        let mut config: ApiConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!("config file not found at {}, using defaults", path.display());
            ApiConfig::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.apply_overrides(cli);

        config.validate()?;
        tracing::info!(
            port = config.port,
            env = %config.env,
            limiter_enabled = config.limiter.enabled,
            seed_users = config.users.len(),
            "loaded api configuration"
        );
        Ok(config)
    }

    /// Apply `MARQUEE_*` overrides. `lookup` is the environment in production
    /// and a plain map in tests. Unparseable values are ignored with a warning.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("MARQUEE_PORT") {
            match v.parse::<u16>() {
                Ok(n) => self.port = n,
                Err(_) => tracing::warn!("config: ignoring MARQUEE_PORT={}", v),
            }
        }
        if let Some(v) = lookup("MARQUEE_ENV") {
            self.env = v;
        }

        // Limiter
        if let Some(v) = lookup("MARQUEE_LIMITER_RPS") {
            match v.parse::<f64>() {
                Ok(n) => self.limiter.rps = n,
                Err(_) => tracing::warn!("config: ignoring MARQUEE_LIMITER_RPS={}", v),
            }
        }
        if let Some(v) = lookup("MARQUEE_LIMITER_BURST") {
            match v.parse::<u32>() {
                Ok(n) => self.limiter.burst = n,
                Err(_) => tracing::warn!("config: ignoring MARQUEE_LIMITER_BURST={}", v),
            }
        }
        if let Some(v) = lookup("MARQUEE_LIMITER_ENABLED") {
            self.limiter.enabled = v == "true" || v == "1";
        }

        if let Some(v) = lookup("MARQUEE_TRUSTED_ORIGINS") {
            self.cors.trusted_origins = v
                .split_whitespace()
                .map(|s| s.to_string())
                .collect();
        }
        if let Some(v) = lookup("MARQUEE_ADMIN_LISTEN") {
            self.admin.listen = v;
        }
    }

    fn apply_overrides(&mut self, cli: &Overrides) {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(ref env) = cli.env {
            self.env = env.clone();
        }
        if let Some(rps) = cli.limiter_rps {
            self.limiter.rps = rps;
        }
        if let Some(burst) = cli.limiter_burst {
            self.limiter.burst = burst;
        }
        if let Some(enabled) = cli.limiter_enabled {
            self.limiter.enabled = enabled;
        }
        if let Some(ref origins) = cli.trusted_origins {
            self.cors.trusted_origins = origins.clone();
        }
        if let Some(ref listen) = cli.admin_listen {
            self.admin.listen = listen.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !validator::permitted_value(&self.env.as_str(), ENVIRONMENTS) {
            anyhow::bail!(
                "env '{}' is not one of {}",
                self.env,
                ENVIRONMENTS.join("|")
            );
        }

        if self.limiter.enabled {
            if !(self.limiter.rps.is_finite() && self.limiter.rps > 0.0) {
                anyhow::bail!("limiter.rps must be a positive number, got {}", self.limiter.rps);
            }
            if self.limiter.burst == 0 {
                anyhow::bail!("limiter.burst must be at least 1");
            }
        }
        if self.limiter.sweep_interval.is_zero() {
            anyhow::bail!("limiter.sweep_interval must be greater than zero");
        }
        if self.limiter.idle_expiry.is_zero() {
            anyhow::bail!("limiter.idle_expiry must be greater than zero");
        }
        if self.shutdown.drain_timeout.is_zero() {
            anyhow::bail!("shutdown.drain_timeout must be greater than zero");
        }
        if self.auth.store_timeout.is_zero() {
            anyhow::bail!("auth.store_timeout must be greater than zero");
        }
        if self.auth.token_ttl.is_zero() {
            anyhow::bail!("auth.token_ttl must be greater than zero");
        }

        for seed in &self.users {
            let mut v = Validator::new();
            users::validate_user(&mut v, &seed.name, &seed.email, &seed.password);
            if let Some((field, msg)) = v.errors().iter().next() {
                anyhow::bail!("user '{}': {} {}", seed.email, field, msg);
            }
        }
        let emails: Vec<&str> = self.users.iter().map(|u| u.email.as_str()).collect();
        if !validator::unique(&emails) {
            anyhow::bail!("users: duplicate email address");
        }

        Ok(())
    }
}
