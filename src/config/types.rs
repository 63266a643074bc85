use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Accept durations as human strings (`"3m"`, `"500ms"`).
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(&s).map_err(serde::de::Error::custom)
}

fn serialize_duration<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&humantime::format_duration(*d))
}

/// Top-level API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// One of `development`, `staging`, `production`.
    #[serde(default = "default_env")]
    pub env: String,

    #[serde(default)]
    pub limiter: LimiterConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    /// Accounts created at startup.
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            env: default_env(),
            limiter: LimiterConfig::default(),
            shutdown: ShutdownConfig::default(),
            cors: CorsConfig::default(),
            auth: AuthConfig::default(),
            admin: AdminConfig::default(),
            users: Vec::new(),
        }
    }
}

fn default_port() -> u16 {
    4000
}

fn default_env() -> String {
    "development".to_string()
}

pub const ENVIRONMENTS: &[&str] = &["development", "staging", "production"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Sustained requests per second per client.
    #[serde(default = "default_rps")]
    pub rps: f64,

    #[serde(default = "default_burst")]
    pub burst: u32,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Clients idle longer than this are forgotten.
    #[serde(
        default = "default_idle_expiry",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub idle_expiry: Duration,

    #[serde(
        default = "default_sweep_interval",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub sweep_interval: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            rps: default_rps(),
            burst: default_burst(),
            enabled: true,
            idle_expiry: default_idle_expiry(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_rps() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

fn default_idle_expiry() -> Duration {
    Duration::from_secs(3 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long in-flight requests get to finish once a stop signal arrives.
    #[serde(
        default = "default_drain_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
        }
    }
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Exact origins allowed to make cross-origin requests.
    #[serde(default)]
    pub trusted_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(
        default = "default_token_ttl",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub token_ttl: Duration,

    /// Upper bound on every token, user and permission store call.
    #[serde(
        default = "default_store_timeout",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub store_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl: default_token_ttl(),
            store_timeout: default_store_timeout(),
        }
    }
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(3)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Listen address for health and metrics. Empty disables the listener.
    #[serde(default = "default_admin_listen")]
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen: default_admin_listen(),
        }
    }
}

fn default_admin_listen() -> String {
    "127.0.0.1:9091".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    pub name: String,
    pub email: String,
    pub password: String,

    #[serde(default)]
    pub activated: bool,

    #[serde(default)]
    pub permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_toml() {
        let cfg: ApiConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.env, "development");
        assert_eq!(cfg.limiter.rps, 2.0);
        assert_eq!(cfg.limiter.burst, 4);
        assert!(cfg.limiter.enabled);
        assert_eq!(cfg.limiter.idle_expiry, Duration::from_secs(180));
        assert_eq!(cfg.limiter.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.shutdown.drain_timeout, Duration::from_secs(5));
        assert_eq!(cfg.auth.store_timeout, Duration::from_secs(3));
        assert!(cfg.users.is_empty());
    }

    #[test]
    fn human_durations() {
        let cfg: ApiConfig = toml::from_str(
            r#"
            [limiter]
            idle_expiry = "90s"
            sweep_interval = "15s"

            [shutdown]
            drain_timeout = "2s 500ms"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.limiter.idle_expiry, Duration::from_secs(90));
        assert_eq!(cfg.limiter.sweep_interval, Duration::from_secs(15));
        assert_eq!(cfg.shutdown.drain_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn bad_duration_is_rejected() {
        let res: Result<ApiConfig, _> = toml::from_str(
            r#"
            [shutdown]
            drain_timeout = "soon"
            "#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn seed_users_from_json() {
        let cfg: ApiConfig = serde_json::from_str(
            r#"{
                "users": [{
                    "name": "Alice",
                    "email": "alice@example.com",
                    "password": "pa55word!",
                    "activated": true,
                    "permissions": ["movies:read"]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.users.len(), 1);
        assert!(cfg.users[0].activated);
        assert_eq!(cfg.users[0].permissions, vec!["movies:read"]);
    }
}
