use crate::config::LimiterConfig;
use crate::error::ApiError;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-client token buckets keyed by client IP.
///
/// Every admission runs the whole refill/consume sequence under one mutex,
/// so two concurrent requests from the same client can never both spend the
/// last token. The guard is dropped before `admit` returns; downstream
/// handling never runs inside the critical section.
///
/// Clients that stay quiet for `idle_expiry` are dropped by a background
/// sweep (see [`RateLimiter::start_sweeper`]), so memory tracks the number of
/// recently active clients rather than every address ever seen.
pub struct RateLimiter {
    config: LimiterConfig,
    clients: Mutex<HashMap<String, ClientEntry>>,
}

struct ClientEntry {
    bucket: Bucket,
    /// Updated on every call, admitted or not.
    last_seen: Instant,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(burst: f64, now: Instant) -> Self {
        Self {
            tokens: burst,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, rate: f64, burst: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if !elapsed.is_zero() {
            self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(burst);
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl RateLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Returns `true` if `identity` may proceed. Always `true` when disabled,
    /// without touching any state.
    pub async fn admit(&self, identity: &str) -> bool {
        if !self.config.enabled {
            return true;
        }

        let burst = f64::from(self.config.burst);
        let now = Instant::now();
        let mut clients = self.clients.lock().await;

        let entry = clients
            .entry(identity.to_string())
            .or_insert_with(|| ClientEntry {
                bucket: Bucket::full(burst, now),
                last_seen: now,
            });
        entry.last_seen = now;
        entry.bucket.try_acquire(self.config.rps, burst, now)
    }

    /// Drop every client idle for longer than `idle_expiry`. Returns how many
    /// were removed.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let expiry = self.config.idle_expiry;
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, c| now.saturating_duration_since(c.last_seen) <= expiry);
        before - clients.len()
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Spawn the idle-client sweep. It wakes every `sweep_interval` and exits
    /// once `cancel` fires.
    pub fn start_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("limiter: sweeper stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        let evicted = limiter.sweep().await;
                        if evicted > 0 {
                            tracing::debug!("limiter: swept idle clients, evicted={}", evicted);
                        }
                        metrics::gauge!("api_rate_limit_clients")
                            .set(limiter.client_count().await as f64);
                    }
                }
            }
        })
    }
}

/// Derive the limiter identity (client IP) from a `host:port` remote address.
pub fn client_identity(remote_addr: &str) -> Result<String, ApiError> {
    remote_addr
        .parse::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .map_err(|e| {
            ApiError::ServerFault(format!(
                "unparseable remote address {:?}: {}",
                remote_addr, e
            ))
        })
}

/// Rate limit stage. Yields the client identity carried in the request
/// context. With limiting off the remote address is used as-is.
pub async fn rate_limit_on_request(
    limiter: &RateLimiter,
    remote_addr: &str,
) -> Result<String, ApiError> {
    if !limiter.enabled() {
        return Ok(remote_addr.to_string());
    }

    let identity = client_identity(remote_addr)?;

    if !limiter.admit(&identity).await {
        tracing::debug!("middleware: rate_limit: rejected, client={}", identity);
        metrics::counter!("api_rate_limit_rejected_total").increment(1);
        return Err(ApiError::RateLimited);
    }

    metrics::counter!("api_rate_limit_allowed_total").increment(1);
    Ok(identity)
}
