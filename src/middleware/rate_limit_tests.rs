use super::rate_limit::RateLimiter;
use crate::config::LimiterConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn config(rps: f64, burst: u32) -> LimiterConfig {
    LimiterConfig {
        rps,
        burst,
        enabled: true,
        idle_expiry: Duration::from_secs(180),
        sweep_interval: Duration::from_secs(60),
    }
}

async fn drain(limiter: &RateLimiter, identity: &str) -> usize {
    let mut allowed = 0;
    while limiter.admit(identity).await {
        allowed += 1;
        assert!(allowed <= 1000, "bucket never ran dry");
    }
    allowed
}

#[tokio::test(start_paused = true)]
async fn test_burst_then_exhaustion() {
    let limiter = RateLimiter::new(config(2.0, 4));

    for i in 0..4 {
        assert!(limiter.admit("1.1.1.1").await, "request {} should be allowed", i);
    }
    assert!(
        !limiter.admit("1.1.1.1").await,
        "request 5 should be rejected with no time elapsed"
    );
}

#[tokio::test(start_paused = true)]
async fn test_refill_one_token_per_interval() {
    let limiter = RateLimiter::new(config(2.0, 4));
    assert_eq!(drain(&limiter, "1.1.1.1").await, 4);

    // 1 / rps = 500ms buys exactly one admission.
    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(limiter.admit("1.1.1.1").await);
    assert!(!limiter.admit("1.1.1.1").await);

    tokio::time::advance(Duration::from_millis(1000)).await;
    assert!(limiter.admit("1.1.1.1").await);
    assert!(limiter.admit("1.1.1.1").await);
    assert!(!limiter.admit("1.1.1.1").await);
}

#[tokio::test(start_paused = true)]
async fn test_refill_capped_at_burst() {
    let limiter = RateLimiter::new(config(2.0, 4));
    drain(&limiter, "1.1.1.1").await;

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(
        drain(&limiter, "1.1.1.1").await,
        4,
        "a long idle period must not bank more than burst"
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_calls_do_not_consume() {
    let limiter = RateLimiter::new(config(2.0, 1));
    assert!(limiter.admit("1.1.1.1").await);
    for _ in 0..10 {
        assert!(!limiter.admit("1.1.1.1").await);
    }
    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(limiter.admit("1.1.1.1").await);
}

#[tokio::test(start_paused = true)]
async fn test_identities_are_independent() {
    let limiter = RateLimiter::new(config(1.0, 2));
    assert_eq!(drain(&limiter, "1.1.1.1").await, 2);
    assert_eq!(drain(&limiter, "2.2.2.2").await, 2);
    assert_eq!(limiter.client_count().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_admits_everything_and_keeps_no_state() {
    let limiter = RateLimiter::new(LimiterConfig {
        enabled: false,
        ..config(1.0, 1)
    });
    for _ in 0..100 {
        assert!(limiter.admit("1.1.1.1").await);
    }
    assert_eq!(limiter.client_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_removes_only_idle_clients() {
    let limiter = RateLimiter::new(config(2.0, 4));
    drain(&limiter, "idle").await;

    tokio::time::advance(Duration::from_secs(120)).await;
    // Rejected calls still count as activity.
    drain(&limiter, "busy").await;
    assert!(!limiter.admit("busy").await);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(limiter.sweep().await, 1);
    assert_eq!(limiter.client_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_swept_client_returns_with_full_burst() {
    let limiter = RateLimiter::new(config(0.001, 3));
    assert_eq!(drain(&limiter, "1.1.1.1").await, 3);

    tokio::time::advance(Duration::from_secs(181)).await;
    assert_eq!(limiter.sweep().await, 1);
    assert_eq!(limiter.client_count().await, 0);

    // At 0.001 rps the old bucket would have refilled by less than one token,
    // so a full burst proves this is a fresh entry.
    assert_eq!(drain(&limiter, "1.1.1.1").await, 3);
}

#[tokio::test(start_paused = true)]
async fn test_background_sweeper_runs_and_stops() {
    let limiter = Arc::new(RateLimiter::new(config(2.0, 4)));
    let cancel = CancellationToken::new();
    let handle = limiter.start_sweeper(cancel.clone());

    limiter.admit("1.1.1.1").await;
    assert_eq!(limiter.client_count().await, 1);

    // Idle past expiry, then let at least one sweep tick fire.
    tokio::time::sleep(Duration::from_secs(181 + 60)).await;
    assert_eq!(limiter.client_count().await, 0);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("sweeper should exit on cancel")
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_callers_never_overspend() {
    let limiter = Arc::new(RateLimiter::new(config(0.001, 5)));

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let limiter = limiter.clone();
        tasks.push(tokio::spawn(async move { limiter.admit("9.9.9.9").await }));
    }

    let mut allowed = 0;
    for t in tasks {
        if t.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 5, "exactly burst admissions across racing tasks");
}
