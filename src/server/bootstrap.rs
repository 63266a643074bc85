use crate::config::{ApiConfig, Overrides};
use crate::data::Models;
use crate::metrics::Metrics;
use crate::server::{self, shutdown, AppState, DrainOutcome};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub overrides: Overrides,
}

/// Server lifecycle: config → state → seed → serve → drain → exit.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    // Held until `run` returns so the last lines reach stdout before exit.
    let _log_guard = init_tracing()?;

    // Phase 1: configuration and shared state.
    let config = ApiConfig::load(&args.config_path, &args.overrides)?;
    let metrics = Metrics::install()?;
    let state = AppState::new(config, Models::in_memory()).with_metrics(metrics);
    state.seed_users().await?;

    // Phase 2: background work owned here.
    let background = CancellationToken::new();
    let sweeper = state
        .limiter
        .enabled()
        .then(|| state.limiter.start_sweeper(background.clone()));

    // Phase 3: shutdown coordinator, then listeners.
    let trigger = shutdown::signal_trigger().context("install signal handlers")?;
    let (handle, report) = shutdown::start(trigger, state.config.shutdown.drain_timeout);

    start_admin_server(&state, &handle).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind api listener on {}", addr))?;
    tracing::info!(
        "server: starting api, addr={}, env={}",
        addr,
        state.config.env
    );

    // Phase 4: serve until a signal; a listener failure ends the process here.
    server::serve(listener, state.clone(), handle.clone()).await?;

    // Phase 5: wait for the drain verdict, then stop background work.
    let report = report
        .await
        .context("shutdown coordinator exited without a report")?;
    background.cancel();
    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            tracing::error!("limiter: sweeper task error: {}", e);
        }
    }

    match report.outcome {
        DrainOutcome::Clean => {
            tracing::info!(
                "server: shutdown complete, drained_in={}",
                humantime::format_duration(report.elapsed)
            );
            Ok(())
        }
        DrainOutcome::Forced { abandoned } => {
            anyhow::bail!(
                "drain window elapsed with {} connection(s) still open",
                abandoned
            )
        }
    }
}

/// Install the JSON subscriber. Log lines are written on a background thread
/// until the returned guard is dropped, which flushes whatever is queued.
fn init_tracing() -> Result<WorkerGuard> {
    let (non_blocking, guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .try_init()
        .context("install tracing subscriber")?;

    Ok(guard)
}

async fn start_admin_server(state: &AppState, handle: &server::ShutdownHandle) -> Result<()> {
    let listen = state.config.admin.listen.clone();
    if listen.is_empty() {
        tracing::info!("server: admin listener disabled");
        return Ok(());
    }

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("bind admin listener on {}", listen))?;
    let state = state.clone();
    let handle = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = server::run_admin_server(listener, state, handle).await {
            tracing::error!("server: admin failed, error={}", e);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_guard_is_handed_back_once() {
        let guard = init_tracing().unwrap();
        tracing::info!("bootstrap: tracing installed");
        // A second install is refused instead of silently replacing the first.
        assert!(init_tracing().is_err());
        drop(guard);
    }
}
