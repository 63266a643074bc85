use std::future::Future;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Lifecycle of the API listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    Stopped,
}

/// How the drain window ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight connection finished inside the window.
    Clean,
    /// The window elapsed; `abandoned` connections were force-closed.
    Forced { abandoned: usize },
}

/// Delivered exactly once, after the drain window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    pub elapsed: Duration,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.outcome == DrainOutcome::Clean
    }
}

/// The connection-side view of the coordinator. Cloned into the accept loop
/// and into every connection task.
#[derive(Clone)]
pub struct ShutdownHandle {
    stop: CancellationToken,
    force: CancellationToken,
    tracker: TaskTracker,
    phase: watch::Receiver<ShutdownPhase>,
}

impl ShutdownHandle {
    /// Resolves once new connections must no longer be accepted.
    pub async fn stopping(&self) {
        self.stop.cancelled().await
    }

    /// Resolves once the drain window has elapsed with work outstanding.
    pub async fn forced(&self) {
        self.force.cancelled().await
    }

    /// Resolves once the coordinator has reached `Stopped`.
    pub async fn finished(&self) {
        let mut phase = self.phase.clone();
        // A dropped sender also means the coordinator is gone.
        let _ = phase.wait_for(|p| *p == ShutdownPhase::Stopped).await;
    }

    /// Begin shutdown without an OS signal, e.g. after a fatal listener error.
    pub fn trigger(&self) {
        self.stop.cancel();
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Connections currently tracked for draining.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub(crate) fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }
}

/// Spawn the shutdown coordinator.
///
/// It waits for `trigger` (or [`ShutdownHandle::trigger`]), flips to
/// `Draining`, stops the accept loop and asks every connection to finish
/// its current request. After `drain_timeout` whatever is left is
/// force-closed. The report is sent once on the returned receiver.
pub fn start<T>(trigger: T, drain_timeout: Duration) -> (ShutdownHandle, oneshot::Receiver<DrainReport>)
where
    T: Future<Output = ()> + Send + 'static,
{
    let (phase_tx, phase_rx) = watch::channel(ShutdownPhase::Running);
    let (report_tx, report_rx) = oneshot::channel();

    let handle = ShutdownHandle {
        stop: CancellationToken::new(),
        force: CancellationToken::new(),
        tracker: TaskTracker::new(),
        phase: phase_rx,
    };

    let stop = handle.stop.clone();
    let force = handle.force.clone();
    let tracker = handle.tracker.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = trigger => {}
            _ = stop.cancelled() => {}
        }

        phase_tx.send_replace(ShutdownPhase::Draining);
        stop.cancel();
        tracker.close();
        info!(
            "shutdown: draining, in_flight={}, window={}",
            tracker.len(),
            humantime::format_duration(drain_timeout)
        );

        let started = Instant::now();
        let outcome = match tokio::time::timeout(drain_timeout, tracker.wait()).await {
            Ok(()) => DrainOutcome::Clean,
            Err(_) => {
                let abandoned = tracker.len();
                force.cancel();
                warn!(
                    "shutdown: drain window elapsed, force closing, abandoned={}",
                    abandoned
                );
                DrainOutcome::Forced { abandoned }
            }
        };

        phase_tx.send_replace(ShutdownPhase::Stopped);
        let report = DrainReport {
            outcome,
            elapsed: started.elapsed(),
        };
        info!("shutdown: stopped, outcome={:?}", report.outcome);

        if report_tx.send(report).is_err() {
            warn!("shutdown: report receiver dropped");
        }
    });

    (handle, report_rx)
}

/// Build a trigger that resolves on SIGINT or SIGTERM. Handler installation
/// happens here so a failure surfaces at startup.
pub fn signal_trigger() -> std::io::Result<impl Future<Output = ()> + Send + 'static> {
    #[cfg(unix)]
    let mut terminate =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    Ok(async move {
        #[cfg(unix)]
        let terminate = async {
            terminate.recv().await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => info!("shutdown: received SIGINT"),
                Err(e) => warn!("shutdown: SIGINT listener failed, error={}", e),
            },
            _ = terminate => info!("shutdown: received SIGTERM"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn idle_server_drains_clean() {
        let (tx, rx) = oneshot::channel::<()>();
        let (handle, report) = start(
            async move {
                let _ = rx.await;
            },
            Duration::from_secs(5),
        );
        assert_eq!(handle.phase(), ShutdownPhase::Running);

        tx.send(()).unwrap();
        let report = report.await.unwrap();
        assert!(report.is_clean());
        assert_eq!(handle.phase(), ShutdownPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn work_inside_window_completes() {
        let (handle, report) = start(std::future::pending(), Duration::from_secs(5));

        let done = CancellationToken::new();
        let worker_done = done.clone();
        handle.tracker().spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            worker_done.cancel();
        });

        handle.trigger();
        let report = report.await.unwrap();
        assert_eq!(report.outcome, DrainOutcome::Clean);
        assert!(done.is_cancelled());
        assert!(report.elapsed >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn work_past_window_is_abandoned() {
        let (handle, report) = start(std::future::pending(), Duration::from_secs(5));

        let h = handle.clone();
        handle.tracker().spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                _ = h.forced() => {}
            }
        });

        handle.trigger();
        let report = report.await.unwrap();
        assert_eq!(report.outcome, DrainOutcome::Forced { abandoned: 1 });
        assert!(report.elapsed >= Duration::from_secs(5));
        handle.finished().await;
    }

    #[tokio::test(start_paused = true)]
    async fn phase_moves_through_draining() {
        let (handle, report) = start(std::future::pending(), Duration::from_secs(5));
        handle.tracker().spawn(tokio::time::sleep(Duration::from_secs(1)));

        handle.trigger();
        handle.stopping().await;
        let mut phase = handle.phase.clone();
        phase
            .wait_for(|p| *p != ShutdownPhase::Running)
            .await
            .unwrap();
        assert_eq!(handle.phase(), ShutdownPhase::Draining);

        report.await.unwrap();
        assert_eq!(handle.phase(), ShutdownPhase::Stopped);
    }
}
