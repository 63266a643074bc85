mod admin;
pub mod bootstrap;
pub mod shutdown;
mod state;

pub use shutdown::{DrainOutcome, DrainReport, ShutdownHandle, ShutdownPhase};
pub use state::AppState;

use crate::api;
use anyhow::Result;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::io;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Pause after an accept failure caused by resource exhaustion.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// Unix errno values. std maps none of these except ENOMEM to an `ErrorKind`.
const ENOMEM: i32 = 12;
const ENFILE: i32 = 23;
const EMFILE: i32 = 24;
#[cfg(target_os = "linux")]
const ENOBUFS: i32 = 105;
#[cfg(not(target_os = "linux"))]
const ENOBUFS: i32 = 55;

/// What the accept loop does after `accept()` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// One pending connection died before it was handed over; take the next.
    Connection,
    /// Out of descriptors or buffers; back off, then keep accepting.
    Exhausted,
    /// The listener itself is broken.
    Fatal,
}

fn classify_accept_error(e: &io::Error) -> AcceptFailure {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::TimedOut
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => AcceptFailure::Connection,
        io::ErrorKind::OutOfMemory => AcceptFailure::Exhausted,
        _ => match e.raw_os_error() {
            Some(ENOMEM | ENFILE | EMFILE | ENOBUFS) if cfg!(unix) => AcceptFailure::Exhausted,
            _ => AcceptFailure::Fatal,
        },
    }
}

/// Sort an accept error into retry or give up, sleeping through the backoff
/// when the process is out of resources. Returns the error if it is fatal.
async fn recover_accept(
    listener: &'static str,
    e: io::Error,
    shutdown: &ShutdownHandle,
) -> io::Result<()> {
    match classify_accept_error(&e) {
        AcceptFailure::Connection => {
            debug!("server: {}: accept dropped a connection, error={}", listener, e);
            Ok(())
        }
        AcceptFailure::Exhausted => {
            error!(
                "server: {}: accept failed, retrying in {}, error={}",
                listener,
                humantime::format_duration(ACCEPT_BACKOFF),
                e
            );
            tokio::select! {
                _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                _ = shutdown.stopping() => {}
            }
            Ok(())
        }
        AcceptFailure::Fatal => Err(e),
    }
}

/// Run the API accept loop until shutdown begins.
///
/// Every accepted connection is served on its own task, tracked by the
/// shutdown coordinator. When the coordinator starts draining, the loop
/// returns `Ok(())` and each connection is asked to finish its current
/// request and close; connections still open when the drain window closes
/// are dropped.
///
/// Accept errors tied to a single connection are skipped, and running out of
/// descriptors or buffers backs off briefly before accepting again. Any other
/// accept error means the listener is broken: it triggers shutdown and is
/// returned.
pub async fn serve(listener: TcpListener, state: AppState, shutdown: ShutdownHandle) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("server: api listening, addr={}", addr);

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.stopping() => {
                info!(
                    "server: api: stop accepting new connections, in_flight={}",
                    shutdown.in_flight()
                );
                return Ok(());
            }
        };

        let (stream, peer_addr) = match accepted {
            Ok(v) => {
                metrics::counter!(
                    "api_connections_total",
                    "status" => "accepted",
                )
                .increment(1);
                v
            }
            Err(e) => {
                metrics::counter!(
                    "api_connections_total",
                    "status" => "error",
                )
                .increment(1);
                if let Err(e) = recover_accept("api", e, &shutdown).await {
                    error!("server: api: listener failed, error={}", e);
                    shutdown.trigger();
                    return Err(e.into());
                }
                continue;
            }
        };

        metrics::gauge!("api_connections_active").increment(1.0);

        let state = state.clone();
        let conn_shutdown = shutdown.clone();
        shutdown.tracker().spawn(async move {
            let io = TokioIo::new(stream);
            let remote = peer_addr.to_string();
            let svc = service_fn(move |req: Request<Incoming>| {
                api::handle_request(req, state.clone(), remote.clone())
            });

            let builder = auto::Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection(io, svc);
            tokio::pin!(conn);

            let result = tokio::select! {
                res = conn.as_mut() => res,
                _ = conn_shutdown.stopping() => {
                    conn.as_mut().graceful_shutdown();
                    tokio::select! {
                        res = conn.as_mut() => res,
                        _ = conn_shutdown.forced() => {
                            debug!("server: api: connection abandoned, peer={}", peer_addr);
                            Ok(())
                        }
                    }
                }
            };

            if let Err(e) = result {
                if !e.to_string().contains("connection closed") {
                    error!(
                        "server: api: connection error, peer={}, error={}",
                        peer_addr, e
                    );
                }
            }

            metrics::gauge!("api_connections_active").decrement(1.0);
        });
    }
}

/// Serve health, readiness and metrics until the coordinator has stopped.
pub async fn run_admin_server(
    listener: TcpListener,
    state: AppState,
    shutdown: ShutdownHandle,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("server: admin listening, addr={}", addr);

    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.finished() => return Ok(()),
        };
        let stream = match accepted {
            Ok((stream, _)) => stream,
            Err(e) => {
                recover_accept("admin", e, &shutdown).await?;
                continue;
            }
        };
        let state = state.clone();
        let conn_shutdown = shutdown.clone();

        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let svc = service_fn(move |req: Request<Incoming>| {
                let state = state.clone();
                let phase = conn_shutdown.phase();
                async move { admin::handle_admin(req, state, phase).await }
            });

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .http1()
                .keep_alive(false)
                .serve_connection(io, svc)
                .await
            {
                if !e.to_string().contains("connection closed") {
                    error!("server: admin: connection error, error={}", e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_handshakes_are_skipped() {
        for kind in [
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::Interrupted,
        ] {
            assert_eq!(
                classify_accept_error(&io::Error::from(kind)),
                AcceptFailure::Connection
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn descriptor_exhaustion_backs_off() {
        for errno in [EMFILE, ENFILE, ENOBUFS, ENOMEM] {
            assert_eq!(
                classify_accept_error(&io::Error::from_raw_os_error(errno)),
                AcceptFailure::Exhausted,
                "errno {}",
                errno
            );
        }
    }

    #[test]
    fn other_listener_errors_are_fatal() {
        for kind in [
            io::ErrorKind::InvalidInput,
            io::ErrorKind::PermissionDenied,
            io::ErrorKind::Other,
        ] {
            assert_eq!(
                classify_accept_error(&io::Error::from(kind)),
                AcceptFailure::Fatal
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_keeps_the_loop_alive_until_shutdown() {
        let (handle, _report) = shutdown::start(std::future::pending::<()>(), Duration::from_secs(1));

        let started = tokio::time::Instant::now();
        recover_accept("api", io::Error::from_raw_os_error(EMFILE), &handle)
            .await
            .unwrap();
        assert!(started.elapsed() >= ACCEPT_BACKOFF);

        let err = recover_accept("api", io::Error::from(io::ErrorKind::InvalidInput), &handle)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
