//! Listener, background tasks and shutdown

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use lanshare_presence::PresenceSweeper;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::routes::{build_routes, AppState};

/// Bind `port`, or the next free port within `retries` steps
pub async fn bind_with_fallback(bind: IpAddr, port: u16, retries: u16) -> io::Result<TcpListener> {
    let mut last_err = None;

    for offset in 0..=retries {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind(SocketAddr::new(bind, candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    warn!("Port {} is busy, using {} instead", port, candidate);
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                debug!("Port {} in use", candidate);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrInUse, format!("no free port from {}", port))
    }))
}

/// Start the periodic sweeps; each stops when `state.shutdown` is cancelled
pub fn spawn_background(state: &AppState) -> Vec<JoinHandle<()>> {
    let config = &state.config;
    let cancel = &state.shutdown;

    let sweeper = PresenceSweeper::from_presence_config(
        state.registry.clone(),
        state.fanout.clone(),
        &config.presence,
    );

    vec![
        tokio::spawn(sweeper.run_loop(cancel.clone())),
        tokio::spawn(
            state
                .limiter
                .clone()
                .run_purge_loop(config.rate_limit.sweep_interval(), cancel.clone()),
        ),
        tokio::spawn(
            state
                .rooms
                .clone()
                .run_sweep_loop(config.signal.sweep_interval(), cancel.clone()),
        ),
    ]
}

/// Serve the API on `listener` until `state.shutdown` is cancelled
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> io::Result<()> {
    let addr = listener.local_addr()?;
    let tasks = spawn_background(&state);
    let app = build_routes(state.clone());
    let shutdown = state.shutdown.clone();

    info!("lanshare listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    for task in tasks {
        if let Err(e) = task.await {
            error!("Background task failed: {}", e);
        }
    }
    info!("lanshare shutdown complete");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => {
                error!("Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = token.cancelled() => return,
    }
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn test_bind_falls_back_when_busy() {
        let taken = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        if port == u16::MAX {
            return;
        }

        match bind_with_fallback(LOOPBACK, port, 5).await {
            Ok(listener) => assert_ne!(listener.local_addr().unwrap().port(), port),
            // Every neighbour may be taken on a busy machine
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::AddrInUse),
        }
    }

    #[tokio::test]
    async fn test_bind_no_retries() {
        let taken = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_with_fallback(LOOPBACK, port, 0).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let shutdown = CancellationToken::new();
        let state = Arc::new(AppState::new(lanshare_core::Config::default(), shutdown.clone()));
        let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();

        let handle = tokio::spawn(serve(listener, state));
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_signal_returns_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), shutdown_signal(token))
            .await
            .unwrap();
    }
}
