//! HTTP server lifecycle

use super::routes::{create_routes, AppState};
use crate::config::AppConfig;
use crate::store::StreamStore;
use amps_supervisor::Supervisor;
use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the application router with its middleware.
pub fn build_app(state: AppState) -> Router {
    create_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until a shutdown signal arrives, then stop every transcoder.
pub async fn serve(config: AppConfig) -> Result<()> {
    let store = Arc::new(StreamStore::new(config.profiles, config.streams));
    let supervisor = Arc::new(Supervisor::new(config.supervisor));
    info!(
        "Loaded {} stream(s), {} profile(s)",
        store.len(),
        store.profile_names().len()
    );

    let addr = config.server.bind_address();
    let socket_addr: SocketAddr = addr.parse().context("Failed to parse socket address")?;
    let listener = tokio::net::TcpListener::bind(&socket_addr)
        .await
        .context("Failed to bind to address")?;

    serve_with_shutdown(
        listener,
        AppState::new(store, Arc::clone(&supervisor)),
        shutdown_signal(),
    )
    .await
}

/// Serve on `listener` until `shutdown` resolves.
///
/// The supervisor's shutdown sweep runs after the server stops, whether it
/// stopped cleanly or with an error.
pub async fn serve_with_shutdown(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let supervisor = Arc::clone(&state.supervisor);
    if let Ok(addr) = listener.local_addr() {
        info!("AMPS listening on http://{}", addr);
    }

    let served = axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error");

    let report = supervisor.shutdown_all().await;
    info!(
        "Stopped {} stream(s) ({} killed)",
        report.streams, report.killed
    );
    served
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C, shutting down"); }
        () = terminate => { info!("Received SIGTERM, shutting down"); }
    }
}
