//! Ingest plane: admission-controls incoming validation requests,
//! header-validates them cheaply, applies sampling, and enqueues accepted
//! requests for asynchronous processing.

mod error;
mod handlers;
mod sampling;
pub mod state;

use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tower::timeout::TimeoutLayer;
use tracing::info;

use crate::config::ServerConfig;
pub use state::AppState;

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/metrics", get(handlers::metrics))
        .route("/ValidateResponse", post(handlers::validate_response))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(server.write_timeout_secs)))
}

/// Binds and serves the ingest router, terminating TLS when configured.
pub async fn run(state: AppState, server: ServerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(state, &server);

    if let Some(tls) = &server.tls {
        info!(%server.bind_addr, "ingest server listening (TLS)");
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file).await?;
        axum_server::bind_rustls(server.bind_addr, rustls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        info!(%server.bind_addr, "ingest server listening (plain)");
        let listener = TcpListener::bind(server.bind_addr).await?;
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
