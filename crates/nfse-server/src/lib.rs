//! HTTP API for NFS-e processing.
//!
//! Endpoints:
//! - `POST /decode` streams extracted invoices for uploaded PDFs
//! - `POST /persist` stores an invoice PDF with its JSON summary
//! - `GET /search` finds stored invoices by competence
//! - `GET|POST /invoices`, `POST /reference` and `GET /compare` drive reconciliation

pub mod error;
pub mod routes;
pub mod state;
pub mod upload;

pub use error::ApiError;
pub use state::AppState;

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let body_limit = state.config().server.max_upload_bytes;

    Router::new()
        .route("/health", get(routes::health))
        .route("/decode", post(routes::decode::decode))
        .route("/persist", post(routes::persist::persist))
        .route("/search", get(routes::persist::search))
        .route(
            "/invoices",
            get(routes::reconcile::list_invoices).post(routes::reconcile::add_invoices),
        )
        .route("/reference", post(routes::reconcile::replace_reference))
        .route("/compare", get(routes::reconcile::compare))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let server = &state.config().server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    if !state.pipeline().has_extractor() {
        tracing::warn!("No LLM credential configured; extraction endpoints will answer 401");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("NFS-e server listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
