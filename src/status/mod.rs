//! Status endpoint: Axum server exposing monitor state as JSON.
//!
//! Read-only and machine-facing: `/health` for liveness probes and
//! `/api/status` for the live `MonitorStats`. CORS is open for GET.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::engine::Monitor;
use routes::{AppState, StatusState};

/// Bind `port` and serve in the background.
pub async fn spawn_status_server(monitor: Monitor, port: u16) -> Result<JoinHandle<()>> {
    let app = build_router(Arc::new(StatusState::new(monitor)));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status port {port}"))?;
    info!(port, "Status server listening on http://localhost:{port}");

    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Status server error");
        }
    }))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
