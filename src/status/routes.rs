//! Route handlers for the status API.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::Monitor;
use crate::types::MonitorStats;

/// Shared state for route handlers.
pub struct StatusState {
    pub monitor: Monitor,
    pub started_at: DateTime<Utc>,
}

impl StatusState {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<StatusState>;

#[derive(Serialize)]
pub struct StatusResponse {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    #[serde(flatten)]
    pub stats: MonitorStats,
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.monitor.stats().await;
    Json(StatusResponse {
        started_at: state.started_at,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        stats,
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
