use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::repository::ArenaCounts;
use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub arenas: ArenaCounts,
    /// Arenas with running capture/deadline tasks.
    pub tracked_arenas: usize,
    pub sse_subscribers: usize,
}

/// Health check endpoint. Returns server status, arena counts and
/// subscriber count as JSON.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        arenas: state.arenas.counts().await,
        tracked_arenas: state.arenas.tracked_count(),
        sse_subscribers: state.sse_subscriber_count.load(Ordering::Relaxed),
    })
}
