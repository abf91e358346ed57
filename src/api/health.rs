//! Health check endpoint

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::ApiState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_calls: usize,
    pub uptime_secs: u64,
}

/// `GET /health`
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_calls: state.registry.active_count().await,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
