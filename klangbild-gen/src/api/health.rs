//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("klangbild-gen")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Short git hash captured at build time
    pub git_hash: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Transactions held by the store
    pub transactions: usize,
    /// Audio tasks queued or running
    pub audio_tasks_in_flight: usize,
    /// Last pipeline error if any (for diagnostics)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "klangbild-gen".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: env!("GIT_HASH").to_string(),
        uptime_seconds,
        transactions: state.controller.store().len(),
        audio_tasks_in_flight: state.controller.audio_pool().in_flight(),
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
