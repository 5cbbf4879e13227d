//! Plain HTTP handlers: health and status.

use axum::extract::State;
use axum::Json;

use super::schema::{AppState, HealthResponse, StatusResponse};

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let metrics = state.metrics.snapshot().await;
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        draft_model: state.config.speculation.draft_model.clone(),
        target_model: state.config.target.model.clone(),
        metrics,
    })
}
