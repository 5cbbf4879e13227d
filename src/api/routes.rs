//! API route configuration

use axum::routing::get;
use axum::Router;

use super::handlers::{health, status};
use super::schema::AppState;
use super::ws::ws_handler;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/generate", get(ws_handler))
        .route("/v1/health", get(health))
        .route("/v1/status", get(status))
        .with_state(state)
}
