//! API request/response schemas and shared application state.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::SpectraConfig;
use crate::draft::DraftCollaborator;
use crate::metrics::SharedMetrics;
use crate::target::TargetCollaborator;

/// Shared application state, cloned into every request handler.
#[derive(Clone)]
pub struct AppState {
    pub draft: Arc<dyn DraftCollaborator>,
    pub target: Arc<dyn TargetCollaborator>,
    pub metrics: SharedMetrics,
    pub config: Arc<SpectraConfig>,
    pub start_time: Instant,
}

/// Client-supplied request opening a speculative generation session.
/// Sent as the first (and only) text frame on a freshly-opened
/// WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Server status / telemetry snapshot response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub draft_model: String,
    pub target_model: String,
    pub metrics: crate::metrics::MetricsSnapshot,
}

/// Error response body, also used by [`crate::utils::SpecError`]'s
/// `IntoResponse` impl.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
