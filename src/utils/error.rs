//! Error types for the speculation engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the speculation engine
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    #[error("draft collaborator failed: {0}")]
    DraftFailure(String),

    #[error("target collaborator failed: {0}")]
    TargetFailure(String),

    #[error("invalid request parameters: {0}")]
    InvalidParameters(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport closed")]
    TransportClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for SpecError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            SpecError::ConfigInvalid(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            SpecError::DraftFailure(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            SpecError::TargetFailure(msg) => (StatusCode::BAD_GATEWAY, msg),
            SpecError::InvalidParameters(msg) => (StatusCode::BAD_REQUEST, msg),
            SpecError::Timeout => (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string()),
            SpecError::TransportClosed => (
                StatusCode::SERVICE_UNAVAILABLE,
                "transport closed".to_string(),
            ),
            SpecError::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("IO error: {}", err),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, SpecError>;
