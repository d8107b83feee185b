//! Chronicle API: error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chronicle_core::error::{AuditError, PersistenceError};
use serde::Serialize;
use thiserror::Error;

/// Startup and shutdown errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// An environment variable is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Tracing or metrics export could not be set up or flushed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer wrapper around `AuditError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub AuditError);

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            AuditError::Persistence(PersistenceError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found")
            }
            AuditError::Persistence(PersistenceError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error")
            }
            AuditError::Persistence(PersistenceError::Backend(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error")
            }
            AuditError::EventStore(_) => (StatusCode::INTERNAL_SERVER_ERROR, "event_store_error"),
            AuditError::Projection(_) => (StatusCode::INTERNAL_SERVER_ERROR, "projection_error"),
        };

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
        };

        (status, Json(body)).into_response()
    }
}
