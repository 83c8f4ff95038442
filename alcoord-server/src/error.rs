//! Error types for alcoord-server
//!
//! `Error` is the coordination-level error; `ApiError` is its HTTP rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Main error type for alcoord-server
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unknown project, session or instance
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation conflicts with stored state (e.g. instance already annotated)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid request parameter
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Session emitted a selection past its project's budget
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// Coordination invariant violated; indicates a bug in a client or the server
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Message arrived in a state where it cannot be handled
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// alcoord-common error
    #[error("Common error: {0}")]
    Common(#[from] alcoord_common::Error),
}

/// Convenience Result type using alcoord-server Error
pub type Result<T> = std::result::Result<T, Error>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Coordination invariant violated (500)
    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::BadRequest(msg) => ApiError::BadRequest(msg),
            Error::Common(alcoord_common::Error::InvalidMessage(msg)) => ApiError::BadRequest(msg),
            Error::Invariant(msg) | Error::BudgetExceeded(msg) => ApiError::Invariant(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Invariant(msg) => {
                error!("Invariant violation surfaced to API caller: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INVARIANT_VIOLATION", msg)
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
