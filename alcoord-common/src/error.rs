//! Common error types for alcoord

use thiserror::Error;

/// Common result type for alcoord operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by server and client
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Message decoded but failed field validation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}
