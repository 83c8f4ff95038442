//! Error types for alcoord-client

use thiserror::Error;

/// Main error type for alcoord-client
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed configuration or corpus files
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corpus content that cannot be used (bad label line, invalid UTF-8)
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Every pool utterance has already been consumed by this session
    #[error("Pool exhausted: every utterance has been consumed")]
    PoolExhausted,

    /// A parallel scan worker failed
    #[error("Scan error: {0}")]
    Scan(String),

    /// Classifier training failed
    #[error("Training error: {0}")]
    Training(String),

    /// Websocket connection errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unexpected message for the current session state
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Session finished while work was in flight
    #[error("Session finished; work cancelled")]
    Cancelled,

    /// A background task panicked or was aborted
    #[error("Task error: {0}")]
    Task(String),

    /// Label store (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// alcoord-common error
    #[error("Common error: {0}")]
    Common(#[from] alcoord_common::Error),
}

/// Convenience Result type using alcoord-client Error
pub type Result<T> = std::result::Result<T, Error>;
