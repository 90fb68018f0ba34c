//! Error types for vitaeq

use thiserror::Error;

/// Result type alias using VitaeqError
pub type Result<T> = std::result::Result<T, VitaeqError>;

/// Error type alias for convenience
pub type Error = VitaeqError;

/// Main error type for vitaeq
///
/// Startup errors (`WorkerInitTimeout`, `WorkerInitFailure`) are fatal and
/// propagate out of `Router::initialize`. Per-query errors are absorbed at
/// the strategy boundary and surface as degraded `QueryResult`s instead;
/// `Router::process_query` never returns an `Err`.
#[derive(Debug, Error)]
pub enum VitaeqError {
    #[error("Worker '{service}' did not signal ready in time")]
    WorkerInitTimeout { service: String },

    #[error("Worker '{service}' failed to initialize: {reason}")]
    WorkerInitFailure { service: String, reason: String },

    #[error("Request '{request_type}' timed out")]
    RequestTimeout { request_type: String },

    #[error("Worker runtime error: {0}")]
    WorkerRuntime(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Unexpected response payload for request '{0}'")]
    UnexpectedResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl VitaeqError {
    /// Whether this error aborts `Router::initialize` entirely
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::WorkerInitTimeout { .. } | Self::WorkerInitFailure { .. }
        )
    }
}
