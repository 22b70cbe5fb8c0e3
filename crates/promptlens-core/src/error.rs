// Error types shared across the workspace

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Result type alias for promptlens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving dashboard reads and streams
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or out-of-range request parameters; the client must fix and retry
    #[error("validation error: {0}")]
    Validation(String),

    /// A limit parameter that could not be interpreted as an integer
    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    /// Malformed cursor token, or a cursor minted under a different sort;
    /// the client must drop its stored cursor and restart from the first page
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// Referenced resource absent; reported as empty/404, never fatal
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure on the consumer side; triggers reconnect
    #[error("network error: {0}")]
    Network(String),

    /// Invalid startup configuration; fail fast, never limp along
    #[error("configuration error: {0}")]
    Config(String),

    /// Unexpected failure; logged in full, surfaced as an opaque 5xx
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create an invalid-limit error
    pub fn invalid_limit(msg: impl Into<String>) -> Self {
        Error::InvalidLimit(msg.into())
    }

    /// Create an invalid-cursor error
    pub fn invalid_cursor(msg: impl Into<String>) -> Self {
        Error::InvalidCursor(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Error::Network(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// The machine-readable code this error carries on the public API
    pub fn code(&self) -> ApiErrorCode {
        match self {
            Error::Validation(_) | Error::InvalidCursor(_) | Error::NotFound(_) => {
                ApiErrorCode::ValidationError
            }
            Error::InvalidLimit(_) => ApiErrorCode::InvalidLimit,
            Error::Network(_) => ApiErrorCode::NetworkError,
            Error::Config(_) | Error::Internal(_) => ApiErrorCode::InternalError,
        }
    }
}

/// Stable error codes exposed on the public API surface.
/// These are part of the wire contract; renaming a variant is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    ValidationError,
    InvalidLimit,
    DatabaseError,
    NetworkError,
    InternalError,
}
