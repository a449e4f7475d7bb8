//! Error types for MinuTAG.

use thiserror::Error;

/// Common error type for MinuTAG.
#[derive(Error, Debug)]
pub enum MinutagError {
    /// Validation error for client input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Server setup is incomplete (missing credentials, bad config file).
    #[error("configuration error: {0}")]
    Config(String),

    /// The admission queue is full.
    #[error("upload queue is full, try again later")]
    QueueFull {
        /// Seconds the client should wait before retrying.
        retry_after_secs: u64,
    },

    /// Waited in the admission queue longer than the configured timeout.
    #[error("timed out waiting for an upload slot")]
    QueueTimeout {
        /// Seconds the client should wait before retrying.
        retry_after_secs: u64,
    },

    /// Credential exchange failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Opaque failure reported by the remote storage service.
    #[error("remote storage error: {0}")]
    Remote(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MinutagError {
    /// Seconds the client should wait before retrying, for errors caused
    /// by load rather than by the request itself.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            MinutagError::QueueFull { retry_after_secs }
            | MinutagError::QueueTimeout { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for MinutagError {
    fn from(e: reqwest::Error) -> Self {
        MinutagError::Remote(e.to_string())
    }
}

/// Result type alias for MinuTAG operations.
pub type Result<T> = std::result::Result<T, MinutagError>;
