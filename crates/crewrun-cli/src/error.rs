//! Error types for the CLI client.

use thiserror::Error;

/// Errors that can occur when talking to the coordinator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The coordinator rejected the request.
    #[error("{code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Bad local input, such as an unreadable plan file.
    #[error("invalid input: {0}")]
    Input(String),
}
