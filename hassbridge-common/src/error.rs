//! Error types for hassbridge.

use thiserror::Error;

/// Common error type for hassbridge components.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid topic '{topic}': {reason}")]
    Topic { topic: String, reason: String },

    #[error("Invalid payload: {0}")]
    Payload(String),
}

impl Error {
    pub(crate) fn topic(topic: &str, reason: impl Into<String>) -> Self {
        Self::Topic {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias using hassbridge's Error.
pub type Result<T> = std::result::Result<T, Error>;
