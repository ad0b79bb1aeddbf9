//! Error types for registry communication.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// The request never produced a response (DNS, connect, timeout, TLS).
    #[error("Registry request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The registry answered with a status the caller cannot interpret.
    #[error("Registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("Invalid registry response: {0}")]
    InvalidResponse(String),

    #[error("Invalid registry configuration: {0}")]
    InvalidConfig(String),
}

impl TrackerError {
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
