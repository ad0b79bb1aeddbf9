use thiserror::Error;
use uuid::Uuid;

/// Failure reported by a task handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Transient; the task is redelivered until it runs out of attempts.
    #[error("{0}")]
    Retry(String),

    /// Retrying cannot help (e.g. the payload does not deserialize).
    #[error("{0} (skip retry)")]
    SkipRetry(String),
}

impl TaskError {
    #[must_use]
    pub fn retry(message: impl Into<String>) -> Self {
        Self::Retry(message.into())
    }

    #[must_use]
    pub fn skip_retry(message: impl Into<String>) -> Self {
        Self::SkipRetry(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}

/// Queue storage errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Unknown task kind: {0}")]
    UnknownKind(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
