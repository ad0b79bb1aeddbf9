use rtcgw_ledger::LedgerError;
use rtcgw_queue::TaskError;
use rtcgw_tracker::TrackerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] TrackerError),

    /// Non-success status on a write, with the registry's conflict text.
    #[error("Registry rejected {operation} with HTTP {status}: {message}")]
    Rejected {
        operation: &'static str,
        status: u16,
        message: String,
    },

    /// The call succeeded but the response carried no usable reference.
    #[error("Registry response to {operation} carried no reference")]
    MissingReference { operation: &'static str },

    /// The input record cannot be processed as sent.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("No sync log for external ID '{0}'")]
    NotRegistered(String),
}

impl EngineError {
    #[must_use]
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }

    /// Whether redelivering the same task could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidPayload(_) | Self::NotRegistered(_) => false,
            Self::Registry(TrackerError::InvalidConfig(_)) => false,
            Self::Ledger(LedgerError::Config { .. }) => false,
            Self::Ledger(_)
            | Self::Registry(_)
            | Self::Rejected { .. }
            | Self::MissingReference { .. } => true,
        }
    }
}

impl From<EngineError> for TaskError {
    fn from(err: EngineError) -> Self {
        if err.is_retryable() {
            TaskError::Retry(err.to_string())
        } else {
            TaskError::SkipRetry(err.to_string())
        }
    }
}
