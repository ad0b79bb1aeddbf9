//! Error types for the sync ledger.

use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique violation (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("No sync log for external ID '{echis_id}'")]
    NotFound { echis_id: String },

    /// A row for this external ID already exists.
    #[error("Sync log for external ID '{echis_id}' already exists")]
    AlreadyExists { echis_id: String },

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl LedgerError {
    #[must_use]
    pub fn not_found(echis_id: impl Into<String>) -> Self {
        Self::NotFound {
            echis_id: echis_id.into(),
        }
    }

    #[must_use]
    pub fn already_exists(echis_id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            echis_id: echis_id.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Maps an insert failure, turning a unique violation into `AlreadyExists`.
    pub(crate) fn from_insert(err: SqlxError, echis_id: &str) -> Self {
        if has_pg_error_code(&err, PG_UNIQUE_VIOLATION) {
            Self::already_exists(echis_id)
        } else {
            Self::Database(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::already_exists("E100");
        assert_eq!(err.to_string(), "Sync log for external ID 'E100' already exists");

        let err = LedgerError::config("empty url");
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_non_database_error_is_not_unique_violation() {
        let err = LedgerError::from_insert(SqlxError::RowNotFound, "E100");
        assert!(matches!(err, LedgerError::Database(_)));
    }
}
