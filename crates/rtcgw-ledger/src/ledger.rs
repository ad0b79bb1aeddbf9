//! Storage trait for the sync ledger.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DailyActivity, NewSyncLog, SyncLog};

/// Ledger storage.
///
/// Setters are keyed by external ID, touch one field, and return
/// [`LedgerError::NotFound`](crate::LedgerError::NotFound) when no row matches.
#[async_trait]
pub trait SyncLedger: Send + Sync {
    async fn find(&self, echis_id: &str) -> Result<Option<SyncLog>>;

    /// Inserts a new row. Fails with
    /// [`LedgerError::AlreadyExists`](crate::LedgerError::AlreadyExists) if
    /// the external ID is already present.
    async fn insert(&self, new: NewSyncLog) -> Result<SyncLog>;

    async fn set_client_creation_errors(&self, echis_id: &str, errors: &str) -> Result<()>;

    /// Marks primary results as pushed. There is no way to unset it.
    async fn set_results_updated(&self, echis_id: &str) -> Result<()>;

    async fn set_results_update_errors(&self, echis_id: &str, errors: &str) -> Result<()>;

    async fn set_lab_enrollment(&self, echis_id: &str, enrollment: &str) -> Result<()>;

    async fn set_lab_event(&self, echis_id: &str, event: &str) -> Result<()>;

    /// Counts for the last `days` days including today, oldest first.
    async fn daily_activity(&self, days: u32) -> Result<Vec<DailyActivity>>;
}
