//! In-memory ledger backend.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::{LedgerError, Result};
use crate::ledger::SyncLedger;
use crate::types::{DailyActivity, NewSyncLog, SyncLog, fill_days, window_start};

/// Ledger kept in a [`DashMap`] keyed by external ID.
///
/// Same contract as the PostgreSQL backend, including the uniqueness of the
/// external ID.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    rows: Arc<DashMap<String, SyncLog>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Snapshot of every row, ordered by id.
    pub fn rows(&self) -> Vec<SyncLog> {
        let mut rows: Vec<SyncLog> = self.rows.iter().map(|r| r.value().clone()).collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    fn update(&self, echis_id: &str, apply: impl FnOnce(&mut SyncLog)) -> Result<()> {
        let mut row = self
            .rows
            .get_mut(echis_id)
            .ok_or_else(|| LedgerError::not_found(echis_id))?;
        apply(row.value_mut());
        row.updated = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SyncLedger for InMemoryLedger {
    async fn find(&self, echis_id: &str) -> Result<Option<SyncLog>> {
        Ok(self.rows.get(echis_id).map(|r| r.value().clone()))
    }

    async fn insert(&self, new: NewSyncLog) -> Result<SyncLog> {
        match self.rows.entry(new.echis_id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::already_exists(new.echis_id)),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let row = SyncLog {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                    echis_id: new.echis_id,
                    tracked_entity: new.tracked_entity,
                    event_id: new.event_id,
                    org_unit: new.org_unit,
                    event_date: new.event_date,
                    client_creation_errors: new.client_creation_errors,
                    results_updated: false,
                    results_update_errors: String::new(),
                    lab_enrollment: String::new(),
                    lab_event: String::new(),
                    created: now,
                    updated: now,
                };
                slot.insert(row.clone());
                Ok(row)
            }
        }
    }

    async fn set_client_creation_errors(&self, echis_id: &str, errors: &str) -> Result<()> {
        self.update(echis_id, |r| r.client_creation_errors = errors.to_string())
    }

    async fn set_results_updated(&self, echis_id: &str) -> Result<()> {
        self.update(echis_id, |r| r.results_updated = true)
    }

    async fn set_results_update_errors(&self, echis_id: &str, errors: &str) -> Result<()> {
        self.update(echis_id, |r| r.results_update_errors = errors.to_string())
    }

    async fn set_lab_enrollment(&self, echis_id: &str, enrollment: &str) -> Result<()> {
        self.update(echis_id, |r| r.lab_enrollment = enrollment.to_string())
    }

    async fn set_lab_event(&self, echis_id: &str, event: &str) -> Result<()> {
        self.update(echis_id, |r| r.lab_event = event.to_string())
    }

    async fn daily_activity(&self, days: u32) -> Result<Vec<DailyActivity>> {
        let today = Utc::now().date_naive();
        let since = window_start(today, days);

        let mut counts: HashMap<NaiveDate, (i64, i64)> = HashMap::new();
        for row in self.rows.iter() {
            let day = row.created.date_naive();
            if day < since {
                continue;
            }
            let entry = counts.entry(day).or_default();
            entry.0 += 1;
            if row.results_updated {
                entry.1 += 1;
            }
        }
        Ok(fill_days(today, days, &counts))
    }
}
