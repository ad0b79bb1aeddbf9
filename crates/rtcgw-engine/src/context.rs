//! Shared dependencies of the reconcilers.

use std::sync::Arc;

use rtcgw_ledger::SyncLedger;
use rtcgw_tracker::{EventUpdatePayload, RegistryClient};
use tracing::warn;

use crate::builder::PayloadBuilder;
use crate::locks::KeyedLocks;
use crate::mapping::FieldMapper;

#[derive(Clone)]
pub struct SyncContext {
    pub registry: Arc<dyn RegistryClient>,
    pub ledger: Arc<dyn SyncLedger>,
    pub mapper: Arc<FieldMapper>,
    pub builder: Arc<PayloadBuilder>,
    /// Shared by every reconciler so work for one external ID never overlaps.
    pub locks: KeyedLocks,
}

impl SyncContext {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        ledger: Arc<dyn SyncLedger>,
        mapper: FieldMapper,
        builder: PayloadBuilder,
    ) -> Self {
        Self {
            registry,
            ledger,
            mapper: Arc::new(mapper),
            builder: Arc::new(builder),
            locks: KeyedLocks::new(),
        }
    }

    /// Sends each single-value update in order, continuing past failures.
    pub async fn push_data_values(&self, updates: &[EventUpdatePayload]) -> Vec<ElementUpdate> {
        let mut report = Vec::with_capacity(updates.len());
        for update in updates {
            let data_element = update.data_element().unwrap_or_default().to_string();
            let error = match self
                .registry
                .update_event_data_value(&update.event, &data_element, update)
                .await
            {
                Ok(response) if response.is_success() => None,
                Ok(response) => Some(response.error_message()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(message) = &error {
                warn!(event = %update.event, data_element = %data_element, error = %message, "Data value update failed");
            }
            report.push(ElementUpdate {
                data_element,
                error,
            });
        }
        report
    }
}

/// Outcome of one single-value update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementUpdate {
    pub data_element: String,
    pub error: Option<String>,
}

impl ElementUpdate {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
