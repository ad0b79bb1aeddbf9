//! Client registration: create once per external ID.

use chrono::Utc;
use rtcgw_ledger::{LedgerError, NewSyncLog};
use rtcgw_tracker::RegistryResponse;
use tracing::{debug, info, instrument, warn};

use crate::builder::Program;
use crate::context::{ElementUpdate, SyncContext};
use crate::error::EngineError;
use crate::records::ClientRegistration;

const CREATE_OPERATION: &str = "create tracked entity";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// A ledger row already existed; nothing was sent.
    AlreadySynced { tracked_entity: String },
    Synced {
        tracked_entity: String,
        event: String,
    },
    /// Created, but the registry flagged the event. The conflicts are on the ledger row.
    SyncedWithConflicts {
        tracked_entity: String,
        event: String,
        conflicts: String,
    },
}

/// Per-call result of [`RegistrationReconciler::push_update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub attributes_error: Option<String>,
    pub data_values: Vec<ElementUpdate>,
}

impl UpdateReport {
    pub fn is_ok(&self) -> bool {
        self.attributes_error.is_none() && self.data_values.iter().all(ElementUpdate::is_ok)
    }
}

pub struct RegistrationReconciler {
    ctx: SyncContext,
}

impl RegistrationReconciler {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Registers the client unless a ledger row for its external ID exists.
    ///
    /// The ID lock is held across the ledger check, the create call and the
    /// insert.
    #[instrument(skip(self, registration), fields(echis_id = %registration.echis_patient_id))]
    pub async fn reconcile(
        &self,
        registration: &ClientRegistration,
    ) -> Result<RegistrationOutcome, EngineError> {
        let echis_id = registration.echis_patient_id.trim();
        if echis_id.is_empty() {
            return Err(EngineError::invalid_payload("echis_patient_id is empty"));
        }

        let _guard = self.ctx.locks.lock(echis_id).await;

        if let Some(log) = self.ctx.ledger.find(echis_id).await? {
            info!(tracked_entity = %log.tracked_entity, "Client already synced, skipping");
            return Ok(RegistrationOutcome::AlreadySynced {
                tracked_entity: log.tracked_entity,
            });
        }

        let org_unit = registration.facility_dhis2_id.as_str();
        let now = Utc::now();
        let payload = self.ctx.builder.registration(
            org_unit,
            self.ctx.mapper.attributes(registration),
            self.ctx.mapper.data_values(registration),
            now,
        );

        let response = self.ctx.registry.create_tracked_entity(&payload).await?;
        debug!(status = response.status, "Create tracked entity answered");
        let refs = extract_references(&response)?;

        let new = NewSyncLog {
            echis_id: echis_id.to_string(),
            tracked_entity: refs.tracked_entity.clone(),
            event_id: refs.event.clone(),
            org_unit: org_unit.to_string(),
            event_date: Some(now),
            client_creation_errors: refs.conflicts.clone().unwrap_or_default(),
        };
        match self.ctx.ledger.insert(new).await {
            Ok(_) => {}
            Err(LedgerError::AlreadyExists { .. }) => {
                // Another process won the insert. Its row is authoritative.
                warn!(tracked_entity = %refs.tracked_entity, "Sync log inserted concurrently");
                return Ok(RegistrationOutcome::AlreadySynced {
                    tracked_entity: refs.tracked_entity,
                });
            }
            Err(e) => return Err(e.into()),
        }

        match refs.conflicts {
            Some(conflicts) => {
                warn!(
                    tracked_entity = %refs.tracked_entity,
                    event = %refs.event,
                    conflicts = %conflicts,
                    "Client registered with conflicts"
                );
                Ok(RegistrationOutcome::SyncedWithConflicts {
                    tracked_entity: refs.tracked_entity,
                    event: refs.event,
                    conflicts,
                })
            }
            None => {
                info!(tracked_entity = %refs.tracked_entity, event = %refs.event, "Client registered");
                Ok(RegistrationOutcome::Synced {
                    tracked_entity: refs.tracked_entity,
                    event: refs.event,
                })
            }
        }
    }

    /// Re-sends attributes and mapped data elements for an already-synced client.
    ///
    /// Failures are collected per call rather than returned and replace the
    /// row's creation errors; only a missing ledger row or a ledger failure
    /// is an error.
    #[instrument(skip(self, registration), fields(echis_id = %registration.echis_patient_id))]
    pub async fn push_update(
        &self,
        registration: &ClientRegistration,
    ) -> Result<UpdateReport, EngineError> {
        let echis_id = registration.echis_patient_id.trim();
        let _guard = self.ctx.locks.lock(echis_id).await;

        let log = self
            .ctx
            .ledger
            .find(echis_id)
            .await?
            .ok_or_else(|| EngineError::NotRegistered(echis_id.to_string()))?;

        let (program, _) = self.ctx.builder.program_ids(Program::Primary);
        let update = self.ctx.builder.attribute_update(
            &log.tracked_entity,
            &log.org_unit,
            self.ctx.mapper.attributes(registration),
        );
        let attributes_error = match self.ctx.registry.update_tracked_entity(program, &update).await
        {
            Ok(response) if response.is_success() => None,
            Ok(response) => Some(response.error_message()),
            Err(e) => Some(e.to_string()),
        };
        if let Some(message) = &attributes_error {
            warn!(tracked_entity = %log.tracked_entity, error = %message, "Attribute update failed");
        }

        let updates = self.ctx.builder.data_value_updates(
            Program::Primary,
            &log.event_id,
            &log.tracked_entity,
            &log.org_unit,
            self.ctx.mapper.data_values(registration),
        );
        let data_values = self.ctx.push_data_values(&updates).await;

        let errors = attributes_error
            .iter()
            .map(String::as_str)
            .chain(data_values.iter().filter_map(|u| u.error.as_deref()))
            .collect::<Vec<_>>()
            .join("; ");
        self.ctx
            .ledger
            .set_client_creation_errors(&log.echis_id, &errors)
            .await?;

        Ok(UpdateReport {
            attributes_error,
            data_values,
        })
    }
}

struct CreatedReferences {
    tracked_entity: String,
    event: String,
    conflicts: Option<String>,
}

/// Pulls references out of a create response.
///
/// A 409 still carries the import summary; when it names both references
/// the entity exists and the conflicts are recorded. Without them the call
/// failed and must be retried.
fn extract_references(response: &RegistryResponse) -> Result<CreatedReferences, EngineError> {
    let refs = response
        .parse_root()
        .ok()
        .and_then(|root| root.tracked_entity_and_event())
        .filter(|refs| !refs.tracked_entity.is_empty());

    match refs {
        Some(refs) => {
            let conflicts = match refs.conflicts {
                Some(c) => Some(c),
                None if !response.is_success() => Some(response.error_message()),
                None => None,
            };
            Ok(CreatedReferences {
                tracked_entity: refs.tracked_entity,
                event: refs.event,
                conflicts,
            })
        }
        None if !response.is_success() => Err(EngineError::Rejected {
            operation: CREATE_OPERATION,
            status: response.status,
            message: response.error_message(),
        }),
        None => Err(EngineError::MissingReference {
            operation: CREATE_OPERATION,
        }),
    }
}
