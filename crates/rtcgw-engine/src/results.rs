//! Lab result sync: primary program update, then the laboratory branch on a
//! positive diagnosis.

use chrono::NaiveDate;
use rtcgw_ledger::SyncLog;
use rtcgw_tracker::{DataValue, TrackedEntitySearch};
use tracing::{info, instrument, warn};

use crate::builder::Program;
use crate::context::{ElementUpdate, SyncContext};
use crate::diagnosis::{Diagnosis, derive_diagnosis};
use crate::error::EngineError;
use crate::records::LabResult;

/// Registry date format for result and enrollment dates.
const REGISTRY_DATE_FORMAT: &str = "%Y-%m-%d";

/// Mapping keys of the data elements a result writes.
const PRIMARY_RESULTS: &str = "results";
const PRIMARY_RESULTS_DATE: &str = "results_date";
const PRIMARY_DIAGNOSED: &str = "diagnosed";
const LAB_RESULTS: &str = "lab_results";
const LAB_RESULTS_DATE: &str = "lab_results_date";
const LAB_DIAGNOSIS: &str = "lab_diagnosis";
const LAB_REFERRED_FROM_COMMUNITY: &str = "lab_sample_referred_from_community";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultOutcome {
    /// No ledger row for the patient; the result is dropped.
    NotRegistered,
    Processed(ResultReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultReport {
    pub diagnosis: Diagnosis,
    pub primary: Vec<ElementUpdate>,
    /// `None` when the diagnosis did not call for the lab branch.
    pub lab: Option<LabOutcome>,
}

impl ResultReport {
    pub fn primary_updated(&self) -> bool {
        !self.primary.is_empty() && self.primary.iter().all(ElementUpdate::is_ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabOutcome {
    EventCreated {
        enrollment: String,
        event: String,
    },
    EventUpdated {
        enrollment: String,
        event: String,
        data_values: Vec<ElementUpdate>,
    },
}

pub struct ResultReconciler {
    ctx: SyncContext,
}

impl ResultReconciler {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, result), fields(echis_id = %result.patient_id))]
    pub async fn reconcile(&self, result: &LabResult) -> Result<ResultOutcome, EngineError> {
        let echis_id = result.patient_id.trim();
        let date = result.result_date()?.date();

        let _guard = self.ctx.locks.lock(echis_id).await;

        let Some(log) = self.ctx.ledger.find(echis_id).await? else {
            self.log_unregistered(result).await;
            return Ok(ResultOutcome::NotRegistered);
        };

        let diagnosis = derive_diagnosis(result.mtb.trim(), result.rr.trim());
        let org_unit = if result.facility_dhis2_id.is_empty() {
            log.org_unit.clone()
        } else {
            result.facility_dhis2_id.clone()
        };
        info!(label = diagnosis.label, diagnosed = diagnosis.diagnosed.as_str(), "Diagnosis derived");

        let primary = self
            .update_primary(&log, &org_unit, &diagnosis, date)
            .await?;

        let lab = if diagnosis.is_diagnosed() {
            Some(self.sync_lab(log, &org_unit, &diagnosis, date).await?)
        } else {
            None
        };

        Ok(ResultOutcome::Processed(ResultReport {
            diagnosis,
            primary,
            lab,
        }))
    }

    /// Whether the registry holds a tracked entity for the result's patient
    /// in the primary program, searched by the configured search attribute.
    pub async fn check_registry_presence(&self, result: &LabResult) -> Result<bool, EngineError> {
        let programs = self.ctx.builder.programs();
        let found = self
            .ctx
            .registry
            .search_tracked_entities(&TrackedEntitySearch {
                org_unit: result.facility_dhis2_id.clone(),
                program: programs.tracker_program.clone(),
                attribute: programs.search_attribute.clone(),
                value: result.patient_id.trim().to_string(),
            })
            .await?;
        Ok(!found.is_empty())
    }

    async fn log_unregistered(&self, result: &LabResult) {
        if self.ctx.builder.programs().search_attribute.is_empty()
            || result.facility_dhis2_id.is_empty()
        {
            warn!("Result for unregistered client dropped");
            return;
        }
        match self.check_registry_presence(result).await {
            Ok(true) => warn!("Result dropped: client is in the registry but has no sync log"),
            Ok(false) => warn!("Result for unregistered client dropped"),
            Err(e) => warn!(error = %e, "Result for unregistered client dropped, registry search failed"),
        }
    }

    async fn update_primary(
        &self,
        log: &SyncLog,
        org_unit: &str,
        diagnosis: &Diagnosis,
        date: NaiveDate,
    ) -> Result<Vec<ElementUpdate>, EngineError> {
        let date = date.format(REGISTRY_DATE_FORMAT).to_string();
        let data_values = self.mapped_values(&[
            (PRIMARY_RESULTS, diagnosis.label),
            (PRIMARY_RESULTS_DATE, date.as_str()),
            (PRIMARY_DIAGNOSED, diagnosis.diagnosed.as_str()),
        ]);
        let updates = self.ctx.builder.data_value_updates(
            Program::Primary,
            &log.event_id,
            &log.tracked_entity,
            org_unit,
            data_values,
        );
        let report = self.ctx.push_data_values(&updates).await;

        if let Some(message) = report.iter().rev().find_map(|u| u.error.as_deref()) {
            self.ctx
                .ledger
                .set_results_update_errors(&log.echis_id, message)
                .await?;
        } else if !report.is_empty() {
            self.ctx.ledger.set_results_updated(&log.echis_id).await?;
            self.ctx
                .ledger
                .set_results_update_errors(&log.echis_id, "")
                .await?;
            info!(tracked_entity = %log.tracked_entity, "Primary results updated");
        }
        Ok(report)
    }

    async fn sync_lab(
        &self,
        mut log: SyncLog,
        org_unit: &str,
        diagnosis: &Diagnosis,
        date: NaiveDate,
    ) -> Result<LabOutcome, EngineError> {
        let enrollment = match self.check_lab_enrollment(&mut log).await? {
            Some(enrollment) => enrollment,
            None => self.create_lab_enrollment(&log, org_unit, date).await?,
        };

        let date_text = date.format(REGISTRY_DATE_FORMAT).to_string();
        let data_values = self.mapped_values(&[
            (LAB_RESULTS, diagnosis.label),
            (LAB_RESULTS_DATE, date_text.as_str()),
            (LAB_DIAGNOSIS, "true"),
            (LAB_REFERRED_FROM_COMMUNITY, "true"),
        ]);

        if log.has_lab_event() && self.ctx.registry.event_exists(&log.lab_event).await? {
            let updates = self.ctx.builder.data_value_updates(
                Program::Lab,
                &log.lab_event,
                &log.tracked_entity,
                org_unit,
                data_values,
            );
            let report = self.ctx.push_data_values(&updates).await;
            info!(event = %log.lab_event, "Lab event updated");
            return Ok(LabOutcome::EventUpdated {
                enrollment,
                event: log.lab_event,
                data_values: report,
            });
        }

        let envelope = self.ctx.builder.lab_event(
            &log.tracked_entity,
            &enrollment,
            org_unit,
            date,
            data_values,
        );
        let response = self.ctx.registry.create_event(&envelope).await?;
        let event = created_reference(&response, "create lab event")?;
        self.ctx.ledger.set_lab_event(&log.echis_id, &event).await?;
        info!(event = %event, enrollment = %enrollment, "Lab event created");

        Ok(LabOutcome::EventCreated { enrollment, event })
    }

    /// Looks up an existing lab-program enrollment in the registry and keeps
    /// the ledger in step with it.
    async fn check_lab_enrollment(&self, log: &mut SyncLog) -> Result<Option<String>, EngineError> {
        let (program, _) = self.ctx.builder.program_ids(Program::Lab);
        let found = self
            .ctx
            .registry
            .find_enrollment(&log.tracked_entity, program, &log.org_unit)
            .await?;

        if found.is_none() && log.has_lab_enrollment() {
            warn!(enrollment = %log.lab_enrollment, "Recorded lab enrollment not found in the registry");
        }
        if let Some(enrollment) = &found {
            if *enrollment != log.lab_enrollment {
                self.ctx
                    .ledger
                    .set_lab_enrollment(&log.echis_id, enrollment)
                    .await?;
                log.lab_enrollment = enrollment.clone();
            }
        }
        Ok(found)
    }

    async fn create_lab_enrollment(
        &self,
        log: &SyncLog,
        org_unit: &str,
        date: NaiveDate,
    ) -> Result<String, EngineError> {
        let payload = self
            .ctx
            .builder
            .lab_enrollment(&log.tracked_entity, org_unit, date);
        let response = self.ctx.registry.create_enrollment(&payload).await?;
        let enrollment = created_reference(&response, "create lab enrollment")?;
        self.ctx
            .ledger
            .set_lab_enrollment(&log.echis_id, &enrollment)
            .await?;
        info!(enrollment = %enrollment, "Lab enrollment created");
        Ok(enrollment)
    }

    /// Data values for the mapped keys, skipping (with a warning) any without a mapping.
    fn mapped_values(&self, values: &[(&str, &str)]) -> Vec<DataValue> {
        values
            .iter()
            .filter_map(|(key, value)| match self.ctx.mapper.table().data_element(key) {
                Some(id) => Some(DataValue::new(id, *value)),
                None => {
                    warn!(key, "No data element mapped, skipping");
                    None
                }
            })
            .collect()
    }
}

fn created_reference(
    response: &rtcgw_tracker::RegistryResponse,
    operation: &'static str,
) -> Result<String, EngineError> {
    if !response.is_success() {
        return Err(EngineError::Rejected {
            operation,
            status: response.status,
            message: response.error_message(),
        });
    }
    response
        .parse_root()?
        .first_reference()
        .map(str::to_string)
        .ok_or(EngineError::MissingReference { operation })
}
