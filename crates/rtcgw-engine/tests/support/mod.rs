//! In-process registry double and wiring shared by the engine tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rtcgw_engine::{FieldMapper, MappingTable, PayloadBuilder, ProgramConfig, SyncContext};
use rtcgw_ledger::InMemoryLedger;
use rtcgw_tracker::{
    EnrollmentPayload, EventUpdatePayload, EventsEnvelope, RegistryClient, RegistryResponse,
    TrackedEntity, TrackedEntityCreatePayload, TrackedEntitySearch, TrackedEntityUpdatePayload,
    TrackerError,
};
use serde_json::json;

pub const ORG_UNIT: &str = "OU000000001";
pub const LAB_PROGRAM: &str = "LAB00000001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Search,
    CreateTrackedEntity,
    UpdateTrackedEntity { tracked_entity: String },
    UpdateDataValue { event: String, data_element: String, value: String },
    CreateEnrollment { program: String },
    CreateEvent { program: String, enrollment: String },
    EventExists(String),
    FindEnrollment { program: String },
}

/// Scriptable registry. References are generated per call unless a fixed
/// create response is set.
#[derive(Default)]
pub struct FakeRegistry {
    calls: Mutex<Vec<Call>>,
    creates: AtomicUsize,
    sequence: AtomicUsize,
    create_delay: Mutex<Duration>,
    create_response: Mutex<Option<(u16, String)>>,
    failing_elements: Mutex<HashMap<String, (u16, String)>>,
    existing_events: Mutex<HashSet<String>>,
    enrollment: Mutex<Option<String>>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_create_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.create_delay.lock().unwrap() = delay;
        self
    }

    pub fn respond_to_create(&self, status: u16, body: serde_json::Value) {
        *self.create_response.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn respond_to_create_raw(&self, status: u16, body: &str) {
        *self.create_response.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn fail_element(&self, data_element: &str, status: u16, body: serde_json::Value) {
        self.failing_elements
            .lock()
            .unwrap()
            .insert(data_element.to_string(), (status, body.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failing_elements.lock().unwrap().clear();
    }

    pub fn add_event(&self, event: &str) {
        self.existing_events.lock().unwrap().insert(event.to_string());
    }

    pub fn set_enrollment(&self, enrollment: &str) {
        *self.enrollment.lock().unwrap() = Some(enrollment.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Data elements sent through single-value updates, in order.
    pub fn updated_elements(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateDataValue { data_element, .. } => Some(data_element),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}{n:08}")
    }
}

pub fn ok(body: serde_json::Value) -> RegistryResponse {
    RegistryResponse {
        status: 200,
        body: body.to_string(),
    }
}

pub fn nested_created(tracked_entity: &str, event: &str, event_status: &str) -> serde_json::Value {
    json!({
        "status": "OK",
        "response": {
            "importSummaries": [{
                "status": "SUCCESS",
                "reference": tracked_entity,
                "enrollments": {
                    "importSummaries": [{
                        "reference": "ENR00000001",
                        "events": {
                            "importSummaries": [{
                                "status": event_status,
                                "reference": event,
                                "conflicts": if event_status == "ERROR" {
                                    json!([{"object": "DE000000001", "value": "Value is not a valid option"}])
                                } else {
                                    json!([])
                                }
                            }]
                        }
                    }]
                }
            }]
        }
    })
}

fn single_reference(reference: &str) -> serde_json::Value {
    json!({"status": "OK", "response": {"importSummaries": [{"status": "SUCCESS", "reference": reference}]}})
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn search_tracked_entities(
        &self,
        _search: &TrackedEntitySearch,
    ) -> Result<Vec<TrackedEntity>, TrackerError> {
        self.record(Call::Search);
        Ok(Vec::new())
    }

    async fn create_tracked_entity(
        &self,
        _payload: &TrackedEntityCreatePayload,
    ) -> Result<RegistryResponse, TrackerError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.record(Call::CreateTrackedEntity);

        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let fixed = self.create_response.lock().unwrap().clone();
        Ok(match fixed {
            Some((status, body)) => RegistryResponse { status, body },
            None => {
                let te = self.next_id("TEI");
                let event = self.next_id("EVT");
                ok(nested_created(&te, &event, "SUCCESS"))
            }
        })
    }

    async fn update_tracked_entity(
        &self,
        _program: &str,
        payload: &TrackedEntityUpdatePayload,
    ) -> Result<RegistryResponse, TrackerError> {
        self.record(Call::UpdateTrackedEntity {
            tracked_entity: payload.tracked_entity_instance.clone(),
        });
        Ok(ok(json!({"status": "OK"})))
    }

    async fn update_event_data_value(
        &self,
        event: &str,
        data_element: &str,
        payload: &EventUpdatePayload,
    ) -> Result<RegistryResponse, TrackerError> {
        self.record(Call::UpdateDataValue {
            event: event.to_string(),
            data_element: data_element.to_string(),
            value: payload
                .data_values
                .first()
                .map(|dv| dv.value.clone())
                .unwrap_or_default(),
        });
        let failure = self.failing_elements.lock().unwrap().get(data_element).cloned();
        Ok(match failure {
            Some((status, body)) => RegistryResponse { status, body },
            None => ok(json!({"status": "OK"})),
        })
    }

    async fn create_enrollment(
        &self,
        payload: &EnrollmentPayload,
    ) -> Result<RegistryResponse, TrackerError> {
        self.record(Call::CreateEnrollment {
            program: payload.program.clone(),
        });
        Ok(ok(single_reference(&self.next_id("ENR"))))
    }

    async fn create_event(&self, payload: &EventsEnvelope) -> Result<RegistryResponse, TrackerError> {
        let event = payload.events.first();
        self.record(Call::CreateEvent {
            program: event.map(|e| e.program.clone()).unwrap_or_default(),
            enrollment: event.map(|e| e.enrollment.clone()).unwrap_or_default(),
        });
        Ok(ok(single_reference(&self.next_id("LEV"))))
    }

    async fn event_exists(&self, event: &str) -> Result<bool, TrackerError> {
        self.record(Call::EventExists(event.to_string()));
        Ok(self.existing_events.lock().unwrap().contains(event))
    }

    async fn find_enrollment(
        &self,
        _tracked_entity: &str,
        program: &str,
        _org_unit: &str,
    ) -> Result<Option<String>, TrackerError> {
        self.record(Call::FindEnrollment {
            program: program.to_string(),
        });
        Ok(self.enrollment.lock().unwrap().clone())
    }
}

pub fn programs() -> ProgramConfig {
    ProgramConfig {
        tracker_program: "PRG00000001".into(),
        tracker_program_stage: "STG00000001".into(),
        tracked_entity_type: "TYPE0000001".into(),
        search_attribute: "ATTR0000001".into(),
        lab_program: LAB_PROGRAM.into(),
        lab_program_stage: "LABSTG00001".into(),
    }
}

fn table(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn mapping() -> MappingTable {
    MappingTable {
        attributes: table(&[
            ("echis_patient_id", "ATTR0000001"),
            ("patient_name", "ATTR0000002"),
            ("patient_gender", "ATTR0000003"),
            ("national_identification_number", ""),
        ]),
        data_elements: table(&[
            ("cough", "DECOUGH0001"),
            ("fever", "DEFEVER0001"),
            ("results", "DERESULT001"),
            ("results_date", "DERESDATE01"),
            ("diagnosed", "DEDIAGNOS01"),
            ("lab_results", "DELABRES001"),
            ("lab_results_date", "DELABDATE01"),
            ("lab_diagnosis", "DELABDIAG01"),
            ("lab_sample_referred_from_community", "DELABREF001"),
        ]),
    }
}

pub fn context(registry: Arc<FakeRegistry>, ledger: Arc<InMemoryLedger>) -> SyncContext {
    SyncContext::new(
        registry,
        ledger,
        FieldMapper::new(mapping()),
        PayloadBuilder::new(programs()),
    )
}
