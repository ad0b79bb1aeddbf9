//! Write-side payloads for the tracker API.
//!
//! These are built per call and never persisted. Field names follow the
//! registry's camelCase contract.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status carried by enrollments and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerStatus {
    Active,
    Completed,
    Cancelled,
}

/// Tracked entity attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub attribute: String,
    pub value: String,
}

impl Attribute {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }
}

/// Event data element value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataValue {
    pub data_element: String,
    pub value: String,
}

impl DataValue {
    pub fn new(data_element: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            data_element: data_element.into(),
            value: value.into(),
        }
    }
}

/// `POST /trackedEntityInstances`: one entity with its enrollment and first event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityCreatePayload {
    pub tracked_entities: Vec<NestedTrackedEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedTrackedEntity {
    pub tracked_entity_type: String,
    pub org_unit: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enrollments: Vec<NestedEnrollment>,
}

/// Enrollment carrying the entity's attributes, as the nested import expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedEnrollment {
    pub program: String,
    pub org_unit: String,
    pub tracked_entity_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
    pub status: TrackerStatus,
    pub enrolled_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<NestedEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedEvent {
    pub program: String,
    pub program_stage: String,
    pub org_unit: String,
    pub status: TrackerStatus,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_values: Vec<DataValue>,
}

/// `PUT /trackedEntityInstances/{id}?program=...`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityUpdatePayload {
    pub tracked_entity_instance: String,
    pub tracked_entity_type: String,
    pub org_unit: String,
    pub attributes: Vec<Attribute>,
}

/// `PUT /events/{event}/{dataElement}`: exactly one data value per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdatePayload {
    pub event: String,
    pub program: String,
    pub program_stage: String,
    pub org_unit: String,
    pub status: TrackerStatus,
    pub tracked_entity_instance: String,
    pub data_values: Vec<DataValue>,
}

impl EventUpdatePayload {
    /// The data element this update targets.
    pub fn data_element(&self) -> Option<&str> {
        self.data_values.first().map(|dv| dv.data_element.as_str())
    }
}

/// `POST /enrollments`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentPayload {
    pub tracked_entity_instance: String,
    pub program: String,
    pub org_unit: String,
    pub status: TrackerStatus,
    pub enrollment_date: NaiveDate,
    pub incident_date: NaiveDate,
}

/// A single event for `POST /events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCreatePayload {
    pub tracked_entity_instance: String,
    pub enrollment: String,
    pub program: String,
    pub program_stage: String,
    pub org_unit: String,
    pub status: TrackerStatus,
    pub event_date: NaiveDate,
    pub data_values: Vec<DataValue>,
}

/// Array wrapper the events endpoint expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsEnvelope {
    pub events: Vec<EventCreatePayload>,
}

impl From<EventCreatePayload> for EventsEnvelope {
    fn from(event: EventCreatePayload) -> Self {
        Self {
            events: vec![event],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_update_wire_shape() {
        let payload = EventUpdatePayload {
            event: "EVT00000001".into(),
            program: "PRG00000001".into(),
            program_stage: "STG00000001".into(),
            org_unit: "OU000000001".into(),
            status: TrackerStatus::Active,
            tracked_entity_instance: "TEI00000001".into(),
            data_values: vec![DataValue::new("DE000000001", "Yes")],
        };

        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(value["status"], "ACTIVE");
        assert_eq!(value["programStage"], "STG00000001");
        assert_eq!(value["trackedEntityInstance"], "TEI00000001");
        assert_eq!(
            value["dataValues"],
            json!([{"dataElement": "DE000000001", "value": "Yes"}])
        );
        assert_eq!(payload.data_element(), Some("DE000000001"));
    }

    #[test]
    fn test_enrollment_dates_are_plain_dates() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).expect("date");
        let payload = EnrollmentPayload {
            tracked_entity_instance: "TEI00000001".into(),
            program: "LAB00000001".into(),
            org_unit: "OU000000001".into(),
            status: TrackerStatus::Active,
            enrollment_date: date,
            incident_date: date,
        };

        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(value["enrollmentDate"], "2025-03-14");
        assert_eq!(value["incidentDate"], "2025-03-14");
    }

    #[test]
    fn test_nested_entity_skips_empty_lists() {
        let entity = NestedTrackedEntity {
            tracked_entity_type: "TYPE0000001".into(),
            org_unit: "OU000000001".into(),
            enrollments: vec![],
        };
        let value = serde_json::to_value(&entity).expect("serialize");
        assert!(value.get("attributes").is_none());
        assert!(value.get("enrollments").is_none());
    }
}
