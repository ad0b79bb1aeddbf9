//! Registry payload construction.

use chrono::{DateTime, NaiveDate, Utc};
use rtcgw_tracker::{
    Attribute, DataValue, EnrollmentPayload, EventCreatePayload, EventUpdatePayload, EventsEnvelope,
    NestedEnrollment, NestedEvent, NestedTrackedEntity, TrackedEntityCreatePayload,
    TrackedEntityUpdatePayload, TrackerStatus,
};

use crate::config::ProgramConfig;

/// Which configured program a write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    Primary,
    Lab,
}

#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    programs: ProgramConfig,
}

impl PayloadBuilder {
    pub fn new(programs: ProgramConfig) -> Self {
        Self { programs }
    }

    pub fn programs(&self) -> &ProgramConfig {
        &self.programs
    }

    /// `(program, program_stage)` IDs for `program`.
    pub fn program_ids(&self, program: Program) -> (&str, &str) {
        match program {
            Program::Primary => (
                &self.programs.tracker_program,
                &self.programs.tracker_program_stage,
            ),
            Program::Lab => (&self.programs.lab_program, &self.programs.lab_program_stage),
        }
    }

    /// One tracked entity with one active enrollment in the primary program
    /// containing one active event. Attributes ride on the enrollment.
    pub fn registration(
        &self,
        org_unit: &str,
        attributes: Vec<Attribute>,
        data_values: Vec<DataValue>,
        now: DateTime<Utc>,
    ) -> TrackedEntityCreatePayload {
        let (program, stage) = self.program_ids(Program::Primary);
        let event = NestedEvent {
            program: program.to_string(),
            program_stage: stage.to_string(),
            org_unit: org_unit.to_string(),
            status: TrackerStatus::Active,
            occurred_at: now,
            data_values,
        };
        let enrollment = NestedEnrollment {
            program: program.to_string(),
            org_unit: org_unit.to_string(),
            tracked_entity_type: self.programs.tracked_entity_type.clone(),
            attributes,
            status: TrackerStatus::Active,
            enrolled_at: now,
            occurred_at: now,
            events: vec![event],
        };
        TrackedEntityCreatePayload {
            tracked_entities: vec![NestedTrackedEntity {
                tracked_entity_type: self.programs.tracked_entity_type.clone(),
                org_unit: org_unit.to_string(),
                enrollments: vec![enrollment],
            }],
        }
    }

    pub fn attribute_update(
        &self,
        tracked_entity: &str,
        org_unit: &str,
        attributes: Vec<Attribute>,
    ) -> TrackedEntityUpdatePayload {
        TrackedEntityUpdatePayload {
            tracked_entity_instance: tracked_entity.to_string(),
            tracked_entity_type: self.programs.tracked_entity_type.clone(),
            org_unit: org_unit.to_string(),
            attributes,
        }
    }

    /// One single-value update per data value, in input order.
    pub fn data_value_updates(
        &self,
        program: Program,
        event: &str,
        tracked_entity: &str,
        org_unit: &str,
        data_values: Vec<DataValue>,
    ) -> Vec<EventUpdatePayload> {
        let (program_id, stage) = self.program_ids(program);
        data_values
            .into_iter()
            .map(|dv| EventUpdatePayload {
                event: event.to_string(),
                program: program_id.to_string(),
                program_stage: stage.to_string(),
                org_unit: org_unit.to_string(),
                status: TrackerStatus::Active,
                tracked_entity_instance: tracked_entity.to_string(),
                data_values: vec![dv],
            })
            .collect()
    }

    pub fn lab_enrollment(
        &self,
        tracked_entity: &str,
        org_unit: &str,
        date: NaiveDate,
    ) -> EnrollmentPayload {
        EnrollmentPayload {
            tracked_entity_instance: tracked_entity.to_string(),
            program: self.programs.lab_program.clone(),
            org_unit: org_unit.to_string(),
            status: TrackerStatus::Active,
            enrollment_date: date,
            incident_date: date,
        }
    }

    pub fn lab_event(
        &self,
        tracked_entity: &str,
        enrollment: &str,
        org_unit: &str,
        date: NaiveDate,
        data_values: Vec<DataValue>,
    ) -> EventsEnvelope {
        EventCreatePayload {
            tracked_entity_instance: tracked_entity.to_string(),
            enrollment: enrollment.to_string(),
            program: self.programs.lab_program.clone(),
            program_stage: self.programs.lab_program_stage.clone(),
            org_unit: org_unit.to_string(),
            status: TrackerStatus::Active,
            event_date: date,
            data_values,
        }
        .into()
    }
}
