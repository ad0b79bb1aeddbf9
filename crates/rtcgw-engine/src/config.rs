use serde::{Deserialize, Serialize};

/// Registry program and type IDs the engine writes into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Primary program every registered client is enrolled in.
    #[serde(default)]
    pub tracker_program: String,
    #[serde(default)]
    pub tracker_program_stage: String,
    #[serde(default)]
    pub tracked_entity_type: String,
    /// Attribute holding the external client ID, used for existence searches.
    #[serde(default)]
    pub search_attribute: String,
    /// Laboratory program, entered on a positive diagnosis.
    #[serde(default)]
    pub lab_program: String,
    #[serde(default)]
    pub lab_program_stage: String,
}

impl ProgramConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("programs.tracker_program", &self.tracker_program),
            ("programs.tracker_program_stage", &self.tracker_program_stage),
            ("programs.tracked_entity_type", &self.tracked_entity_type),
        ] {
            if value.trim().is_empty() {
                return Err(format!("{name} must be set"));
            }
        }
        // The lab branch needs both or neither.
        if self.lab_program.is_empty() != self.lab_program_stage.is_empty() {
            return Err("programs.lab_program and programs.lab_program_stage must be set together".into());
        }
        Ok(())
    }

    pub fn lab_enabled(&self) -> bool {
        !self.lab_program.is_empty()
    }
}
