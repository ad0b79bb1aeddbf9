//! Inbound record types and their validation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Format of [`LabResult::result_date`].
pub const RESULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static NIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^C[MF]\d{2}[A-Za-z0-9]{10}$").expect("NIN pattern is valid")
});
static REGISTRY_UID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9]{10}$").expect("UID pattern is valid")
});
static YES_NO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Yes|No)$").expect("Yes/No pattern is valid"));
static MALE_FEMALE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Male|Female)$").expect("gender pattern is valid"));

/// Field name → message for every rule a record breaks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub BTreeMap<&'static str, String>);

impl ValidationErrors {
    fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}: {v}")).collect();
        f.write_str(&parts.join("; "))
    }
}

/// A client registration from the community health app.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientRegistration {
    pub echis_patient_id: String,
    pub national_identification_number: String,
    pub patient_name: String,
    pub patient_gender: String,
    pub facility_id: String,
    pub facility_dhis2_id: String,
    pub patient_phone: String,
    pub patient_category: String,
    pub patient_age_in_years: String,
    pub patient_age_in_months: String,
    pub patient_age_in_days: String,
    pub client_category: String,
    pub cough: String,
    pub fever: String,
    pub weight_loss: String,
    pub excessive_night_sweat: String,
    pub is_on_tb_treatment: String,
    pub poor_weight_gain: String,
}

impl ClientRegistration {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.echis_patient_id.trim().is_empty() {
            errors.add("echis_patient_id", "echis_patient_id is required and cannot be empty.");
        }
        if self.patient_name.trim().is_empty() {
            errors.add("patient_name", "patient_name is required and must be provided.");
        }
        if !REGISTRY_UID.is_match(&self.facility_dhis2_id) {
            errors.add("facility_dhis2_id", "facility_dhis2_id must be a valid registry UID.");
        }
        if !self.national_identification_number.is_empty()
            && !NIN.is_match(&self.national_identification_number)
        {
            errors.add(
                "national_identification_number",
                "invalid national_identification_number provided.",
            );
        }
        if !self.patient_gender.is_empty() && !MALE_FEMALE.is_match(&self.patient_gender) {
            errors.add("patient_gender", "patient_gender should be Male or Female");
        }

        for (field, value) in [
            ("cough", &self.cough),
            ("fever", &self.fever),
            ("weight_loss", &self.weight_loss),
            ("excessive_night_sweat", &self.excessive_night_sweat),
            ("is_on_tb_treatment", &self.is_on_tb_treatment),
        ] {
            if !value.is_empty() && !YES_NO.is_match(value) {
                errors.add(field, "Should be exactly 'Yes' or 'No'. Notice the case");
            }
        }

        errors.into_result()
    }
}

/// A GeneXpert result for a previously registered client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabResult {
    /// External client ID, the ledger key.
    pub patient_id: String,
    pub lab: String,
    pub mtb: String,
    pub rr: String,
    /// `YYYY-MM-DD HH:MM:SS`
    pub result_date: String,
    pub facility_dhis2_id: String,
}

impl LabResult {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if self.patient_id.trim().is_empty() {
            errors.add("patient_id", "patient_id is required and cannot be empty.");
        }
        if self.parse_result_date().is_none() {
            errors.add("result_date", "result_date must be formatted as YYYY-MM-DD HH:MM:SS.");
        }
        if !self.facility_dhis2_id.is_empty() && !REGISTRY_UID.is_match(&self.facility_dhis2_id) {
            errors.add("facility_dhis2_id", "facility_dhis2_id must be a valid registry UID.");
        }
        errors.into_result()
    }

    fn parse_result_date(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(self.result_date.trim(), RESULT_DATE_FORMAT).ok()
    }

    pub fn result_date(&self) -> Result<NaiveDateTime, EngineError> {
        self.parse_result_date().ok_or_else(|| {
            EngineError::invalid_payload(format!(
                "result_date '{}' is not formatted as YYYY-MM-DD HH:MM:SS",
                self.result_date
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_registration() -> ClientRegistration {
        ClientRegistration {
            echis_patient_id: "E100".into(),
            patient_name: "Jane Doe".into(),
            facility_dhis2_id: "OU000000001".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_registration() {
        assert_eq!(valid_registration().validate(), Ok(()));

        let reg = ClientRegistration {
            national_identification_number: "CF12ABCDEFGHIJ".into(),
            patient_gender: "Female".into(),
            cough: "Yes".into(),
            fever: "No".into(),
            ..valid_registration()
        };
        assert_eq!(reg.validate(), Ok(()));
    }

    #[test]
    fn test_registration_errors_are_per_field() {
        let reg = ClientRegistration {
            echis_patient_id: " ".into(),
            facility_dhis2_id: "1nvalid".into(),
            national_identification_number: "CX12ABCDEFGHIJ".into(),
            patient_gender: "male".into(),
            cough: "yes".into(),
            ..Default::default()
        };
        let errors = reg.validate().expect_err("invalid");
        for field in [
            "echis_patient_id",
            "patient_name",
            "facility_dhis2_id",
            "national_identification_number",
            "patient_gender",
            "cough",
        ] {
            assert!(errors.get(field).is_some(), "missing error for {field}");
        }
        assert!(errors.get("fever").is_none());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let reg: ClientRegistration = serde_json::from_str(
            r#"{"echis_patient_id": "E100", "patient_name": "Jane", "extra": 1}"#,
        )
        .expect("deserialize");
        assert_eq!(reg.echis_patient_id, "E100");
        assert!(reg.cough.is_empty());
    }

    #[test]
    fn test_lab_result_date() {
        let result = LabResult {
            patient_id: "E100".into(),
            result_date: "2025-03-14 09:30:00".into(),
            ..Default::default()
        };
        assert!(result.validate().is_ok());
        assert_eq!(
            result.result_date().expect("date").date().to_string(),
            "2025-03-14"
        );

        let bad = LabResult {
            result_date: "14/03/2025".into(),
            ..result
        };
        assert!(bad.validate().is_err());
        assert!(matches!(
            bad.result_date(),
            Err(EngineError::InvalidPayload(_))
        ));
    }
}
