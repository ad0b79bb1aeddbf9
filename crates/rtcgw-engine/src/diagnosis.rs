//! Diagnosis derived from GeneXpert MTB/RIF codes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Diagnosed {
    Yes,
    No,
}

impl Diagnosed {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::No => "No",
        }
    }
}

/// Result label as stored in the registry, and whether the client counts as diagnosed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnosis {
    pub label: &'static str,
    pub diagnosed: Diagnosed,
}

impl Diagnosis {
    const fn new(label: &'static str, diagnosed: Diagnosed) -> Self {
        Self { label, diagnosed }
    }

    pub fn is_diagnosed(&self) -> bool {
        self.diagnosed == Diagnosed::Yes
    }
}

pub fn derive_diagnosis(mtb: &str, rr: &str) -> Diagnosis {
    use Diagnosed::{No, Yes};

    match mtb {
        "DETECTED VERY LOW" | "DETECTED LOW" | "DETECTED MEDIUM" | "DETECTED HIGH" => match rr {
            "DETECTED" => Diagnosis::new("MTB detected, rifampicin resistance detected", Yes),
            "INDETERMINATE" => {
                Diagnosis::new("MTB detected, rifampicin resistance indeterminate", Yes)
            }
            "NOT DETECTED" => {
                Diagnosis::new("MTB detected, rifampicin resistance not detected", Yes)
            }
            "Invalid" => Diagnosis::new("Invalid", No),
            "Error" => Diagnosis::new("Error", No),
            _ => Diagnosis::new("No result", No),
        },
        "ERROR" => Diagnosis::new("Error", No),
        "INVALID" => Diagnosis::new("Invalid", No),
        "NO RESULT" => Diagnosis::new("No result", No),
        "NOT DETECTED" => Diagnosis::new("MTB not detected", No),
        _ => Diagnosis::new("No Result", No),
    }
}
