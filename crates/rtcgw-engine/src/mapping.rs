//! Field mapping from inbound records to registry attributes and data elements.
//!
//! Each record type declares a static table of its fields: external name,
//! role and accessor. The configured [`MappingTable`] translates external
//! names to registry IDs; a name mapped to an empty ID is left out on purpose.

use std::collections::BTreeMap;

use rtcgw_tracker::{Attribute, DataValue};
use serde::{Deserialize, Serialize};

use crate::records::ClientRegistration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Identity/demographic value on the tracked entity.
    Attribute,
    /// Clinical value on an event.
    DataElement,
}

/// One field of a record type.
pub struct FieldSpec<R> {
    /// External (JSON) field name, also the mapping table key.
    pub name: &'static str,
    /// `None` for fields used for routing only (e.g. the facility).
    pub role: Option<FieldRole>,
    pub accessor: fn(&R) -> &str,
    /// Leave the field out entirely when blank instead of sending `""`.
    pub omit_when_blank: bool,
}

/// A record with a static field table.
pub trait MappedRecord: Sized + 'static {
    fn fields() -> &'static [FieldSpec<Self>];
}

macro_rules! field {
    ($record:ty, $name:ident, $role:expr) => {
        field!($record, $name, $role, false)
    };
    ($record:ty, $name:ident, $role:expr, omit) => {
        field!($record, $name, $role, true)
    };
    ($record:ty, $name:ident, $role:expr, $omit:expr) => {
        FieldSpec {
            name: stringify!($name),
            role: $role,
            accessor: |r: &$record| r.$name.as_str(),
            omit_when_blank: $omit,
        }
    };
}

const ATTR: Option<FieldRole> = Some(FieldRole::Attribute);
const DE: Option<FieldRole> = Some(FieldRole::DataElement);

static CLIENT_REGISTRATION_FIELDS: &[FieldSpec<ClientRegistration>] = &[
    field!(ClientRegistration, echis_patient_id, ATTR),
    field!(ClientRegistration, national_identification_number, ATTR),
    field!(ClientRegistration, patient_name, ATTR),
    field!(ClientRegistration, patient_gender, ATTR),
    field!(ClientRegistration, facility_id, None),
    field!(ClientRegistration, facility_dhis2_id, None),
    field!(ClientRegistration, patient_phone, ATTR),
    field!(ClientRegistration, patient_category, ATTR),
    field!(ClientRegistration, patient_age_in_years, ATTR),
    field!(ClientRegistration, patient_age_in_months, ATTR, omit),
    field!(ClientRegistration, patient_age_in_days, ATTR, omit),
    field!(ClientRegistration, client_category, ATTR, omit),
    field!(ClientRegistration, cough, DE, omit),
    field!(ClientRegistration, fever, DE, omit),
    field!(ClientRegistration, weight_loss, DE, omit),
    field!(ClientRegistration, excessive_night_sweat, DE, omit),
    field!(ClientRegistration, is_on_tb_treatment, DE, omit),
    field!(ClientRegistration, poor_weight_gain, DE, omit),
];

impl MappedRecord for ClientRegistration {
    fn fields() -> &'static [FieldSpec<Self>] {
        CLIENT_REGISTRATION_FIELDS
    }
}

/// External field name → registry ID, per role. Loaded once at start-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingTable {
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub data_elements: BTreeMap<String, String>,
}

impl MappingTable {
    /// Configured registry ID for `name`, `None` if missing or blank.
    pub fn registry_id(&self, role: FieldRole, name: &str) -> Option<&str> {
        let table = match role {
            FieldRole::Attribute => &self.attributes,
            FieldRole::DataElement => &self.data_elements,
        };
        table
            .get(name)
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
    }

    pub fn data_element(&self, name: &str) -> Option<&str> {
        self.registry_id(FieldRole::DataElement, name)
    }

    /// Rejects a registry ID mapped from more than one field name. Such
    /// fields would overwrite each other in [`FieldMapper::map`].
    pub fn validate(&self) -> Result<(), String> {
        for (section, table) in [
            ("mapping.attributes", &self.attributes),
            ("mapping.data_elements", &self.data_elements),
        ] {
            let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
            for (name, id) in table {
                let id = id.trim();
                if id.is_empty() {
                    continue;
                }
                if let Some(first) = seen.insert(id, name) {
                    return Err(format!(
                        "{section}: {id} is mapped from both {first} and {name}"
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldMapper {
    table: MappingTable,
}

impl FieldMapper {
    pub fn new(table: MappingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// External name → value for every field of `record` carrying `role`.
    pub fn fields_with_role<R: MappedRecord>(
        record: &R,
        role: FieldRole,
    ) -> BTreeMap<&'static str, String> {
        R::fields()
            .iter()
            .filter(|spec| spec.role == Some(role))
            .filter_map(|spec| {
                let value = (spec.accessor)(record);
                if spec.omit_when_blank && value.trim().is_empty() {
                    None
                } else {
                    Some((spec.name, value.to_string()))
                }
            })
            .collect()
    }

    /// Registry ID → value for the fields of `record` carrying `role` that
    /// have a non-empty mapping.
    pub fn map<R: MappedRecord>(&self, record: &R, role: FieldRole) -> BTreeMap<String, String> {
        Self::fields_with_role(record, role)
            .into_iter()
            .filter_map(|(name, value)| {
                self.table
                    .registry_id(role, name)
                    .map(|id| (id.to_string(), value))
            })
            .collect()
    }

    pub fn attributes<R: MappedRecord>(&self, record: &R) -> Vec<Attribute> {
        self.map(record, FieldRole::Attribute)
            .into_iter()
            .map(|(id, value)| Attribute::new(id, value))
            .collect()
    }

    pub fn data_values<R: MappedRecord>(&self, record: &R) -> Vec<DataValue> {
        self.map(record, FieldRole::DataElement)
            .into_iter()
            .map(|(id, value)| DataValue::new(id, value))
            .collect()
    }
}
