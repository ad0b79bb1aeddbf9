//! Read-side registry types.
//!
//! Create and update calls answer with a recursive import-summary tree:
//! a root response holding per-record summaries, each of which may carry
//! nested enrollment summaries, which may in turn carry event summaries.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Status value the registry uses for a rejected import.
pub const STATUS_ERROR: &str = "ERROR";

/// Reads an explicit `null` as the field's default; the registry sends
/// `"conflicts": null` and the like on some versions.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A single conflict entry.
///
/// The registry is inconsistent about the shape (objects with
/// `object`/`value`, bare strings, occasionally something else), so the raw
/// JSON is kept and rendered on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conflict(pub Value);

impl Conflict {
    pub fn render(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            Value::Object(map) => {
                let object = map.get("object").and_then(Value::as_str);
                let value = map.get("value").and_then(Value::as_str);
                match (object, value) {
                    (Some(o), Some(v)) => format!("{o}: {v}"),
                    (None, Some(v)) => v.to_string(),
                    (Some(o), None) => o.to_string(),
                    (None, None) => self.0.to_string(),
                }
            }
            other => other.to_string(),
        }
    }
}

/// Joins conflicts into a single `; `-delimited message.
pub fn render_conflicts<'a>(conflicts: impl IntoIterator<Item = &'a Conflict>) -> String {
    conflicts
        .into_iter()
        .map(Conflict::render)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub http_status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub http_status_code: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub response: ImportResponse,
}

/// One level of the tree: the root `response`, or the `enrollments`/`events`
/// block nested in a summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub response_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub imported: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ignored: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub deleted: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conflicts: Vec<Conflict>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub import_summaries: Vec<ImportSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub response_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reference: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub href: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conflicts: Vec<Conflict>,
    #[serde(default)]
    pub enrollments: Option<ImportResponse>,
    #[serde(default)]
    pub events: Option<ImportResponse>,
}

impl ImportSummary {
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_ERROR)
    }
}

/// References extracted from a tracked-entity create response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReferences {
    pub tracked_entity: String,
    pub event: String,
    /// Rendered conflicts when the event summary was rejected, `None` otherwise.
    pub conflicts: Option<String>,
}

impl RootResponse {
    /// Walks the tree for the tracked-entity and first event reference.
    ///
    /// The tracked entity is taken from top-level summaries with a non-empty
    /// reference; a later one overwrites an earlier one. The walk stops at
    /// the first event summary with a non-empty reference. Returns `None`
    /// when no event reference exists anywhere.
    pub fn tracked_entity_and_event(&self) -> Option<EventReferences> {
        let mut tracked_entity = "";
        for summary in &self.response.import_summaries {
            if !summary.reference.is_empty() {
                tracked_entity = &summary.reference;
            }
            let Some(enrollments) = &summary.enrollments else {
                continue;
            };
            for enrollment in &enrollments.import_summaries {
                let Some(events) = &enrollment.events else {
                    continue;
                };
                for event in &events.import_summaries {
                    if event.reference.is_empty() {
                        continue;
                    }
                    let conflicts = event.is_error().then(|| {
                        render_conflicts(
                            event
                                .conflicts
                                .iter()
                                .chain(&enrollment.conflicts)
                                .chain(&summary.conflicts),
                        )
                    });
                    return Some(EventReferences {
                        tracked_entity: tracked_entity.to_string(),
                        event: event.reference.clone(),
                        conflicts,
                    });
                }
            }
        }
        None
    }

    /// First non-empty top-level reference.
    pub fn first_reference(&self) -> Option<&str> {
        self.response
            .import_summaries
            .iter()
            .map(|s| s.reference.as_str())
            .find(|r| !r.is_empty())
    }

    /// Response-level and summary-level conflicts, or the message when the
    /// registry reported none.
    pub fn conflict_message(&self) -> Option<String> {
        let rendered = render_conflicts(
            self.response.conflicts.iter().chain(
                self.response
                    .import_summaries
                    .iter()
                    .flat_map(|s| s.conflicts.iter()),
            ),
        );
        if !rendered.is_empty() {
            return Some(rendered);
        }
        let descriptions = self
            .response
            .import_summaries
            .iter()
            .map(|s| s.description.as_str())
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>();
        if !descriptions.is_empty() {
            return Some(descriptions.join("; "));
        }
        (!self.message.is_empty()).then(|| self.message.clone())
    }
}

/// A tracked entity as returned by `GET /tracker/trackedEntities`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntity {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracked_entity: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracked_entity_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub org_unit: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attributes: Vec<TrackedEntityAttribute>,
}

impl TrackedEntity {
    pub fn attribute(&self, id: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.attribute == id)
            .map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedEntityAttribute {
    pub attribute: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
}
