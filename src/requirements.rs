//! Requirement assignments on node templates.
//!
//! A requirement entry is a single-key map. The value is either the target
//! node name (short form) or a map of `node`, `capability`, `relationship`,
//! `occurrences` and `node_filter` (long form).

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::datatypes::UNBOUNDED;
use crate::issues::IssueCollector;

pub const REQUIREMENT_KEYS: &[&str] = &[
    "node",
    "capability",
    "relationship",
    "occurrences",
    "node_filter",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
/// The `relationship` value of a long-form requirement.
pub enum RequirementRelationship {
    Named(String),
    Inline(JsonMap<String, JsonValue>),
}

impl RequirementRelationship {
    /// Relationship type (or template) name, if one is given.
    pub fn type_name(&self) -> Option<&str> {
        match self {
            RequirementRelationship::Named(name) => Some(name),
            RequirementRelationship::Inline(map) => map.get("type").and_then(JsonValue::as_str),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Occurrences {
    pub min: u64,
    /// `None` for `UNBOUNDED`.
    pub max: Option<u64>,
}

impl Occurrences {
    /// Accepts `[min, max]` with `0 <= min <= max` and `max != 0`. Any other
    /// value records exactly one `InvalidPropertyValueError`.
    pub fn parse(value: &JsonValue, issues: &mut IssueCollector) -> Option<Occurrences> {
        let parsed = value.as_array().filter(|items| items.len() == 2).and_then(|items| {
            let min = items[0].as_u64()?;
            let max = match &items[1] {
                JsonValue::String(s) if s == UNBOUNDED => None,
                other => Some(other.as_u64()?),
            };
            match max {
                Some(0) => None,
                Some(max) if min > max => None,
                _ => Some(Occurrences { min, max }),
            }
        });
        if parsed.is_none() {
            issues.invalid_property_value(&value.to_string());
        }
        parsed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementAssignment {
    pub name: String,
    pub node: Option<String>,
    pub capability: Option<String>,
    pub relationship: Option<RequirementRelationship>,
    pub occurrences: Option<Occurrences>,
    pub node_filter: Option<JsonValue>,
    /// Entry value as written.
    #[serde(skip)]
    pub raw: JsonValue,
}

impl RequirementAssignment {
    /// Materializes one requirement entry. `occurrences` is range-checked
    /// here; key checks belong to node template validation.
    pub fn parse(name: &str, raw: &JsonValue, issues: &mut IssueCollector) -> Self {
        let mut assignment = Self {
            name: name.to_string(),
            node: None,
            capability: None,
            relationship: None,
            occurrences: None,
            node_filter: None,
            raw: raw.clone(),
        };
        match raw {
            JsonValue::String(node) => assignment.node = Some(node.clone()),
            JsonValue::Object(map) => {
                assignment.node = map.get("node").and_then(JsonValue::as_str).map(str::to_string);
                assignment.capability = map
                    .get("capability")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string);
                assignment.relationship = match map.get("relationship") {
                    Some(JsonValue::String(rel)) => Some(RequirementRelationship::Named(rel.clone())),
                    Some(JsonValue::Object(rel)) => Some(RequirementRelationship::Inline(rel.clone())),
                    _ => None,
                };
                assignment.occurrences = map
                    .get("occurrences")
                    .and_then(|occ| Occurrences::parse(occ, issues));
                assignment.node_filter = map.get("node_filter").cloned();
            }
            _ => {}
        }
        assignment
    }

    /// The raw long-form map, if this entry used it.
    pub fn long_form(&self) -> Option<&JsonMap<String, JsonValue>> {
        self.raw.as_object()
    }
}

/// Splits a `requirements` list into `(name, value)` entries.
pub fn requirement_entries(raw: &JsonValue) -> Vec<(String, JsonValue)> {
    let mut out = Vec::new();
    if let JsonValue::Array(items) = raw {
        for item in items {
            if let Some(map) = item.as_object() {
                for (name, value) in map {
                    out.push((name.clone(), value.clone()));
                }
            }
        }
    }
    out
}
