//! Policies and their triggers.
//!
//! `policies` is a list of single-key maps. A policy's `targets` name node
//! templates or groups of the same topology; the policy type's own `targets`
//! list, when present, restricts which types they may have.

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::entity::EntityTemplate;
use crate::entity_type::TypeKind;
use crate::groups::Group;
use crate::issues::{IssueCode, IssueCollector};
use crate::node_template::NodeTemplate;
use crate::registry::TypeRegistry;
use crate::scalar_unit::{ScalarUnit, ScalarUnitKind};

pub const TRIGGER_KEYS: &[&str] = &[
    "description",
    "event",
    "event_type",
    "schedule",
    "target_filter",
    "condition",
    "action",
];

pub const CONDITION_KEYS: &[&str] = &["constraint", "period", "evaluations", "method"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    NodeTemplate,
    Group,
}

#[derive(Debug, Clone, Serialize)]
pub struct Trigger {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_filter: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<JsonMap<String, JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<JsonValue>,
}

impl Trigger {
    pub fn parse(name: &str, raw: &JsonValue, issues: &mut IssueCollector) -> Trigger {
        let what = format!("Triggers \"{name}\"");
        let empty = JsonMap::new();
        let map = match raw {
            JsonValue::Object(map) => map,
            _ => {
                issues.type_mismatch(&what, "map");
                &empty
            }
        };
        for key in map.keys() {
            if !TRIGGER_KEYS.contains(&key.as_str()) {
                issues.unknown_field(&what, key);
            }
        }

        let condition = map.get("condition").and_then(|c| match c {
            JsonValue::Object(condition) => {
                validate_condition(name, condition, issues);
                Some(condition.clone())
            }
            _ => {
                issues.type_mismatch(&format!("Condition of trigger \"{name}\""), "map");
                None
            }
        });

        // `event` is either the event name or a map carrying `type`.
        let event = map
            .get("event")
            .or_else(|| map.get("event_type"))
            .and_then(|e| match e {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Object(m) => m.get("type").and_then(JsonValue::as_str).map(str::to_string),
                _ => None,
            });

        Trigger {
            name: name.to_string(),
            description: map
                .get("description")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            event,
            schedule: map.get("schedule").cloned(),
            target_filter: map.get("target_filter").cloned(),
            condition,
            action: map.get("action").cloned(),
        }
    }
}

fn validate_condition(trigger: &str, condition: &JsonMap<String, JsonValue>, issues: &mut IssueCollector) {
    let what = format!("Condition of trigger \"{trigger}\"");
    for key in condition.keys() {
        if !CONDITION_KEYS.contains(&key.as_str()) {
            issues.unknown_field(&what, key);
        }
    }
    if let Some(evaluations) = condition.get("evaluations") {
        if !evaluations.is_i64() && !evaluations.is_u64() {
            issues.type_mismatch(&format!("\"evaluations\" of trigger \"{trigger}\""), "integer");
        }
    }
    if let Some(period) = condition.get("period") {
        let is_integer = period.is_i64() || period.is_u64();
        if !is_integer && ScalarUnit::parse(ScalarUnitKind::Time, period).is_err() {
            issues.type_mismatch(
                &format!("\"period\" of trigger \"{trigger}\""),
                "scalar-unit.time",
            );
        }
    }
    if let Some(method) = condition.get("method") {
        if !method.is_string() {
            issues.type_mismatch(&format!("\"method\" of trigger \"{trigger}\""), "string");
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Policy {
    #[serde(flatten)]
    pub entity: EntityTemplate,
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets_kind: Option<TargetKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
}

impl Policy {
    pub fn new(
        name: &str,
        raw: &JsonValue,
        nodes: &[NodeTemplate],
        groups: &[Group],
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Self {
        let mut entity = EntityTemplate::build(name, raw, TypeKind::Policy, registry, issues);
        entity.validate_properties(registry, issues);

        let targets: Vec<String> = match entity.raw.get("targets") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(_) => {
                issues.type_mismatch(&format!("\"targets\" of policy \"{name}\""), "list");
                Vec::new()
            }
        };

        let allowed_types: Vec<String> = entity
            .type_def
            .as_ref()
            .and_then(|t| t.get_definition("targets", registry))
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        let mut targets_kind = None;
        for target in &targets {
            let (kind, target_type) = if let Some(node) = nodes.iter().find(|n| n.name() == target) {
                (TargetKind::NodeTemplate, &node.entity)
            } else if let Some(group) = groups.iter().find(|g| g.name() == target) {
                (TargetKind::Group, &group.entity)
            } else {
                issues.record(
                    IssueCode::InvalidGroupTarget,
                    format!("Target \"{target}\" of policy \"{name}\" is not a node template or group."),
                );
                continue;
            };
            targets_kind.get_or_insert(kind);
            if !allowed_types.is_empty()
                && !allowed_types
                    .iter()
                    .any(|t| target_type.is_derived_from(t, registry))
            {
                issues.record(
                    IssueCode::InvalidGroupTarget,
                    format!(
                        "Target \"{target}\" of policy \"{name}\" has type \"{}\", which is not one of the target types \"{}\".",
                        target_type.type_label(),
                        allowed_types.join(", ")
                    ),
                );
            }
        }

        let triggers = match entity.raw.get("triggers") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Object(map)) => map
                .iter()
                .map(|(trigger_name, trigger)| Trigger::parse(trigger_name, trigger, issues))
                .collect(),
            Some(_) => {
                issues.type_mismatch(&format!("\"triggers\" of policy \"{name}\""), "map");
                Vec::new()
            }
        };

        Self {
            entity,
            targets,
            targets_kind,
            triggers,
        }
    }

    pub fn name(&self) -> &str {
        &self.entity.name
    }
}

/// Splits the `policies` list into `(name, definition)` pairs.
pub fn policy_entries(raw: &JsonValue, issues: &mut IssueCollector) -> Vec<(String, JsonValue)> {
    let mut out = Vec::new();
    match raw {
        JsonValue::Array(items) => {
            for item in items {
                match item.as_object() {
                    Some(map) => {
                        for (name, def) in map {
                            out.push((name.clone(), def.clone()));
                        }
                    }
                    None => issues.type_mismatch("Policy entry", "map"),
                }
            }
        }
        JsonValue::Null => {}
        _ => issues.type_mismatch("\"policies\" of topology template", "list"),
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::issues::{IssueCode, IssueCollector};
    use crate::node_template::NodeTemplate;
    use crate::registry::TypeRegistry;

    use super::{policy_entries, Policy, TargetKind, Trigger};

    #[test]
    fn targets_resolve_to_nodes_or_groups() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let nodes = vec![NodeTemplate::new(
            "server",
            &json!({ "type": "tosca.nodes.Compute" }),
            &registry,
            &mut issues,
        )];
        let policy = Policy::new(
            "placement",
            &json!({ "type": "tosca.policies.Placement", "targets": ["server", "nowhere"] }),
            &nodes,
            &[],
            &registry,
            &mut issues,
        );
        assert_eq!(policy.targets_kind, Some(TargetKind::NodeTemplate));
        assert_eq!(issues.count(IssueCode::InvalidGroupTarget), 1);
    }

    #[test]
    fn trigger_condition_fields_are_checked() {
        let mut issues = IssueCollector::new();
        let trigger = Trigger::parse(
            "resize",
            &json!({
                "event": "resize_compute",
                "condition": {
                    "constraint": { "utilization": { "greater_than": 50 } },
                    "period": "60 s",
                    "evaluations": "one",
                    "method": "average"
                },
                "action": { "resize": null },
                "priority": 1
            }),
            &mut issues,
        );
        assert_eq!(trigger.event.as_deref(), Some("resize_compute"));
        assert_eq!(issues.count(IssueCode::TypeMismatch), 1);
        assert_eq!(issues.count(IssueCode::UnknownField), 1);
    }

    #[test]
    fn policies_section_is_a_list_of_single_key_maps() {
        let mut issues = IssueCollector::new();
        let entries = policy_entries(
            &json!([{ "a": { "type": "tosca.policies.Root" } }, { "b": { "type": "tosca.policies.Root" } }]),
            &mut issues,
        );
        assert_eq!(entries.len(), 2);
        policy_entries(&json!({ "a": {} }), &mut issues);
        assert_eq!(issues.count(IssueCode::TypeMismatch), 1);
    }
}
