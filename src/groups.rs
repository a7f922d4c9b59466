//! Groups of node templates.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::entity::EntityTemplate;
use crate::entity_type::TypeKind;
use crate::issues::{IssueCode, IssueCollector};
use crate::node_template::NodeTemplate;
use crate::registry::TypeRegistry;

#[derive(Debug, Clone, Serialize)]
pub struct Group {
    #[serde(flatten)]
    pub entity: EntityTemplate,
    pub members: Vec<String>,
}

impl Group {
    /// Builds the group and checks that every member is a node template of
    /// a type the group type accepts.
    pub fn new(
        name: &str,
        raw: &JsonValue,
        nodes: &[NodeTemplate],
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Self {
        let mut entity = EntityTemplate::build(name, raw, TypeKind::Group, registry, issues);
        entity.validate_properties(registry, issues);
        entity.validate_interfaces(registry, issues);

        let members = match entity.raw.get("members") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .filter_map(|item| match item.as_str() {
                    Some(member) => Some(member.to_string()),
                    None => {
                        issues.type_mismatch(&format!("Member {item} of group \"{name}\""), "string");
                        None
                    }
                })
                .collect(),
            Some(_) => {
                issues.type_mismatch(&format!("\"members\" of group \"{name}\""), "list");
                Vec::new()
            }
        };

        let allowed_types: Vec<String> = entity
            .type_def
            .as_ref()
            .and_then(|t| t.get_definition("members", registry))
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();

        for member in &members {
            let Some(node) = nodes.iter().find(|n| n.name() == member) else {
                issues.record(
                    IssueCode::InvalidGroupTarget,
                    format!("Member \"{member}\" of group \"{name}\" is not a node template."),
                );
                continue;
            };
            if !allowed_types.is_empty()
                && !allowed_types
                    .iter()
                    .any(|t| node.entity.is_derived_from(t, registry))
            {
                issues.record(
                    IssueCode::InvalidGroupTarget,
                    format!(
                        "Member \"{member}\" of group \"{name}\" has type \"{}\", which is not one of the member types \"{}\".",
                        node.type_label(),
                        allowed_types.join(", ")
                    ),
                );
            }
        }

        Self { entity, members }
    }

    pub fn name(&self) -> &str {
        &self.entity.name
    }
}
