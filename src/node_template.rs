//! Node templates and their post-construction validation.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::entity::EntityTemplate;
use crate::entity_type::TypeKind;
use crate::graph::ResolvedRelationship;
use crate::issues::IssueCollector;
use crate::registry::TypeRegistry;
use crate::relationship_template::RelationshipTemplate;
use crate::requirements::REQUIREMENT_KEYS;
use crate::topology::TopologyTemplate;

const CAPABILITY_ASSIGNMENT_KEYS: &[&str] = &["properties", "attributes"];

#[derive(Debug, Clone, Serialize)]
pub struct NodeTemplate {
    #[serde(flatten)]
    pub entity: EntityTemplate,
    /// Requirements resolved to a target node and relationship type.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<ResolvedRelationship>,
    /// Relationships in which this node is the target.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relationship_templates: Vec<RelationshipTemplate>,
    /// Nested topology substituting this node, once expanded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitution: Option<Box<TopologyTemplate>>,
}

impl NodeTemplate {
    pub fn new(
        name: &str,
        raw: &JsonValue,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Self {
        Self {
            entity: EntityTemplate::build(name, raw, TypeKind::Node, registry, issues),
            relationships: Vec::new(),
            relationship_templates: Vec::new(),
            substitution: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.entity.name
    }

    pub fn type_label(&self) -> &str {
        self.entity.type_label()
    }

    pub fn has_interfaces(&self) -> bool {
        self.entity.raw.contains_key("interfaces")
    }

    /// Target node names, one per resolved requirement.
    pub fn related_nodes(&self) -> Vec<&str> {
        self.relationships.iter().map(|r| r.target.as_str()).collect()
    }

    /// Full-entity checks, run after every template in the topology exists.
    pub fn validate(&mut self, registry: &TypeRegistry, issues: &mut IssueCollector) {
        self.validate_capabilities(registry, issues);
        self.validate_requirements(registry, issues);
        self.entity.validate_properties(registry, issues);
        self.entity.validate_interfaces(registry, issues);
    }

    fn validate_capabilities(&mut self, registry: &TypeRegistry, issues: &mut IssueCollector) {
        let EntityTemplate {
            name,
            raw,
            capabilities,
            type_def,
            ..
        } = &mut self.entity;
        let raw_caps = match raw.get("capabilities") {
            None | Some(JsonValue::Null) => return,
            Some(JsonValue::Object(map)) => map,
            Some(_) => {
                issues.type_mismatch(&format!("\"capabilities\" of template \"{name}\""), "map");
                return;
            }
        };

        for (cap_name, cap_value) in raw_caps {
            let Some(assignment) = capabilities.iter_mut().find(|c| &c.name == cap_name) else {
                if type_def.is_some() {
                    issues.unknown_field(&format!("\"capabilities\" of template \"{name}\""), cap_name);
                }
                continue;
            };
            let what = format!("Capability \"{cap_name}\" of template \"{name}\"");
            let overrides = match cap_value {
                JsonValue::Object(map) => {
                    for key in map.keys() {
                        if !CAPABILITY_ASSIGNMENT_KEYS.contains(&key.as_str()) {
                            issues.unknown_field(&what, key);
                        }
                    }
                    map.get("properties").and_then(JsonValue::as_object)
                }
                JsonValue::Null => None,
                _ => {
                    issues.type_mismatch(&what, "map");
                    None
                }
            };

            let props_what = format!("\"properties\" of capability \"{cap_name}\" in template \"{name}\"");
            if let Some(overrides) = overrides {
                for key in overrides.keys() {
                    if assignment.definition.property_def(key).is_none() {
                        issues.unknown_field(&props_what, key);
                    }
                }
            }
            for def in &assignment.definition.properties {
                let supplied = overrides.is_some_and(|o| o.contains_key(&def.name));
                if def.needs_value() && !supplied {
                    issues.missing_required_field(&props_what, &def.name);
                }
            }

            assignment.validate_scalable(name, issues);
            assignment.validate_properties(registry, issues);
        }
    }

    fn validate_requirements(&self, registry: &TypeRegistry, issues: &mut IssueCollector) {
        let name = &self.entity.name;
        let what = format!("\"requirements\" of template \"{name}\"");
        let items = match self.entity.raw.get("requirements") {
            None | Some(JsonValue::Null) => return,
            Some(JsonValue::Array(items)) => items,
            Some(_) => {
                issues.type_mismatch(&what, "list");
                return;
            }
        };
        let declared: Option<Vec<String>> = self.entity.type_def.as_ref().map(|t| {
            t.requirements(registry)
                .into_iter()
                .map(|(req, _)| req)
                .collect()
        });

        for item in items {
            let Some(entry) = item.as_object() else {
                issues.type_mismatch(&format!("Requirement entry of template \"{name}\""), "map");
                continue;
            };
            for (req_name, value) in entry {
                if let Some(declared) = &declared {
                    if !declared.contains(req_name) {
                        issues.unknown_field(&what, req_name);
                    }
                }
                if let JsonValue::Object(long_form) = value {
                    let req_what = format!("Requirement \"{req_name}\" of template \"{name}\"");
                    for key in long_form.keys() {
                        if !REQUIREMENT_KEYS.contains(&key.as_str()) {
                            issues.unknown_field(&req_what, key);
                        }
                    }
                }
            }
        }
    }
}
