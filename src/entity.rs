//! Shared construction of node, relationship, group and policy templates.
//!
//! [`EntityTemplate::build`] runs every structural check and materializes
//! properties, capabilities, requirements and interfaces in one pass. None of
//! the steps returns early: a template with a bad type still gets its
//! sections checked, and the caller receives a usable (possibly degraded)
//! entity.

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::capabilities::CapabilityAssignment;
use crate::entity_type::{TypeDef, TypeKind};
use crate::interfaces::{
    build_interfaces, custom_interface_operations, interface_type_name, is_configure_interface,
    is_lifecycle_interface, InterfaceDef, CONFIGURE_OPERATIONS, INTERFACE_RESERVED_WORDS,
    LIFECYCLE_OPERATIONS,
};
use crate::issues::IssueCollector;
use crate::properties::Property;
use crate::registry::TypeRegistry;
use crate::requirements::{requirement_entries, RequirementAssignment};
use crate::schema::PropertyDef;

pub const NODE_TEMPLATE_SECTIONS: &[&str] = &[
    "type",
    "properties",
    "requirements",
    "interfaces",
    "capabilities",
    "attributes",
    "artifacts",
    "directives",
    "node_filter",
    "copy",
    "metadata",
    "description",
];

pub const RELATIONSHIP_TEMPLATE_SECTIONS: &[&str] = &[
    "type",
    "description",
    "metadata",
    "properties",
    "attributes",
    "interfaces",
    "copy",
];

pub const GROUP_SECTIONS: &[&str] = &[
    "type",
    "description",
    "metadata",
    "properties",
    "members",
    "interfaces",
];

pub const POLICY_SECTIONS: &[&str] = &[
    "type",
    "description",
    "metadata",
    "properties",
    "targets",
    "triggers",
];

/// Section names a template of `kind` may carry.
pub fn allowed_sections(kind: TypeKind) -> &'static [&'static str] {
    match kind {
        TypeKind::Node => NODE_TEMPLATE_SECTIONS,
        TypeKind::Relationship => RELATIONSHIP_TEMPLATE_SECTIONS,
        TypeKind::Group => GROUP_SECTIONS,
        TypeKind::Policy => POLICY_SECTIONS,
        TypeKind::Capability
        | TypeKind::Data
        | TypeKind::Artifact
        | TypeKind::Interface => &[],
    }
}

fn label(kind: TypeKind) -> &'static str {
    match kind {
        TypeKind::Node => "Node template",
        TypeKind::Relationship => "Relationship template",
        TypeKind::Group => "Group",
        TypeKind::Policy => "Policy",
        TypeKind::Capability => "Capability",
        TypeKind::Data => "Data",
        TypeKind::Artifact => "Artifact",
        TypeKind::Interface => "Interface",
    }
}

#[derive(Debug, Clone, Serialize)]
/// A template instance bound to its resolved type.
pub struct EntityTemplate {
    pub name: String,
    pub kind: TypeKind,
    #[serde(skip)]
    pub raw: JsonMap<String, JsonValue>,
    pub type_name: Option<String>,
    #[serde(skip)]
    pub type_def: Option<TypeDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub properties: Vec<Property>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilityAssignment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<RequirementAssignment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<InterfaceDef>,
    #[serde(skip)]
    pub property_defs: Vec<PropertyDef>,
}

impl EntityTemplate {
    /// Builds a template from its raw map, resolving `type` against the
    /// registry.
    pub fn build(
        name: &str,
        raw: &JsonValue,
        kind: TypeKind,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> EntityTemplate {
        let what = format!("{} \"{name}\"", label(kind));
        let raw = match raw {
            JsonValue::Object(map) => map.clone(),
            JsonValue::Null => JsonMap::new(),
            _ => {
                issues.type_mismatch(&what, "map");
                JsonMap::new()
            }
        };

        for key in raw.keys() {
            if !allowed_sections(kind).contains(&key.as_str()) {
                issues.unknown_field(&what, key);
            }
        }
        if let Some(metadata) = raw.get("metadata") {
            if !metadata.is_object() {
                issues.type_mismatch(&format!("\"metadata\" of template \"{name}\""), "map");
            }
        }

        let type_name = match raw.get("type") {
            Some(JsonValue::String(t)) => Some(t.clone()),
            Some(_) => {
                issues.type_mismatch(&format!("\"type\" of template \"{name}\""), "string");
                None
            }
            None => {
                issues.missing_required_field(&format!("Template \"{name}\""), "type");
                None
            }
        };
        let type_def = type_name
            .as_deref()
            .and_then(|t| registry.resolve(kind, t, issues));

        Self::materialize(name, kind, raw, type_name, type_def, registry, issues)
    }

    /// Binds raw sections to an already-resolved type.
    pub fn materialize(
        name: &str,
        kind: TypeKind,
        raw: JsonMap<String, JsonValue>,
        type_name: Option<String>,
        type_def: Option<TypeDef>,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> EntityTemplate {
        let property_defs = type_def
            .as_ref()
            .map(|t| t.properties_def(registry, issues))
            .unwrap_or_default();

        let property_values = match raw.get("properties") {
            Some(JsonValue::Object(values)) => Some(values.clone()),
            Some(JsonValue::Null) | None => None,
            Some(_) => {
                issues.type_mismatch(&format!("\"properties\" of template \"{name}\""), "map");
                None
            }
        };
        let properties = materialize_properties(property_values.as_ref(), &property_defs);

        let mut capabilities = Vec::new();
        let mut requirements = Vec::new();
        if kind == TypeKind::Node {
            if let Some(ty) = &type_def {
                let template_caps = raw.get("capabilities").and_then(JsonValue::as_object);
                for def in ty.capabilities_def(registry, issues) {
                    let overrides = template_caps
                        .and_then(|caps| caps.get(&def.name))
                        .and_then(|cap| cap.get("properties"))
                        .and_then(JsonValue::as_object);
                    capabilities.push(CapabilityAssignment::new(&def, overrides));
                }
            }
            if let Some(raw_requirements @ JsonValue::Array(_)) = raw.get("requirements") {
                for (req_name, value) in requirement_entries(raw_requirements) {
                    requirements.push(RequirementAssignment::parse(&req_name, &value, issues));
                }
            }
        }

        let type_interfaces = type_def
            .as_ref()
            .map(|t| t.interfaces(registry))
            .unwrap_or_default();
        let interfaces = match template_interfaces(kind, &raw) {
            Some(map) => build_interfaces(map, &type_interfaces, name, issues),
            None => Vec::new(),
        };

        EntityTemplate {
            name: name.to_string(),
            kind,
            description: raw
                .get("description")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            raw,
            type_name,
            type_def,
            properties,
            capabilities,
            requirements,
            interfaces,
            property_defs,
        }
    }

    /// Resolved type name, falling back to the name as written.
    pub fn type_label(&self) -> &str {
        self.type_def
            .as_ref()
            .map(|t| t.name.as_str())
            .or(self.type_name.as_deref())
            .unwrap_or_default()
    }

    pub fn is_derived_from(&self, name: &str, registry: &TypeRegistry) -> bool {
        self.type_def
            .as_ref()
            .is_some_and(|t| t.is_derived_from(name, registry))
    }

    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn get_property_value(&self, name: &str) -> Option<&JsonValue> {
        self.get_property(name).map(|p| &p.value)
    }

    pub fn get_capability(&self, name: &str) -> Option<&CapabilityAssignment> {
        self.capabilities.iter().find(|c| c.name == name)
    }

    /// Property values as a map, in materialization order.
    pub fn property_values(&self) -> JsonMap<String, JsonValue> {
        self.properties
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    /// Raw template properties as written.
    pub fn raw_properties(&self) -> Option<&JsonMap<String, JsonValue>> {
        self.raw.get("properties").and_then(JsonValue::as_object)
    }

    /// Unknown names, missing required values, then each value's own checks.
    pub fn validate_properties(&mut self, registry: &TypeRegistry, issues: &mut IssueCollector) {
        let what = format!("\"properties\" of template \"{}\"", self.name);
        if self.type_def.is_some() {
            if let Some(values) = self.raw_properties() {
                for key in values.keys() {
                    if !self.property_defs.iter().any(|d| &d.name == key) {
                        issues.unknown_field(&what, key);
                    }
                }
            }
            for def in &self.property_defs {
                if def.needs_value() && self.get_property(&def.name).is_none() {
                    issues.missing_required_field(&what, &def.name);
                }
            }
        }
        for property in &mut self.properties {
            property.validate(registry, issues);
        }
    }

    /// Interface names must be declared by the type; operation names must
    /// belong to the interface.
    pub fn validate_interfaces(&self, registry: &TypeRegistry, issues: &mut IssueCollector) {
        let Some(interfaces) = template_interfaces(self.kind, &self.raw) else {
            return;
        };
        let what = format!("\"interfaces\" of template \"{}\"", self.name);
        let type_interfaces = self
            .type_def
            .as_ref()
            .map(|t| t.interfaces(registry))
            .unwrap_or_default();
        for (name, value) in interfaces {
            let declared_type = interface_type_name(name, value, &type_interfaces);
            let matches = |check: fn(&str) -> bool| {
                check(name) || declared_type.as_deref().is_some_and(check)
            };
            let allowed: Vec<String> = if matches(is_lifecycle_interface) {
                LIFECYCLE_OPERATIONS.iter().map(|op| op.to_string()).collect()
            } else if matches(is_configure_interface) {
                CONFIGURE_OPERATIONS.iter().map(|op| op.to_string()).collect()
            } else if type_interfaces.contains_key(name) {
                custom_interface_operations(name, &type_interfaces, registry)
            } else {
                issues.unknown_field(&what, name);
                continue;
            };
            let Some(operations) = value.as_object() else {
                continue;
            };
            for operation in operations.keys() {
                if INTERFACE_RESERVED_WORDS.contains(&operation.as_str()) {
                    continue;
                }
                if !allowed.iter().any(|op| op == operation) {
                    issues.unknown_field(&what, operation);
                }
            }
        }
    }
}

/// Explicit values first (in the order written), then type defaults not
/// already supplied.
pub fn materialize_properties(
    values: Option<&JsonMap<String, JsonValue>>,
    defs: &[PropertyDef],
) -> Vec<Property> {
    let mut properties: Vec<Property> = Vec::new();
    if let Some(values) = values {
        for (prop_name, value) in values {
            if let Some(def) = defs.iter().find(|d| &d.name == prop_name) {
                properties.push(Property::new(prop_name, value.clone(), def.schema.clone()));
            }
        }
    }
    for def in defs {
        if properties.iter().any(|p| p.name == def.name) {
            continue;
        }
        if let Some(default) = def.default_value() {
            properties.push(Property::new(&def.name, default.clone(), def.schema.clone()));
        }
    }
    properties
}

/// The `interfaces` block of a template. Relationship templates written in
/// the short form nest it under `relationship`.
fn template_interfaces(
    kind: TypeKind,
    raw: &JsonMap<String, JsonValue>,
) -> Option<&JsonMap<String, JsonValue>> {
    if let Some(map) = raw.get("interfaces").and_then(JsonValue::as_object) {
        return Some(map);
    }
    if kind != TypeKind::Relationship {
        return None;
    }
    if let Some(map) = raw
        .get("relationship")
        .and_then(|rel| rel.get("interfaces"))
        .and_then(JsonValue::as_object)
    {
        return Some(map);
    }
    raw.values()
        .find_map(|value| value.get("relationship")?.get("interfaces")?.as_object())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::entity_type::TypeKind;
    use crate::issues::{IssueCode, IssueCollector};
    use crate::registry::TypeRegistry;

    use super::EntityTemplate;

    #[test]
    fn unknown_sections_are_reported_per_key() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let entity = EntityTemplate::build(
            "server",
            &json!({ "type": "tosca.nodes.Compute", "colour": "blue" }),
            TypeKind::Node,
            &registry,
            &mut issues,
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues.count(IssueCode::UnknownField), 1);
        assert!(issues.issues()[0].message.contains("\"server\""));
        assert!(issues.issues()[0].message.contains("\"colour\""));
        assert_eq!(entity.type_label(), "tosca.nodes.Compute");
    }

    #[test]
    fn missing_type_degrades_without_aborting() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let entity = EntityTemplate::build(
            "orphan",
            &json!({ "properties": { "a": 1 } }),
            TypeKind::Node,
            &registry,
            &mut issues,
        );
        assert!(entity.type_def.is_none());
        assert!(entity.properties.is_empty());
        assert_eq!(issues.count(IssueCode::MissingRequiredField), 1);
    }

    #[test]
    fn explicit_properties_precede_defaults() {
        let mut registry = TypeRegistry::builtin();
        registry.insert_custom(
            TypeKind::Node,
            "my.nodes.App",
            json!({
                "derived_from": "tosca.nodes.Root",
                "properties": {
                    "port": { "type": "integer", "default": 80 },
                    "name": { "type": "string" },
                    "debug": { "type": "boolean", "default": false }
                }
            }),
        );
        let mut issues = IssueCollector::new();
        let entity = EntityTemplate::build(
            "app",
            &json!({ "type": "my.nodes.App", "properties": { "name": "web" } }),
            TypeKind::Node,
            &registry,
            &mut issues,
        );
        let names: Vec<&str> = entity.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["name", "port", "debug"]);
        assert_eq!(entity.get_property_value("port"), Some(&json!(80)));
        assert!(issues.is_empty());
    }

    #[test]
    fn relationship_interfaces_from_own_section() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let entity = EntityTemplate::build(
            "link",
            &json!({
                "type": "tosca.relationships.ConnectsTo",
                "interfaces": {
                    "Configure": { "pre_configure_source": "scripts/pre.sh" }
                }
            }),
            TypeKind::Relationship,
            &registry,
            &mut issues,
        );
        assert_eq!(entity.interfaces.len(), 1);
        assert_eq!(entity.interfaces[0].operation, "pre_configure_source");
        assert!(issues.is_empty());
    }
    fn connects_to(raw: serde_json::Value) -> EntityTemplate {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let type_def = registry.find(TypeKind::Relationship, "ConnectsTo").unwrap();
        let entity = EntityTemplate::materialize(
            "link",
            TypeKind::Relationship,
            raw.as_object().unwrap().clone(),
            Some(type_def.name.clone()),
            Some(type_def),
            &registry,
            &mut issues,
        );
        assert!(issues.is_empty(), "{:?}", issues.issues());
        entity
    }

    #[test]
    fn relationship_interfaces_may_nest_under_relationship() {
        let entity = connects_to(json!({
            "type": "tosca.relationships.ConnectsTo",
            "relationship": {
                "interfaces": {
                    "Configure": { "post_configure_target": "scripts/post.sh" }
                }
            }
        }));
        assert_eq!(entity.interfaces.len(), 1);
        assert_eq!(entity.interfaces[0].interface_name, "Configure");
        assert_eq!(entity.interfaces[0].operation, "post_configure_target");
        assert_eq!(entity.interfaces[0].implementation, Some(json!("scripts/post.sh")));
    }

    #[test]
    fn relationship_interfaces_found_in_sibling_block() {
        let entity = connects_to(json!({
            "type": "tosca.relationships.ConnectsTo",
            "database_endpoint": {
                "relationship": {
                    "interfaces": {
                        "Configure": {
                            "pre_configure_source": "scripts/pre.sh",
                            "add_target": "scripts/add.sh"
                        }
                    }
                }
            }
        }));
        let operations: Vec<&str> = entity.interfaces.iter().map(|i| i.operation.as_str()).collect();
        assert_eq!(operations, vec!["pre_configure_source", "add_target"]);
    }
}
