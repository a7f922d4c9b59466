//! Type kinds, resolved type definitions, and inheritance-aware flattening.
//!
//! A [`TypeDef`] is a copy of one registry entry. Every flattened view
//! (properties, capabilities, requirements, interfaces) is computed by walking
//! the `derived_from` chain and merging section values with child precedence,
//! always on fresh copies so nothing shared in the registry is mutated.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::issues::IssueCollector;
use crate::registry::TypeRegistry;
use crate::schema::PropertyDef;

/// Guard against malformed `derived_from` chains.
const MAX_DERIVATION_DEPTH: usize = 64;

/// Primitive data types a data type may derive from.
pub const PRIMITIVE_TYPES: &[&str] = &[
    "string",
    "integer",
    "float",
    "number",
    "boolean",
    "timestamp",
    "range",
    "version",
    "list",
    "map",
    "scalar-unit.size",
    "scalar-unit.frequency",
    "scalar-unit.time",
];

pub fn is_primitive_type(name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
/// The closed set of TOSCA type families.
pub enum TypeKind {
    Node,
    Capability,
    Relationship,
    Data,
    Policy,
    Group,
    Artifact,
    Interface,
}

impl TypeKind {
    pub const ALL: [TypeKind; 8] = [
        TypeKind::Node,
        TypeKind::Capability,
        TypeKind::Relationship,
        TypeKind::Data,
        TypeKind::Policy,
        TypeKind::Group,
        TypeKind::Artifact,
        TypeKind::Interface,
    ];

    /// Namespace prefix used for shorthand names.
    pub fn prefix(&self) -> &'static str {
        match self {
            TypeKind::Node => "tosca.nodes.",
            TypeKind::Capability => "tosca.capabilities.",
            TypeKind::Relationship => "tosca.relationships.",
            TypeKind::Data => "tosca.datatypes.",
            TypeKind::Policy => "tosca.policies.",
            TypeKind::Group => "tosca.groups.",
            TypeKind::Artifact => "tosca.artifacts.",
            TypeKind::Interface => "tosca.interfaces.",
        }
    }

    /// Root sentinel of the family; the walk stops here.
    pub fn root(&self) -> &'static str {
        match self {
            TypeKind::Node => "tosca.nodes.Root",
            TypeKind::Capability => "tosca.capabilities.Root",
            TypeKind::Relationship => "tosca.relationships.Root",
            TypeKind::Data => "tosca.datatypes.Root",
            TypeKind::Policy => "tosca.policies.Root",
            TypeKind::Group => "tosca.groups.Root",
            TypeKind::Artifact => "tosca.artifacts.Root",
            TypeKind::Interface => "tosca.interfaces.Root",
        }
    }

    /// Document section holding definitions of this kind.
    pub fn section(&self) -> &'static str {
        match self {
            TypeKind::Node => "node_types",
            TypeKind::Capability => "capability_types",
            TypeKind::Relationship => "relationship_types",
            TypeKind::Data => "data_types",
            TypeKind::Policy => "policy_types",
            TypeKind::Group => "group_types",
            TypeKind::Artifact => "artifact_types",
            TypeKind::Interface => "interface_types",
        }
    }

    pub fn from_section(section: &str) -> Option<TypeKind> {
        TypeKind::ALL.into_iter().find(|k| k.section() == section)
    }

    /// Keys a custom definition of this kind may carry.
    pub fn allowed_definition_keys(&self) -> &'static [&'static str] {
        match self {
            TypeKind::Node => &[
                "derived_from",
                "version",
                "metadata",
                "description",
                "properties",
                "attributes",
                "requirements",
                "capabilities",
                "interfaces",
                "artifacts",
            ],
            TypeKind::Capability => &[
                "derived_from",
                "version",
                "metadata",
                "description",
                "properties",
                "attributes",
                "valid_source_types",
            ],
            TypeKind::Relationship => &[
                "derived_from",
                "version",
                "metadata",
                "description",
                "properties",
                "attributes",
                "interfaces",
                "valid_target_types",
                "credential",
            ],
            TypeKind::Data => &[
                "derived_from",
                "version",
                "metadata",
                "description",
                "properties",
                "constraints",
            ],
            TypeKind::Policy => &[
                "derived_from",
                "version",
                "metadata",
                "description",
                "properties",
                "targets",
                "triggers",
                "type",
            ],
            TypeKind::Group => &[
                "derived_from",
                "version",
                "metadata",
                "description",
                "properties",
                "members",
                "interfaces",
            ],
            TypeKind::Artifact => &[
                "derived_from",
                "version",
                "metadata",
                "description",
                "properties",
                "mime_type",
                "file_ext",
            ],
            // Interface types list operations as free-form keys.
            TypeKind::Interface => &[],
        }
    }
}

/// Shared read surface of every resolved type.
pub trait EntityType {
    fn kind(&self) -> TypeKind;
    fn type_name(&self) -> &str;
    fn derived_from(&self) -> Option<&str>;
    fn parent_type(&self, registry: &TypeRegistry) -> Option<TypeDef>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// A resolved type: its kind, fully-qualified name, and a private copy of
/// its raw definition map.
pub struct TypeDef {
    pub kind: TypeKind,
    pub name: String,
    pub definition: JsonMap<String, JsonValue>,
}

impl EntityType for TypeDef {
    fn kind(&self) -> TypeKind {
        self.kind
    }

    fn type_name(&self) -> &str {
        &self.name
    }

    fn derived_from(&self) -> Option<&str> {
        self.definition.get("derived_from").and_then(JsonValue::as_str)
    }

    fn parent_type(&self, registry: &TypeRegistry) -> Option<TypeDef> {
        let parent = self.derived_from()?;
        if self.name == self.kind.root() || parent == self.name {
            return None;
        }
        if self.kind == TypeKind::Data && is_primitive_type(parent) {
            return None;
        }
        registry.find(self.kind, parent)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
/// A relationship type reachable through one of a node type's requirement
/// definitions.
pub struct DeclaredRelationship {
    pub requirement: String,
    pub relationship_type: String,
    pub node: Option<String>,
    pub capability: Option<String>,
}

#[derive(Debug, Clone)]
/// Capability declared on a node type, with its capability type resolved and
/// property schemas merged (node-level overrides over the capability type).
pub struct CapabilityDef {
    pub name: String,
    pub type_name: String,
    pub type_def: Option<TypeDef>,
    pub definition: JsonMap<String, JsonValue>,
    pub properties: Vec<PropertyDef>,
}

impl CapabilityDef {
    pub fn property_def(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

impl EntityType for CapabilityDef {
    fn kind(&self) -> TypeKind {
        TypeKind::Capability
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn derived_from(&self) -> Option<&str> {
        self.type_def.as_ref().and_then(|t| t.derived_from())
    }

    fn parent_type(&self, registry: &TypeRegistry) -> Option<TypeDef> {
        self.type_def.as_ref().and_then(|t| t.parent_type(registry))
    }
}

impl TypeDef {
    pub fn new(kind: TypeKind, name: &str, definition: JsonMap<String, JsonValue>) -> Self {
        Self {
            kind,
            name: name.to_string(),
            definition,
        }
    }

    /// This type followed by its parents, most-derived first.
    pub fn ancestors(&self, registry: &TypeRegistry) -> Vec<TypeDef> {
        let mut chain = vec![self.clone()];
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(self.name.clone());
        while chain.len() < MAX_DERIVATION_DEPTH {
            let Some(parent) = chain.last().and_then(|t| t.parent_type(registry)) else {
                break;
            };
            if !seen.insert(parent.name.clone()) {
                tracing::debug!(type_name = %self.name, "derived_from cycle at '{}'", parent.name);
                break;
            }
            chain.push(parent);
        }
        chain
    }

    /// Returns `true` when `name` is this type or one of its ancestors.
    pub fn is_derived_from(&self, name: &str, registry: &TypeRegistry) -> bool {
        let qualified = registry.qualified_name(self.kind, name);
        self.ancestors(registry)
            .iter()
            .any(|t| t.name == name || t.name == qualified)
    }

    /// Merged value of section `key` across the inheritance chain.
    ///
    /// Maps take the union with child entries winning; lists append parent
    /// entries not already present. The first defined value seeds the result.
    pub fn get_definition(&self, key: &str, registry: &TypeRegistry) -> Option<JsonValue> {
        let mut value: Option<JsonValue> = None;
        for ty in self.ancestors(registry) {
            let Some(parent_value) = ty.definition.get(key) else {
                continue;
            };
            match value.as_mut() {
                None => value = Some(parent_value.clone()),
                Some(JsonValue::Object(current)) => {
                    if let Some(parent_map) = parent_value.as_object() {
                        for (k, v) in parent_map {
                            if !current.contains_key(k) {
                                current.insert(k.clone(), v.clone());
                            }
                        }
                    }
                }
                Some(JsonValue::Array(current)) => {
                    if let Some(parent_items) = parent_value.as_array() {
                        for item in parent_items {
                            if !current.contains(item) {
                                current.push(item.clone());
                            }
                        }
                    }
                }
                Some(_) => {}
            }
        }
        value
    }

    fn schema_defs(
        &self,
        key: &str,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Vec<PropertyDef> {
        let Some(JsonValue::Object(defs)) = self.get_definition(key, registry) else {
            return Vec::new();
        };
        defs.iter()
            .map(|(name, schema)| PropertyDef::new(name, schema, registry, issues))
            .collect()
    }

    pub fn properties_def(
        &self,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Vec<PropertyDef> {
        self.schema_defs("properties", registry, issues)
    }

    pub fn attributes_def(
        &self,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Vec<PropertyDef> {
        self.schema_defs("attributes", registry, issues)
    }

    /// Names of every declared property, inherited ones included.
    pub fn property_names(&self, registry: &TypeRegistry) -> Vec<String> {
        match self.get_definition("properties", registry) {
            Some(JsonValue::Object(defs)) => defs.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn attribute_names(&self, registry: &TypeRegistry) -> Vec<String> {
        match self.get_definition("attributes", registry) {
            Some(JsonValue::Object(defs)) => defs.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Requirement definitions as `(name, definition)` pairs in declaration
    /// order. A map-shaped `requirements` section is accepted as well.
    pub fn requirements(&self, registry: &TypeRegistry) -> Vec<(String, JsonValue)> {
        let mut out = Vec::new();
        match self.get_definition("requirements", registry) {
            Some(JsonValue::Array(items)) => {
                for item in items {
                    if let Some(map) = item.as_object() {
                        for (name, def) in map {
                            out.push((name.clone(), def.clone()));
                        }
                    }
                }
            }
            Some(JsonValue::Object(map)) => {
                for (name, def) in map {
                    out.push((name.clone(), def.clone()));
                }
            }
            _ => {}
        }
        out
    }

    pub fn interfaces(&self, registry: &TypeRegistry) -> JsonMap<String, JsonValue> {
        match self.get_definition("interfaces", registry) {
            Some(JsonValue::Object(map)) => map,
            _ => JsonMap::new(),
        }
    }

    /// Capabilities declared on this (node or group) type.
    pub fn capabilities_def(
        &self,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Vec<CapabilityDef> {
        let Some(JsonValue::Object(caps)) = self.get_definition("capabilities", registry) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (name, raw) in caps {
            let definition = match raw {
                JsonValue::Object(map) => map,
                JsonValue::String(type_name) => {
                    let mut map = JsonMap::new();
                    map.insert("type".to_string(), JsonValue::String(type_name));
                    map
                }
                _ => JsonMap::new(),
            };
            let declared_type = definition
                .get("type")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string();
            let type_def = if declared_type.is_empty() {
                None
            } else {
                registry.resolve(TypeKind::Capability, &declared_type, issues)
            };

            let mut merged = match type_def
                .as_ref()
                .and_then(|t| t.get_definition("properties", registry))
            {
                Some(JsonValue::Object(map)) => map,
                _ => JsonMap::new(),
            };
            if let Some(JsonValue::Object(overrides)) = definition.get("properties") {
                for (prop, schema) in overrides {
                    merged.insert(prop.clone(), schema.clone());
                }
            }
            let properties = merged
                .iter()
                .map(|(prop, schema)| PropertyDef::new(prop, schema, registry, issues))
                .collect();

            out.push(CapabilityDef {
                type_name: type_def
                    .as_ref()
                    .map(|t| t.name.clone())
                    .unwrap_or(declared_type),
                name,
                type_def,
                definition,
                properties,
            });
        }
        out
    }

    /// Relationship types reachable from this node type's requirements.
    pub fn relationship_types(&self, registry: &TypeRegistry) -> Vec<DeclaredRelationship> {
        let mut out = Vec::new();
        for (requirement, def) in self.requirements(registry) {
            let Some(def) = def.as_object() else {
                continue;
            };
            let relationship = match def.get("relationship") {
                Some(JsonValue::String(name)) => Some(name.clone()),
                Some(JsonValue::Object(map)) => map
                    .get("type")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
                _ => None,
            };
            let Some(relationship) = relationship else {
                continue;
            };
            let relationship_type = match registry.find(TypeKind::Relationship, &relationship) {
                Some(found) => found.name,
                None => relationship,
            };
            out.push(DeclaredRelationship {
                requirement,
                relationship_type,
                node: def.get("node").and_then(JsonValue::as_str).map(str::to_string),
                capability: def
                    .get("capability")
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
            });
        }
        out
    }

    /// Primitive type a data type ultimately derives from, if any.
    pub fn value_type(&self, registry: &TypeRegistry) -> Option<String> {
        if self.kind != TypeKind::Data {
            return None;
        }
        self.ancestors(registry).iter().find_map(|t| {
            t.derived_from()
                .filter(|parent| is_primitive_type(parent))
                .map(str::to_string)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::issues::IssueCollector;
    use crate::registry::TypeRegistry;

    use super::{EntityType, TypeKind};

    #[test]
    fn compute_inherits_root_requirement_and_capability() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let compute = registry.find(TypeKind::Node, "Compute").unwrap();
        assert_eq!(compute.name, "tosca.nodes.Compute");
        assert_eq!(compute.derived_from(), Some("tosca.nodes.Root"));

        let names: Vec<String> = compute
            .requirements(&registry)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["local_storage", "dependency"]);

        let caps = compute.capabilities_def(&registry, &mut issues);
        assert!(caps.iter().any(|c| c.name == "feature"));
        let host = caps.iter().find(|c| c.name == "host").unwrap();
        assert_eq!(host.type_name, "tosca.capabilities.Container");
        assert!(host.property_def("num_cpus").is_some());
        assert!(issues.is_empty(), "{:?}", issues.issues());
    }

    #[test]
    fn data_type_value_type_follows_primitive_parent() {
        let registry = TypeRegistry::builtin();
        let port_def = registry.find(TypeKind::Data, "tosca.datatypes.network.PortDef").unwrap();
        assert_eq!(port_def.value_type(&registry).as_deref(), Some("integer"));
        let credential = registry.find(TypeKind::Data, "tosca.datatypes.Credential").unwrap();
        assert_eq!(credential.value_type(&registry), None);
    }

    #[test]
    fn derived_from_cycle_terminates() {
        let mut registry = TypeRegistry::builtin();
        registry.insert_custom(
            TypeKind::Node,
            "my.A",
            json!({ "derived_from": "my.B", "properties": { "a": { "type": "string" } } }),
        );
        registry.insert_custom(
            TypeKind::Node,
            "my.B",
            json!({ "derived_from": "my.A", "properties": { "b": { "type": "string" } } }),
        );
        let a = registry.find(TypeKind::Node, "my.A").unwrap();
        assert_eq!(a.ancestors(&registry).len(), 2);
        assert_eq!(a.property_names(&registry), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn relationship_types_come_from_requirement_definitions() {
        let registry = TypeRegistry::builtin();
        let software = registry.find(TypeKind::Node, "SoftwareComponent").unwrap();
        let rels = software.relationship_types(&registry);
        let host = rels.iter().find(|r| r.requirement == "host").unwrap();
        assert_eq!(host.relationship_type, "tosca.relationships.HostedOn");
        assert_eq!(host.node.as_deref(), Some("tosca.nodes.Compute"));
    }
}
