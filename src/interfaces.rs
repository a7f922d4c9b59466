//! Interface operations declared on templates.

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::entity_type::{TypeDef, TypeKind};
use crate::issues::IssueCollector;
use crate::registry::TypeRegistry;

pub const LIFECYCLE: &str = "tosca.interfaces.node.lifecycle.Standard";
pub const LIFECYCLE_SHORTNAME: &str = "Standard";
pub const CONFIGURE: &str = "tosca.interfaces.relationship.Configure";
pub const CONFIGURE_SHORTNAME: &str = "Configure";

pub const LIFECYCLE_OPERATIONS: &[&str] = &["create", "configure", "start", "stop", "delete"];

pub const CONFIGURE_OPERATIONS: &[&str] = &[
    "pre_configure_source",
    "pre_configure_target",
    "post_configure_source",
    "post_configure_target",
    "add_target",
    "add_source",
    "remove_target",
    "remove_source",
];

/// Keys of an interface definition that are not operations.
pub const INTERFACE_RESERVED_WORDS: &[&str] =
    &["type", "inputs", "derived_from", "version", "description"];

const OPERATION_KEYS: &[&str] = &["implementation", "inputs"];

#[derive(Debug, Clone, PartialEq, Serialize)]
/// One operation of one interface on a template.
pub struct InterfaceDef {
    pub interface_name: String,
    pub interface_type: Option<String>,
    pub operation: String,
    pub implementation: Option<JsonValue>,
    pub inputs: Option<JsonMap<String, JsonValue>>,
}

impl InterfaceDef {
    /// Parses an operation value: an implementation string, or a map of
    /// `implementation` and `inputs`.
    pub fn parse(
        interface_name: &str,
        interface_type: Option<&str>,
        operation: &str,
        value: &JsonValue,
        owner: &str,
        issues: &mut IssueCollector,
    ) -> Self {
        let mut def = Self {
            interface_name: interface_name.to_string(),
            interface_type: interface_type.map(str::to_string),
            operation: operation.to_string(),
            implementation: None,
            inputs: None,
        };
        match value {
            JsonValue::Object(map) => {
                for key in map.keys() {
                    if !OPERATION_KEYS.contains(&key.as_str()) {
                        issues.unknown_field(&format!("\"interfaces\" of template \"{owner}\""), key);
                    }
                }
                def.implementation = map.get("implementation").cloned();
                def.inputs = map.get("inputs").and_then(JsonValue::as_object).cloned();
            }
            JsonValue::Null => {}
            other => def.implementation = Some(other.clone()),
        }
        def
    }

    pub fn is_lifecycle(&self) -> bool {
        is_lifecycle_interface(&self.interface_name)
            || self.interface_type.as_deref().is_some_and(is_lifecycle_interface)
    }
}

pub fn is_lifecycle_interface(name: &str) -> bool {
    name == LIFECYCLE || name == LIFECYCLE_SHORTNAME
}

pub fn is_configure_interface(name: &str) -> bool {
    name == CONFIGURE || name == CONFIGURE_SHORTNAME
}

/// Declared `type` of interface `name`, from the template entry first and the
/// entity type's `interfaces` section second.
pub fn interface_type_name(
    name: &str,
    template_value: &JsonValue,
    type_interfaces: &JsonMap<String, JsonValue>,
) -> Option<String> {
    template_value
        .get("type")
        .and_then(JsonValue::as_str)
        .or_else(|| {
            type_interfaces
                .get(name)
                .and_then(|def| def.get("type"))
                .and_then(JsonValue::as_str)
        })
        .map(str::to_string)
}

/// Materializes every operation of an `interfaces` map.
pub fn build_interfaces(
    interfaces: &JsonMap<String, JsonValue>,
    type_interfaces: &JsonMap<String, JsonValue>,
    owner: &str,
    issues: &mut IssueCollector,
) -> Vec<InterfaceDef> {
    let mut out = Vec::new();
    for (name, value) in interfaces {
        let Some(operations) = value.as_object() else {
            issues.type_mismatch(&format!("Interface \"{name}\" of template \"{owner}\""), "map");
            continue;
        };
        let interface_type = interface_type_name(name, value, type_interfaces);
        for (operation, op_value) in operations {
            if INTERFACE_RESERVED_WORDS.contains(&operation.as_str()) {
                continue;
            }
            out.push(InterfaceDef::parse(
                name,
                interface_type.as_deref(),
                operation,
                op_value,
                owner,
                issues,
            ));
        }
    }
    out
}

/// Operation names allowed for a custom interface: those declared on the
/// entity type's interface entry plus those of the referenced interface type.
pub fn custom_interface_operations(
    name: &str,
    type_interfaces: &JsonMap<String, JsonValue>,
    registry: &TypeRegistry,
) -> Vec<String> {
    let Some(entry) = type_interfaces.get(name).and_then(JsonValue::as_object) else {
        return Vec::new();
    };
    let mut candidates: Vec<String> = entry.keys().cloned().collect();
    if let Some(iface_type) = entry.get("type").and_then(JsonValue::as_str) {
        if let Some(def) = registry.find(TypeKind::Interface, iface_type) {
            candidates.extend(interface_type_operations(&def, registry));
        }
    }
    let mut allowed: Vec<String> = Vec::new();
    for op in candidates {
        if !INTERFACE_RESERVED_WORDS.contains(&op.as_str()) && !allowed.contains(&op) {
            allowed.push(op);
        }
    }
    allowed
}

/// Operations declared by an interface type and its parents.
pub fn interface_type_operations(def: &TypeDef, registry: &TypeRegistry) -> Vec<String> {
    let mut ops: Vec<String> = Vec::new();
    for ty in def.ancestors(registry) {
        for key in ty.definition.keys() {
            if !INTERFACE_RESERVED_WORDS.contains(&key.as_str()) && !ops.contains(key) {
                ops.push(key.clone());
            }
        }
    }
    ops
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::issues::{IssueCode, IssueCollector};
    use crate::registry::TypeRegistry;

    use super::{build_interfaces, custom_interface_operations};

    #[test]
    fn operations_accept_string_and_map_forms() {
        let mut issues = IssueCollector::new();
        let interfaces = json!({
            "Standard": {
                "inputs": { "shared": 1 },
                "create": "scripts/create.sh",
                "configure": {
                    "implementation": "scripts/configure.sh",
                    "inputs": { "port": 80 },
                    "timeout": 30
                }
            }
        });
        let defs = build_interfaces(
            interfaces.as_object().unwrap(),
            &serde_json::Map::new(),
            "web",
            &mut issues,
        );
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].implementation, Some(json!("scripts/create.sh")));
        assert!(defs[0].is_lifecycle());
        assert_eq!(defs[1].inputs.as_ref().unwrap()["port"], json!(80));
        assert_eq!(issues.count(IssueCode::UnknownField), 1);
    }

    #[test]
    fn custom_interfaces_merge_type_operations() {
        let mut registry = TypeRegistry::builtin();
        registry.insert_custom(
            crate::entity_type::TypeKind::Interface,
            "my.interfaces.Backup",
            json!({ "derived_from": "tosca.interfaces.Root", "backup": {}, "restore": {} }),
        );
        let type_interfaces = json!({
            "Backup": { "type": "my.interfaces.Backup", "verify": {}, "inputs": {} }
        });
        let ops = custom_interface_operations("Backup", type_interfaces.as_object().unwrap(), &registry);
        assert_eq!(ops, vec!["verify", "backup", "restore"]);
    }
}
