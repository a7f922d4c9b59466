//! Property and attribute schemas.
//!
//! Schema keys:
//! - `type` (required), `required` (default `true`), `description`
//! - `default`, `status` (`supported` | `experimental`)
//! - `entry_schema` (type name shorthand or a nested schema map)
//! - `constraints` (list of constraint clauses)

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::constraints::Constraint;
use crate::entity_type::{is_primitive_type, TypeKind};
use crate::issues::IssueCollector;
use crate::registry::TypeRegistry;

pub const SCHEMA_KEYS: &[&str] = &[
    "type",
    "required",
    "description",
    "default",
    "constraints",
    "entry_schema",
    "status",
    "metadata",
    "key_schema",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyStatus {
    #[default]
    Supported,
    Experimental,
}

#[derive(Debug, Clone)]
/// A parsed property/attribute schema.
pub struct Schema {
    pub name: String,
    /// Declared type; empty when the schema omitted it.
    pub type_name: String,
    pub required: bool,
    pub description: Option<String>,
    pub default: Option<JsonValue>,
    pub status: PropertyStatus,
    pub entry_schema: Option<Box<Schema>>,
    pub constraints: Vec<Constraint>,
}

/// Primitive type constraints of `type_name` are checked against.
fn constraint_type(type_name: &str, registry: &TypeRegistry) -> String {
    if is_primitive_type(type_name) {
        return type_name.to_string();
    }
    registry
        .find(TypeKind::Data, type_name)
        .and_then(|dt| dt.value_type(registry))
        .unwrap_or_else(|| type_name.to_string())
}

impl Schema {
    pub fn parse(
        name: &str,
        value: &JsonValue,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Schema {
        let empty = JsonMap::new();
        let map = match value {
            JsonValue::Object(map) => map,
            // `entry_schema: string` shorthand.
            JsonValue::String(type_name) => {
                return Schema {
                    name: name.to_string(),
                    type_name: type_name.clone(),
                    required: true,
                    description: None,
                    default: None,
                    status: PropertyStatus::Supported,
                    entry_schema: None,
                    constraints: Vec::new(),
                };
            }
            _ => {
                issues.invalid_schema(format!("Schema definition of \"{name}\" must be a dict."));
                &empty
            }
        };

        for key in map.keys() {
            if !SCHEMA_KEYS.contains(&key.as_str()) {
                issues.unknown_field(&format!("Schema definition of \"{name}\""), key);
            }
        }

        let type_name = match map.get("type") {
            Some(JsonValue::String(t)) => t.clone(),
            _ => {
                if value.is_object() {
                    issues.invalid_schema(format!(
                        "Schema definition of \"{name}\" must have a \"type\" attribute."
                    ));
                }
                String::new()
            }
        };

        let required = match map.get("required") {
            None => true,
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::String(s)) if s.eq_ignore_ascii_case("true") => true,
            Some(JsonValue::String(s)) if s.eq_ignore_ascii_case("false") => false,
            Some(other) => {
                issues.invalid_schema(format!(
                    "Schema definition of \"{name}\" has \"required\" attribute with invalid value \"{other}\". The value must be a boolean."
                ));
                true
            }
        };

        let status = match map.get("status").and_then(JsonValue::as_str) {
            None | Some("supported") => PropertyStatus::Supported,
            Some("experimental") => PropertyStatus::Experimental,
            Some(other) => {
                issues.invalid_schema(format!(
                    "Schema definition of \"{name}\" has \"status\" attribute with invalid value \"{other}\". Valid values are \"supported, experimental\"."
                ));
                PropertyStatus::Supported
            }
        };

        let entry_schema = map
            .get("entry_schema")
            .map(|entry| Box::new(Schema::parse(name, entry, registry, issues)));

        let constraints = match map.get("constraints") {
            Some(raw) if !type_name.is_empty() => {
                Constraint::parse_list(name, &constraint_type(&type_name, registry), raw, issues)
            }
            _ => Vec::new(),
        };

        Schema {
            name: name.to_string(),
            type_name,
            required,
            description: map
                .get("description")
                .and_then(JsonValue::as_str)
                .map(|d| d.trim().to_string()),
            default: map.get("default").cloned(),
            status,
            entry_schema,
            constraints,
        }
    }
}

#[derive(Debug, Clone)]
/// A named schema from a type's `properties` or `attributes` section.
pub struct PropertyDef {
    pub name: String,
    pub schema: Schema,
}

/// Attribute definitions share the property definition shape.
pub type AttributeDef = PropertyDef;

impl PropertyDef {
    pub fn new(
        name: &str,
        schema: &JsonValue,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Self {
        Self {
            name: name.to_string(),
            schema: Schema::parse(name, schema, registry, issues),
        }
    }

    pub fn default_value(&self) -> Option<&JsonValue> {
        self.schema.default.as_ref()
    }

    pub fn required(&self) -> bool {
        self.schema.required
    }

    /// Required and without a default to fall back on.
    pub fn needs_value(&self) -> bool {
        self.schema.required && self.schema.default.is_none()
    }
}
