//! Topology inputs and outputs.

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::datatypes::is_known_value_type;
use crate::issues::IssueCollector;
use crate::properties::Property;
use crate::registry::TypeRegistry;
use crate::schema::Schema;

pub const INPUT_KEYS: &[&str] = &[
    "type",
    "description",
    "default",
    "constraints",
    "required",
    "status",
    "entry_schema",
];

pub const OUTPUT_KEYS: &[&str] = &["description", "value"];

#[derive(Debug, Clone, Serialize)]
pub struct Input {
    pub name: String,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    pub required: bool,
    /// Value in effect after validation: the supplied parameter or the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(skip)]
    pub schema: Schema,
}

impl Input {
    pub fn new(
        name: &str,
        raw: &JsonValue,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Self {
        let what = format!("Input \"{name}\"");
        let mut known = JsonMap::new();
        match raw {
            JsonValue::Object(map) => {
                for (key, value) in map {
                    if INPUT_KEYS.contains(&key.as_str()) {
                        known.insert(key.clone(), value.clone());
                    } else {
                        issues.unknown_field(&what, key);
                    }
                }
            }
            _ => issues.type_mismatch(&what, "map"),
        }

        let schema = Schema::parse(name, &JsonValue::Object(known), registry, issues);
        if !schema.type_name.is_empty() && !is_known_value_type(&schema.type_name, registry) {
            issues.value_error(format!("Invalid type \"{}\".", schema.type_name));
        }

        Self {
            name: name.to_string(),
            type_name: schema.type_name.clone(),
            description: schema.description.clone(),
            default: schema.default.clone(),
            required: schema.required,
            value: None,
            schema,
        }
    }

    /// Validates the supplied value, or the default when none is supplied.
    pub fn validate(
        &mut self,
        supplied: Option<&JsonValue>,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) {
        let Some(value) = supplied.or(self.default.as_ref()).cloned() else {
            if self.required {
                tracing::warn!(input = %self.name, "required input has no value and no default");
            }
            return;
        };
        let mut property = Property::new(&self.name, value, self.schema.clone());
        property.validate(registry, issues);
        self.value = Some(property.value);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Output {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Option<JsonValue>,
}

impl Output {
    pub fn new(name: &str, raw: &JsonValue, issues: &mut IssueCollector) -> Self {
        let what = format!("Output \"{name}\"");
        let mut output = Self {
            name: name.to_string(),
            description: None,
            value: None,
        };
        let Some(map) = raw.as_object() else {
            issues.type_mismatch(&what, "map");
            return output;
        };
        for key in map.keys() {
            if !OUTPUT_KEYS.contains(&key.as_str()) {
                issues.unknown_field(&what, key);
            }
        }
        output.description = map
            .get("description")
            .and_then(JsonValue::as_str)
            .map(str::to_string);
        output.value = map.get("value").cloned();
        if output.value.is_none() {
            issues.missing_required_field(&what, "value");
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::issues::{IssueCode, IssueCollector};
    use crate::registry::TypeRegistry;

    use super::{Input, Output};

    #[test]
    fn supplied_value_wins_over_default() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let mut input = Input::new(
            "cpus",
            &json!({ "type": "integer", "default": 1, "constraints": [{ "valid_values": [1, 2, 4] }] }),
            &registry,
            &mut issues,
        );
        input.validate(Some(&json!("4")), &registry, &mut issues);
        assert_eq!(input.value, Some(json!(4)));
        assert!(issues.is_empty());

        input.validate(Some(&json!(3)), &registry, &mut issues);
        assert_eq!(issues.count(IssueCode::ValidationError), 1);
    }

    #[test]
    fn unknown_keys_are_reported_once() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        Input::new("port", &json!({ "type": "integer", "colour": "red" }), &registry, &mut issues);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues.count(IssueCode::UnknownField), 1);
    }

    #[test]
    fn input_type_must_be_known() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        Input::new("thing", &json!({ "type": "my.Unknown" }), &registry, &mut issues);
        assert_eq!(issues.count(IssueCode::ValueError), 1);
    }

    #[test]
    fn outputs_require_a_value() {
        let mut issues = IssueCollector::new();
        let output = Output::new("url", &json!({ "description": "endpoint" }), &mut issues);
        assert!(output.value.is_none());
        assert_eq!(issues.count(IssueCode::MissingRequiredField), 1);
    }
}
