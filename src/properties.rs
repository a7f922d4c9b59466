//! Materialized property values bound to their schemas.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::datatypes::validate_datatype;
use crate::functions::is_function;
use crate::issues::IssueCollector;
use crate::registry::TypeRegistry;
use crate::schema::Schema;

#[derive(Debug, Clone, Serialize)]
pub struct Property {
    pub name: String,
    pub value: JsonValue,
    #[serde(skip)]
    pub schema: Schema,
}

impl Property {
    pub fn new(name: &str, value: JsonValue, schema: Schema) -> Self {
        Self {
            name: name.to_string(),
            value,
            schema,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.schema.type_name
    }

    pub fn required(&self) -> bool {
        self.schema.required
    }

    pub fn default_value(&self) -> Option<&JsonValue> {
        self.schema.default.as_ref()
    }

    pub fn is_function(&self) -> bool {
        is_function(&self.value)
    }

    /// Checks the value against type and constraints, replacing it with the
    /// normalized form. Constraints are skipped for a value of the wrong type.
    pub fn validate(&mut self, registry: &TypeRegistry, issues: &mut IssueCollector) {
        if self.is_function() || self.schema.type_name.is_empty() {
            return;
        }
        let (normalized, well_typed) = validate_datatype(
            &self.schema.type_name,
            &self.value,
            self.schema.entry_schema.as_deref(),
            &self.name,
            registry,
            issues,
        );
        if well_typed {
            for constraint in &self.schema.constraints {
                constraint.validate(&normalized, issues);
            }
        }
        self.value = normalized;
    }
}
