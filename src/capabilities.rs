//! Capability assignments on node templates.

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::entity_type::CapabilityDef;
use crate::issues::IssueCollector;
use crate::properties::Property;
use crate::registry::TypeRegistry;

pub const SCALABLE: &str = "scalable";

#[derive(Debug, Clone, Serialize)]
/// A capability of a node template: the type-level definition plus the
/// property values after template overrides.
pub struct CapabilityAssignment {
    pub name: String,
    pub type_name: String,
    pub properties: Vec<Property>,
    #[serde(skip)]
    pub definition: CapabilityDef,
}

impl CapabilityAssignment {
    /// Seeds properties from the capability definition defaults, then applies
    /// `overrides` (the template's `properties` for this capability).
    pub fn new(definition: &CapabilityDef, overrides: Option<&JsonMap<String, JsonValue>>) -> Self {
        let mut properties: Vec<Property> = Vec::new();
        if let Some(overrides) = overrides {
            for (prop_name, value) in overrides {
                if let Some(def) = definition.property_def(prop_name) {
                    properties.push(Property::new(prop_name, value.clone(), def.schema.clone()));
                }
            }
        }
        for def in &definition.properties {
            if properties.iter().any(|p| p.name == def.name) {
                continue;
            }
            if let Some(default) = def.default_value() {
                properties.push(Property::new(&def.name, default.clone(), def.schema.clone()));
            }
        }
        Self {
            name: definition.name.clone(),
            type_name: definition.type_name.clone(),
            properties,
            definition: definition.clone(),
        }
    }

    pub fn get_property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn get_property_value(&self, name: &str) -> Option<&JsonValue> {
        self.get_property(name).map(|p| &p.value)
    }

    pub fn properties_map(&self) -> JsonMap<String, JsonValue> {
        self.properties
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    pub fn validate_properties(&mut self, registry: &TypeRegistry, issues: &mut IssueCollector) {
        for property in &mut self.properties {
            property.validate(registry, issues);
        }
    }

    /// `min_instances <= default_instances <= max_instances` for `scalable`.
    pub fn validate_scalable(&self, template: &str, issues: &mut IssueCollector) {
        if self.name != SCALABLE {
            return;
        }
        let int = |name: &str| self.get_property_value(name).and_then(JsonValue::as_i64);
        let (Some(min), Some(max)) = (int("min_instances"), int("max_instances")) else {
            return;
        };
        if min > max {
            issues.validation_error(format!(
                "\"min_instances\" ({min}) of capability \"{SCALABLE}\" on template \"{template}\" must not exceed \"max_instances\" ({max})."
            ));
            return;
        }
        if let Some(default) = int("default_instances") {
            if default < min || default > max {
                issues.validation_error(format!(
                    "\"default_instances\" ({default}) of capability \"{SCALABLE}\" on template \"{template}\" is not between \"min_instances\" ({min}) and \"max_instances\" ({max})."
                ));
            }
        }
    }
}
