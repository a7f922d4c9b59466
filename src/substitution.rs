//! Substitution mappings and recursive expansion of nested topologies.
//!
//! A topology declaring `substitution_mappings` can stand in for any node
//! template of the mapped `node_type`. [`SubstitutionExpander`] walks a
//! topology, parses the matching nested topology for each eligible node, and
//! recurses into it. Recursion stops at the configured nesting ceiling, and
//! expansion as a whole stops once the substitution budget is spent. Either
//! cut-off is logged and recorded, never raised.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::config::DEFAULT_MAX_SUBSTITUTIONS;
use crate::entity_type::TypeKind;
use crate::functions::resolve_get_input;
use crate::issues::{IssueCode, IssueCollector};
use crate::node_template::NodeTemplate;
use crate::parameters::{Input, Output};
use crate::registry::TypeRegistry;
use crate::topology::TopologyTemplate;

pub const SUBSTITUTION_MAPPINGS_KEYS: &[&str] = &["node_type", "requirements", "capabilities"];

#[derive(Debug, Clone, PartialEq)]
/// What a nested topology needs to know about the node it substitutes.
pub struct SubstitutedNode {
    pub name: String,
    /// Property names set explicitly on the node template.
    pub property_names: Vec<String>,
}

impl SubstitutedNode {
    pub fn from_node(node: &NodeTemplate) -> Self {
        Self {
            name: node.name().to_string(),
            property_names: node
                .entity
                .raw_properties()
                .map(|p| p.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubstitutionMappings {
    pub node_type: Option<String>,
    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    pub capabilities: JsonMap<String, JsonValue>,
    #[serde(skip_serializing_if = "JsonMap::is_empty")]
    pub requirements: JsonMap<String, JsonValue>,
    /// Name of the node template this topology substitutes, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substituted_node: Option<String>,
}

impl SubstitutionMappings {
    pub fn parse(
        raw: &JsonValue,
        inputs: &[Input],
        outputs: &[Output],
        node_templates: &[NodeTemplate],
        substituted: Option<&SubstitutedNode>,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Self {
        let what = "SubstitutionMappings";
        let empty = JsonMap::new();
        let map = match raw {
            JsonValue::Object(map) => map,
            _ => {
                issues.type_mismatch(what, "map");
                &empty
            }
        };
        for key in map.keys() {
            if !SUBSTITUTION_MAPPINGS_KEYS.contains(&key.as_str()) {
                issues.unknown_field(what, key);
            }
        }

        let section = |key: &str| -> JsonMap<String, JsonValue> {
            map.get(key).and_then(JsonValue::as_object).cloned().unwrap_or_default()
        };
        let mappings = SubstitutionMappings {
            node_type: map.get("node_type").and_then(JsonValue::as_str).map(str::to_string),
            capabilities: section("capabilities"),
            requirements: section("requirements"),
            substituted_node: substituted.map(|s| s.name.clone()),
        };

        let Some(node_type_name) = mappings.node_type.as_deref() else {
            issues.missing_required_field(what, "node_type");
            return mappings;
        };
        let Some(node_type) = registry.find(TypeKind::Node, node_type_name) else {
            issues.record(
                IssueCode::InvalidNodeType,
                format!("Node type \"{node_type_name}\" is not a valid type."),
            );
            return mappings;
        };

        let input_names: Vec<&str> = inputs.iter().map(|i| i.name.as_str()).collect();
        let missing_input = |issues: &mut IssueCollector, input: &str| {
            issues.record(
                IssueCode::MissingRequiredInput,
                format!(
                    "SubstitutionMappings with node_type \"{node_type_name}\" is missing required input definition of input \"{input}\"."
                ),
            );
        };

        let property_defs = node_type.properties_def(registry, issues);
        for def in &property_defs {
            if def.needs_value() && !input_names.contains(&def.name.as_str()) {
                missing_input(issues, &def.name);
            }
        }
        if let Some(substituted) = substituted {
            for property in &substituted.property_names {
                if !input_names.contains(&property.as_str()) {
                    missing_input(issues, property);
                }
            }
        }
        for input in inputs {
            let is_property = property_defs.iter().any(|d| d.name == input.name);
            if !is_property && input.default.is_none() {
                issues.record(
                    IssueCode::MissingDefaultValue,
                    format!(
                        "SubstitutionMappings with node_type \"{node_type_name}\" is missing required default value of input \"{}\".",
                        input.name
                    ),
                );
            }
        }

        let attribute_names = node_type.attribute_names(registry);
        for output in outputs {
            if !attribute_names.contains(&output.name) {
                issues.record(
                    IssueCode::UnknownOutput,
                    format!(
                        "Unknown output \"{}\" in SubstitutionMappings with node_type \"{node_type_name}\".",
                        output.name
                    ),
                );
            }
        }

        let capability_names: Vec<String> = node_type
            .capabilities_def(registry, issues)
            .into_iter()
            .map(|c| c.name)
            .collect();
        let requirement_names: Vec<String> = node_type
            .requirements(registry)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        check_exports("capability", &mappings.capabilities, &capability_names, node_templates);
        check_exports("requirement", &mappings.requirements, &requirement_names, node_templates);

        mappings
    }
}

/// Re-export entries are `name: [node_template, name_on_node]`. Mismatches
/// are tolerated and only logged.
fn check_exports(
    what: &str,
    exports: &JsonMap<String, JsonValue>,
    declared: &[String],
    node_templates: &[NodeTemplate],
) {
    for (name, target) in exports {
        if !declared.contains(name) {
            tracing::debug!(%name, "{what} is not declared by the substitution node type");
        }
        let node = target
            .as_array()
            .and_then(|pair| pair.first())
            .and_then(JsonValue::as_str);
        match node {
            Some(node) if node_templates.iter().any(|n| n.name() == node) => {}
            _ => tracing::debug!(%name, target = %target, "{what} mapping does not name a node template"),
        }
    }
}

#[derive(Debug, Clone)]
/// A topology available for substitution, typically from an import.
pub struct NestedTemplate {
    /// Where the topology came from.
    pub source: String,
    /// The `topology_template` section.
    pub topology: JsonValue,
}

impl NestedTemplate {
    pub fn new(source: &str, topology: JsonValue) -> Self {
        Self {
            source: source.to_string(),
            topology,
        }
    }

    /// `substitution_mappings.node_type` of the topology.
    pub fn node_type(&self) -> Option<&str> {
        self.topology
            .get("substitution_mappings")
            .and_then(|m| m.get("node_type"))
            .and_then(JsonValue::as_str)
    }
}

/// Expands substitutable node templates into nested topologies.
pub struct SubstitutionExpander<'a> {
    registry: &'a TypeRegistry,
    nested: &'a [NestedTemplate],
    max_depth: usize,
    max_expansions: usize,
    expansions: usize,
}

impl<'a> SubstitutionExpander<'a> {
    pub fn new(registry: &'a TypeRegistry, nested: &'a [NestedTemplate], max_depth: usize) -> Self {
        Self {
            registry,
            nested,
            max_depth,
            max_expansions: DEFAULT_MAX_SUBSTITUTIONS,
            expansions: 0,
        }
    }

    /// Caps the number of nested topologies built across all branches.
    pub fn with_max_expansions(mut self, count: usize) -> Self {
        self.max_expansions = count;
        self
    }

    /// Nested topologies built so far.
    pub fn expansions(&self) -> usize {
        self.expansions
    }

    fn matching_template(&self, node: &NodeTemplate) -> Option<&'a NestedTemplate> {
        let written = node.entity.type_name.as_deref()?;
        let resolved = node.type_label();
        self.nested.iter().find(|nested| {
            nested.node_type().is_some_and(|mapped| {
                mapped == written
                    || self
                        .registry
                        .find(TypeKind::Node, mapped)
                        .is_some_and(|t| t.name == resolved)
            })
        })
    }

    /// Expands every eligible node of `topology`. `depth` is the nesting
    /// level of `topology` itself.
    pub fn expand(
        &mut self,
        topology: &mut TopologyTemplate,
        params: &BTreeMap<String, JsonValue>,
        depth: usize,
        issues: &mut IssueCollector,
    ) {
        for node in topology.node_templates.iter_mut() {
            if node.substitution.is_some() || node.has_interfaces() {
                continue;
            }
            let Some(nested) = self.matching_template(node) else {
                continue;
            };
            if depth >= self.max_depth {
                tracing::warn!(
                    node = %node.name(),
                    source = %nested.source,
                    max_depth = self.max_depth,
                    "substitution nesting limit reached"
                );
                issues.record(
                    IssueCode::SubstitutionDepthExceeded,
                    format!(
                        "Substitution of node template \"{}\" stopped at the maximum nesting level of {}.",
                        node.name(),
                        self.max_depth
                    ),
                );
                continue;
            }
            if self.expansions >= self.max_expansions {
                tracing::warn!(
                    node = %node.name(),
                    max_expansions = self.max_expansions,
                    "substitution budget spent"
                );
                issues.record(
                    IssueCode::SubstitutionDepthExceeded,
                    format!(
                        "Substitution of node template \"{}\" stopped after {} expansions.",
                        node.name(),
                        self.max_expansions
                    ),
                );
                continue;
            }
            self.expansions += 1;

            let mut nested_params = params.clone();
            for (name, value) in node.entity.property_values() {
                nested_params.insert(name, resolve_get_input(&value, params));
            }
            tracing::debug!(node = %node.name(), source = %nested.source, depth, "expanding substitution");
            let substituted = SubstitutedNode::from_node(node);
            let mut nested_topology = TopologyTemplate::parse(
                &nested.topology,
                self.registry,
                &nested_params,
                Some(&substituted),
                issues,
            );
            self.expand(&mut nested_topology, &nested_params, depth + 1, issues);
            node.substitution = Some(Box::new(nested_topology));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use crate::config::DEFAULT_MAX_SUBSTITUTIONS;
use crate::entity_type::TypeKind;
    use crate::issues::{IssueCode, IssueCollector};
    use crate::registry::TypeRegistry;
    use crate::topology::TopologyTemplate;

    use super::{NestedTemplate, SubstitutionExpander};

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::builtin();
        registry.insert_custom(
            TypeKind::Node,
            "example.Database",
            json!({
                "derived_from": "tosca.nodes.Root",
                "properties": { "db_name": { "type": "string" } },
                "attributes": { "db_url": { "type": "string" } }
            }),
        );
        registry
    }

    #[test]
    fn node_properties_flow_into_nested_inputs() {
        let registry = registry();
        let mut issues = IssueCollector::new();
        let nested = vec![NestedTemplate::new(
            "db.yaml",
            json!({
                "inputs": { "db_name": { "type": "string" } },
                "substitution_mappings": { "node_type": "example.Database" },
                "node_templates": {
                    "dbms": { "type": "tosca.nodes.Compute" }
                }
            }),
        )];
        let params = BTreeMap::from([("name".to_string(), json!("orders"))]);
        let mut top = TopologyTemplate::parse(
            &json!({
                "inputs": { "name": { "type": "string" } },
                "node_templates": {
                    "db": { "type": "example.Database", "properties": { "db_name": { "get_input": "name" } } }
                }
            }),
            &registry,
            &params,
            None,
            &mut issues,
        );
        SubstitutionExpander::new(&registry, &nested, 20).expand(&mut top, &params, 0, &mut issues);
        assert!(issues.is_empty(), "{:?}", issues.issues());
        let inner = top.node_templates[0].substitution.as_ref().unwrap();
        assert_eq!(inner.inputs[0].value, Some(json!("orders")));
        let mappings = inner.substitution_mappings.as_ref().unwrap();
        assert_eq!(mappings.substituted_node.as_deref(), Some("db"));
    }

    #[test]
    fn self_substituting_topology_stops_at_depth_limit() {
        let registry = registry();
        let mut issues = IssueCollector::new();
        let nested = vec![NestedTemplate::new(
            "loop.yaml",
            json!({
                "inputs": { "db_name": { "type": "string", "default": "x" } },
                "substitution_mappings": { "node_type": "example.Database" },
                "node_templates": {
                    "inner": { "type": "example.Database", "properties": { "db_name": "y" } }
                }
            }),
        )];
        let mut top = TopologyTemplate::parse(
            &json!({ "node_templates": { "outer": { "type": "example.Database", "properties": { "db_name": "z" } } } }),
            &registry,
            &BTreeMap::new(),
            None,
            &mut issues,
        );
        SubstitutionExpander::new(&registry, &nested, 5).expand(&mut top, &BTreeMap::new(), 0, &mut issues);
        assert_eq!(issues.count(IssueCode::SubstitutionDepthExceeded), 1);

        let mut levels = 0;
        let mut current = top.node_templates[0].substitution.as_deref();
        while let Some(topology) = current {
            levels += 1;
            current = topology.node_templates[0].substitution.as_deref();
        }
        assert_eq!(levels, 5);
    }

    fn nested_count(topology: &TopologyTemplate) -> usize {
        topology
            .node_templates
            .iter()
            .filter_map(|n| n.substitution.as_deref())
            .map(|inner| 1 + nested_count(inner))
            .sum()
    }

    #[test]
    fn branching_substitution_is_bounded_in_total() {
        let registry = registry();
        let mut issues = IssueCollector::new();
        let nested = vec![NestedTemplate::new(
            "fanout.yaml",
            json!({
                "inputs": { "db_name": { "type": "string", "default": "x" } },
                "substitution_mappings": { "node_type": "example.Database" },
                "node_templates": {
                    "left": { "type": "example.Database", "properties": { "db_name": "l" } },
                    "right": { "type": "example.Database", "properties": { "db_name": "r" } }
                }
            }),
        )];
        let mut top = TopologyTemplate::parse(
            &json!({ "node_templates": { "root": { "type": "example.Database", "properties": { "db_name": "z" } } } }),
            &registry,
            &BTreeMap::new(),
            None,
            &mut issues,
        );
        let mut expander = SubstitutionExpander::new(&registry, &nested, 20).with_max_expansions(30);
        expander.expand(&mut top, &BTreeMap::new(), 0, &mut issues);
        assert_eq!(expander.expansions(), 30);
        assert_eq!(nested_count(&top), 30);
        assert!(issues
            .issues()
            .iter()
            .any(|i| i.message.contains("stopped after 30 expansions")));
    }

    #[test]
    fn mapping_checks_inputs_and_outputs() {
        let registry = registry();
        let mut issues = IssueCollector::new();
        TopologyTemplate::parse(
            &json!({
                "inputs": { "extra": { "type": "integer" } },
                "outputs": { "bogus": { "value": 1 } },
                "substitution_mappings": { "node_type": "example.Database" }
            }),
            &registry,
            &BTreeMap::new(),
            None,
            &mut issues,
        );
        assert_eq!(issues.count(IssueCode::MissingRequiredInput), 1);
        assert_eq!(issues.count(IssueCode::MissingDefaultValue), 1);
        assert_eq!(issues.count(IssueCode::UnknownOutput), 1);
    }

    #[test]
    fn unknown_mapping_node_type() {
        let registry = registry();
        let mut issues = IssueCollector::new();
        TopologyTemplate::parse(
            &json!({ "substitution_mappings": { "node_type": "example.Missing" } }),
            &registry,
            &BTreeMap::new(),
            None,
            &mut issues,
        );
        assert_eq!(issues.count(IssueCode::InvalidNodeType), 1);
    }
}
