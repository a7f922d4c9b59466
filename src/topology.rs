//! One `topology_template` scope: inputs, templates, groups, policies,
//! outputs, the relationship graph and optional substitution mappings.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::functions::FunctionScope;
use crate::graph::{resolve_requirements, RelationshipGraph};
use crate::groups::Group;
use crate::issues::IssueCollector;
use crate::node_template::NodeTemplate;
use crate::parameters::{Input, Output};
use crate::policies::{policy_entries, Policy};
use crate::registry::TypeRegistry;
use crate::relationship_template::RelationshipTemplate;
use crate::substitution::{SubstitutedNode, SubstitutionMappings};

pub const TOPOLOGY_TEMPLATE_KEYS: &[&str] = &[
    "description",
    "inputs",
    "node_templates",
    "relationship_templates",
    "outputs",
    "groups",
    "substitution_mappings",
    "policies",
    "metadata",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct TopologyTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap<String, JsonValue>>,
    pub inputs: Vec<Input>,
    pub node_templates: Vec<NodeTemplate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relationship_templates: Vec<RelationshipTemplate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<Policy>,
    pub outputs: Vec<Output>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitution_mappings: Option<SubstitutionMappings>,
    #[serde(skip)]
    pub graph: RelationshipGraph,
}

/// Entries of a name-keyed section, or none when the section is absent.
fn named_section<'a>(
    raw: &'a JsonMap<String, JsonValue>,
    key: &str,
    issues: &mut IssueCollector,
) -> Vec<(&'a String, &'a JsonValue)> {
    match raw.get(key) {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Object(map)) => map.iter().collect(),
        Some(_) => {
            issues.type_mismatch(&format!("\"{key}\" of topology template"), "map");
            Vec::new()
        }
    }
}

impl TopologyTemplate {
    /// Builds and validates every part of the topology. `params` supplies
    /// input values; `substituted` names the node this topology stands in
    /// for when it is parsed as a nested template.
    pub fn parse(
        raw: &JsonValue,
        registry: &TypeRegistry,
        params: &BTreeMap<String, JsonValue>,
        substituted: Option<&SubstitutedNode>,
        issues: &mut IssueCollector,
    ) -> TopologyTemplate {
        let empty = JsonMap::new();
        let raw = match raw {
            JsonValue::Object(map) => map,
            JsonValue::Null => &empty,
            _ => {
                issues.type_mismatch("Template \"topology_template\"", "map");
                &empty
            }
        };
        for key in raw.keys() {
            if !TOPOLOGY_TEMPLATE_KEYS.contains(&key.as_str()) {
                issues.unknown_field("Template \"topology_template\"", key);
            }
        }

        let mut inputs: Vec<Input> = Vec::new();
        for (name, def) in named_section(raw, "inputs", issues) {
            let mut input = Input::new(name, def, registry, issues);
            input.validate(params.get(name.as_str()), registry, issues);
            inputs.push(input);
        }

        let mut node_templates: Vec<NodeTemplate> = named_section(raw, "node_templates", issues)
            .into_iter()
            .map(|(name, tpl)| NodeTemplate::new(name, tpl, registry, issues))
            .collect();
        let mut relationship_templates: Vec<RelationshipTemplate> =
            named_section(raw, "relationship_templates", issues)
                .into_iter()
                .map(|(name, tpl)| RelationshipTemplate::new(name, tpl, registry, issues))
                .collect();

        for node in &mut node_templates {
            node.validate(registry, issues);
        }
        for template in &mut relationship_templates {
            template.validate(registry, issues);
        }

        let groups: Vec<Group> = named_section(raw, "groups", issues)
            .into_iter()
            .map(|(name, tpl)| Group::new(name, tpl, &node_templates, registry, issues))
            .collect();

        let policies: Vec<Policy> = match raw.get("policies") {
            Some(section) => policy_entries(section, issues)
                .into_iter()
                .map(|(name, tpl)| Policy::new(&name, &tpl, &node_templates, &groups, registry, issues))
                .collect(),
            None => Vec::new(),
        };

        let outputs: Vec<Output> = named_section(raw, "outputs", issues)
            .into_iter()
            .map(|(name, def)| Output::new(name, def, issues))
            .collect();

        let input_names: Vec<String> = inputs.iter().map(|i| i.name.clone()).collect();
        let node_names: Vec<String> = node_templates.iter().map(|n| n.name().to_string()).collect();
        let scope = FunctionScope {
            inputs: &input_names,
            node_templates: &node_names,
            registry,
        };
        for node in &node_templates {
            scope.validate(&JsonValue::Object(node.entity.raw.clone()), issues);
        }
        for template in &relationship_templates {
            scope.validate(&JsonValue::Object(template.entity.raw.clone()), issues);
        }
        for group in &groups {
            scope.validate(&JsonValue::Object(group.entity.raw.clone()), issues);
        }
        for policy in &policies {
            scope.validate(&JsonValue::Object(policy.entity.raw.clone()), issues);
        }
        for output in &outputs {
            if let Some(value) = &output.value {
                scope.validate(value, issues);
            }
        }

        resolve_requirements(&mut node_templates, &mut relationship_templates, registry, issues);
        let graph = RelationshipGraph::build(&node_templates);

        let substitution_mappings = raw.get("substitution_mappings").map(|mappings| {
            SubstitutionMappings::parse(
                mappings,
                &inputs,
                &outputs,
                &node_templates,
                substituted,
                registry,
                issues,
            )
        });

        TopologyTemplate {
            description: raw
                .get("description")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            metadata: raw.get("metadata").and_then(JsonValue::as_object).cloned(),
            inputs,
            node_templates,
            relationship_templates,
            groups,
            policies,
            outputs,
            substitution_mappings,
            graph,
        }
    }

    pub fn node_template(&self, name: &str) -> Option<&NodeTemplate> {
        self.node_templates.iter().find(|n| n.name() == name)
    }

    pub fn relationship_template(&self, name: &str) -> Option<&RelationshipTemplate> {
        self.relationship_templates.iter().find(|t| t.name() == name)
    }

    pub fn input(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name() == name)
    }

    pub fn policy(&self, name: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.name() == name)
    }

    /// Effective input values: supplied parameters or defaults.
    pub fn input_values(&self) -> BTreeMap<String, JsonValue> {
        self.inputs
            .iter()
            .filter_map(|i| i.value.clone().map(|v| (i.name.clone(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use crate::issues::{IssueCode, IssueCollector};
    use crate::registry::TypeRegistry;

    use super::TopologyTemplate;

    fn parse(raw: serde_json::Value) -> (TopologyTemplate, IssueCollector) {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let topology = TopologyTemplate::parse(&raw, &registry, &BTreeMap::new(), None, &mut issues);
        (topology, issues)
    }

    #[test]
    fn builds_graph_across_templates() {
        let (topology, issues) = parse(json!({
            "inputs": { "cpus": { "type": "integer", "default": 2 } },
            "node_templates": {
                "server": {
                    "type": "tosca.nodes.Compute",
                    "capabilities": { "host": { "properties": { "num_cpus": { "get_input": "cpus" } } } }
                },
                "web": {
                    "type": "tosca.nodes.WebServer",
                    "requirements": [{ "host": "server" }]
                }
            },
            "outputs": { "address": { "value": { "get_attribute": ["server", "private_address"] } } }
        }));
        assert!(issues.is_empty(), "{:?}", issues.issues());
        assert_eq!(topology.graph.vertex_count(), 2);
        assert_eq!(topology.graph.successors("web"), vec!["server"]);
        assert_eq!(topology.input_values()["cpus"], json!(2));
        assert_eq!(
            topology.node_template("server").unwrap().relationship_templates.len(),
            1
        );
    }

    #[test]
    fn function_references_are_checked() {
        let (_, issues) = parse(json!({
            "node_templates": {
                "server": {
                    "type": "tosca.nodes.Compute",
                    "capabilities": { "host": { "properties": { "num_cpus": { "get_input": "cpus" } } } }
                }
            },
            "outputs": { "address": { "value": { "get_attribute": ["nowhere", "private_address"] } } }
        }));
        assert_eq!(issues.count(IssueCode::UnknownInput), 1);
        assert_eq!(issues.count(IssueCode::KeyError), 1);
    }

    #[test]
    fn unknown_topology_sections_are_reported() {
        let (_, issues) = parse(json!({ "node_templates": {}, "workflows": {} }));
        assert_eq!(issues.count(IssueCode::UnknownField), 1);
    }
}
