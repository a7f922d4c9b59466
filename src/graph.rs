//! Requirement-to-relationship resolution and the topology node graph.
//!
//! Resolution runs after every node template of a topology is built. For each
//! requirement naming a target `node`, the relationship type is taken from
//! the first of:
//! 1. the requirement's own `relationship` (name, or map with `type`)
//! 2. the node type's requirement definition of the same name
//! 3. a relationship template of that name (binds source and target)
//! 4. a relationship type of that name, shorthand or prefixed
//!
//! A requirement that resolves to nothing records a `ValidationError` and
//! contributes no edge.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::entity_type::{TypeDef, TypeKind};
use crate::issues::{IssueCode, IssueCollector};
use crate::node_template::NodeTemplate;
use crate::registry::TypeRegistry;
use crate::relationship_template::RelationshipTemplate;
use crate::requirements::{RequirementAssignment, RequirementRelationship};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// One requirement resolved to a target node.
pub struct ResolvedRelationship {
    pub requirement: String,
    pub relationship_type: String,
    pub target: String,
    /// Relationship template used, when the requirement named one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Relationship name a requirement asks for: explicit first, then the node
/// type's requirement definition.
fn requested_relationship(
    node: &NodeTemplate,
    requirement: &RequirementAssignment,
    registry: &TypeRegistry,
    issues: &mut IssueCollector,
) -> Option<String> {
    match &requirement.relationship {
        Some(RequirementRelationship::Named(name)) => return Some(name.clone()),
        Some(RequirementRelationship::Inline(map)) => match map.get("type").and_then(JsonValue::as_str) {
            Some(name) => return Some(name.to_string()),
            None => issues.missing_required_field(
                &format!("\"relationship\" used in template \"{}\"", node.name()),
                "type",
            ),
        },
        None => {}
    }
    let type_def = node.entity.type_def.as_ref()?;
    type_def
        .requirements(registry)
        .into_iter()
        .find(|(name, _)| name == &requirement.name)
        .and_then(|(_, def)| match def.get("relationship") {
            Some(JsonValue::String(name)) => Some(name.clone()),
            Some(JsonValue::Object(map)) => map.get("type").and_then(JsonValue::as_str).map(str::to_string),
            _ => None,
        })
}

enum Resolution {
    Template(usize),
    Type(TypeDef),
}

fn resolve_relationship(
    node: &NodeTemplate,
    requested: &str,
    relationship_templates: &[RelationshipTemplate],
    registry: &TypeRegistry,
) -> Option<Resolution> {
    if let Some(index) = relationship_templates.iter().position(|t| t.name() == requested) {
        return Some(Resolution::Template(index));
    }
    let found = registry.find(TypeKind::Relationship, requested)?;
    if let Some(type_def) = &node.entity.type_def {
        let declared = type_def.relationship_types(registry);
        let within = declared.iter().any(|d| {
            d.relationship_type == found.name || found.is_derived_from(&d.relationship_type, registry)
        });
        if !within {
            tracing::debug!(
                node = %node.name(),
                relationship = %found.name,
                "relationship type outside the node type's declared set"
            );
        }
    }
    Some(Resolution::Type(found))
}

/// Resolves every requirement of every node template, filling
/// `NodeTemplate::relationships`, binding named relationship templates, and
/// attaching synthesized relationship templates to their target nodes.
pub fn resolve_requirements(
    nodes: &mut [NodeTemplate],
    relationship_templates: &mut [RelationshipTemplate],
    registry: &TypeRegistry,
    issues: &mut IssueCollector,
) {
    let names: Vec<String> = nodes.iter().map(|n| n.name().to_string()).collect();
    let mut attachments: Vec<(String, RelationshipTemplate)> = Vec::new();

    for node in nodes.iter_mut() {
        let mut resolved = Vec::new();
        for requirement in &node.entity.requirements {
            let Some(target) = requirement.node.as_deref() else {
                continue;
            };
            if registry.kind_of(target).is_some() {
                issues.record(
                    IssueCode::NotImplemented,
                    format!(
                        "Lookup by TOSCA types is not supported. Requirement for \"{}\" can not be full-filled.",
                        requirement.name
                    ),
                );
                continue;
            }
            if !names.iter().any(|n| n == target) {
                issues.record(
                    IssueCode::KeyError,
                    format!("Node template \"{target}\" was not found."),
                );
                continue;
            }

            let requested = requested_relationship(node, requirement, registry, issues);
            let resolution = requested.as_deref().and_then(|name| {
                resolve_relationship(node, name, relationship_templates, registry)
            });
            match resolution {
                Some(Resolution::Template(index)) => {
                    let template = &mut relationship_templates[index];
                    template.bind(node.name(), target, requirement.capability.as_deref());
                    resolved.push(ResolvedRelationship {
                        requirement: requirement.name.clone(),
                        relationship_type: template.entity.type_label().to_string(),
                        target: target.to_string(),
                        template: Some(template.name().to_string()),
                    });
                }
                Some(Resolution::Type(rel_type)) => {
                    resolved.push(ResolvedRelationship {
                        requirement: requirement.name.clone(),
                        relationship_type: rel_type.name.clone(),
                        target: target.to_string(),
                        template: None,
                    });
                    let template = RelationshipTemplate::from_requirement(
                        node.name(),
                        target,
                        requirement,
                        rel_type,
                        registry,
                        issues,
                    );
                    attachments.push((target.to_string(), template));
                }
                None => issues.validation_error(format!(
                    "Relationship \"{}\" of requirement \"{}\" in node template \"{}\" could not be resolved.",
                    requested.as_deref().unwrap_or_default(),
                    requirement.name,
                    node.name()
                )),
            }
        }
        node.relationships = resolved;
    }

    for (target, mut template) in attachments {
        if let Some(node) = nodes.iter_mut().find(|n| n.name() == target) {
            if matches!(
                template.entity.raw.get("properties"),
                Some(JsonValue::Object(_))
            ) {
                template.validate(registry, issues);
            }
            node.relationship_templates.push(template);
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Directed graph of node templates; an edge runs from the node holding a
/// requirement to its target and carries the relationship type.
pub struct RelationshipGraph {
    graph: DiGraph<String, String>,
    node_indices: HashMap<String, NodeIndex>,
}

impl RelationshipGraph {
    /// Two passes: one vertex per node template, then one edge per resolved
    /// relationship whose target is a known vertex other than the source.
    pub fn build(nodes: &[NodeTemplate]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();
        for node in nodes {
            let index = graph.add_node(node.name().to_string());
            node_indices.insert(node.name().to_string(), index);
        }
        for node in nodes {
            let Some(&source) = node_indices.get(node.name()) else {
                continue;
            };
            for relationship in &node.relationships {
                match node_indices.get(&relationship.target) {
                    Some(&target) if target != source => {
                        graph.add_edge(source, target, relationship.relationship_type.clone());
                    }
                    _ => tracing::debug!(
                        source = %node.name(),
                        target = %relationship.target,
                        "dropping graph edge"
                    ),
                }
            }
        }
        Self { graph, node_indices }
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_indices.contains_key(name)
    }

    pub fn vertices(&self) -> Vec<&str> {
        self.graph.node_weights().map(String::as_str).collect()
    }

    /// `(source, target, relationship type)` triples.
    pub fn edges(&self) -> Vec<(&str, &str, &str)> {
        self.graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].as_str(),
                    self.graph[e.target()].as_str(),
                    e.weight().as_str(),
                )
            })
            .collect()
    }

    /// Nodes `name` has requirements on.
    pub fn successors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Nodes with requirements on `name`.
    pub fn predecessors(&self, name: &str) -> Vec<&str> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&index) = self.node_indices.get(name) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(index, direction)
            .map(|i| self.graph[i].as_str())
            .collect()
    }

    /// Requirement targets before the nodes depending on them; `None` when
    /// the graph has a cycle.
    pub fn deployment_order(&self) -> Option<Vec<&str>> {
        let mut order = toposort(&self.graph, None).ok()?;
        order.reverse();
        Some(order.into_iter().map(|i| self.graph[i].as_str()).collect())
    }
}
