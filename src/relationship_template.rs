//! Relationship templates: declared in `relationship_templates` or
//! synthesized from a resolved requirement.

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::entity::EntityTemplate;
use crate::entity_type::{TypeDef, TypeKind};
use crate::issues::IssueCollector;
use crate::registry::TypeRegistry;
use crate::requirements::{RequirementAssignment, RequirementRelationship};

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipTemplate {
    #[serde(flatten)]
    pub entity: EntityTemplate,
    /// Node template holding the requirement.
    pub source: Option<String>,
    /// Node template the requirement points at.
    pub target: Option<String>,
    pub capability: Option<String>,
}

impl RelationshipTemplate {
    /// A template from the `relationship_templates` section. Source and
    /// target are bound later, when a requirement names it.
    pub fn new(
        name: &str,
        raw: &JsonValue,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Self {
        Self {
            entity: EntityTemplate::build(name, raw, TypeKind::Relationship, registry, issues),
            source: None,
            target: None,
            capability: None,
        }
    }

    /// Synthesizes the relationship implied by `requirement` of `source`.
    /// An inline `relationship` map contributes its `properties` and
    /// `interfaces`.
    pub fn from_requirement(
        source: &str,
        target: &str,
        requirement: &RequirementAssignment,
        relationship_type: TypeDef,
        registry: &TypeRegistry,
        issues: &mut IssueCollector,
    ) -> Self {
        let mut raw = JsonMap::new();
        raw.insert(
            "type".to_string(),
            JsonValue::String(relationship_type.name.clone()),
        );
        if let Some(RequirementRelationship::Inline(inline)) = &requirement.relationship {
            for key in ["properties", "interfaces"] {
                if let Some(value) = inline.get(key) {
                    raw.insert(key.to_string(), value.clone());
                }
            }
        }
        let name = relationship_type.name.clone();
        let entity = EntityTemplate::materialize(
            &name,
            TypeKind::Relationship,
            raw,
            Some(name.clone()),
            Some(relationship_type),
            registry,
            issues,
        );
        Self {
            entity,
            source: Some(source.to_string()),
            target: Some(target.to_string()),
            capability: requirement.capability.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.entity.name
    }

    /// Binds a declared template to the requirement that uses it.
    pub fn bind(&mut self, source: &str, target: &str, capability: Option<&str>) {
        self.source = Some(source.to_string());
        self.target = Some(target.to_string());
        if let Some(capability) = capability {
            self.capability = Some(capability.to_string());
        }
    }

    pub fn validate(&mut self, registry: &TypeRegistry, issues: &mut IssueCollector) {
        self.entity.validate_properties(registry, issues);
        self.entity.validate_interfaces(registry, issues);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::entity_type::TypeKind;
    use crate::issues::{IssueCode, IssueCollector};
    use crate::registry::TypeRegistry;
    use crate::requirements::RequirementAssignment;

    use super::RelationshipTemplate;

    #[test]
    fn declared_template_requires_type_properties() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let mut template = RelationshipTemplate::new(
            "storage_attachment",
            &json!({ "type": "AttachesTo", "properties": { "device": "/dev/vdb" } }),
            &registry,
            &mut issues,
        );
        template.validate(&registry, &mut issues);
        assert_eq!(template.entity.type_label(), "tosca.relationships.AttachesTo");
        assert_eq!(issues.count(IssueCode::MissingRequiredField), 1);
        assert!(issues.issues()[0].message.contains("\"location\""));
    }

    #[test]
    fn inline_relationship_contributes_properties() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let requirement = RequirementAssignment::parse(
            "local_storage",
            &json!({
                "node": "volume",
                "relationship": { "type": "AttachesTo", "properties": { "location": "/mnt" } }
            }),
            &mut issues,
        );
        let rel_type = registry.find(TypeKind::Relationship, "AttachesTo").unwrap();
        let mut template = RelationshipTemplate::from_requirement(
            "server",
            "volume",
            &requirement,
            rel_type,
            &registry,
            &mut issues,
        );
        template.validate(&registry, &mut issues);
        assert_eq!(template.source.as_deref(), Some("server"));
        assert_eq!(template.target.as_deref(), Some("volume"));
        assert_eq!(template.entity.get_property_value("location"), Some(&json!("/mnt")));
        assert!(issues.is_empty(), "{:?}", issues.issues());
    }

    #[test]
    fn synthesized_relationship_is_named_after_its_type() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let requirement = RequirementAssignment::parse(
            "host",
            &json!({
                "node": "server",
                "relationship": {
                    "type": "HostedOn",
                    "interfaces": {
                        "Configure": { "pre_configure_source": "scripts/prepare.sh" }
                    }
                }
            }),
            &mut issues,
        );
        let rel_type = registry.find(TypeKind::Relationship, "HostedOn").unwrap();
        let template = RelationshipTemplate::from_requirement(
            "app",
            "server",
            &requirement,
            rel_type,
            &registry,
            &mut issues,
        );
        assert_eq!(template.name(), "tosca.relationships.HostedOn");
        assert_eq!(template.entity.type_name.as_deref(), Some("tosca.relationships.HostedOn"));
        assert_eq!(template.entity.interfaces.len(), 1);
        assert_eq!(template.entity.interfaces[0].operation, "pre_configure_source");
        assert!(issues.is_empty(), "{:?}", issues.issues());
    }
}
