//! Top-level service template documents.
//!
//! [`ToscaTemplate::from_value`] runs the whole pipeline: document checks,
//! registry setup, imports, custom type validation, the topology and
//! substitution expansion. Problems are collected; only a missing or
//! non-mapping document is a hard error.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::config::ParserConfig;
use crate::error::ToscaError;
use crate::extensions::{find_extension, is_valid_version, valid_versions};
use crate::imports::{content_identity, FileImportResolver, ImportProcessor, ImportResolver};
use crate::issues::{IssueCode, IssueCollector, ValidationIssue};
use crate::registry::TypeRegistry;
use crate::substitution::SubstitutionExpander;
use crate::topology::TopologyTemplate;

/// Keys allowed at the top level of a definitions document.
pub const SECTIONS: &[&str] = &[
    "tosca_definitions_version",
    "topology_template",
    "node_types",
    "capability_types",
    "relationship_types",
    "data_types",
    "interface_types",
    "policy_types",
    "group_types",
    "artifact_types",
    "imports",
    "repositories",
    "metadata",
    "description",
    "dsl_definitions",
    "template_name",
    "template_author",
    "template_version",
];

/// Checks `tosca_definitions_version` and returns it when valid.
pub(crate) fn check_version(
    doc: &JsonMap<String, JsonValue>,
    what: &str,
    config: &ParserConfig,
    issues: &mut IssueCollector,
) -> Option<String> {
    match doc.get("tosca_definitions_version") {
        None => {
            issues.missing_required_field(what, "tosca_definitions_version");
            None
        }
        Some(JsonValue::String(version)) if is_valid_version(version, config) => {
            Some(version.clone())
        }
        Some(other) => {
            let text = match other {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
            issues.record(
                IssueCode::InvalidTemplateVersion,
                format!(
                    "The template version \"{text}\" is invalid. Valid versions are \"{}\".",
                    valid_versions(config).join(", ")
                ),
            );
            None
        }
    }
}

pub(crate) fn check_document_sections(
    doc: &JsonMap<String, JsonValue>,
    what: &str,
    issues: &mut IssueCollector,
) {
    for key in doc.keys() {
        if !SECTIONS.contains(&key.as_str()) {
            issues.unknown_field(what, key);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
/// A parsed service template and every issue found while building it.
pub struct ToscaTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap<String, JsonValue>>,
    /// Locations of processed imports, in processing order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology_template: Option<TopologyTemplate>,
    #[serde(skip)]
    pub registry: TypeRegistry,
    issues: Vec<ValidationIssue>,
}

impl ToscaTemplate {
    /// Parses YAML text. `source_name` labels the document in errors.
    pub fn parse_str(
        text: &str,
        source_name: &str,
        config: &ParserConfig,
        resolver: &dyn ImportResolver,
    ) -> Result<Self, ToscaError> {
        let doc: JsonValue = serde_yaml::from_str(text).map_err(|e| ToscaError::YamlParseError {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        Self::from_value(doc, Some(source_name), None, Some(&content_identity(text)), config, resolver)
    }

    /// Reads and parses a file; relative imports resolve against its directory.
    pub fn parse_path(path: &Path, config: &ParserConfig) -> Result<Self, ToscaError> {
        let text = fs::read_to_string(path)?;
        let source_name = path.display().to_string();
        let doc: JsonValue = serde_yaml::from_str(&text).map_err(|e| ToscaError::YamlParseError {
            source_name: source_name.clone(),
            message: e.to_string(),
        })?;
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let base = canonical.parent().map(|p| p.display().to_string());
        let identity = canonical.display().to_string();
        Self::from_value(
            doc,
            Some(&source_name),
            base.as_deref(),
            Some(&identity),
            config,
            &FileImportResolver::new(),
        )
    }

    /// Builds the model from an already parsed document tree.
    pub fn from_value(
        doc: JsonValue,
        path: Option<&str>,
        base: Option<&str>,
        identity: Option<&str>,
        config: &ParserConfig,
        resolver: &dyn ImportResolver,
    ) -> Result<Self, ToscaError> {
        let JsonValue::Object(doc) = doc else {
            return Err(ToscaError::InvalidDocument(format!(
                "'{}' is not a mapping",
                path.unwrap_or("<input>")
            )));
        };
        tracing::debug!(path = path.unwrap_or("<input>"), "parsing service template");

        let mut issues = IssueCollector::new();
        check_document_sections(&doc, "Template", &mut issues);
        let version = check_version(&doc, "Template", config, &mut issues);

        let mut registry = version
            .as_deref()
            .and_then(|v| find_extension(v, config))
            .map(TypeRegistry::with_extension)
            .unwrap_or_else(TypeRegistry::builtin);

        let mut processor = ImportProcessor::new(resolver, config);
        if let Some(identity) = identity {
            processor.mark_processed(identity);
        }
        processor.process(&doc, base, &mut registry, &mut issues);
        let imports = processor.imported().to_vec();
        let nested_templates = processor.into_nested_templates();

        let doc = JsonValue::Object(doc);
        registry.add_custom_types(&doc, None);
        registry.validate_custom_types(&mut issues);

        let topology_template = doc.get("topology_template").map(|raw| {
            let mut topology =
                TopologyTemplate::parse(raw, &registry, &config.parsed_params, None, &mut issues);
            let params = topology.input_values();
            SubstitutionExpander::new(&registry, &nested_templates, config.max_nesting_depth)
                .with_max_expansions(config.max_substitutions)
                .expand(&mut topology, &params, 0, &mut issues);
            topology
        });

        if issues.is_empty() {
            tracing::debug!("service template is valid");
        } else {
            tracing::debug!(count = issues.len(), "service template has issues");
        }

        Ok(Self {
            path: path.map(str::to_string),
            version,
            description: doc
                .get("description")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
            metadata: doc.get("metadata").and_then(JsonValue::as_object).cloned(),
            imports,
            topology_template,
            registry,
            issues: issues.into_issues(),
        })
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// `Ok` when no issue was recorded, otherwise one aggregated error that
    /// lists every issue.
    pub fn validation_result(&self) -> Result<(), ToscaError> {
        if self.issues.is_empty() {
            return Ok(());
        }
        Err(ToscaError::Validation {
            path: self.path.clone().unwrap_or_else(|| "<input>".to_string()),
            issues: self.issues.clone(),
        })
    }
}

/// Parses a template from text; imports resolve against the working directory.
pub fn parse_template_str(text: &str, config: &ParserConfig) -> Result<ToscaTemplate, ToscaError> {
    ToscaTemplate::parse_str(text, "<input>", config, &FileImportResolver::new())
}

pub fn parse_template_path(path: &Path, config: &ParserConfig) -> Result<ToscaTemplate, ToscaError> {
    ToscaTemplate::parse_path(path, config)
}
