//! Import processing.
//!
//! Fetching bytes is delegated to an [`ImportResolver`]; this module parses
//! import entries, checks imported documents, merges their type sections
//! into the registry and collects imported topologies for substitution.
//! Every resolved document carries an identity; an identity seen twice is
//! skipped, which also stops import cycles.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use sha2::{Digest, Sha256};

use crate::config::ParserConfig;
use crate::error::ToscaError;
use crate::issues::{IssueCode, IssueCollector};
use crate::registry::TypeRegistry;
use crate::substitution::NestedTemplate;
use crate::template::{check_document_sections, check_version};

pub const IMPORT_KEYS: &[&str] = &["file", "repository", "namespace_uri", "namespace_prefix"];

pub const REPOSITORY_KEYS: &[&str] = &["description", "url", "credential"];

#[derive(Debug, Clone, PartialEq, Serialize)]
/// One entry of an `imports` list.
pub struct ImportDef {
    /// Import name for the map form; `None` for a bare file entry.
    pub name: Option<String>,
    pub file: String,
    pub repository: Option<String>,
    pub namespace_uri: Option<String>,
    pub namespace_prefix: Option<String>,
}

impl ImportDef {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.file)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Repository {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<JsonValue>,
}

#[derive(Debug, Clone)]
/// A fetched and parsed import.
pub struct ResolvedImport {
    /// Stable identity used for de-duplication (canonical path or content hash).
    pub identity: String,
    /// Human-readable location for messages.
    pub location: String,
    /// Base that relative imports inside this document resolve against.
    pub base: Option<String>,
    pub document: JsonValue,
}

/// Import fetching abstraction consumed by the parser.
pub trait ImportResolver {
    /// Fetches and parses `file`, optionally under a repository URL and
    /// relative to the importing document's `base`.
    fn resolve(
        &self,
        file: &str,
        repository_url: Option<&str>,
        base: Option<&str>,
    ) -> Result<ResolvedImport, ToscaError>;
}

fn parse_yaml(location: &str, text: &str) -> Result<JsonValue, ToscaError> {
    serde_yaml::from_str(text).map_err(|e| ToscaError::YamlParseError {
        source_name: location.to_string(),
        message: e.to_string(),
    })
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Content fingerprint used as identity for documents without a path.
pub fn content_identity(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[derive(Debug, Clone, Default)]
/// [`ImportResolver`] reading local files. Relative paths resolve against the
/// importing document's directory, then `root`.
pub struct FileImportResolver {
    root: Option<PathBuf>,
}

impl FileImportResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }
}

impl ImportResolver for FileImportResolver {
    fn resolve(
        &self,
        file: &str,
        repository_url: Option<&str>,
        base: Option<&str>,
    ) -> Result<ResolvedImport, ToscaError> {
        let prefix = repository_url.map(|url| url.strip_prefix("file://").unwrap_or(url));
        if let Some(url) = prefix.filter(|url| is_url(url)) {
            return Err(ToscaError::ImportError(format!(
                "remote repository \"{url}\" is not supported by the file resolver"
            )));
        }
        if is_url(file) {
            return Err(ToscaError::ImportError(format!(
                "remote import \"{file}\" is not supported by the file resolver"
            )));
        }

        let relative = match prefix {
            Some(dir) => Path::new(dir).join(file),
            None => PathBuf::from(file),
        };
        let path = if relative.is_absolute() {
            relative
        } else if let Some(base) = base {
            Path::new(base).join(relative)
        } else if let Some(root) = &self.root {
            root.join(relative)
        } else {
            relative
        };

        let text = fs::read_to_string(&path).map_err(|e| {
            ToscaError::ImportError(format!("failed to read import '{}': {e}", path.display()))
        })?;
        let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        let location = path.display().to_string();
        Ok(ResolvedImport {
            identity: canonical.display().to_string(),
            base: canonical.parent().map(|p| p.display().to_string()),
            document: parse_yaml(&location, &text)?,
            location,
        })
    }
}

#[derive(Debug, Clone, Default)]
/// [`ImportResolver`] backed by in-memory YAML documents keyed by path.
pub struct MapImportResolver {
    documents: BTreeMap<String, String>,
}

impl MapImportResolver {
    pub fn new(documents: BTreeMap<String, String>) -> Self {
        Self { documents }
    }

    pub fn with_document(mut self, path: &str, text: &str) -> Self {
        self.documents.insert(path.to_string(), text.to_string());
        self
    }
}

impl ImportResolver for MapImportResolver {
    fn resolve(
        &self,
        file: &str,
        repository_url: Option<&str>,
        base: Option<&str>,
    ) -> Result<ResolvedImport, ToscaError> {
        let mut candidates = Vec::new();
        if let Some(url) = repository_url {
            candidates.push(format!("{}/{file}", url.trim_end_matches('/')));
        }
        if let Some(base) = base.filter(|b| !b.is_empty()) {
            candidates.push(format!("{base}/{file}"));
        }
        candidates.push(file.to_string());

        let (key, text) = candidates
            .iter()
            .find_map(|key| self.documents.get(key).map(|text| (key, text)))
            .ok_or_else(|| ToscaError::ImportError(format!("import \"{file}\" was not found")))?;
        Ok(ResolvedImport {
            identity: content_identity(text),
            location: key.clone(),
            base: key.rsplit_once('/').map(|(dir, _)| dir.to_string()),
            document: parse_yaml(key, text)?,
        })
    }
}

/// Parses a `repositories` section. Each entry needs a `url`; the short form
/// is the URL string itself.
pub fn parse_repositories(
    raw: Option<&JsonValue>,
    issues: &mut IssueCollector,
) -> BTreeMap<String, Repository> {
    let mut out = BTreeMap::new();
    let entries = match raw {
        None | Some(JsonValue::Null) => return out,
        Some(JsonValue::Object(entries)) => entries,
        Some(_) => {
            issues.type_mismatch("\"repositories\"", "map");
            return out;
        }
    };
    for (name, def) in entries {
        let what = format!("Repository \"{name}\"");
        let repository = match def {
            JsonValue::String(url) => Repository {
                name: name.clone(),
                description: None,
                url: Some(url.clone()),
                credential: None,
            },
            JsonValue::Object(map) => {
                for key in map.keys() {
                    if !REPOSITORY_KEYS.contains(&key.as_str()) {
                        issues.unknown_field(&what, key);
                    }
                }
                let url = map.get("url").and_then(JsonValue::as_str).map(str::to_string);
                if url.is_none() {
                    issues.missing_required_field(&what, "url");
                }
                Repository {
                    name: name.clone(),
                    description: map
                        .get("description")
                        .and_then(JsonValue::as_str)
                        .map(str::to_string),
                    url,
                    credential: map.get("credential").cloned(),
                }
            }
            _ => {
                issues.type_mismatch(&what, "map");
                continue;
            }
        };
        out.insert(name.clone(), repository);
    }
    out
}

fn optional_string(map: &JsonMap<String, JsonValue>, key: &str) -> Option<String> {
    map.get(key).and_then(JsonValue::as_str).map(str::to_string)
}

/// Parses an `imports` list. Duplicate names are reported once per name and
/// every entry is kept.
pub fn import_entries(raw: &JsonValue, issues: &mut IssueCollector) -> Vec<ImportDef> {
    let items = match raw {
        JsonValue::Array(items) => items,
        JsonValue::Null => {
            issues.validation_error("\"imports\" keyname is defined without including templates.");
            return Vec::new();
        }
        _ => {
            issues.type_mismatch("\"imports\"", "list");
            return Vec::new();
        }
    };
    if items.is_empty() {
        issues.validation_error("\"imports\" keyname is defined without including templates.");
        return Vec::new();
    }

    let mut names: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        match item {
            JsonValue::String(file) => out.push(ImportDef {
                name: None,
                file: file.clone(),
                repository: None,
                namespace_uri: None,
                namespace_prefix: None,
            }),
            JsonValue::Object(entry) => {
                for (name, value) in entry {
                    if !names.insert(name.clone()) {
                        issues.validation_error(format!("Duplicate import name \"{name}\" was found."));
                    }
                    let what = format!("Import \"{name}\"");
                    match value {
                        JsonValue::String(file) => out.push(ImportDef {
                            name: Some(name.clone()),
                            file: file.clone(),
                            repository: None,
                            namespace_uri: None,
                            namespace_prefix: None,
                        }),
                        JsonValue::Object(map) => {
                            for key in map.keys() {
                                if !IMPORT_KEYS.contains(&key.as_str()) {
                                    issues.unknown_field(&what, key);
                                }
                            }
                            let Some(file) = optional_string(map, "file") else {
                                issues.missing_required_field(&what, "file");
                                continue;
                            };
                            out.push(ImportDef {
                                name: Some(name.clone()),
                                file,
                                repository: optional_string(map, "repository"),
                                namespace_uri: optional_string(map, "namespace_uri"),
                                namespace_prefix: optional_string(map, "namespace_prefix"),
                            });
                        }
                        _ => issues.type_mismatch(&what, "string or map"),
                    }
                }
            }
            other => issues.type_mismatch(&format!("Import entry {other}"), "string or map"),
        }
    }
    out
}

/// Walks the import tree of one root document.
pub struct ImportProcessor<'a> {
    resolver: &'a dyn ImportResolver,
    config: &'a ParserConfig,
    processed: HashSet<String>,
    nested_templates: Vec<NestedTemplate>,
    imported: Vec<String>,
}

impl<'a> ImportProcessor<'a> {
    pub fn new(resolver: &'a dyn ImportResolver, config: &'a ParserConfig) -> Self {
        Self {
            resolver,
            config,
            processed: HashSet::new(),
            nested_templates: Vec::new(),
            imported: Vec::new(),
        }
    }

    /// Marks an identity (usually the root document) as already processed.
    pub fn mark_processed(&mut self, identity: &str) {
        self.processed.insert(identity.to_string());
    }

    /// Processes the imports of `doc`, depth first. Types of an imported
    /// document are merged after those of its own imports.
    pub fn process(
        &mut self,
        doc: &JsonMap<String, JsonValue>,
        base: Option<&str>,
        registry: &mut TypeRegistry,
        issues: &mut IssueCollector,
    ) {
        let repositories = parse_repositories(doc.get("repositories"), issues);
        let Some(raw_imports) = doc.get("imports") else {
            return;
        };

        for import in import_entries(raw_imports, issues) {
            let repository_url = match import.repository.as_deref() {
                None => None,
                Some(repo) => match repositories.get(repo) {
                    Some(repository) => repository.url.as_deref(),
                    None => {
                        issues.validation_error(format!(
                            "Repository \"{repo}\" of import \"{}\" is not defined in \"repositories\".",
                            import.label()
                        ));
                        continue;
                    }
                },
            };

            let resolved = match self.resolver.resolve(&import.file, repository_url, base) {
                Ok(resolved) => resolved,
                Err(err) => {
                    let code = if is_url(&import.file) || repository_url.is_some_and(is_url) {
                        IssueCode::UrlError
                    } else {
                        IssueCode::ImportError
                    };
                    issues.record(
                        code,
                        format!("Import \"{}\" could not be loaded: {err}", import.label()),
                    );
                    continue;
                }
            };
            if !self.processed.insert(resolved.identity.clone()) {
                tracing::debug!(location = %resolved.location, "import already processed");
                continue;
            }
            tracing::debug!(location = %resolved.location, "processing import");
            self.imported.push(resolved.location.clone());

            let what = format!("Import \"{}\"", import.label());
            let Some(imported) = resolved.document.as_object() else {
                issues.type_mismatch(&what, "map");
                continue;
            };
            check_version(imported, &what, self.config, issues);
            check_document_sections(imported, &what, issues);

            self.process(imported, resolved.base.as_deref(), registry, issues);
            registry.add_custom_types(&resolved.document, import.namespace_prefix.as_deref());

            if let Some(topology) = imported.get("topology_template") {
                self.nested_templates
                    .push(NestedTemplate::new(&resolved.location, topology.clone()));
            }
        }
    }

    /// Locations of every processed import, in processing order.
    pub fn imported(&self) -> &[String] {
        &self.imported
    }

    pub fn into_nested_templates(self) -> Vec<NestedTemplate> {
        self.nested_templates
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::ParserConfig;
    use crate::entity_type::TypeKind;
    use crate::issues::{IssueCode, IssueCollector};
    use crate::registry::TypeRegistry;

    use super::{import_entries, parse_repositories, ImportProcessor, MapImportResolver};

    const TYPES_A: &str = "tosca_definitions_version: tosca_simple_yaml_1_0\nnode_types:\n  my.nodes.A:\n    derived_from: tosca.nodes.Root\n";
    const TYPES_B: &str = "tosca_definitions_version: tosca_simple_yaml_1_0\nnode_types:\n  my.nodes.B:\n    derived_from: tosca.nodes.Root\n";

    #[test]
    fn duplicate_names_are_reported_once_and_kept() {
        let mut issues = IssueCollector::new();
        let entries = import_entries(
            &json!([{ "shared": "a.yaml" }, { "shared": { "file": "b.yaml" } }]),
            &mut issues,
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues.issues()[0].message,
            "Duplicate import name \"shared\" was found."
        );
    }

    #[test]
    fn empty_imports_is_a_validation_error() {
        let mut issues = IssueCollector::new();
        assert!(import_entries(&json!([]), &mut issues).is_empty());
        assert_eq!(issues.count(IssueCode::ValidationError), 1);
    }

    #[test]
    fn repositories_need_a_url() {
        let mut issues = IssueCollector::new();
        let repos = parse_repositories(
            Some(&json!({ "short": "http://example.org", "long": { "description": "no url" } })),
            &mut issues,
        );
        assert_eq!(repos["short"].url.as_deref(), Some("http://example.org"));
        assert_eq!(issues.count(IssueCode::MissingRequiredField), 1);
    }

    #[test]
    fn cyclic_imports_terminate() {
        let resolver = MapImportResolver::default()
            .with_document(
                "a.yaml",
                &format!("{TYPES_A}imports:\n  - b.yaml\n"),
            )
            .with_document(
                "b.yaml",
                &format!("{TYPES_B}imports:\n  - a.yaml\n"),
            );
        let config = ParserConfig::default();
        let mut processor = ImportProcessor::new(&resolver, &config);
        let mut registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let root = json!({ "imports": ["a.yaml"] });
        processor.process(root.as_object().unwrap(), None, &mut registry, &mut issues);
        assert!(issues.is_empty(), "{:?}", issues.issues());
        assert_eq!(processor.imported(), ["a.yaml", "b.yaml"]);
        assert!(registry.find(TypeKind::Node, "my.nodes.A").is_some());
        assert!(registry.find(TypeKind::Node, "my.nodes.B").is_some());
    }

    #[test]
    fn namespace_prefix_qualifies_imported_types() {
        let resolver = MapImportResolver::default().with_document("a.yaml", TYPES_A);
        let config = ParserConfig::default();
        let mut processor = ImportProcessor::new(&resolver, &config);
        let mut registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let root = json!({ "imports": [{ "lib": { "file": "a.yaml", "namespace_prefix": "lib" } }] });
        processor.process(root.as_object().unwrap(), None, &mut registry, &mut issues);
        assert!(registry.find(TypeKind::Node, "lib:my.nodes.A").is_some());
        assert!(registry.find(TypeKind::Node, "my.nodes.A").is_none());
    }

    #[test]
    fn missing_import_is_recorded() {
        let resolver = MapImportResolver::default();
        let config = ParserConfig::default();
        let mut processor = ImportProcessor::new(&resolver, &config);
        let mut registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let root = json!({ "imports": ["missing.yaml", "http://example.org/remote.yaml"] });
        processor.process(root.as_object().unwrap(), None, &mut registry, &mut issues);
        assert_eq!(issues.count(IssueCode::ImportError), 1);
        assert_eq!(issues.count(IssueCode::UrlError), 1);
    }
}
