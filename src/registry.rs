//! Built-in type catalogue plus per-parse custom type definitions.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::datatypes::parse_tosca_version;
use crate::entity_type::{EntityType, TypeDef, TypeKind};
use crate::extensions::Extension;
use crate::issues::{IssueCode, IssueCollector};

const BUILTIN_DEFINITIONS: &str = include_str!("definitions/tosca_simple_yaml_1_0.yaml");

/// Legacy type names that are recognised but deliberately unsupported.
pub const UNSUPPORTED_TYPES: &[&str] = &[
    "tosca.test.invalidtype",
    "tosca.nodes.Storage.ObjectStorage",
    "tosca.nodes.Storage.BlockStorage",
];

/// Short data type names accepted without their `network.` namespace.
const DATA_TYPE_ALIASES: &[(&str, &str)] = &[
    ("PortDef", "tosca.datatypes.network.PortDef"),
    ("PortSpec", "tosca.datatypes.network.PortSpec"),
    ("PortInfo", "tosca.datatypes.network.PortInfo"),
    ("NetworkInfo", "tosca.datatypes.network.NetworkInfo"),
];

/// Definitions keyed by kind and name, so a data type and a node type may
/// share a name.
type Catalogue = BTreeMap<(TypeKind, String), JsonMap<String, JsonValue>>;

/// Flattens a definitions document (`node_types`, `data_types`, ...) into the
/// catalogue. Names are optionally qualified with `prefix:`.
fn collect_sections(doc: &JsonValue, namespace_prefix: Option<&str>, out: &mut Catalogue) {
    let Some(doc) = doc.as_object() else {
        return;
    };
    for kind in TypeKind::ALL {
        let Some(JsonValue::Object(section)) = doc.get(kind.section()) else {
            continue;
        };
        for (name, def) in section {
            let definition = def.as_object().cloned().unwrap_or_default();
            let key = match namespace_prefix {
                Some(prefix) if !prefix.is_empty() => format!("{prefix}:{name}"),
                _ => name.clone(),
            };
            out.insert((kind, key), definition);
        }
    }
}

fn builtin_catalogue() -> &'static Catalogue {
    static CATALOGUE: OnceLock<Catalogue> = OnceLock::new();
    CATALOGUE.get_or_init(|| {
        let mut out = Catalogue::new();
        match serde_yaml::from_str::<JsonValue>(BUILTIN_DEFINITIONS) {
            Ok(doc) => collect_sections(&doc, None, &mut out),
            Err(err) => tracing::error!(error = %err, "bundled type definitions failed to load"),
        }
        out
    })
}

#[derive(Debug, Clone)]
/// Type lookup for one parse: the shared built-in catalogue, the active
/// profile extension, and custom types from the document and its imports.
pub struct TypeRegistry {
    builtin: &'static Catalogue,
    profile: Catalogue,
    custom: Catalogue,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TypeRegistry {
    /// Registry holding only the built-in catalogue.
    pub fn builtin() -> Self {
        Self {
            builtin: builtin_catalogue(),
            profile: Catalogue::new(),
            custom: Catalogue::new(),
        }
    }

    /// Registry for documents of one profile extension.
    pub fn with_extension(extension: &Extension) -> Self {
        let mut registry = Self::builtin();
        collect_sections(&extension.definitions, None, &mut registry.profile);
        registry
    }

    /// Merges the type sections of one document. Later calls override
    /// earlier entries with the same name.
    pub fn add_custom_types(&mut self, doc: &JsonValue, namespace_prefix: Option<&str>) {
        collect_sections(doc, namespace_prefix, &mut self.custom);
    }

    pub fn insert_custom(&mut self, kind: TypeKind, name: &str, definition: JsonValue) {
        self.custom.insert(
            (kind, name.to_string()),
            definition.as_object().cloned().unwrap_or_default(),
        );
    }

    /// Kind of the type registered under exactly `name`, built-in and profile
    /// types first.
    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        [self.builtin, &self.profile, &self.custom]
            .into_iter()
            .find_map(|catalogue| {
                TypeKind::ALL
                    .into_iter()
                    .find(|kind| catalogue.contains_key(&(*kind, name.to_string())))
            })
    }

    /// Builtin candidate name for `name`: `tosca:` shorthand stripped and the
    /// kind prefix added unless the name is already in the `tosca` namespace.
    pub fn qualified_name(&self, kind: TypeKind, name: &str) -> String {
        if kind == TypeKind::Data {
            if let Some((_, full)) = DATA_TYPE_ALIASES.iter().find(|(short, _)| *short == name) {
                return full.to_string();
            }
        }
        match name.strip_prefix("tosca:") {
            Some(short) if short.starts_with("tosca.") => short.to_string(),
            Some(short) => format!("{}{short}", kind.prefix()),
            None if name.starts_with("tosca") => name.to_string(),
            None => format!("{}{name}", kind.prefix()),
        }
    }

    /// Silent lookup: built-in (qualified) first, then custom by the name as
    /// written.
    pub fn find(&self, kind: TypeKind, name: &str) -> Option<TypeDef> {
        let qualified = self.qualified_name(kind, name);
        for candidate in [qualified.as_str(), name] {
            let key = (kind, candidate.to_string());
            if let Some(definition) = self.builtin.get(&key).or_else(|| self.profile.get(&key)) {
                return Some(TypeDef::new(kind, candidate, definition.clone()));
            }
        }
        self.custom
            .get(&(kind, name.to_string()))
            .map(|definition| TypeDef::new(kind, name, definition.clone()))
    }

    /// Resolves `name` as a type of `kind`, recording why when it cannot.
    pub fn resolve(
        &self,
        kind: TypeKind,
        name: &str,
        issues: &mut IssueCollector,
    ) -> Option<TypeDef> {
        if let Some(found) = self.find(kind, name) {
            return Some(found);
        }
        let qualified = self.qualified_name(kind, name);
        if UNSUPPORTED_TYPES.contains(&name) || UNSUPPORTED_TYPES.contains(&qualified.as_str()) {
            issues.record(
                IssueCode::UnsupportedType,
                format!("Type \"{name}\" is valid TOSCA type but not supported at this time."),
            );
        } else {
            issues.invalid_type(name);
        }
        None
    }

    /// Structural checks on every custom type, run once per parse.
    pub fn validate_custom_types(&self, issues: &mut IssueCollector) {
        for ((kind, name), definition) in &self.custom {
            let what = format!("Type \"{name}\"");
            let allowed = kind.allowed_definition_keys();
            if !allowed.is_empty() {
                for key in definition.keys() {
                    if !allowed.contains(&key.as_str()) {
                        issues.unknown_field(&what, key);
                    }
                }
            }

            let ty = TypeDef::new(*kind, name, definition.clone());
            match definition.get("derived_from") {
                None => {}
                Some(JsonValue::String(parent)) => {
                    let primitive_parent = *kind == TypeKind::Data
                        && crate::entity_type::is_primitive_type(parent);
                    if !primitive_parent
                        && parent != name
                        && ty.parent_type(self).is_none()
                    {
                        issues.invalid_type(parent);
                    }
                }
                Some(_) => issues.type_mismatch(&format!("{what} field \"derived_from\""), "string"),
            }

            if let Some(version) = definition.get("version") {
                let text = match version {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if parse_tosca_version(&text).is_err() {
                    issues.record(
                        IssueCode::InvalidToscaVersionProperty,
                        format!(
                            "The TOSCA version \"{text}\" is invalid. The version must be in the format \"major_version.minor_version.fix_version[.qualifier][-build_version]\"."
                        ),
                    );
                }
            }

            if let Some(metadata) = definition.get("metadata") {
                if !metadata.is_object() {
                    issues.type_mismatch(&format!("{what} field \"metadata\""), "map");
                }
            }
        }
    }
}
