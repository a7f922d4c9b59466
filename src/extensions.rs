//! Template version allow-list and definition-profile extensions.
//!
//! A profile extension contributes extra built-in types for one
//! `tosca_definitions_version` string. The NFV profile ships with the crate;
//! callers can register more through
//! [`ParserConfig::with_extension`](crate::config::ParserConfig::with_extension).

use std::sync::OnceLock;

use serde_json::Value as JsonValue;

use crate::config::ParserConfig;
use crate::error::ToscaError;

/// Versions handled by the built-in catalogue alone.
pub const SIMPLE_YAML_VERSIONS: &[&str] = &[
    "tosca_simple_yaml_1_0",
    "tosca_simple_yaml_1_1",
    "tosca_simple_yaml_1_2",
    "tosca_simple_yaml_1_3",
];

pub const NFV_VERSION: &str = "tosca_simple_profile_for_nfv_1_0_0";

const NFV_DEFINITIONS: &str = include_str!("definitions/tosca_simple_profile_for_nfv_1_0_0.yaml");

#[derive(Debug, Clone)]
/// Extra type definitions enabled by one template version string.
pub struct Extension {
    pub version: String,
    /// Definition document with `node_types`, `capability_types`, ... sections.
    pub definitions: JsonValue,
}

impl Extension {
    pub fn new(version: &str, definitions: JsonValue) -> Self {
        Self {
            version: version.to_string(),
            definitions,
        }
    }

    /// Parses a YAML definitions document for `version`.
    pub fn from_yaml(version: &str, text: &str) -> Result<Self, ToscaError> {
        let definitions: JsonValue =
            serde_yaml::from_str(text).map_err(|e| ToscaError::YamlParseError {
                source_name: format!("extension '{version}'"),
                message: e.to_string(),
            })?;
        Ok(Self::new(version, definitions))
    }
}

fn builtin_extensions() -> &'static [Extension] {
    static EXTENSIONS: OnceLock<Vec<Extension>> = OnceLock::new();
    EXTENSIONS.get_or_init(|| {
        let mut out = Vec::new();
        match Extension::from_yaml(NFV_VERSION, NFV_DEFINITIONS) {
            Ok(extension) => out.push(extension),
            Err(err) => tracing::error!(error = %err, "bundled NFV definitions failed to load"),
        }
        out
    })
}

/// Finds the extension registered for `version`; caller registrations win
/// over bundled ones.
pub fn find_extension<'a>(version: &str, config: &'a ParserConfig) -> Option<&'a Extension> {
    config
        .extensions
        .iter()
        .find(|e| e.version == version)
        .or_else(|| builtin_extensions().iter().find(|e| e.version == version))
}

/// All accepted `tosca_definitions_version` values.
pub fn valid_versions(config: &ParserConfig) -> Vec<String> {
    let mut out: Vec<String> = SIMPLE_YAML_VERSIONS.iter().map(|v| v.to_string()).collect();
    for extension in builtin_extensions().iter().chain(config.extensions.iter()) {
        if !out.contains(&extension.version) {
            out.push(extension.version.clone());
        }
    }
    out
}

pub fn is_valid_version(version: &str, config: &ParserConfig) -> bool {
    SIMPLE_YAML_VERSIONS.contains(&version) || find_extension(version, config).is_some()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::ParserConfig;

    use super::{find_extension, is_valid_version, valid_versions, Extension, NFV_VERSION};

    #[test]
    fn bundled_nfv_profile_is_a_valid_version() {
        let config = ParserConfig::default();
        assert!(is_valid_version(NFV_VERSION, &config));
        let nfv = find_extension(NFV_VERSION, &config).unwrap();
        assert!(nfv.definitions["node_types"]["tosca.nodes.nfv.VDU"].is_object());
    }

    #[test]
    fn registered_extension_extends_allow_list() {
        let config = ParserConfig::default().with_extension(Extension::new(
            "acme_profile_1_0",
            json!({ "node_types": { "acme.nodes.Widget": { "derived_from": "tosca.nodes.Root" } } }),
        ));
        assert!(is_valid_version("acme_profile_1_0", &config));
        assert!(valid_versions(&config).contains(&"acme_profile_1_0".to_string()));
        assert!(!is_valid_version("acme_profile_2_0", &config));
    }
}
