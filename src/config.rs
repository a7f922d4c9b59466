//! Parser options.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::extensions::Extension;

/// Default ceiling on nested substitution-mapping expansion.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 20;

/// Default ceiling on the total number of nested topologies built per parse.
pub const DEFAULT_MAX_SUBSTITUTIONS: usize = 1000;

#[derive(Debug, Clone)]
/// Options for one parse invocation.
pub struct ParserConfig {
    /// Maximum substitution nesting level before expansion stops for a branch.
    pub max_nesting_depth: usize,
    /// Maximum number of substitutions expanded across the whole parse.
    pub max_substitutions: usize,
    /// Values for topology inputs, keyed by input name.
    pub parsed_params: BTreeMap<String, JsonValue>,
    /// Extra definition profiles keyed by `tosca_definitions_version`.
    pub extensions: Vec<Extension>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            max_substitutions: DEFAULT_MAX_SUBSTITUTIONS,
            parsed_params: BTreeMap::new(),
            extensions: Vec::new(),
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_max_substitutions(mut self, count: usize) -> Self {
        self.max_substitutions = count;
        self
    }

    pub fn with_parsed_params(mut self, params: BTreeMap<String, JsonValue>) -> Self {
        self.parsed_params = params;
        self
    }

    pub fn with_param(mut self, name: &str, value: JsonValue) -> Self {
        self.parsed_params.insert(name.to_string(), value);
        self
    }

    /// Registers an additional profile. A later registration for the same
    /// version replaces an earlier one.
    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extensions.retain(|e| e.version != extension.version);
        self.extensions.push(extension);
        self
    }
}
