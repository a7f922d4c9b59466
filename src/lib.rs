pub mod capabilities;
pub mod config;
pub mod constraints;
pub mod datatypes;
pub mod entity;
pub mod entity_type;
pub mod error;
pub mod extensions;
pub mod functions;
pub mod graph;
pub mod groups;
pub mod imports;
pub mod interfaces;
pub mod issues;
pub mod node_template;
pub mod parameters;
pub mod policies;
pub mod properties;
pub mod registry;
pub mod relationship_template;
pub mod requirements;
pub mod scalar_unit;
pub mod schema;
pub mod substitution;
pub mod template;
pub mod topology;

pub use config::ParserConfig;
pub use entity_type::{TypeDef, TypeKind};
pub use error::ToscaError;
pub use extensions::Extension;
pub use graph::{RelationshipGraph, ResolvedRelationship};
pub use imports::{FileImportResolver, ImportResolver, MapImportResolver, ResolvedImport};
pub use issues::{IssueCode, IssueCollector, ValidationIssue};
pub use node_template::NodeTemplate;
pub use registry::TypeRegistry;
pub use relationship_template::RelationshipTemplate;
pub use template::{parse_template_path, parse_template_str, ToscaTemplate};
pub use topology::TopologyTemplate;

/// Parses `input` and returns the aggregated validation error when any issue
/// was recorded.
pub fn validate_template(input: &str, config: &ParserConfig) -> Result<(), ToscaError> {
    parse_template_str(input, config)?.validation_result()
}
