//! Hard-failure error type for the public parsing APIs.
//!
//! Ordinary template problems never surface here; they are recorded as
//! [`ValidationIssue`](crate::issues::ValidationIssue)s. A `ToscaError` means
//! there was no document to work with, or is the aggregated report produced
//! by [`ToscaTemplate::validation_result`](crate::template::ToscaTemplate::validation_result).

use thiserror::Error;

use crate::issues::ValidationIssue;

#[derive(Debug, Error)]
/// Top-level error type returned by public APIs.
pub enum ToscaError {
    /// The input text is not YAML.
    #[error("yaml parse error in '{source_name}': {message}")]
    YamlParseError {
        source_name: String,
        message: String,
    },
    /// The input parsed but is not a TOSCA document mapping.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    /// An import collaborator could not produce a document.
    #[error("import error: {0}")]
    ImportError(String),
    /// Aggregated validation failure carrying every recorded issue.
    #[error("{}", format_validation_failure(.path, .issues))]
    Validation {
        path: String,
        issues: Vec<ValidationIssue>,
    },
    /// Filesystem I/O error from CLI or callers that propagate I/O.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_validation_failure(path: &str, issues: &[ValidationIssue]) -> String {
    let lines: Vec<String> = issues.iter().map(|issue| issue.to_string()).collect();
    format!(
        "\nThe input \"{}\" failed validation with the following error(s): \n\n\t{}\n",
        path,
        lines.join("\n\t")
    )
}

#[cfg(test)]
mod tests {
    use crate::issues::{IssueCode, ValidationIssue};

    use super::ToscaError;

    #[test]
    fn validation_failure_lists_every_issue() {
        let err = ToscaError::Validation {
            path: "service.yaml".to_string(),
            issues: vec![
                ValidationIssue::new(IssueCode::UnknownField, "first"),
                ValidationIssue::new(IssueCode::KeyError, "second"),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("\"service.yaml\" failed validation"));
        assert!(text.contains("UnknownFieldError: first"));
        assert!(text.contains("KeyError: second"));
    }
}
