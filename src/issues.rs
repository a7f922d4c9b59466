//! Per-parse accumulator of validation issues.
//!
//! Every resolver and builder takes `&mut IssueCollector` and records what it
//! finds instead of returning early, so one pass over a broken document yields
//! the complete report. One collector belongs to one top-level parse; nothing
//! here is global.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable issue codes. The string form is part of the public output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueCode {
    UnknownField,
    MissingRequiredField,
    TypeMismatch,
    InvalidType,
    InvalidNodeType,
    InvalidPropertyValue,
    NotImplemented,
    UnsupportedType,
    KeyError,
    ValueError,
    ValidationError,
    InvalidSchema,
    InvalidTemplateVersion,
    InvalidToscaVersionProperty,
    MissingRequiredInput,
    MissingDefaultValue,
    UnknownInput,
    UnknownOutput,
    InvalidGroupTarget,
    ImportError,
    UrlError,
    SubstitutionDepthExceeded,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::UnknownField => "UnknownFieldError",
            IssueCode::MissingRequiredField => "MissingRequiredFieldError",
            IssueCode::TypeMismatch => "TypeMismatchError",
            IssueCode::InvalidType => "InvalidTypeError",
            IssueCode::InvalidNodeType => "InvalidNodeTypeError",
            IssueCode::InvalidPropertyValue => "InvalidPropertyValueError",
            IssueCode::NotImplemented => "NotImplementedError",
            IssueCode::UnsupportedType => "UnsupportedTypeError",
            IssueCode::KeyError => "KeyError",
            IssueCode::ValueError => "ValueError",
            IssueCode::ValidationError => "ValidationError",
            IssueCode::InvalidSchema => "InvalidSchemaError",
            IssueCode::InvalidTemplateVersion => "InvalidTemplateVersion",
            IssueCode::InvalidToscaVersionProperty => "InvalidTOSCAVersionPropertyError",
            IssueCode::MissingRequiredInput => "MissingRequiredInputError",
            IssueCode::MissingDefaultValue => "MissingDefaultValueError",
            IssueCode::UnknownInput => "UnknownInputError",
            IssueCode::UnknownOutput => "UnknownOutputError",
            IssueCode::InvalidGroupTarget => "InvalidGroupTargetError",
            IssueCode::ImportError => "ImportError",
            IssueCode::UrlError => "URLError",
            IssueCode::SubstitutionDepthExceeded => "SubstitutionDepthExceeded",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// One recorded problem: a stable code and a formatted message.
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Ordered, de-duplicating issue list for one parse run.
///
/// Identical `(code, message)` pairs are kept once: the same broken type is
/// resolved many times while entities are built, and the report should name
/// it a single time.
#[derive(Debug, Default, Clone)]
pub struct IssueCollector {
    issues: Vec<ValidationIssue>,
    seen: HashSet<ValidationIssue>,
    recorded: usize,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, code: IssueCode, message: impl Into<String>) {
        let issue = ValidationIssue::new(code, message);
        self.recorded += 1;
        if self.seen.insert(issue.clone()) {
            tracing::debug!(code = %issue.code, message = %issue.message, "validation issue");
            self.issues.push(issue);
        }
    }

    pub fn unknown_field(&mut self, what: &str, field: &str) {
        self.record(
            IssueCode::UnknownField,
            format!(
                "{what} contains unknown field \"{field}\". Refer to the definition to verify valid values."
            ),
        );
    }

    pub fn missing_required_field(&mut self, what: &str, required: &str) {
        self.record(
            IssueCode::MissingRequiredField,
            format!("{what} is missing required field \"{required}\"."),
        );
    }

    pub fn type_mismatch(&mut self, what: &str, expected: &str) {
        self.record(
            IssueCode::TypeMismatch,
            format!("{what} must be of type \"{expected}\"."),
        );
    }

    pub fn invalid_type(&mut self, type_name: &str) {
        self.record(
            IssueCode::InvalidType,
            format!("Type \"{type_name}\" is not a valid type."),
        );
    }

    pub fn invalid_property_value(&mut self, what: &str) {
        self.record(
            IssueCode::InvalidPropertyValue,
            format!("Value of property \"{what}\" is invalid."),
        );
    }

    pub fn validation_error(&mut self, message: impl Into<String>) {
        self.record(IssueCode::ValidationError, message);
    }

    pub fn value_error(&mut self, message: impl Into<String>) {
        self.record(IssueCode::ValueError, message);
    }

    pub fn invalid_schema(&mut self, message: impl Into<String>) {
        self.record(IssueCode::InvalidSchema, message);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Number of `record` calls so far, duplicates included.
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn count(&self, code: IssueCode) -> usize {
        self.issues.iter().filter(|i| i.code == code).count()
    }

    pub fn into_issues(self) -> Vec<ValidationIssue> {
        self.issues
    }
}
