//! Property constraint clauses (`greater_than`, `in_range`, `pattern`, ...).
//!
//! A constraint is parsed once, against the primitive type of the property it
//! belongs to, and never changes afterwards. Violations are recorded as
//! `ValidationError` issues.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::datatypes::{parse_timestamp, parse_tosca_version, range_bounds, UNBOUNDED};
use crate::functions::is_function;
use crate::issues::IssueCollector;
use crate::scalar_unit::{self, ScalarUnitKind};

pub const CONSTRAINT_KEYS: &[&str] = &[
    "equal",
    "greater_than",
    "greater_or_equal",
    "less_than",
    "less_or_equal",
    "in_range",
    "valid_values",
    "length",
    "min_length",
    "max_length",
    "pattern",
];

const COMPARABLE_TYPES: &[&str] = &[
    "integer",
    "float",
    "number",
    "timestamp",
    "version",
    "scalar-unit.size",
    "scalar-unit.frequency",
    "scalar-unit.time",
];

const LENGTH_TYPES: &[&str] = &["string", "map", "list"];

#[derive(Debug, Clone, PartialEq)]
/// A value that can be ordered against another of the same property type.
pub enum Comparable {
    Number(f64),
    Timestamp(DateTime<FixedOffset>),
    Version(semver::Version),
}

impl Comparable {
    /// Converts `value` for comparison under `property_type`.
    pub fn from_value(property_type: &str, value: &JsonValue) -> Option<Comparable> {
        if let Some(kind) = ScalarUnitKind::from_type_name(property_type) {
            return scalar_unit::convert(kind, value, None).ok().map(Comparable::Number);
        }
        match property_type {
            "timestamp" => value.as_str().and_then(parse_timestamp).map(Comparable::Timestamp),
            "version" => {
                let text = match value {
                    JsonValue::String(s) => s.clone(),
                    JsonValue::Number(n) => n.to_string(),
                    _ => return None,
                };
                match parse_tosca_version(&text) {
                    Ok(Some(version)) => Some(Comparable::Version(version.to_semver())),
                    Ok(None) => Some(Comparable::Version(semver::Version::new(0, 0, 0))),
                    Err(_) => None,
                }
            }
            "integer" | "float" | "number" => match value {
                JsonValue::Number(n) => n.as_f64().map(Comparable::Number),
                JsonValue::String(s) => s.trim().parse::<f64>().ok().map(Comparable::Number),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn compare(&self, other: &Comparable) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::Timestamp(a), Comparable::Timestamp(b)) => Some(a.cmp(b)),
            (Comparable::Version(a), Comparable::Version(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConstraintRule {
    Equal(JsonValue),
    GreaterThan(Comparable),
    GreaterOrEqual(Comparable),
    LessThan(Comparable),
    LessOrEqual(Comparable),
    InRange(Comparable, Option<Comparable>),
    ValidValues(Vec<JsonValue>),
    Length(usize),
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
}

#[derive(Debug, Clone)]
/// One parsed constraint clause bound to a property.
pub struct Constraint {
    pub property_name: String,
    pub property_type: String,
    pub rule: ConstraintRule,
    /// Clause argument as written, for messages.
    raw: JsonValue,
}

fn invalid_schema(issues: &mut IssueCollector, message: String) -> Option<Constraint> {
    issues.invalid_schema(message);
    None
}

fn length_of(value: &JsonValue) -> Option<usize> {
    match value {
        JsonValue::String(s) => Some(s.chars().count()),
        JsonValue::Array(items) => Some(items.len()),
        JsonValue::Object(map) => Some(map.len()),
        _ => None,
    }
}

fn display(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Constraint {
    /// Parses a single-key constraint map such as `{ in_range: [1, 10] }`.
    pub fn parse(
        property_name: &str,
        property_type: &str,
        raw: &JsonValue,
        issues: &mut IssueCollector,
    ) -> Option<Constraint> {
        let Some((key, arg)) = raw
            .as_object()
            .filter(|m| m.len() == 1)
            .and_then(|m| m.iter().next())
        else {
            return invalid_schema(issues, "Invalid constraint schema.".to_string());
        };
        if !CONSTRAINT_KEYS.contains(&key.as_str()) {
            return invalid_schema(issues, format!("Invalid property \"{key}\"."));
        }

        let applicable = match key.as_str() {
            "equal" | "valid_values" => true,
            "in_range" => COMPARABLE_TYPES.contains(&property_type) || property_type == "range",
            "length" | "min_length" | "max_length" => LENGTH_TYPES.contains(&property_type),
            "pattern" => property_type == "string",
            _ => COMPARABLE_TYPES.contains(&property_type),
        };
        if !applicable {
            return invalid_schema(
                issues,
                format!("Property \"{key}\" is not valid for data type \"{property_type}\"."),
            );
        }

        // Ranges compare their integer bounds.
        let comparable_type = if property_type == "range" { "integer" } else { property_type };
        let comparable = |value: &JsonValue| Comparable::from_value(comparable_type, value);
        let expects_comparable =
            || format!("The property \"{key}\" expects comparable values.");

        let rule = match key.as_str() {
            "equal" => ConstraintRule::Equal(arg.clone()),
            "greater_than" | "greater_or_equal" | "less_than" | "less_or_equal" => {
                let Some(bound) = comparable(arg) else {
                    return invalid_schema(issues, expects_comparable());
                };
                match key.as_str() {
                    "greater_than" => ConstraintRule::GreaterThan(bound),
                    "greater_or_equal" => ConstraintRule::GreaterOrEqual(bound),
                    "less_than" => ConstraintRule::LessThan(bound),
                    _ => ConstraintRule::LessOrEqual(bound),
                }
            }
            "in_range" => {
                let Some(items) = arg.as_array().filter(|items| items.len() == 2) else {
                    return invalid_schema(
                        issues,
                        format!("The property \"{key}\" expects a list."),
                    );
                };
                let Some(min) = comparable(&items[0]) else {
                    return invalid_schema(issues, expects_comparable());
                };
                let max = match &items[1] {
                    JsonValue::String(s) if s == UNBOUNDED => None,
                    other => match comparable(other) {
                        Some(max) => Some(max),
                        None => return invalid_schema(issues, expects_comparable()),
                    },
                };
                ConstraintRule::InRange(min, max)
            }
            "valid_values" => match arg.as_array() {
                Some(items) => ConstraintRule::ValidValues(items.clone()),
                None => {
                    return invalid_schema(
                        issues,
                        format!("The property \"{key}\" expects a list."),
                    )
                }
            },
            "length" | "min_length" | "max_length" => {
                let Some(n) = arg.as_u64().map(|n| n as usize) else {
                    return invalid_schema(
                        issues,
                        format!("The property \"{key}\" expects an integer."),
                    );
                };
                match key.as_str() {
                    "length" => ConstraintRule::Length(n),
                    "min_length" => ConstraintRule::MinLength(n),
                    _ => ConstraintRule::MaxLength(n),
                }
            }
            _ => {
                let Some(pattern) = arg.as_str() else {
                    return invalid_schema(
                        issues,
                        format!("The property \"{key}\" expects a string."),
                    );
                };
                // Anchored at the start only.
                match Regex::new(&format!("^(?:{pattern})")) {
                    Ok(re) => ConstraintRule::Pattern(re),
                    Err(e) => {
                        return invalid_schema(
                            issues,
                            format!("The property \"{key}\" has an invalid pattern: {e}"),
                        )
                    }
                }
            }
        };

        Some(Constraint {
            property_name: property_name.to_string(),
            property_type: property_type.to_string(),
            rule,
            raw: arg.clone(),
        })
    }

    /// Parses every clause of a `constraints` list.
    pub fn parse_list(
        property_name: &str,
        property_type: &str,
        raw: &JsonValue,
        issues: &mut IssueCollector,
    ) -> Vec<Constraint> {
        match raw {
            JsonValue::Array(items) => items
                .iter()
                .filter_map(|item| Constraint::parse(property_name, property_type, item, issues))
                .collect(),
            _ => {
                issues.invalid_schema(format!(
                    "Constraints of property \"{property_name}\" must be a list."
                ));
                Vec::new()
            }
        }
    }

    fn values_equal(&self, a: &JsonValue, b: &JsonValue) -> bool {
        if a == b {
            return true;
        }
        match (
            Comparable::from_value(&self.property_type, a),
            Comparable::from_value(&self.property_type, b),
        ) {
            (Some(x), Some(y)) => x.compare(&y) == Some(Ordering::Equal),
            _ => false,
        }
    }

    fn compare_to(&self, value: &JsonValue, bound: &Comparable) -> Option<Ordering> {
        let comparable_type = if self.property_type == "range" {
            "integer"
        } else {
            self.property_type.as_str()
        };
        Comparable::from_value(comparable_type, value)?.compare(bound)
    }

    fn is_satisfied(&self, value: &JsonValue) -> bool {
        match &self.rule {
            ConstraintRule::Equal(expected) => self.values_equal(value, expected),
            ConstraintRule::GreaterThan(bound) => {
                self.compare_to(value, bound) == Some(Ordering::Greater)
            }
            ConstraintRule::GreaterOrEqual(bound) => matches!(
                self.compare_to(value, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            ConstraintRule::LessThan(bound) => self.compare_to(value, bound) == Some(Ordering::Less),
            ConstraintRule::LessOrEqual(bound) => matches!(
                self.compare_to(value, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            ConstraintRule::InRange(min, max) => {
                if self.property_type == "range" {
                    return match range_bounds(value) {
                        Ok((lower, upper)) => {
                            let in_bounds = |n: i64| {
                                let n = Comparable::Number(n as f64);
                                n.compare(min) != Some(Ordering::Less)
                                    && max
                                        .as_ref()
                                        .map_or(true, |m| n.compare(m) != Some(Ordering::Greater))
                            };
                            in_bounds(lower) && upper.map_or(max.is_none(), in_bounds)
                        }
                        Err(_) => true,
                    };
                }
                let above_min = matches!(
                    self.compare_to(value, min),
                    Some(Ordering::Greater | Ordering::Equal)
                );
                let below_max = match max {
                    Some(max) => matches!(
                        self.compare_to(value, max),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    None => true,
                };
                above_min && below_max
            }
            ConstraintRule::ValidValues(allowed) => {
                allowed.iter().any(|candidate| self.values_equal(value, candidate))
            }
            ConstraintRule::Length(n) => length_of(value) == Some(*n),
            ConstraintRule::MinLength(n) => length_of(value).is_some_and(|len| len >= *n),
            ConstraintRule::MaxLength(n) => length_of(value).is_some_and(|len| len <= *n),
            ConstraintRule::Pattern(re) => value.as_str().is_some_and(|s| re.is_match(s)),
        }
    }

    fn violation_message(&self, value: &JsonValue) -> String {
        let name = &self.property_name;
        let shown = display(value);
        let arg = display(&self.raw);
        match &self.rule {
            ConstraintRule::Equal(_) => {
                format!("The value \"{shown}\" of property \"{name}\" is not equal to \"{arg}\".")
            }
            ConstraintRule::GreaterThan(_) => format!(
                "The value \"{shown}\" of property \"{name}\" must be greater than \"{arg}\"."
            ),
            ConstraintRule::GreaterOrEqual(_) => format!(
                "The value \"{shown}\" of property \"{name}\" must be greater than or equal to \"{arg}\"."
            ),
            ConstraintRule::LessThan(_) => format!(
                "The value \"{shown}\" of property \"{name}\" must be less than \"{arg}\"."
            ),
            ConstraintRule::LessOrEqual(_) => format!(
                "The value \"{shown}\" of property \"{name}\" must be less than or equal to \"{arg}\"."
            ),
            ConstraintRule::InRange(_, _) => {
                let (min, max) = match self.raw.as_array().map(Vec::as_slice) {
                    Some([min, max]) => (display(min), display(max)),
                    _ => (arg.clone(), arg.clone()),
                };
                format!(
                    "The value \"{shown}\" of property \"{name}\" is out of range \"(min:{min}, max:{max})\"."
                )
            }
            ConstraintRule::ValidValues(_) => format!(
                "The value \"{shown}\" of property \"{name}\" is not valid. Expected a value from \"{arg}\"."
            ),
            ConstraintRule::Length(_) => format!(
                "Length of value \"{shown}\" of property \"{name}\" must be equal to \"{arg}\"."
            ),
            ConstraintRule::MinLength(_) => format!(
                "Length of value \"{shown}\" of property \"{name}\" must be at least \"{arg}\"."
            ),
            ConstraintRule::MaxLength(_) => format!(
                "Length of value \"{shown}\" of property \"{name}\" must be no greater than \"{arg}\"."
            ),
            ConstraintRule::Pattern(_) => format!(
                "The value \"{shown}\" of property \"{name}\" does not match pattern \"{arg}\"."
            ),
        }
    }

    /// Records a `ValidationError` when `value` violates this clause.
    /// Returns whether the value satisfied it.
    pub fn validate(&self, value: &JsonValue, issues: &mut IssueCollector) -> bool {
        if is_function(value) || value.is_null() {
            return true;
        }
        if self.is_satisfied(value) {
            return true;
        }
        issues.validation_error(self.violation_message(value));
        false
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::issues::{IssueCode, IssueCollector};

    use super::Constraint;

    fn constraint(property_type: &str, raw: serde_json::Value) -> Constraint {
        let mut issues = IssueCollector::new();
        let parsed = Constraint::parse("prop", property_type, &raw, &mut issues);
        assert!(issues.is_empty(), "{:?}", issues.issues());
        parsed.unwrap()
    }

    #[test]
    fn comparison_constraints_on_numbers_and_scalar_units() {
        let mut issues = IssueCollector::new();
        assert!(constraint("integer", json!({ "greater_or_equal": 1 })).validate(&json!(1), &mut issues));
        assert!(!constraint("integer", json!({ "greater_than": 1 })).validate(&json!(1), &mut issues));
        assert!(constraint("scalar-unit.size", json!({ "greater_or_equal": "1 MB" }))
            .validate(&json!("1 GiB"), &mut issues));
        assert!(!constraint("scalar-unit.size", json!({ "less_than": "1 kB" }))
            .validate(&json!("2000 B"), &mut issues));
        assert_eq!(issues.count(IssueCode::ValidationError), 2);
        assert_eq!(
            issues.issues()[0].message,
            "The value \"1\" of property \"prop\" must be greater than \"1\"."
        );
    }

    #[test]
    fn in_range_accepts_unbounded_upper_limit() {
        let mut issues = IssueCollector::new();
        let c = constraint("integer", json!({ "in_range": [2, "UNBOUNDED"] }));
        assert!(c.validate(&json!(1_000_000), &mut issues));
        assert!(!c.validate(&json!(1), &mut issues));

        let ranged = constraint("range", json!({ "in_range": [1, 65535] }));
        assert!(ranged.validate(&json!([80, 8080]), &mut issues));
        assert!(!ranged.validate(&json!([0, 80]), &mut issues));
        assert!(!ranged.validate(&json!([80, "UNBOUNDED"]), &mut issues));
        assert_eq!(issues.count(IssueCode::ValidationError), 3);
    }

    #[test]
    fn versions_and_timestamps_compare_semantically() {
        let mut issues = IssueCollector::new();
        assert!(constraint("version", json!({ "greater_than": "1.2" }))
            .validate(&json!("1.10"), &mut issues));
        assert!(constraint("timestamp", json!({ "less_than": "2020-01-01" }))
            .validate(&json!("2019-12-31 23:59:59"), &mut issues));
        assert!(issues.is_empty());
    }

    #[test]
    fn length_family_and_pattern() {
        let mut issues = IssueCollector::new();
        assert!(constraint("string", json!({ "length": 3 })).validate(&json!("abc"), &mut issues));
        assert!(constraint("map", json!({ "min_length": 1 })).validate(&json!({ "a": 1 }), &mut issues));
        assert!(!constraint("list", json!({ "max_length": 1 })).validate(&json!([1, 2]), &mut issues));
        assert!(constraint("string", json!({ "pattern": "[a-z]+" })).validate(&json!("abc1"), &mut issues));
        assert!(!constraint("string", json!({ "pattern": "[a-z]+" })).validate(&json!("1abc"), &mut issues));
        assert_eq!(issues.count(IssueCode::ValidationError), 2);
    }

    #[test]
    fn valid_values_and_equal_use_typed_equality() {
        let mut issues = IssueCollector::new();
        assert!(constraint("integer", json!({ "valid_values": [4, 6] })).validate(&json!(6), &mut issues));
        assert!(constraint("scalar-unit.size", json!({ "equal": "1 kB" }))
            .validate(&json!("1000 B"), &mut issues));
        assert!(!constraint("boolean", json!({ "equal": true })).validate(&json!(false), &mut issues));
        assert_eq!(issues.count(IssueCode::ValidationError), 1);
    }

    #[test]
    fn malformed_or_inapplicable_constraints_are_schema_errors() {
        let mut issues = IssueCollector::new();
        assert!(Constraint::parse("p", "string", &json!({ "greater_than": 1 }), &mut issues).is_none());
        assert!(Constraint::parse("p", "integer", &json!({ "in_range": 1 }), &mut issues).is_none());
        assert!(Constraint::parse("p", "integer", &json!({ "bogus": 1 }), &mut issues).is_none());
        assert!(Constraint::parse("p", "integer", &json!({ "a": 1, "b": 2 }), &mut issues).is_none());
        assert!(Constraint::parse("p", "string", &json!({ "pattern": "(" }), &mut issues).is_none());
        assert_eq!(issues.count(IssueCode::InvalidSchema), 5);
    }
}
