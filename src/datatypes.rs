//! Value validation against TOSCA primitive and user-defined data types.
//!
//! Every check records into the [`IssueCollector`] and returns the best
//! normalized value it could produce; nothing here aborts.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use regex::Regex;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::constraints::Constraint;
use crate::entity_type::{is_primitive_type, TypeKind};
use crate::functions::is_function;
use crate::issues::{IssueCode, IssueCollector};
use crate::registry::TypeRegistry;
use crate::scalar_unit::{self, ScalarUnitKind};
use crate::schema::Schema;

const MAX_DATATYPE_DEPTH: usize = 64;

/// Upper-bound marker accepted in ranges and `in_range` constraints.
pub const UNBOUNDED: &str = "UNBOUNDED";

#[derive(Debug, Clone, PartialEq, Eq)]
/// `major.minor[.fix[.qualifier[-build]]]`
pub struct ToscaVersion {
    pub major: u64,
    pub minor: u64,
    pub fix: u64,
    pub qualifier: Option<String>,
    pub build: Option<u64>,
}

impl ToscaVersion {
    /// Ordering key. The qualifier becomes a semver pre-release tag.
    pub fn to_semver(&self) -> semver::Version {
        let mut version = semver::Version::new(self.major, self.minor, self.fix);
        if let Some(qualifier) = &self.qualifier {
            let tag = match self.build {
                Some(build) => format!("{qualifier}.{build}"),
                None => qualifier.clone(),
            };
            if let Ok(pre) = semver::Prerelease::new(&tag) {
                version.pre = pre;
            }
        }
        version
    }
}

impl fmt::Display for ToscaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.fix)?;
        if let Some(qualifier) = &self.qualifier {
            write!(f, ".{qualifier}")?;
            if let Some(build) = self.build {
                write!(f, "-{build}")?;
            }
        }
        Ok(())
    }
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+)(?:\.(\w+)(?:-(\d+))?)?)?$")
            .expect("valid version regex")
    })
}

/// Parses a TOSCA version string. `0`, `0.0` and `0.0.0` mean "no version".
pub fn parse_tosca_version(text: &str) -> Result<Option<ToscaVersion>, String> {
    let text = text.trim();
    if matches!(text, "0" | "0.0" | "0.0.0") {
        return Ok(None);
    }
    let invalid = || {
        format!(
            "Value of TOSCA version property \"{text}\" is not valid. The version must be in the format \"major_version.minor_version.fix_version[.qualifier][-build_version]\"."
        )
    };
    let caps = version_regex().captures(text).ok_or_else(invalid)?;
    let number = |i: usize| -> Result<Option<u64>, String> {
        caps.get(i)
            .map(|m| m.as_str().parse::<u64>().map_err(|_| invalid()))
            .transpose()
    };
    Ok(Some(ToscaVersion {
        major: number(1)?.unwrap_or(0),
        minor: number(2)?.unwrap_or(0),
        fix: number(3)?.unwrap_or(0),
        qualifier: caps.get(4).map(|m| m.as_str().to_string()),
        build: number(5)?,
    }))
}

fn version_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) if n.is_f64() => {
            let text = n.to_string();
            Some(if text.contains('.') { text } else { format!("{text}.0") })
        }
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:(?:[Tt]|\s+)(\d{1,2}):(\d{2}):(\d{2})(?:\.(\d+))?\s*(Z|z|[+-]\d{1,2}(?::?\d{2})?)?)?$",
        )
        .expect("valid timestamp regex")
    })
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    if text.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let sign = if text.starts_with('-') { -1 } else { 1 };
    let digits: String = text[1..].chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        3 | 4 => {
            let split = digits.len() - 2;
            (digits[..split].parse::<i32>().ok()?, digits[split..].parse::<i32>().ok()?)
        }
        _ => return None,
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parses RFC 3339 and the YAML 1.1 timestamp forms (`2001-12-14`,
/// `2001-12-14 21:59:43.10 -5`). Missing offsets mean UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed);
    }
    let caps = timestamp_regex().captures(text)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    let date = NaiveDate::from_ymd_opt(caps[1].parse().ok()?, field(2)?, field(3)?)?;
    let nanos = match caps.get(7) {
        Some(m) => {
            let mut digits = m.as_str().to_string();
            digits.truncate(9);
            while digits.len() < 9 {
                digits.push('0');
            }
            digits.parse::<u32>().ok()?
        }
        None => 0,
    };
    let naive = date.and_hms_nano_opt(field(4).unwrap_or(0), field(5).unwrap_or(0), field(6).unwrap_or(0), nanos)?;
    let offset = match caps.get(8) {
        Some(m) => parse_offset(m.as_str())?,
        None => FixedOffset::east_opt(0)?,
    };
    offset.from_local_datetime(&naive).single()
}

fn describe(path: &str) -> String {
    format!("Value of \"{path}\"")
}

fn validate_integer(value: &JsonValue, path: &str, issues: &mut IssueCollector) -> JsonValue {
    match value {
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => value.clone(),
        JsonValue::String(s) => match s.trim().parse::<i64>() {
            Ok(parsed) => JsonValue::Number(parsed.into()),
            Err(_) => {
                issues.type_mismatch(&describe(path), "integer");
                value.clone()
            }
        },
        _ => {
            issues.type_mismatch(&describe(path), "integer");
            value.clone()
        }
    }
}

fn validate_float(
    value: &JsonValue,
    path: &str,
    type_name: &str,
    issues: &mut IssueCollector,
) -> JsonValue {
    match value {
        JsonValue::Number(_) => value.clone(),
        JsonValue::String(s) => match s.trim().parse::<f64>().ok().and_then(JsonNumber::from_f64) {
            Some(n) => JsonValue::Number(n),
            None => {
                issues.type_mismatch(&describe(path), type_name);
                value.clone()
            }
        },
        _ => {
            issues.type_mismatch(&describe(path), type_name);
            value.clone()
        }
    }
}

fn validate_boolean(value: &JsonValue, path: &str, issues: &mut IssueCollector) -> JsonValue {
    match value {
        JsonValue::Bool(_) => value.clone(),
        JsonValue::String(s) if s.eq_ignore_ascii_case("true") => JsonValue::Bool(true),
        JsonValue::String(s) if s.eq_ignore_ascii_case("false") => JsonValue::Bool(false),
        _ => {
            issues.type_mismatch(&describe(path), "boolean");
            value.clone()
        }
    }
}

fn validate_string(value: &JsonValue, path: &str, issues: &mut IssueCollector) -> JsonValue {
    match value {
        JsonValue::String(_) => value.clone(),
        JsonValue::Number(n) => JsonValue::String(n.to_string()),
        JsonValue::Bool(b) => JsonValue::String(b.to_string()),
        _ => {
            issues.type_mismatch(&describe(path), "string");
            value.clone()
        }
    }
}

/// `[lower, upper]` with integer bounds; `upper` may be `UNBOUNDED`.
pub fn range_bounds(value: &JsonValue) -> Result<(i64, Option<i64>), String> {
    let items = value
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| format!("\"{value}\" is not a valid range."))?;
    let lower = items[0]
        .as_i64()
        .ok_or_else(|| format!("\"{value}\" is not a valid range."))?;
    let upper = match &items[1] {
        JsonValue::String(s) if s == UNBOUNDED => None,
        other => Some(
            other
                .as_i64()
                .ok_or_else(|| format!("\"{value}\" is not a valid range."))?,
        ),
    };
    if let Some(upper) = upper {
        if lower > upper {
            return Err(format!(
                "\"{value}\" is not a valid range: the lower bound must not exceed the upper bound."
            ));
        }
    }
    Ok((lower, upper))
}

fn validate_range(value: &JsonValue, issues: &mut IssueCollector) -> JsonValue {
    if let Err(message) = range_bounds(value) {
        issues.value_error(message);
    }
    value.clone()
}

fn validate_timestamp(value: &JsonValue, path: &str, issues: &mut IssueCollector) -> JsonValue {
    let parsed = value.as_str().and_then(parse_timestamp);
    if parsed.is_none() {
        issues.value_error(format!("{} is not a valid timestamp.", describe(path)));
    }
    value.clone()
}

fn validate_version(value: &JsonValue, issues: &mut IssueCollector) -> JsonValue {
    let Some(text) = version_text(value) else {
        issues.record(
            IssueCode::InvalidToscaVersionProperty,
            format!("Value of TOSCA version property \"{value}\" is not valid."),
        );
        return value.clone();
    };
    match parse_tosca_version(&text) {
        Ok(Some(_)) => JsonValue::String(text),
        Ok(None) => JsonValue::Null,
        Err(message) => {
            issues.record(IssueCode::InvalidToscaVersionProperty, message);
            value.clone()
        }
    }
}

/// Validates `value` against `type_name` and returns the normalized value.
///
/// `entry_schema` applies to list elements and map values. `path` only feeds
/// issue messages.
pub fn validate_datatype(
    type_name: &str,
    value: &JsonValue,
    entry_schema: Option<&Schema>,
    path: &str,
    registry: &TypeRegistry,
    issues: &mut IssueCollector,
) -> (JsonValue, bool) {
    let before = issues.recorded();
    let normalized = validate_datatype_inner(type_name, value, entry_schema, path, 0, registry, issues);
    (normalized, issues.recorded() == before)
}

fn validate_entries(
    entry: &Schema,
    value: &JsonValue,
    path: &str,
    depth: usize,
    registry: &TypeRegistry,
    issues: &mut IssueCollector,
) -> JsonValue {
    let check = |item: &JsonValue, item_path: String, issues: &mut IssueCollector| {
        let before = issues.recorded();
        let normalized = validate_datatype_inner(
            &entry.type_name,
            item,
            entry.entry_schema.as_deref(),
            &item_path,
            depth + 1,
            registry,
            issues,
        );
        if issues.recorded() == before {
            for constraint in &entry.constraints {
                constraint.validate(&normalized, issues);
            }
        }
        normalized
    };
    match value {
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| check(item, format!("{path}[{i}]"), issues))
                .collect(),
        ),
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), check(v, format!("{path}.{k}"), issues)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn validate_datatype_inner(
    type_name: &str,
    value: &JsonValue,
    entry_schema: Option<&Schema>,
    path: &str,
    depth: usize,
    registry: &TypeRegistry,
    issues: &mut IssueCollector,
) -> JsonValue {
    if is_function(value) {
        return value.clone();
    }
    if depth > MAX_DATATYPE_DEPTH {
        tracing::warn!(path, "data type validation exceeded max depth ({MAX_DATATYPE_DEPTH})");
        return value.clone();
    }

    if let Some(kind) = ScalarUnitKind::from_type_name(type_name) {
        return scalar_unit::validate(kind, value, issues);
    }

    match type_name {
        "string" => validate_string(value, path, issues),
        "integer" => validate_integer(value, path, issues),
        "float" | "number" => validate_float(value, path, type_name, issues),
        "boolean" => validate_boolean(value, path, issues),
        "range" => validate_range(value, issues),
        "timestamp" => validate_timestamp(value, path, issues),
        "version" => validate_version(value, issues),
        "list" => {
            if !value.is_array() {
                issues.type_mismatch(&describe(path), "list");
                return value.clone();
            }
            match entry_schema {
                Some(entry) => validate_entries(entry, value, path, depth, registry, issues),
                None => value.clone(),
            }
        }
        "map" => {
            if !value.is_object() {
                issues.type_mismatch(&describe(path), "map");
                return value.clone();
            }
            match entry_schema {
                Some(entry) => validate_entries(entry, value, path, depth, registry, issues),
                None => value.clone(),
            }
        }
        _ => validate_complex(type_name, value, path, depth, registry, issues),
    }
}

fn validate_complex(
    type_name: &str,
    value: &JsonValue,
    path: &str,
    depth: usize,
    registry: &TypeRegistry,
    issues: &mut IssueCollector,
) -> JsonValue {
    let Some(data_type) = registry.resolve(TypeKind::Data, type_name, issues) else {
        return value.clone();
    };

    if let Some(primitive) = data_type.value_type(registry) {
        let normalized =
            validate_datatype_inner(&primitive, value, None, path, depth + 1, registry, issues);
        if let Some(JsonValue::Array(raw)) = data_type.get_definition("constraints", registry) {
            for raw_constraint in &raw {
                if let Some(constraint) = Constraint::parse(path, &primitive, raw_constraint, issues) {
                    constraint.validate(&normalized, issues);
                }
            }
        }
        return normalized;
    }

    let fields: &JsonMap<String, JsonValue> = match value {
        JsonValue::Object(map) => map,
        JsonValue::Array(items) if items.first().is_some_and(JsonValue::is_object) => {
            issues.type_mismatch(&describe(path), "map");
            match items.first().and_then(JsonValue::as_object) {
                Some(first) => first,
                None => return value.clone(),
            }
        }
        _ => {
            issues.type_mismatch(&describe(path), &data_type.name);
            return value.clone();
        }
    };

    let what = format!("Data value of type \"{}\"", data_type.name);
    let defs = data_type.properties_def(registry, issues);

    for key in fields.keys() {
        if !defs.iter().any(|d| &d.name == key) {
            issues.unknown_field(&what, key);
        }
    }

    let mut normalized = fields.clone();
    for def in &defs {
        match fields.get(&def.name) {
            Some(field) => {
                let field_path = format!("{path}.{}", def.name);
                let checked = validate_datatype_inner(
                    &def.schema.type_name,
                    field,
                    def.schema.entry_schema.as_deref(),
                    &field_path,
                    depth + 1,
                    registry,
                    issues,
                );
                for constraint in &def.schema.constraints {
                    constraint.validate(&checked, issues);
                }
                normalized.insert(def.name.clone(), checked);
            }
            None => match &def.schema.default {
                Some(default) => {
                    normalized.insert(def.name.clone(), default.clone());
                }
                None if def.schema.required => issues.missing_required_field(&what, &def.name),
                None => {}
            },
        }
    }
    JsonValue::Object(normalized)
}

/// Returns `true` when `type_name` can be used for a property or input.
pub fn is_known_value_type(type_name: &str, registry: &TypeRegistry) -> bool {
    is_primitive_type(type_name) || registry.find(TypeKind::Data, type_name).is_some()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::issues::{IssueCode, IssueCollector};
    use crate::registry::TypeRegistry;

    use super::{parse_timestamp, parse_tosca_version, range_bounds, validate_datatype};

    fn check(type_name: &str, value: serde_json::Value) -> (serde_json::Value, IssueCollector) {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let (out, valid) = validate_datatype(type_name, &value, None, "value", &registry, &mut issues);
        assert_eq!(valid, issues.is_empty());
        (out, issues)
    }

    #[test]
    fn primitive_coercions() {
        assert_eq!(check("integer", json!("42")).0, json!(42));
        assert_eq!(check("boolean", json!("TRUE")).0, json!(true));
        assert_eq!(check("string", json!(7)).0, json!("7"));
        assert_eq!(check("float", json!("1.5")).0, json!(1.5));

        let (_, issues) = check("integer", json!(true));
        assert_eq!(issues.count(IssueCode::TypeMismatch), 1);
        let (_, issues) = check("integer", json!("abc"));
        assert_eq!(
            issues.issues()[0].message,
            "Value of \"value\" must be of type \"integer\"."
        );
        let (_, issues) = check("string", json!({ "a": 1 }));
        assert_eq!(issues.count(IssueCode::TypeMismatch), 1);
    }

    #[test]
    fn ranges_need_ordered_integer_bounds() {
        assert_eq!(range_bounds(&json!([1, 10])).unwrap(), (1, Some(10)));
        assert_eq!(range_bounds(&json!([0, "UNBOUNDED"])).unwrap(), (0, None));
        assert!(range_bounds(&json!([5, 1])).is_err());
        assert!(range_bounds(&json!([1])).is_err());
        assert!(range_bounds(&json!(["a", 2])).is_err());
    }

    #[test]
    fn versions_follow_tosca_grammar() {
        let v = parse_tosca_version("18.0.3.beta-1").unwrap().unwrap();
        assert_eq!((v.major, v.minor, v.fix), (18, 0, 3));
        assert_eq!(v.qualifier.as_deref(), Some("beta"));
        assert_eq!(v.build, Some(1));
        assert_eq!(v.to_string(), "18.0.3.beta-1");
        assert!(parse_tosca_version("0.0").unwrap().is_none());
        assert!(parse_tosca_version("1.x").is_err());
        assert!(parse_tosca_version("18.0.3-1").is_err());

        assert_eq!(check("version", json!(1.0)).0, json!("1.0"));
        let (_, issues) = check("version", json!("a.b"));
        assert_eq!(issues.count(IssueCode::InvalidToscaVersionProperty), 1);
    }

    #[test]
    fn timestamps_accept_yaml_forms() {
        assert!(parse_timestamp("2001-12-14t21:59:43.10-05:00").is_some());
        assert!(parse_timestamp("2001-12-14 21:59:43.10 -5").is_some());
        assert!(parse_timestamp("2001-12-15T02:59:43.1Z").is_some());
        assert!(parse_timestamp("2002-12-14").is_some());
        assert!(parse_timestamp("yesterday").is_none());
        let (_, issues) = check("timestamp", json!("2002-13-45"));
        assert_eq!(issues.count(IssueCode::ValueError), 1);
    }

    #[test]
    fn lists_and_maps_apply_entry_schema() {
        let registry = TypeRegistry::builtin();
        let mut issues = IssueCollector::new();
        let entry = crate::schema::Schema::parse(
            "ports",
            &json!({ "type": "integer", "constraints": [{ "less_than": 100 }] }),
            &registry,
            &mut issues,
        );
        let (out, valid) = validate_datatype(
            "list",
            &json!([1, "2", 300]),
            Some(&entry),
            "ports",
            &registry,
            &mut issues,
        );
        assert_eq!(out, json!([1, 2, 300]));
        assert!(!valid);
        assert_eq!(issues.count(IssueCode::ValidationError), 1);
    }

    #[test]
    fn complex_types_run_every_field_check() {
        let (out, issues) = check(
            "tosca.datatypes.Credential",
            json!({ "user": "admin", "bogus": 1, "keys": "not-a-map" }),
        );
        assert_eq!(issues.count(IssueCode::UnknownField), 1);
        assert_eq!(issues.count(IssueCode::MissingRequiredField), 1);
        assert_eq!(issues.count(IssueCode::TypeMismatch), 1);
        assert_eq!(out["token_type"], json!("password"));
    }

    #[test]
    fn value_typed_data_types_apply_their_constraints() {
        let (out, issues) = check("PortDef", json!(8080));
        assert_eq!(out, json!(8080));
        assert!(issues.is_empty());
        let (_, issues) = check("tosca.datatypes.network.PortDef", json!(70000));
        assert_eq!(issues.count(IssueCode::ValidationError), 1);
    }

    #[test]
    fn functions_bypass_validation() {
        let (out, issues) = check("integer", json!({ "get_input": "cpus" }));
        assert_eq!(out, json!({ "get_input": "cpus" }));
        assert!(issues.is_empty());
    }
}
