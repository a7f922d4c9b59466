//! `scalar-unit.size`, `scalar-unit.frequency` and `scalar-unit.time` values.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::issues::IssueCollector;

const SIZE_UNITS: &[(&str, f64)] = &[
    ("B", 1.0),
    ("kB", 1_000.0),
    ("KiB", 1_024.0),
    ("MB", 1_000_000.0),
    ("MiB", 1_048_576.0),
    ("GB", 1_000_000_000.0),
    ("GiB", 1_073_741_824.0),
    ("TB", 1_000_000_000_000.0),
    ("TiB", 1_099_511_627_776.0),
];

const TIME_UNITS: &[(&str, f64)] = &[
    ("d", 86_400.0),
    ("h", 3_600.0),
    ("m", 60.0),
    ("s", 1.0),
    ("ms", 0.001),
    ("us", 0.000_001),
    ("ns", 0.000_000_001),
];

const FREQUENCY_UNITS: &[(&str, f64)] = &[
    ("Hz", 1.0),
    ("kHz", 1_000.0),
    ("MHz", 1_000_000.0),
    ("GHz", 1_000_000_000.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarUnitKind {
    Size,
    Frequency,
    Time,
}

impl ScalarUnitKind {
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "scalar-unit.size" => Some(ScalarUnitKind::Size),
            "scalar-unit.frequency" => Some(ScalarUnitKind::Frequency),
            "scalar-unit.time" => Some(ScalarUnitKind::Time),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarUnitKind::Size => "scalar-unit.size",
            ScalarUnitKind::Frequency => "scalar-unit.frequency",
            ScalarUnitKind::Time => "scalar-unit.time",
        }
    }

    fn units(&self) -> &'static [(&'static str, f64)] {
        match self {
            ScalarUnitKind::Size => SIZE_UNITS,
            ScalarUnitKind::Frequency => FREQUENCY_UNITS,
            ScalarUnitKind::Time => TIME_UNITS,
        }
    }

    /// Unit used when a conversion target is not given.
    pub fn default_unit(&self) -> &'static str {
        match self {
            ScalarUnitKind::Size => "B",
            ScalarUnitKind::Frequency => "GHz",
            ScalarUnitKind::Time => "ms",
        }
    }

    fn factor(&self, unit: &str) -> Option<f64> {
        self.units()
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, factor)| *factor)
    }

    fn unit_list(&self) -> String {
        self.units()
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Exact unit match, or a case-insensitive one when unambiguous.
    fn reconcile_unit(&self, unit: &str) -> Option<&'static str> {
        if let Some((name, _)) = self.units().iter().find(|(name, _)| *name == unit) {
            return Some(name);
        }
        let mut matches = self
            .units()
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case(unit));
        match (matches.next(), matches.next()) {
            (Some((name, _)), None) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A parsed `<number> <unit>` value with a unit from the kind's table.
pub struct ScalarUnit {
    pub kind: ScalarUnitKind,
    pub number: f64,
    pub unit: &'static str,
}

fn scalar_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([0-9.]+)\s*(\w+)\s*$").expect("valid scalar-unit regex"))
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{number}")
    }
}

impl ScalarUnit {
    /// Parses `value`. A unit that only differs in case is corrected with a
    /// warning; anything else is an error message.
    pub fn parse(kind: ScalarUnitKind, value: &JsonValue) -> Result<Self, String> {
        let text = match value {
            JsonValue::String(s) => s.as_str(),
            other => return Err(format!("\"{other}\" is not a valid scalar-unit.")),
        };
        let caps = scalar_regex()
            .captures(text)
            .ok_or_else(|| format!("\"{text}\" is not a valid scalar-unit."))?;
        let number: f64 = caps[1]
            .parse()
            .map_err(|_| format!("\"{text}\" is not a valid scalar-unit."))?;
        let written = &caps[2];
        let unit = kind.reconcile_unit(written).ok_or_else(|| {
            format!(
                "The unit \"{written}\" is not valid. Valid units are \"{}\".",
                kind.unit_list()
            )
        })?;
        if unit != written {
            tracing::warn!(
                value = text,
                "the unit \"{written}\" does not follow scalar-unit standard; using \"{unit}\" instead"
            );
        }
        Ok(Self { kind, number, unit })
    }

    /// Value expressed in `unit`, or in the kind's default unit.
    pub fn convert(&self, unit: Option<&str>) -> Result<f64, String> {
        let target = unit.unwrap_or(self.kind.default_unit());
        let target_unit = self.kind.reconcile_unit(target).ok_or_else(|| {
            format!(
                "The unit \"{target}\" is not valid. Valid units are \"{}\".",
                self.kind.unit_list()
            )
        })?;
        let from = self.kind.factor(self.unit).unwrap_or(1.0);
        let to = self.kind.factor(target_unit).unwrap_or(1.0);
        let converted = self.number * from / to;
        // Trim float noise like 0.30000000000000004.
        let rounded = (converted * 1e9).round() / 1e9;
        Ok(if (rounded - converted).abs() < 1e-9 { rounded } else { converted })
    }

    /// Canonical `<number> <unit>` text.
    pub fn normalized(&self) -> String {
        format!("{} {}", format_number(self.number), self.unit)
    }
}

/// Validates a scalar-unit value and returns it normalized; the original is
/// returned unchanged after recording a `ValueError`.
pub fn validate(
    kind: ScalarUnitKind,
    value: &JsonValue,
    issues: &mut IssueCollector,
) -> JsonValue {
    match ScalarUnit::parse(kind, value) {
        Ok(parsed) => JsonValue::String(parsed.normalized()),
        Err(message) => {
            issues.value_error(message);
            value.clone()
        }
    }
}

/// Numeric value of a scalar-unit text in `unit` (default unit if `None`).
pub fn convert(kind: ScalarUnitKind, value: &JsonValue, unit: Option<&str>) -> Result<f64, String> {
    ScalarUnit::parse(kind, value)?.convert(unit)
}
