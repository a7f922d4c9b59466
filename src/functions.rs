//! Intrinsic function markers (`get_input`, `get_property`, ...).
//!
//! Values that are function calls cannot be checked statically, so schema
//! validation passes them through. What can be checked here is that the
//! references they make exist in the enclosing topology.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::entity_type::TypeKind;
use crate::issues::{IssueCode, IssueCollector};
use crate::registry::TypeRegistry;

pub const GET_INPUT: &str = "get_input";
pub const GET_PROPERTY: &str = "get_property";
pub const GET_ATTRIBUTE: &str = "get_attribute";
pub const GET_OPERATION_OUTPUT: &str = "get_operation_output";
pub const CONCAT: &str = "concat";
pub const TOKEN: &str = "token";
pub const GET_NODES_OF_TYPE: &str = "get_nodes_of_type";
pub const GET_ARTIFACT: &str = "get_artifact";

pub const FUNCTION_NAMES: &[&str] = &[
    GET_INPUT,
    GET_PROPERTY,
    GET_ATTRIBUTE,
    GET_OPERATION_OUTPUT,
    CONCAT,
    TOKEN,
    GET_NODES_OF_TYPE,
    GET_ARTIFACT,
];

/// Keywords accepted as the entity argument of `get_property` and friends.
pub const ENTITY_KEYWORDS: &[&str] = &["SELF", "SOURCE", "TARGET", "HOST"];

#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    GetInput(JsonValue),
    GetProperty(Vec<JsonValue>),
    GetAttribute(Vec<JsonValue>),
    GetOperationOutput(Vec<JsonValue>),
    Concat(Vec<JsonValue>),
    Token(Vec<JsonValue>),
    GetNodesOfType(JsonValue),
    GetArtifact(Vec<JsonValue>),
}

/// Returns `true` for a single-key map whose key is a function name.
pub fn is_function(value: &JsonValue) -> bool {
    match value.as_object() {
        Some(map) if map.len() == 1 => map
            .keys()
            .next()
            .is_some_and(|k| FUNCTION_NAMES.contains(&k.as_str())),
        _ => false,
    }
}

fn as_args(value: &JsonValue) -> Vec<JsonValue> {
    match value {
        JsonValue::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

impl Function {
    pub fn parse(value: &JsonValue) -> Option<Function> {
        if !is_function(value) {
            return None;
        }
        let (name, args) = value.as_object()?.iter().next()?;
        let function = match name.as_str() {
            GET_INPUT => Function::GetInput(args.clone()),
            GET_PROPERTY => Function::GetProperty(as_args(args)),
            GET_ATTRIBUTE => Function::GetAttribute(as_args(args)),
            GET_OPERATION_OUTPUT => Function::GetOperationOutput(as_args(args)),
            CONCAT => Function::Concat(as_args(args)),
            TOKEN => Function::Token(as_args(args)),
            GET_NODES_OF_TYPE => Function::GetNodesOfType(args.clone()),
            GET_ARTIFACT => Function::GetArtifact(as_args(args)),
            _ => return None,
        };
        Some(function)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::GetInput(_) => GET_INPUT,
            Function::GetProperty(_) => GET_PROPERTY,
            Function::GetAttribute(_) => GET_ATTRIBUTE,
            Function::GetOperationOutput(_) => GET_OPERATION_OUTPUT,
            Function::Concat(_) => CONCAT,
            Function::Token(_) => TOKEN,
            Function::GetNodesOfType(_) => GET_NODES_OF_TYPE,
            Function::GetArtifact(_) => GET_ARTIFACT,
        }
    }

    /// Input name referenced by `get_input`.
    pub fn input_name(&self) -> Option<&str> {
        match self {
            Function::GetInput(JsonValue::String(name)) => Some(name),
            Function::GetInput(JsonValue::Array(items)) => items.first().and_then(JsonValue::as_str),
            _ => None,
        }
    }
}

/// Names visible to function references in one topology.
#[derive(Debug, Clone, Copy)]
pub struct FunctionScope<'a> {
    pub inputs: &'a [String],
    pub node_templates: &'a [String],
    pub registry: &'a TypeRegistry,
}

fn illegal_arguments(issues: &mut IssueCollector, name: &str, expected: &str) {
    issues.value_error(format!(
        "Illegal arguments for function \"{name}\". Expected arguments: {expected}"
    ));
}

impl FunctionScope<'_> {
    /// Checks every function call inside `value`, nested ones included.
    pub fn validate(&self, value: &JsonValue, issues: &mut IssueCollector) {
        match Function::parse(value) {
            Some(function) => self.validate_function(&function, issues),
            None => match value {
                JsonValue::Array(items) => items.iter().for_each(|v| self.validate(v, issues)),
                JsonValue::Object(map) => map.values().for_each(|v| self.validate(v, issues)),
                _ => {}
            },
        }
    }

    fn validate_function(&self, function: &Function, issues: &mut IssueCollector) {
        match function {
            Function::GetInput(_) => match function.input_name() {
                Some(name) if self.inputs.iter().any(|i| i == name) => {}
                Some(name) => issues.record(
                    IssueCode::UnknownInput,
                    format!("Unknown input \"{name}\"."),
                ),
                None => illegal_arguments(issues, GET_INPUT, "\"input_name\""),
            },
            Function::GetProperty(args) | Function::GetAttribute(args) => {
                if args.len() < 2 {
                    illegal_arguments(
                        issues,
                        function.name(),
                        "\"node-template-name\", \"req-or-cap\"(optional), \"property name\"",
                    );
                    return;
                }
                self.check_entity_reference(&args[0], issues);
                for arg in &args[1..] {
                    self.validate(arg, issues);
                }
            }
            Function::GetOperationOutput(args) => {
                if args.len() != 4 {
                    illegal_arguments(
                        issues,
                        GET_OPERATION_OUTPUT,
                        "\"template_name\", \"interface_name\", \"operation_name\", \"output_variable_name\"",
                    );
                    return;
                }
                self.check_entity_reference(&args[0], issues);
            }
            Function::Concat(args) => {
                if args.is_empty() {
                    illegal_arguments(issues, CONCAT, "at least one argument");
                }
                for arg in args {
                    self.validate(arg, issues);
                }
            }
            Function::Token(args) => {
                let well_formed = args.len() == 3
                    && args[1].as_str().is_some_and(|s| s.chars().count() == 1)
                    && args[2].as_u64().is_some();
                if !well_formed {
                    illegal_arguments(
                        issues,
                        TOKEN,
                        "\"string_with_tokens\", \"string_of_token_chars\", \"substring_index\"",
                    );
                    return;
                }
                self.validate(&args[0], issues);
            }
            Function::GetNodesOfType(arg) => match arg.as_str() {
                Some(type_name) => {
                    if self.registry.find(TypeKind::Node, type_name).is_none() {
                        issues.record(
                            IssueCode::KeyError,
                            format!("Node type \"{type_name}\" was not found."),
                        );
                    }
                }
                None => illegal_arguments(issues, GET_NODES_OF_TYPE, "\"node_type_name\""),
            },
            Function::GetArtifact(args) => {
                if args.len() < 2 {
                    illegal_arguments(
                        issues,
                        GET_ARTIFACT,
                        "\"modelable_entity_name\", \"artifact_name\"",
                    );
                    return;
                }
                self.check_entity_reference(&args[0], issues);
            }
        }
    }

    fn check_entity_reference(&self, arg: &JsonValue, issues: &mut IssueCollector) {
        let Some(name) = arg.as_str() else {
            issues.value_error(format!("Entity reference {arg} must be a string."));
            return;
        };
        if ENTITY_KEYWORDS.contains(&name) || self.node_templates.iter().any(|n| n == name) {
            return;
        }
        issues.record(
            IssueCode::KeyError,
            format!("Node template \"{name}\" was not found."),
        );
    }
}

/// Replaces every `get_input` whose input has a value in `params`.
pub fn resolve_get_input(value: &JsonValue, params: &BTreeMap<String, JsonValue>) -> JsonValue {
    if let Some(function @ Function::GetInput(_)) = Function::parse(value) {
        if let Some(resolved) = function.input_name().and_then(|name| params.get(name)) {
            return resolved.clone();
        }
        return value.clone();
    }
    match value {
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|v| resolve_get_input(v, params)).collect())
        }
        JsonValue::Object(map) if !is_function(value) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_get_input(v, params)))
                .collect(),
        ),
        other => other.clone(),
    }
}
