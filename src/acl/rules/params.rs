//! Helpers for reading raw rule settings.

use crate::error::{IndexGateError, Result};

use serde_json::Value;

/// A single string value.
pub fn string(rule: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        Value::String(_) => Err(IndexGateError::invalid_parameter(rule, "value cannot be empty")),
        other => Err(IndexGateError::invalid_parameter(
            rule,
            format!("expected a string, found {}", kind(other)),
        )),
    }
}

/// A string or a non-empty list of strings.
pub fn string_list(rule: &str, value: &Value) -> Result<Vec<String>> {
    let items = match value {
        Value::String(_) => vec![string(rule, value)?],
        Value::Array(items) => items
            .iter()
            .map(|item| string(rule, item))
            .collect::<Result<Vec<_>>>()?,
        other => {
            return Err(IndexGateError::invalid_parameter(
                rule,
                format!("expected a string or a list of strings, found {}", kind(other)),
            ))
        }
    };

    if items.is_empty() {
        return Err(IndexGateError::invalid_parameter(rule, "list cannot be empty"));
    }

    Ok(items)
}

/// A non-negative integer.
pub fn unsigned(rule: &str, value: &Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        IndexGateError::invalid_parameter(
            rule,
            format!("expected a non-negative integer, found {}", kind(value)),
        )
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
