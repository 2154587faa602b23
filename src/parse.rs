//! Strict parsing of structured oracle output.
//!
//! The completion oracle is asked for bare JSON. Anything else (prose,
//! markdown fences, a scalar) is rejected rather than scraped for JSON.

use crate::types::Record;
use serde_json::Value;

/// Parse an oracle reply into one or more records.
///
/// A single object becomes a one-element list. The error is a
/// human-readable diagnostic; callers attach the raw text themselves.
pub fn parse_records(raw: &str) -> Result<Vec<Record>, String> {
    let value: Value = serde_json::from_str(raw.trim()).map_err(|e| e.to_string())?;

    let items = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        other => {
            return Err(format!(
                "expected a JSON object or array, got {}",
                json_kind(&other)
            ))
        }
    };

    if items.is_empty() {
        return Err("response is an empty list".to_string());
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(format!("element {} is {}, not an object", i, json_kind(&item)));
            }
            serde_json::from_value(item).map_err(|e| format!("element {}: {}", i, e))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
