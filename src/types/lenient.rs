//! Tolerant deserializers for oracle-produced JSON
//!
//! The oracle is untrusted: it may send a bare string where a list is
//! expected, a numeric string where a number is expected, or the literal
//! text `null` for an absent command.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Accept `"x"`, `["x", "y"]` or `null`
pub fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => Vec::new(),
        Value::String(s) if s.trim().is_empty() => Vec::new(),
        Value::String(s) => vec![s],
        Value::Array(items) => items.into_iter().filter_map(value_to_string).collect(),
        other => vec![other.to_string()],
    })
}

/// Accept numbers, numeric strings and percentages; anything else is `None`
pub fn loose_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| value_to_f64(&v)))
}

/// Absent, empty and the literal `null` string all mean "no command"
pub fn optional_command<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_string).and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

/// Accept numbers or numeric strings for an index; junk becomes 0
pub fn loose_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| value_to_f64(&v))
        .filter(|n| *n >= 0.0)
        .map(|n| n as usize)
        .unwrap_or(0))
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
}
