//! Read-time sanitizing of persisted JSON. Stored blobs may come from older
//! builds or the companion context, so nothing here fails hard.

use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Interpret booleans written as `true`, `"true"`, `1` and friends.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" | "" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_f64().map(|f| f.abs() > f64::EPSILON),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Interpret a non-negative whole number, accepting numeric strings.
pub fn coerce_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Interpret a finite number, accepting numeric strings.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// Non-empty string field.
pub fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// serde helper: lenient boolean, `false` when unrecognized.
pub fn de_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_bool(&value).unwrap_or(false))
}

/// serde helper: lenient non-negative integer, `0` when unrecognized.
pub fn de_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_u32(&value)
        .or_else(|| coerce_f64(&value).map(round_to_u32))
        .unwrap_or(0))
}

/// serde helper: lenient finite float, `0.0` when unrecognized.
pub fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_f64(&value).unwrap_or(0.0))
}

/// Round a float into `u32`, clamping out-of-range values.
pub fn round_to_u32(value: f64) -> u32 {
    let rounded = value.round();
    if rounded <= 0.0 {
        return 0;
    }
    // Values above u32::MAX saturate; parsing the decimal text avoids a lossy cast.
    format!("{rounded:.0}").parse().unwrap_or(u32::MAX)
}

/// Parse a stored JSON array record by record. A blob that is not an array
/// yields an empty collection; records `parse` rejects are skipped.
pub fn parse_collection<T, F>(raw: Option<&str>, key: &str, parse: F) -> Vec<T>
where
    F: Fn(&Value) -> Option<T>,
{
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => {
            let total = items.len();
            let parsed: Vec<T> = items.iter().filter_map(&parse).collect();
            if parsed.len() < total {
                warn!("Skipped {} malformed record(s) in '{key}'", total - parsed.len());
            }
            parsed
        }
        Ok(_) => {
            warn!("Stored '{key}' is not an array, treating as empty");
            Vec::new()
        }
        Err(e) => {
            warn!("Stored '{key}' is not valid JSON, treating as empty: {e}");
            Vec::new()
        }
    }
}
