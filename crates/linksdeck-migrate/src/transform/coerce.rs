//! Total coercions from untyped document fields.
//!
//! None of these fail: a missing or wrongly-shaped value degrades to the
//! caller's default.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// String value, or empty for anything else.
#[must_use]
pub fn string(value: Option<&Value>) -> String {
    value.and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Trimmed string value; absent when missing, not a string, or blank.
#[must_use]
pub fn optional_string(value: Option<&Value>) -> Option<String> {
    let trimmed = value.and_then(Value::as_str)?.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Boolean value, or `default` for anything else.
#[must_use]
pub fn boolean(value: Option<&Value>, default: bool) -> bool {
    value.and_then(Value::as_bool).unwrap_or(default)
}

/// Timestamp value normalized to UTC, or `default`.
///
/// Accepts RFC3339 strings (with or without fractional seconds) and
/// native timestamp objects (`{seconds, nanos}` or the SDK's
/// `{_seconds, _nanoseconds}`).
#[must_use]
pub fn timestamp(value: Option<&Value>, default: DateTime<Utc>) -> DateTime<Utc> {
    parse_timestamp(value).unwrap_or(default)
}

/// Timestamp value normalized to UTC; absent when missing or unparseable.
#[must_use]
pub fn optional_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    parse_timestamp(value)
}

/// Array elements, or an empty slice for anything else.
#[must_use]
pub fn list(value: Option<&Value>) -> &[Value] {
    match value {
        Some(Value::Array(items)) => items,
        _ => &[],
    }
}

/// Object entries, or `None` for anything else.
#[must_use]
pub fn object(value: Option<&Value>) -> Option<&Map<String, Value>> {
    value.and_then(Value::as_object)
}

/// Reads `key` from a value expected to be an object.
#[must_use]
pub fn field<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    object(value).and_then(|map| map.get(key))
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) if !s.is_empty() => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Object(map) => {
            let seconds = map.get("seconds").or_else(|| map.get("_seconds"))?;
            let nanos = map.get("nanos").or_else(|| map.get("_nanoseconds"));
            let nanos = nanos.and_then(integer).unwrap_or(0);
            DateTime::from_timestamp(integer(seconds)?, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

// Timestamp protos encode int64 as either a JSON number or a decimal string.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
