use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

use crate::object::Record;

/// Canonical UTC RFC 3339 form (`2024-03-01T08:00:00.000Z`).
///
/// Accepts RFC 3339 strings and epoch milliseconds. Anything else becomes `null`.
pub fn coerce_timestamp(value: &Value) -> Value {
    parse(value)
        .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .unwrap_or(Value::Null)
}

/// Read a coerced timestamp field back as a `DateTime`.
pub fn timestamp(record: &Record, field: &str) -> Option<DateTime<Utc>> {
    record.get(field).and_then(parse)
}

fn parse(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
