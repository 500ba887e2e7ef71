//! Path-based value access on JSON objects.
//!
//! Paths use `.` as separator. A segment addresses an object key, or an array
//! index when the current value is an array. A key that literally contains dots
//! (`"identities.connection"`) is matched as a whole before the path is split.

use serde_json::{Map, Value};

use super::Record;

/// Read the value at `path`. Returns `None` when any segment is absent.
///
/// An empty path addresses `value` itself.
pub fn get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }

    if let Value::Object(map) = value
        && let Some(direct) = map.get(path)
    {
        return Some(direct);
    }

    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `new_value` at `path`, creating intermediate objects as needed.
///
/// Intermediates that exist but are not objects are replaced by objects.
pub fn set(target: &mut Record, path: &str, new_value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = target;

    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), new_value);
            return;
        }

        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(map) = slot else {
            return;
        };
        current = map;
    }
}

/// Copy values from `source` into a new record according to `(from, to)` pairs.
///
/// Pairs with an empty side are skipped, and absent source values are never
/// written. With `merge_unmapped`, top-level source keys that no pair consumed
/// are carried over; mapped values win on collision (objects merge deeply).
pub fn extract<'a, I>(source: &Record, pairs: I, merge_unmapped: bool) -> Record
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let root = Value::Object(source.clone());
    let mut mapped = Record::new();
    let mut consumed = Vec::new();

    for (from, to) in pairs {
        if from.is_empty() || to.is_empty() {
            continue;
        }
        if let Some(value) = get(&root, from) {
            set(&mut mapped, to, value.clone());
            consumed.push(from);
        }
    }

    if !merge_unmapped {
        return mapped;
    }

    let mut result: Record = source
        .iter()
        .filter(|(key, _)| !consumed.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    merge_deep(&mut result, &mapped);
    result
}

/// Deep-merge `source` into `target`. Nested objects merge key by key; any
/// other value in `source` replaces the one in `target`.
pub fn merge_deep(target: &mut Record, source: &Record) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_deep(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
