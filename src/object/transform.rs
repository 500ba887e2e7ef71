//! Pure tree rewrites over JSON values.
//!
//! Every function here takes the input by reference and builds a new tree.
//! Traversal is pre-order: a node is offered to the callback before its
//! children, and a replacement value is itself traversed.

use serde_json::{Map, Value};

/// Position of a value inside the tree being rewritten.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    path: &'a [String],
}

impl<'a> Node<'a> {
    /// The object key (or array index) this value sits under. `None` at the root.
    pub fn key(&self) -> Option<&'a str> {
        self.path.last().map(String::as_str)
    }

    /// Full path from the root, one segment per level.
    pub fn path(&self) -> &'a [String] {
        self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

/// Rename every object key in the tree with `key_fn(key, value)`.
///
/// Array elements are traversed but indexes are never renamed. When two keys
/// rename to the same name the later one (in iteration order) wins.
pub fn rewrite_keys<K>(value: &Value, mut key_fn: K) -> Value
where
    K: FnMut(&str, &Value) -> String,
{
    rewrite_keys_with(value, &mut key_fn, |_, value| value)
}

/// Like [`rewrite_keys`], but also passes each value through
/// `value_fn(new_key, value)` before descending into it.
pub fn rewrite_keys_with<K, V>(value: &Value, mut key_fn: K, mut value_fn: V) -> Value
where
    K: FnMut(&str, &Value) -> String,
    V: FnMut(&str, Value) -> Value,
{
    rewrite_inner(value, &mut key_fn, &mut value_fn)
}

fn rewrite_inner<K, V>(value: &Value, key_fn: &mut K, value_fn: &mut V) -> Value
where
    K: FnMut(&str, &Value) -> String,
    V: FnMut(&str, Value) -> Value,
{
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                let new_key = key_fn(key, child);
                let replaced = value_fn(&new_key, child.clone());
                let rewritten = rewrite_inner(&replaced, key_fn, value_fn);
                out.insert(new_key, rewritten);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| rewrite_inner(item, key_fn, value_fn))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Visit every node, replacing it when `f` returns `Some`.
pub fn visit<F>(value: &Value, mut f: F) -> Value
where
    F: FnMut(Node<'_>, &Value) -> Option<Value>,
{
    let mut path = Vec::new();
    visit_inner(value, &mut path, &mut f)
}

fn visit_inner<F>(value: &Value, path: &mut Vec<String>, f: &mut F) -> Value
where
    F: FnMut(Node<'_>, &Value) -> Option<Value>,
{
    let replaced = f(Node { path: path.as_slice() }, value);
    let current = replaced.as_ref().unwrap_or(value);

    match current {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, child) in map {
                path.push(key.clone());
                out.insert(key.clone(), visit_inner(child, path, f));
                path.pop();
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                path.push(index.to_string());
                out.push(visit_inner(item, path, f));
                path.pop();
            }
            Value::Array(out)
        }
        other => other.clone(),
    }
}
