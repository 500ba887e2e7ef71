use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Reserved key: a hasher returning it makes the call bypass the cache.
pub const NO_CACHE: &str = "NO_CACHE";

pub struct CacheKeys;

impl CacheKeys {
    /// Memoized call: memo:{sha256 of canonical arguments}
    pub fn memo(digest: &str) -> String {
        format!("memo:{}", digest)
    }
}

/// Deterministic key for `args`.
///
/// Object keys are sorted at every depth so `{a, b}` and `{b, a}` hash alike;
/// array order is kept. Arguments that fail to serialize bypass the cache.
pub fn hash_args<A: Serialize + ?Sized>(args: &A) -> String {
    match serde_json::to_value(args) {
        Ok(value) => {
            let mut canonical = String::new();
            write_canonical(&value, &mut canonical);
            CacheKeys::memo(&hex::encode(Sha256::digest(canonical.as_bytes())))
        }
        Err(_) => NO_CACHE.to_string(),
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            out.push('{');
            for (i, (key, child)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(child, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::ser::Error as _;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_hash_is_key_order_independent() {
        let mut a = HashMap::new();
        a.insert("users", vec!["read", "update"]);
        a.insert("clients", vec!["read"]);
        let mut b = HashMap::new();
        b.insert("clients", vec!["read"]);
        b.insert("users", vec!["read", "update"]);

        assert_eq!(hash_args(&("User", &a)), hash_args(&("User", &b)));
    }

    #[test]
    fn test_hash_preserves_array_order() {
        assert_ne!(hash_args(&json!(["a", "b"])), hash_args(&json!(["b", "a"])));
    }

    #[test]
    fn test_hash_distinguishes_arguments() {
        assert_ne!(hash_args(&("User", 1)), hash_args(&("Account", 1)));
        assert!(hash_args(&"x").starts_with("memo:"));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("not serializable"))
        }
    }

    #[test]
    fn test_unserializable_arguments_bypass() {
        assert_eq!(hash_args(&Unserializable), NO_CACHE);
    }
}
