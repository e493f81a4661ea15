//! Canonical JSON serialization for state fingerprinting.
//!
//! Two values that are equal as mappings (same keys and values, any
//! insertion order) and equal as sequences (same order) always produce
//! the same canonical string. Object keys are emitted in lexicographic
//! order; array element order is preserved.

use serde::Serialize;
use serde_json::Value;

/// Nesting bound for the canonical writer. Ownership makes reference
/// cycles unrepresentable; runaway depth is the remaining hazard.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CanonicalError {
    #[error("unsupported value: {0}")]
    Unsupported(String),
    #[error("nesting exceeds {MAX_DEPTH} levels")]
    DepthExceeded,
}

/// Render `value` as canonical JSON text.
///
/// Values that cannot be represented as plain JSON (maps with composite
/// keys, for instance) yield [`CanonicalError::Unsupported`]. Non-finite
/// floats render as the null literal.
pub fn to_canonical_string<T: Serialize>(value: &T) -> Result<String, CanonicalError> {
    let value =
        serde_json::to_value(value).map_err(|e| CanonicalError::Unsupported(e.to_string()))?;
    let mut out = String::new();
    write_value(&value, &mut out, 0)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut String, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::DepthExceeded);
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out, depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // serde_json already stores object keys sorted, but the
            // guarantee must not depend on a feature flag.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();

            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out)?;
                out.push(':');
                write_value(&map[*key], out, depth + 1)?;
            }
            out.push('}');
        }
    }

    Ok(())
}

fn write_string(s: &str, out: &mut String) -> Result<(), CanonicalError> {
    let escaped =
        serde_json::to_string(s).map_err(|e| CanonicalError::Unsupported(e.to_string()))?;
    out.push_str(&escaped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_key_order_is_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap();
        assert_eq!(
            to_canonical_string(&a).unwrap(),
            to_canonical_string(&b).unwrap()
        );
        assert_eq!(
            to_canonical_string(&a).unwrap(),
            r#"{"a":{"x":3,"y":2},"b":1}"#
        );
    }

    #[test]
    fn test_array_order_is_significant() {
        assert_ne!(
            to_canonical_string(&json!([1, 2, 3])).unwrap(),
            to_canonical_string(&json!([3, 2, 1])).unwrap()
        );
    }

    #[test]
    fn test_missing_field_equals_absent_field() {
        #[derive(serde::Serialize)]
        struct WithOption {
            a: u32,
            #[serde(skip_serializing_if = "Option::is_none")]
            b: Option<u32>,
        }

        let sparse = to_canonical_string(&WithOption { a: 1, b: None }).unwrap();
        assert_eq!(sparse, to_canonical_string(&json!({ "a": 1 })).unwrap());
    }

    #[test]
    fn test_null_array_element_is_preserved() {
        let rendered = to_canonical_string(&json!([1, null, 2])).unwrap();
        assert_eq!(rendered, "[1,null,2]");
    }

    #[test]
    fn test_non_finite_renders_as_null() {
        assert_eq!(to_canonical_string(&f64::NAN).unwrap(), "null");
        assert_eq!(to_canonical_string(&f64::INFINITY).unwrap(), "null");
    }

    #[test]
    fn test_composite_map_key_is_unsupported() {
        let mut weird: HashMap<(u8, u8), u8> = HashMap::new();
        weird.insert((1, 2), 3);
        assert!(matches!(
            to_canonical_string(&weird),
            Err(CanonicalError::Unsupported(_))
        ));
    }

    #[test]
    fn test_depth_guard() {
        let mut nested = json!(1);
        for _ in 0..(MAX_DEPTH + 2) {
            nested = json!([nested]);
        }
        assert_eq!(
            to_canonical_string(&nested),
            Err(CanonicalError::DepthExceeded)
        );
    }

    #[test]
    fn test_string_escaping() {
        let rendered = to_canonical_string(&json!({ "a\"b": "c\nd" })).unwrap();
        assert_eq!(rendered, r#"{"a\"b":"c\nd"}"#);
    }

    proptest! {
        #[test]
        fn prop_insertion_order_never_matters(
            entries in proptest::collection::btree_map("[a-z]{1,8}", 0u64..1000, 1..8),
            seed in 0usize..64,
        ) {
            let pairs: Vec<(String, u64)> = entries.into_iter().collect();
            let mut shuffled = pairs.clone();
            let len = shuffled.len();
            shuffled.rotate_left(seed % len);

            let forward: serde_json::Map<String, Value> = pairs
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();
            let rotated: serde_json::Map<String, Value> = shuffled
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect();

            prop_assert_eq!(
                to_canonical_string(&Value::Object(forward)).unwrap(),
                to_canonical_string(&Value::Object(rotated)).unwrap()
            );
        }
    }
}
