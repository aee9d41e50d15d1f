//! Canonical JSON serialization and content hashing.
//!
//! The canonical form is compact JSON (no insignificant whitespace) with object
//! keys sorted by byte order at every depth. Arrays keep their order. Any
//! verifier holding the same logical content can reproduce the bytes and hence
//! the SHA-256 digest.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{ComplianceError, ComplianceResult};

/// Return a copy of `value` with every object's keys inserted in sorted order.
///
/// Output is sorted whether or not `serde_json` is built with `preserve_order`.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize `value` into canonical bytes.
pub fn to_canonical_bytes(value: &Value) -> ComplianceResult<Vec<u8>> {
    serde_json::to_vec(&canonicalize(value)).map_err(|e| {
        ComplianceError::serialization(format!("canonical serialization failed: {}", e))
    })
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_depth() {
        let v = json!({"b": 1, "a": {"z": true, "m": [ {"y": 1, "x": 2} ]}});
        let bytes = to_canonical_bytes(&v).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"m":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let a = json!({"type": "t", "account": "1", "region": "r"});
        let mut map = Map::new();
        map.insert("region".to_string(), json!("r"));
        map.insert("type".to_string(), json!("t"));
        map.insert("account".to_string(), json!("1"));
        let b = Value::Object(map);
        assert_eq!(
            to_canonical_bytes(&a).unwrap(),
            to_canonical_bytes(&b).unwrap()
        );
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
