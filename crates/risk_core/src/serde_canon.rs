//! Canonical JSON serialization for model hashing and schema fingerprints
//!
//! Object keys are sorted recursively and no whitespace is emitted, so two
//! artifacts describing the same ensemble always hash identically.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json_value = serde_json::to_value(value)?;
    serde_json::to_string(&canonicalize_value(&json_value))
}

fn canonicalize_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<_, _> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize_value(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(canonicalize_value).collect()),
        other => other.clone(),
    }
}

/// Blake3 digest of the canonical JSON representation
pub fn hash_canonical<T: Serialize>(value: &T) -> serde_json::Result<[u8; 32]> {
    let json = to_canonical_json(value)?;
    Ok(*blake3::hash(json.as_bytes()).as_bytes())
}

/// Blake3 digest of the canonical JSON representation as lowercase hex
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> serde_json::Result<String> {
    Ok(hex::encode(hash_canonical(value)?))
}
