use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a public id (hex encoded to 24 chars)
const PUBLIC_ID_BYTES: usize = 12;

/// Width of a public id in characters
pub const PUBLIC_ID_LEN: usize = PUBLIC_ID_BYTES * 2;

/// Nested objects of a backend notification that carry their own ids
const NESTED_ID_PATHS: [&str; 3] = ["object", "nearby", "faraway"];

/// Derive the public-facing id for a persistent entity id.
///
/// SHA-256 truncated to 12 bytes. An empty entity id yields the empty
/// sentinel so callers can tell "no identity" apart from a real one.
pub fn redact(entity_id: &str) -> String {
    if entity_id.is_empty() {
        return String::new();
    }
    let digest = Sha256::digest(entity_id.as_bytes());
    hex::encode(&digest[..PUBLIC_ID_BYTES])
}

/// Replace the `id` of a feature object with its public id.
///
/// Other fields are untouched. Non-object input is returned as-is.
pub fn redact_feature(mut feature: Value) -> Value {
    redact_id_field(&mut feature, true);
    feature
}

/// Redact every id-bearing path of a backend notification payload.
///
/// Covers the acting `id`, `object.id` and the counterpart ids under
/// `nearby` / `faraway` (both the sub-object and its `object`).
pub fn redact_event(mut event: Value) -> Value {
    if !event.is_object() {
        return event;
    }
    redact_id_field(&mut event, false);
    for path in NESTED_ID_PATHS {
        if let Some(nested) = event.get_mut(path) {
            if !nested.is_object() {
                continue;
            }
            redact_id_field(nested, false);
            if let Some(object) = nested.get_mut("object") {
                redact_id_field(object, false);
            }
        }
    }
    event
}

// Only features gain an empty id when missing; events and bare
// geometries without an id are left alone.
fn redact_id_field(value: &mut Value, insert_missing: bool) {
    let Some(map) = value.as_object_mut() else {
        return;
    };
    let raw = match map.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => String::new(),
        None if insert_missing => String::new(),
        None => return,
    };
    map.insert("id".to_string(), Value::String(redact(&raw)));
}
