//! Payload codec between the flat external shape and the persisted shape.
//!
//! The persisted shape keeps `id`, `last_modified` and `deleted` in their own
//! columns and everything else in one opaque JSON text. Encoding is canonical
//! (object keys sorted at every depth), so two payloads with the same fields
//! encode identically regardless of insertion order.

use serde_json::Value;

use crate::error::CoreError;
use crate::record::{Payload, DELETED_FIELD, ID_FIELD, MODIFIED_FIELD, RESERVED_FIELDS};

/// Reserved values pulled out of an incoming record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reserved {
    /// Caller-supplied id, if any.
    pub id: Option<String>,
    /// True only if the caller explicitly marked the record deleted.
    pub deleted: bool,
}

/// Splits an incoming flat object into its reserved values and the payload.
///
/// `last_modified` is always assigned by the store, so a caller-supplied
/// value is discarded.
pub fn split_reserved(mut object: Payload) -> Result<(Reserved, Payload), CoreError> {
    let id = match object.remove(ID_FIELD) {
        None => None,
        Some(Value::String(id)) => Some(id),
        Some(_) => {
            return Err(CoreError::InvalidReservedField {
                field: ID_FIELD,
                expected: "a string",
            })
        }
    };
    object.remove(MODIFIED_FIELD);
    let deleted = match object.remove(DELETED_FIELD) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => flag,
        Some(_) => {
            return Err(CoreError::InvalidReservedField {
                field: DELETED_FIELD,
                expected: "a boolean",
            })
        }
    };
    Ok((Reserved { id, deleted }, object))
}

/// Interprets an arbitrary JSON value as a flat record object.
pub fn object_from_value(value: Value) -> Result<Payload, CoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::InvalidRecord {
            reason: format!("expected a JSON object, got {}", kind_of(&other)),
        }),
    }
}

/// Serializes a payload to canonical JSON text, skipping reserved fields.
pub fn encode_payload(payload: &Payload) -> Result<String, serde_json::Error> {
    let mut keys: Vec<&String> = payload
        .keys()
        .filter(|k| !RESERVED_FIELDS.contains(&k.as_str()))
        .collect();
    keys.sort();
    let mut canonical = Payload::new();
    for key in keys {
        canonical.insert(key.clone(), canonicalize(&payload[key.as_str()]));
    }
    serde_json::to_string(&Value::Object(canonical))
}

/// Parses stored payload text back into a payload, dropping any reserved
/// field names that may have been persisted by older writers.
pub fn decode_payload(data: &str) -> Result<Payload, CoreError> {
    let value: Value = serde_json::from_str(data).map_err(|e| CoreError::InvalidRecord {
        reason: format!("stored payload is not valid JSON: {}", e),
    })?;
    let mut payload = object_from_value(value)?;
    for field in RESERVED_FIELDS {
        payload.remove(field);
    }
    Ok(payload)
}

/// Canonical JSON text of a single value.
pub fn canonical_text(value: &Value) -> String {
    // Serializing a `Value` cannot fail: every map key is already a string.
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Follows a dotted path through nested objects.
pub fn lookup_path<'a>(payload: &'a Payload, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = payload.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Rebuilds objects with sorted keys at every depth.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Payload::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
