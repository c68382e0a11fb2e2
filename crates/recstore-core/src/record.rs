//! The externally visible record and its bookkeeping fields.
//!
//! A [`Record`] is presented to callers as one flat JSON object: the payload
//! fields plus the reserved [`ID_FIELD`], [`MODIFIED_FIELD`] and, for
//! tombstones, [`DELETED_FIELD`]. Internally the reserved fields are kept
//! apart from the payload so they can be stored in dedicated columns.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::codec::lookup_path;
use crate::query::Field;

/// Flat mapping of payload field names to JSON values.
pub type Payload = serde_json::Map<String, Value>;

/// Record identifier field.
pub const ID_FIELD: &str = "id";
/// Modification timestamp field, also the default cursor field.
pub const MODIFIED_FIELD: &str = "last_modified";
/// Tombstone marker field.
pub const DELETED_FIELD: &str = "deleted";
/// Field names that never appear inside a stored payload.
pub const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, MODIFIED_FIELD, DELETED_FIELD];

/// Modification token: milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Timestamp(millis)
    }

    /// The timestamp to issue for a write that follows `previous`.
    ///
    /// Always strictly greater than `previous`, even if the clock stalled or
    /// went backwards.
    pub fn next_after(previous: Option<Timestamp>) -> Self {
        let now = Timestamp::now();
        match previous {
            Some(prev) if prev.0 >= now.0 => Timestamp(prev.0 + 1),
            _ => now,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored record as seen by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub last_modified: Timestamp,
    pub deleted: bool,
    /// Payload fields. Always empty for tombstones, never contains reserved
    /// field names.
    pub payload: Payload,
}

impl Record {
    /// A live record.
    pub fn new(id: impl Into<String>, last_modified: Timestamp, payload: Payload) -> Self {
        Record {
            id: id.into(),
            last_modified,
            deleted: false,
            payload,
        }
    }

    /// The minimal shape returned for deletions: id, timestamp, deleted marker.
    pub fn tombstone(id: impl Into<String>, last_modified: Timestamp) -> Self {
        Record {
            id: id.into(),
            last_modified,
            deleted: true,
            payload: Payload::new(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.deleted
    }

    /// Flattens into the external shape, injecting the reserved fields.
    ///
    /// The deleted marker is only present on tombstones.
    pub fn to_object(&self) -> Payload {
        let mut object = self.payload.clone();
        object.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        object.insert(MODIFIED_FIELD.to_string(), Value::from(self.last_modified.0));
        if self.deleted {
            object.insert(DELETED_FIELD.to_string(), Value::Bool(true));
        }
        object
    }

    /// Value of `field` on this record, `Null` when the payload lacks it.
    pub fn field_value(&self, field: &Field) -> Value {
        match field {
            Field::Id => Value::String(self.id.clone()),
            Field::LastModified => Value::from(self.last_modified.0),
            Field::Deleted => Value::Bool(self.deleted),
            Field::Data(path) => lookup_path(&self.payload, path)
                .cloned()
                .unwrap_or(Value::Null),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_object().serialize(serializer)
    }
}
