//! Storage error types for recstore-storage.
//!
//! [`StorageError`] covers every failure a store operation can surface:
//! missing keys, unicity conflicts, readonly violations, migration failures,
//! malformed queries, and engine errors. Engine errors are carried
//! transparently so callers see the underlying SQLite error unchanged.

use recstore_core::{CoreError, Record, RecordKey};
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No live record exists at the key.
    #[error("record not found: {key}")]
    RecordNotFound { key: RecordKey },

    /// A record (live or tombstoned) already exists at the key.
    #[error("unicity constraint violated on '{field}': record {} already exists", existing.id)]
    Conflict {
        field: String,
        existing: Box<Record>,
    },

    /// A mutating call was made against a readonly store.
    #[error("store is readonly: {operation} refused")]
    ReadOnly { operation: &'static str },

    /// The installed schema version disagreed with the expected one
    /// mid-migration. Fatal: the store needs manual inspection.
    #[error("{name} schema: expected version {expected}, found {}", found.map_or_else(|| "none".to_string(), |v| v.to_string()))]
    MigrationVersionMismatch {
        name: String,
        expected: u32,
        found: Option<u32>,
    },

    /// A schema or migration script could not be found.
    #[error("missing schema script: {name}")]
    MigrationScriptMissing { name: String },

    /// A listing query could not be applied.
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// Configuration values could not be interpreted.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// An incoming record or stored row could not be interpreted.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading a script from disk failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The SQLite engine reported an error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    pub(crate) fn not_found(key: RecordKey) -> Self {
        StorageError::RecordNotFound { key }
    }

    pub(crate) fn conflict(existing: Record) -> Self {
        StorageError::Conflict {
            field: recstore_core::record::ID_FIELD.to_string(),
            existing: Box::new(existing),
        }
    }

    /// Returns true if this error means "no such live record".
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::RecordNotFound { .. })
    }
}
