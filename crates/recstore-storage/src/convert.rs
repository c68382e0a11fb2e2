//! Row shape for the SQLite backend.
//!
//! [`StoredRow`] is one `records` row as read back from SQLite; it turns
//! into a [`Record`] by decoding the payload text. Tombstones decode to an
//! empty payload whatever their stored data.

use rusqlite::Row;

use recstore_core::codec::decode_payload;
use recstore_core::{Payload, Record, Timestamp};

use crate::error::StorageError;

/// One persisted record row.
#[derive(Debug, Clone)]
pub struct StoredRow {
    pub id: String,
    pub parent_id: String,
    pub data: String,
    pub last_modified: i64,
    pub deleted: bool,
}

impl StoredRow {
    /// Maps a row selected with [`crate::sql::ROW_COLUMNS`].
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredRow {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            data: row.get(2)?,
            last_modified: row.get(3)?,
            deleted: row.get(4)?,
        })
    }

    pub fn timestamp(&self) -> Timestamp {
        Timestamp(self.last_modified)
    }

    pub fn into_record(self) -> Result<Record, StorageError> {
        if self.deleted {
            return Ok(Record::tombstone(self.id, Timestamp(self.last_modified)));
        }
        let payload: Payload = decode_payload(&self.data)?;
        Ok(Record::new(self.id, Timestamp(self.last_modified), payload))
    }
}
