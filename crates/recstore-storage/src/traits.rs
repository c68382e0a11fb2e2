//! The [`RecordStore`] trait defining the storage contract for records.
//!
//! Two groups of operations:
//! - **Record operations** (`create`, `get`, `update`, `delete`, `list`)
//!   address one (collection, parent) scope at a time. Writes require a
//!   literal parent; reads and purges also accept wildcard parent patterns.
//! - **Store operations** (`initialize`, `installed_version`, `flush`) act on
//!   the store as a whole.
//!
//! Both backends (InMemoryStore, SqliteStore) implement this trait with
//! identical observable semantics, so they are fully swappable.

use recstore_core::{IdGenerator, ListQuery, Payload, Record, Timestamp};

use crate::error::StorageError;
use crate::schema::MigrationReport;
use crate::types::ListPage;

/// The storage contract for versioned records.
///
/// The trait is synchronous: every call runs to completion on the calling
/// thread inside one execution context.
pub trait RecordStore {
    // -------------------------------------------------------------------
    // Store-level operations
    // -------------------------------------------------------------------

    /// Creates or migrates the schema to the version this build expects.
    ///
    /// With `dry_run` nothing is persisted; the report lists the steps that
    /// would run.
    fn initialize(&mut self, dry_run: bool) -> Result<MigrationReport, StorageError>;

    /// Installed schema version, `None` if the schema was never created.
    fn installed_version(&self) -> Result<Option<u32>, StorageError>;

    /// Removes every record and every scope timestamp.
    fn flush(&mut self) -> Result<(), StorageError>;

    // -------------------------------------------------------------------
    // Record CRUD
    // -------------------------------------------------------------------

    /// Stores a new record in the scope.
    ///
    /// `record` is the flat external shape. Its `id`, if present, is used as
    /// is; otherwise one is drawn from `id_generator` (UUIDv4 by default).
    /// Fails with [`StorageError::Conflict`] if the key is taken by a live
    /// record or a tombstone.
    fn create(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        record: Payload,
        id_generator: Option<&dyn IdGenerator>,
    ) -> Result<Record, StorageError>;

    /// Returns the live record at the key.
    fn get(&self, collection_id: &str, parent_id: &str, id: &str) -> Result<Record, StorageError>;

    /// Replaces the payload of the record at the key, creating it if absent.
    ///
    /// Reserved fields in `record` are stripped; a `deleted: true` marker
    /// turns the write into a tombstone. Updating a key with no row and a
    /// deleted marker persists nothing and returns a tombstone.
    fn update(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        id: &str,
        record: Payload,
    ) -> Result<Record, StorageError>;

    /// Deletes the live record at the key.
    ///
    /// Soft deletion keeps a tombstone with a fresh `last_modified`; hard
    /// deletion removes the row and reports its last `last_modified`.
    fn delete(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        id: &str,
        soft: bool,
    ) -> Result<Record, StorageError>;

    // -------------------------------------------------------------------
    // Listing and bulk operations
    // -------------------------------------------------------------------

    /// Returns one page of records matching `query`, plus the total count.
    fn list(
        &self,
        collection_id: &str,
        parent_id: &str,
        query: &ListQuery,
    ) -> Result<ListPage, StorageError>;

    /// Deletes every live record matching the query's filters, up to the
    /// fetch cap, returning one tombstone per deleted record.
    fn delete_all(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        query: &ListQuery,
        soft: bool,
    ) -> Result<Vec<Record>, StorageError>;

    /// Physically removes tombstones, optionally only those modified before
    /// `before`. Returns the number removed.
    fn purge_deleted(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        before: Option<Timestamp>,
    ) -> Result<usize, StorageError>;

    /// Highest timestamp issued in the scope, `None` if never written.
    fn scope_timestamp(
        &self,
        collection_id: &str,
        parent_id: &str,
    ) -> Result<Option<Timestamp>, StorageError>;
}
