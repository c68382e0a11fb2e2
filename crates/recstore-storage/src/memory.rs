//! In-memory implementation of [`RecordStore`].
//!
//! [`InMemoryStore`] is a first-class backend for tests, ephemeral sessions,
//! and anywhere persistence isn't needed. It keeps records in a BTreeMap keyed
//! by [`RecordKey`] with identical semantics to the SQLite backend: the same
//! timestamp rule, the same tombstone handling, and listings evaluated with
//! the reference implementations in `recstore_core::query`.

use std::collections::{BTreeMap, HashMap};

use recstore_core::codec::split_reserved;
use recstore_core::query::{compare_listed, effective_sorting};
use recstore_core::{
    IdGenerator, ListQuery, Listed, Payload, Record, RecordKey, Scope, Timestamp, Uuid4,
};

use crate::config::{check_fetch_size, StoreConfig, DEFAULT_MAX_FETCH_SIZE};
use crate::error::StorageError;
use crate::schema::{MigrationReport, MigrationStep, SCHEMA_VERSION};
use crate::sql::check_query;
use crate::traits::RecordStore;
use crate::types::{fetch_limit, writable_scope, ListPage, UpsertPlan};

/// In-memory storage backend.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    records: BTreeMap<RecordKey, Record>,
    /// Highest timestamp issued per scope; survives hard deletes.
    timestamps: HashMap<Scope, Timestamp>,
    schema_version: Option<u32>,
    max_fetch_size: usize,
    readonly: bool,
}

impl InMemoryStore {
    /// Creates a new empty, initialized in-memory store.
    pub fn new() -> Self {
        InMemoryStore {
            records: BTreeMap::new(),
            timestamps: HashMap::new(),
            schema_version: Some(SCHEMA_VERSION),
            max_fetch_size: DEFAULT_MAX_FETCH_SIZE,
            readonly: false,
        }
    }

    /// Creates an empty store honouring the fetch cap and readonly flag of
    /// `config`. Its schema is absent until [`RecordStore::initialize`] runs.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StorageError> {
        config.validate()?;
        Ok(InMemoryStore {
            records: BTreeMap::new(),
            timestamps: HashMap::new(),
            schema_version: None,
            max_fetch_size: config.max_fetch_size,
            readonly: config.readonly,
        })
    }

    pub fn with_max_fetch_size(mut self, max_fetch_size: usize) -> Result<Self, StorageError> {
        self.max_fetch_size = check_fetch_size(max_fetch_size)?;
        Ok(self)
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    fn ensure_writable(&self, operation: &'static str) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly { operation });
        }
        Ok(())
    }

    /// Issues the next timestamp for `scope` and records it.
    fn bump_timestamp(&mut self, scope: &Scope) -> Timestamp {
        let next = Timestamp::next_after(self.timestamps.get(scope).copied());
        self.timestamps.insert(scope.clone(), next);
        next
    }

    /// Records in scope passing the query's tombstone rule and filters,
    /// sorted, with the cursor applied.
    fn select(
        &self,
        collection_id: &str,
        parent_id: &str,
        query: &ListQuery,
    ) -> Result<Selection, StorageError> {
        let sorting = effective_sorting(&query.sorting);
        check_query(query, &sorting)?;
        let scope = Scope::new(collection_id, parent_id);

        let matching: Vec<(&RecordKey, &Record)> = self
            .records
            .iter()
            .filter(|(key, _)| scope.contains(&key.collection_id, &key.parent_id))
            .filter(|(_, record)| query.matches(record))
            .collect();
        let total = matching.len();

        let mut rows: Vec<(RecordKey, Record)> = matching
            .into_iter()
            .filter(|(key, record)| {
                query.cursor.as_ref().map_or(true, |cursor| {
                    cursor.precedes(Listed::new(&key.parent_id, record), &sorting)
                })
            })
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect();
        rows.sort_by(|(ka, a), (kb, b)| {
            compare_listed(
                Listed::new(&ka.parent_id, a),
                Listed::new(&kb.parent_id, b),
                &sorting,
            )
        });

        Ok(Selection {
            rows,
            total,
            sorting,
        })
    }
}

/// Result of [`InMemoryStore::select`].
struct Selection {
    rows: Vec<(RecordKey, Record)>,
    total: usize,
    sorting: Vec<recstore_core::Sort>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryStore {
    // -------------------------------------------------------------------
    // Store-level operations
    // -------------------------------------------------------------------

    fn initialize(&mut self, dry_run: bool) -> Result<MigrationReport, StorageError> {
        let mut steps = Vec::new();
        let start = match self.schema_version {
            None => {
                steps.push(MigrationStep::CreateSchema { version: 0 });
                0
            }
            Some(version) => version,
        };
        for from in start..SCHEMA_VERSION {
            steps.push(MigrationStep::Migrate { from, to: from + 1 });
        }
        let target = self.schema_version.map_or(SCHEMA_VERSION, |v| v.max(SCHEMA_VERSION));

        if !steps.is_empty() && !dry_run {
            self.ensure_writable("initialize")?;
            self.schema_version = Some(target);
        }
        Ok(MigrationReport {
            dry_run,
            steps,
            version: Some(target),
        })
    }

    fn installed_version(&self) -> Result<Option<u32>, StorageError> {
        Ok(self.schema_version)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.ensure_writable("flush")?;
        self.records.clear();
        self.timestamps.clear();
        Ok(())
    }

    // -------------------------------------------------------------------
    // Record CRUD
    // -------------------------------------------------------------------

    fn create(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        record: Payload,
        id_generator: Option<&dyn IdGenerator>,
    ) -> Result<Record, StorageError> {
        self.ensure_writable("create")?;
        let scope = writable_scope(collection_id, parent_id)?;
        let (reserved, payload) = split_reserved(record)?;
        let id = match reserved.id {
            Some(id) => id,
            None => id_generator.unwrap_or(&Uuid4).generate(),
        };
        let key = scope.key(id);

        if let Some(existing) = self.records.get(&key) {
            return Err(StorageError::conflict(existing.clone()));
        }
        let last_modified = self.bump_timestamp(&scope);
        let stored = Record::new(key.id.clone(), last_modified, payload);
        self.records.insert(key, stored.clone());
        Ok(stored)
    }

    fn get(&self, collection_id: &str, parent_id: &str, id: &str) -> Result<Record, StorageError> {
        let key = RecordKey::new(collection_id, parent_id, id);
        match self.records.get(&key) {
            Some(record) if !record.deleted => Ok(record.clone()),
            _ => Err(StorageError::not_found(key)),
        }
    }

    fn update(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        id: &str,
        record: Payload,
    ) -> Result<Record, StorageError> {
        self.ensure_writable("update")?;
        let scope = writable_scope(collection_id, parent_id)?;
        let key = scope.key(id);
        let (reserved, payload) = split_reserved(record)?;

        let plan = UpsertPlan::probe(self.records.contains_key(&key));
        if plan == UpsertPlan::CreateNew {
            if reserved.deleted {
                tracing::debug!(key = %key, "deleting a missing record, nothing to write");
                let last_modified = Timestamp::next_after(self.timestamps.get(&scope).copied());
                return Ok(Record::tombstone(id, last_modified));
            }
            tracing::debug!(key = %key, "no record to update, creating it");
        }

        let last_modified = self.bump_timestamp(&scope);
        let stored = if reserved.deleted {
            Record::tombstone(id, last_modified)
        } else {
            Record::new(id, last_modified, payload)
        };
        self.records.insert(key, stored.clone());
        Ok(stored)
    }

    fn delete(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        id: &str,
        soft: bool,
    ) -> Result<Record, StorageError> {
        self.ensure_writable("delete")?;
        let scope = writable_scope(collection_id, parent_id)?;
        let key = scope.key(id);

        if soft {
            match self.records.get(&key) {
                Some(record) if !record.deleted => {}
                _ => return Err(StorageError::not_found(key)),
            }
            let tombstone = Record::tombstone(id, self.bump_timestamp(&scope));
            self.records.insert(key, tombstone.clone());
            return Ok(tombstone);
        }

        match self.records.remove(&key) {
            Some(removed) => Ok(Record::tombstone(id, removed.last_modified)),
            None => Err(StorageError::not_found(key)),
        }
    }

    // -------------------------------------------------------------------
    // Listing and bulk operations
    // -------------------------------------------------------------------

    fn list(
        &self,
        collection_id: &str,
        parent_id: &str,
        query: &ListQuery,
    ) -> Result<ListPage, StorageError> {
        let limit = fetch_limit(query.limit, self.max_fetch_size);
        let selection = self.select(collection_id, parent_id, query)?;
        let rows = selection
            .rows
            .into_iter()
            .take(limit.saturating_add(1))
            .map(|(key, record)| (key.parent_id, record))
            .collect();
        Ok(ListPage::from_fetched(
            rows,
            limit,
            &selection.sorting,
            selection.total,
        ))
    }

    fn delete_all(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        query: &ListQuery,
        soft: bool,
    ) -> Result<Vec<Record>, StorageError> {
        self.ensure_writable("delete_all")?;
        let mut live = query.clone();
        live.include_deleted = false;
        let limit = fetch_limit(live.limit, self.max_fetch_size);
        let selection = self.select(collection_id, parent_id, &live)?;

        let mut deleted = Vec::new();
        for (key, record) in selection.rows.into_iter().take(limit) {
            if soft {
                let tombstone = Record::tombstone(record.id, self.bump_timestamp(&key.scope()));
                self.records.insert(key, tombstone.clone());
                deleted.push(tombstone);
            } else {
                self.records.remove(&key);
                deleted.push(Record::tombstone(record.id, record.last_modified));
            }
        }
        Ok(deleted)
    }

    fn purge_deleted(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        before: Option<Timestamp>,
    ) -> Result<usize, StorageError> {
        self.ensure_writable("purge_deleted")?;
        let scope = Scope::new(collection_id, parent_id);
        let before_len = self.records.len();
        self.records.retain(|key, record| {
            let purge = scope.contains(&key.collection_id, &key.parent_id)
                && record.deleted
                && before.map_or(true, |before| record.last_modified < before);
            !purge
        });
        Ok(before_len - self.records.len())
    }

    fn scope_timestamp(
        &self,
        collection_id: &str,
        parent_id: &str,
    ) -> Result<Option<Timestamp>, StorageError> {
        let scope = Scope::new(collection_id, parent_id);
        Ok(self
            .timestamps
            .iter()
            .filter(|(written, _)| scope.contains(&written.collection_id, &written.parent_id))
            .map(|(_, timestamp)| *timestamp)
            .max())
    }
}
