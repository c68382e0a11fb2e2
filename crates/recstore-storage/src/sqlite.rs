//! SQLite implementation of [`RecordStore`].
//!
//! [`SqliteStore`] keeps every record in one `records` table keyed by
//! (id, parent_id, collection_id), with the payload as canonical JSON text.
//! Each public operation runs in exactly one execution context obtained from
//! [`SqliteClient::connect`]; writes commit when the operation succeeds and
//! roll back otherwise. The composite primary key is the only uniqueness
//! check: a constraint violation on insert is reported as
//! [`StorageError::Conflict`].

use rusqlite::{named_params, ErrorCode};

use recstore_core::codec::{encode_payload, split_reserved};
use recstore_core::{IdGenerator, ListQuery, Payload, Record, RecordKey, Scope, Timestamp, Uuid4};

use crate::client::{ExecutionContext, SqliteClient};
use crate::config::StoreConfig;
use crate::convert::StoredRow;
use crate::error::StorageError;
use crate::schema::{MigrationReport, Migrator, SchemaExecutor};
use crate::sql::{compile_listing, QueryBuilder};
use crate::traits::RecordStore;
use crate::types::{fetch_limit, writable_scope, ListPage, UpsertPlan};

const INSERT_RECORD: &str = "INSERT INTO records (id, parent_id, collection_id, data, last_modified, deleted) \
     VALUES (:id, :parent_id, :collection_id, :data, :last_modified, :deleted)";

const SELECT_RECORD: &str = "SELECT id, parent_id, data, last_modified, deleted FROM records \
     WHERE id = :id AND parent_id = :parent_id AND collection_id = :collection_id";

const SELECT_LIVE_RECORD: &str = "SELECT id, parent_id, data, last_modified, deleted FROM records \
     WHERE id = :id AND parent_id = :parent_id AND collection_id = :collection_id AND deleted = 0";

const UPDATE_RECORD: &str = "UPDATE records SET data = :data, last_modified = :last_modified, deleted = :deleted \
     WHERE id = :id AND parent_id = :parent_id AND collection_id = :collection_id";

const DELETE_RECORD: &str =
    "DELETE FROM records WHERE id = :id AND parent_id = :parent_id AND collection_id = :collection_id";

const SELECT_SCOPE_TIMESTAMP: &str = "SELECT last_modified FROM timestamps \
     WHERE parent_id = :parent_id AND collection_id = :collection_id";

const UPSERT_SCOPE_TIMESTAMP: &str = "INSERT INTO timestamps (parent_id, collection_id, last_modified) \
     VALUES (:parent_id, :collection_id, :last_modified) \
     ON CONFLICT (parent_id, collection_id) DO UPDATE SET last_modified = excluded.last_modified";

const FLUSH: &str = "DELETE FROM records; DELETE FROM timestamps;";

/// Payload text stored for tombstones.
const EMPTY_PAYLOAD: &str = "{}";

/// SQLite-backed implementation of [`RecordStore`].
pub struct SqliteStore {
    client: SqliteClient,
    migrator: Migrator,
    max_fetch_size: usize,
    readonly: bool,
}

impl SqliteStore {
    /// Opens the store described by `config` without touching its schema.
    pub fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let client = if config.readonly {
            SqliteClient::open_readonly(&config.storage_location)?
        } else {
            SqliteClient::open(&config.storage_location)?
        };
        Ok(SqliteStore {
            client,
            migrator: Migrator::records(),
            max_fetch_size: config.max_fetch_size,
            readonly: config.readonly,
        })
    }

    /// Opens the store described by `config` and brings its schema up to
    /// date.
    pub fn from_config(config: &StoreConfig) -> Result<Self, StorageError> {
        let mut store = Self::open(config)?;
        store.initialize(false)?;
        Ok(store)
    }

    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        Self::from_config(&StoreConfig::at(path))
    }

    /// Opens an initialized in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::from_config(&StoreConfig::in_memory())
    }

    /// Replaces the migration controller, e.g. to load scripts from disk.
    pub fn with_migrator(mut self, migrator: Migrator) -> Self {
        self.migrator = migrator;
        self
    }

    pub fn location(&self) -> &str {
        self.client.location()
    }

    pub fn max_fetch_size(&self) -> usize {
        self.max_fetch_size
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn ensure_writable(&self, operation: &'static str) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly { operation });
        }
        Ok(())
    }
}

/// Reads the row at `key`; with `live_only`, tombstones count as absent.
fn read_row(
    ctx: &ExecutionContext<'_>,
    key: &RecordKey,
    live_only: bool,
) -> Result<Option<StoredRow>, StorageError> {
    let sql = if live_only {
        SELECT_LIVE_RECORD
    } else {
        SELECT_RECORD
    };
    ctx.query_row(
        sql,
        named_params! {
            ":id": key.id,
            ":parent_id": key.parent_id,
            ":collection_id": key.collection_id,
        },
        StoredRow::from_row,
    )
}

fn read_scope_timestamp(
    ctx: &ExecutionContext<'_>,
    scope: &Scope,
) -> Result<Option<Timestamp>, StorageError> {
    let value = ctx.query_row(
        SELECT_SCOPE_TIMESTAMP,
        named_params! {
            ":parent_id": scope.parent_id,
            ":collection_id": scope.collection_id,
        },
        |row| row.get::<_, i64>(0),
    )?;
    Ok(value.map(Timestamp))
}

/// Issues the next timestamp for `scope` and records it.
fn bump_timestamp(ctx: &ExecutionContext<'_>, scope: &Scope) -> Result<Timestamp, StorageError> {
    let next = Timestamp::next_after(read_scope_timestamp(ctx, scope)?);
    ctx.execute(
        UPSERT_SCOPE_TIMESTAMP,
        named_params! {
            ":parent_id": scope.parent_id,
            ":collection_id": scope.collection_id,
            ":last_modified": next.0,
        },
    )?;
    Ok(next)
}

/// Inserts a live row. A primary key violation becomes a conflict carrying
/// the row already at the key.
fn insert_row(
    ctx: &ExecutionContext<'_>,
    key: &RecordKey,
    data: &str,
    last_modified: Timestamp,
) -> Result<(), StorageError> {
    let inserted = ctx.execute(
        INSERT_RECORD,
        named_params! {
            ":id": key.id,
            ":parent_id": key.parent_id,
            ":collection_id": key.collection_id,
            ":data": data,
            ":last_modified": last_modified.0,
            ":deleted": false,
        },
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(StorageError::Sqlite(err)) if is_constraint_violation(&err) => {
            tracing::debug!(key = %key, "insert hit an existing key");
            match read_row(ctx, key, false)? {
                Some(existing) => Err(StorageError::conflict(existing.into_record()?)),
                None => Err(StorageError::Sqlite(err)),
            }
        }
        Err(err) => Err(err),
    }
}

fn overwrite_row(
    ctx: &ExecutionContext<'_>,
    key: &RecordKey,
    data: &str,
    last_modified: Timestamp,
    deleted: bool,
) -> Result<(), StorageError> {
    ctx.execute(
        UPDATE_RECORD,
        named_params! {
            ":data": data,
            ":last_modified": last_modified.0,
            ":deleted": deleted,
            ":id": key.id,
            ":parent_id": key.parent_id,
            ":collection_id": key.collection_id,
        },
    )?;
    Ok(())
}

fn remove_row(ctx: &ExecutionContext<'_>, key: &RecordKey) -> Result<usize, StorageError> {
    ctx.execute(
        DELETE_RECORD,
        named_params! {
            ":id": key.id,
            ":parent_id": key.parent_id,
            ":collection_id": key.collection_id,
        },
    )
}

/// Re-reads the row just written at `key`.
fn stored_record(ctx: &ExecutionContext<'_>, key: &RecordKey) -> Result<Record, StorageError> {
    read_row(ctx, key, false)?
        .ok_or_else(|| StorageError::not_found(key.clone()))?
        .into_record()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

impl RecordStore for SqliteStore {
    fn initialize(&mut self, dry_run: bool) -> Result<MigrationReport, StorageError> {
        if self.readonly && !dry_run {
            let plan = self.migrator.create_or_migrate(&self.client, true)?;
            if !plan.is_noop() {
                return Err(StorageError::ReadOnly {
                    operation: "initialize",
                });
            }
            return Ok(plan);
        }
        self.migrator.create_or_migrate(&self.client, dry_run)
    }

    fn installed_version(&self) -> Result<Option<u32>, StorageError> {
        self.client.installed_version()
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.ensure_writable("flush")?;
        tracing::info!(location = %self.location(), "flushing all records");
        self.client.connect(true, |ctx| ctx.execute_batch(FLUSH))
    }

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
        let data = encode_payload(&payload)?;

        self.client.connect(true, |ctx| {
            let last_modified = bump_timestamp(ctx, &scope)?;
            insert_row(ctx, &key, &data, last_modified)?;
            stored_record(ctx, &key)
        })
    }

    fn get(&self, collection_id: &str, parent_id: &str, id: &str) -> Result<Record, StorageError> {
        let key = RecordKey::new(collection_id, parent_id, id);
        self.client.connect(false, |ctx| match read_row(ctx, &key, true)? {
            Some(row) => row.into_record(),
            None => Err(StorageError::not_found(key.clone())),
        })
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
        let data = if reserved.deleted {
            EMPTY_PAYLOAD.to_string()
        } else {
            encode_payload(&payload)?
        };

        self.client.connect(true, |ctx| {
            let exists = read_row(ctx, &key, false)?.is_some();
            match UpsertPlan::probe(exists) {
                UpsertPlan::UpdateExisting => {
                    let last_modified = bump_timestamp(ctx, &scope)?;
                    overwrite_row(ctx, &key, &data, last_modified, reserved.deleted)?;
                }
                UpsertPlan::CreateNew if reserved.deleted => {
                    tracing::debug!(key = %key, "deleting a missing record, nothing to write");
                    let last_modified = Timestamp::next_after(read_scope_timestamp(ctx, &scope)?);
                    return Ok(Record::tombstone(key.id.clone(), last_modified));
                }
                UpsertPlan::CreateNew => {
                    tracing::debug!(key = %key, "no record to update, creating it");
                    let last_modified = bump_timestamp(ctx, &scope)?;
                    insert_row(ctx, &key, &data, last_modified)?;
                }
            }
            stored_record(ctx, &key)
        })
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

        self.client.connect(true, |ctx| {
            if soft {
                if read_row(ctx, &key, true)?.is_none() {
                    return Err(StorageError::not_found(key.clone()));
                }
                let last_modified = bump_timestamp(ctx, &scope)?;
                overwrite_row(ctx, &key, EMPTY_PAYLOAD, last_modified, true)?;
                return Ok(Record::tombstone(key.id.clone(), last_modified));
            }

            let row = read_row(ctx, &key, false)?
                .ok_or_else(|| StorageError::not_found(key.clone()))?;
            remove_row(ctx, &key)?;
            Ok(Record::tombstone(key.id.clone(), row.timestamp()))
        })
    }

    fn list(
        &self,
        collection_id: &str,
        parent_id: &str,
        query: &ListQuery,
    ) -> Result<ListPage, StorageError> {
        let scope = Scope::new(collection_id, parent_id);
        let limit = fetch_limit(query.limit, self.max_fetch_size);
        let compiled = compile_listing(&scope, query, limit)?;

        self.client.connect(false, |ctx| {
            let rows = ctx.query_all(
                &compiled.select.sql,
                &compiled.select.named_params(),
                StoredRow::from_row,
            )?;
            let total = ctx
                .query_row(
                    &compiled.count.sql,
                    &compiled.count.named_params(),
                    |row| row.get::<_, i64>(0),
                )?
                .unwrap_or(0);
            let rows = rows
                .into_iter()
                .map(|row| Ok((row.parent_id.clone(), row.into_record()?)))
                .collect::<Result<Vec<_>, StorageError>>()?;
            Ok(ListPage::from_fetched(
                rows,
                limit,
                &compiled.sorting,
                usize::try_from(total).unwrap_or(0),
            ))
        })
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
        let compiled = compile_listing(&Scope::new(collection_id, parent_id), &live, limit)?;

        self.client.connect(true, |ctx| {
            let mut rows = ctx.query_all(
                &compiled.select.sql,
                &compiled.select.named_params(),
                StoredRow::from_row,
            )?;
            rows.truncate(limit);

            let mut deleted = Vec::with_capacity(rows.len());
            for row in rows {
                let scope = Scope::new(collection_id, row.parent_id.as_str());
                let key = scope.key(row.id.as_str());
                if soft {
                    let last_modified = bump_timestamp(ctx, &scope)?;
                    overwrite_row(ctx, &key, EMPTY_PAYLOAD, last_modified, true)?;
                    deleted.push(Record::tombstone(row.id, last_modified));
                } else {
                    remove_row(ctx, &key)?;
                    deleted.push(Record::tombstone(row.id, Timestamp(row.last_modified)));
                }
            }
            tracing::debug!(collection_id, parent_id, count = deleted.len(), soft, "deleted records");
            Ok(deleted)
        })
    }

    fn purge_deleted(
        &mut self,
        collection_id: &str,
        parent_id: &str,
        before: Option<Timestamp>,
    ) -> Result<usize, StorageError> {
        self.ensure_writable("purge_deleted")?;
        let mut builder = QueryBuilder::new();
        builder.scope(&Scope::new(collection_id, parent_id));
        builder.push("deleted = 1");
        if let Some(before) = before {
            let bound = builder.bind(rusqlite::types::Value::Integer(before.0));
            builder.push(format!("last_modified < {}", bound));
        }
        let purge = builder.finish("DELETE FROM records", "");

        let removed = self
            .client
            .connect(true, |ctx| ctx.execute(&purge.sql, &purge.named_params()))?;
        tracing::debug!(collection_id, parent_id, removed, "purged tombstones");
        Ok(removed)
    }

    fn scope_timestamp(
        &self,
        collection_id: &str,
        parent_id: &str,
    ) -> Result<Option<Timestamp>, StorageError> {
        let mut builder = QueryBuilder::new();
        builder.scope(&Scope::new(collection_id, parent_id));
        let query = builder.finish("SELECT MAX(last_modified) FROM timestamps", "");

        let value = self.client.connect(false, |ctx| {
            ctx.query_row(&query.sql, &query.named_params(), |row| {
                row.get::<_, Option<i64>>(0)
            })
        })?;
        Ok(value.flatten().map(Timestamp))
    }
}
