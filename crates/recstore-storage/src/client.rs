//! Execution context provider for the SQLite backend.
//!
//! [`SqliteClient`] owns the connection and hands out one
//! [`ExecutionContext`] per logical operation via [`SqliteClient::connect`].
//! Each context is a transaction: when the operation returns `Ok` and
//! `force_commit` was requested its effects are committed; otherwise, and on
//! every error path, the transaction is rolled back when the context drops.
//! Engine errors are logged and propagated unchanged.

use std::path::Path;

use rusqlite::types::ToSql;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, Transaction};

use crate::config::MEMORY_LOCATION;
use crate::error::StorageError;

/// Named statement parameters, e.g. `&[(":id", &id)]`.
pub type NamedParams<'a> = [(&'a str, &'a dyn ToSql)];

/// Owns the SQLite connection for a store.
pub struct SqliteClient {
    conn: Connection,
    location: String,
}

impl SqliteClient {
    /// Opens (or creates) the database at `location`; `:memory:` opens a
    /// private in-memory database.
    pub fn open(location: &str) -> Result<Self, StorageError> {
        tracing::debug!(location, "opening SQLite database");
        let conn = if location == MEMORY_LOCATION {
            Connection::open_in_memory()
        } else {
            Connection::open(location)
        }
        .map_err(|e| log_engine_error("open", e))?;

        if location != MEMORY_LOCATION {
            // WAL gives concurrent readers alongside the single writer.
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }

        Ok(SqliteClient {
            conn,
            location: location.to_string(),
        })
    }

    /// Opens an existing database without write access. Nothing is created
    /// or altered on disk: a missing file is refused and the journal mode is
    /// left as found. A `:memory:` location has nothing to protect and opens
    /// as usual.
    pub fn open_readonly(location: &str) -> Result<Self, StorageError> {
        if location == MEMORY_LOCATION {
            return Self::open(location);
        }
        if !Path::new(location).exists() {
            tracing::warn!(location, "readonly store has no database to open");
            return Err(StorageError::ReadOnly {
                operation: "create database",
            });
        }
        tracing::debug!(location, "opening SQLite database read-only");
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(location, flags)
            .map_err(|e| log_engine_error("open", e))?;
        Ok(SqliteClient {
            conn,
            location: location.to_string(),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Runs `op` inside one execution context.
    pub fn connect<T, F>(&self, force_commit: bool, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&ExecutionContext<'_>) -> Result<T, StorageError>,
    {
        tracing::debug!(location = %self.location, force_commit, "acquiring execution context");
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| log_engine_error("begin", e))?;
        let ctx = ExecutionContext { tx };

        let value = match op(&ctx) {
            Ok(value) => value,
            Err(err) => {
                if let StorageError::Sqlite(engine) = &err {
                    tracing::error!(error = %engine, "statement failed, rolling back");
                }
                return Err(err);
            }
        };

        if force_commit {
            ctx.tx.commit().map_err(|e| log_engine_error("commit", e))?;
        }
        Ok(value)
    }
}

/// A scoped transaction handed to one logical operation.
pub struct ExecutionContext<'conn> {
    tx: Transaction<'conn>,
}

impl ExecutionContext<'_> {
    /// Executes one statement, returning the number of affected rows.
    pub fn execute(&self, sql: &str, params: &NamedParams<'_>) -> Result<usize, StorageError> {
        let mut stmt = self.tx.prepare_cached(sql)?;
        Ok(stmt.execute(params)?)
    }

    /// Executes a script of several statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StorageError> {
        Ok(self.tx.execute_batch(sql)?)
    }

    /// Returns the first row mapped through `map`, or `None`.
    pub fn query_row<T, F>(
        &self,
        sql: &str,
        params: &NamedParams<'_>,
        map: F,
    ) -> Result<Option<T>, StorageError>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.tx.prepare_cached(sql)?;
        Ok(stmt.query_row(params, map).optional()?)
    }

    /// Returns every row mapped through `map`.
    pub fn query_all<T, F>(
        &self,
        sql: &str,
        params: &NamedParams<'_>,
        mut map: F,
    ) -> Result<Vec<T>, StorageError>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.tx.prepare_cached(sql)?;
        let rows = stmt.query_map(params, |row| map(row))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}

fn log_engine_error(stage: &'static str, err: rusqlite::Error) -> StorageError {
    tracing::error!(stage, error = %err, "SQLite engine error");
    StorageError::Sqlite(err)
}
