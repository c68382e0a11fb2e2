//! Schema versioning and migrations.
//!
//! The [`Migrator`] drives a store from "no schema" to [`SCHEMA_VERSION`]:
//! it creates the base schema (version 0) and then applies
//! `migration_{from:03}_{to:03}` scripts one step at a time. Scripts come
//! from an injected [`ScriptLoader`] and run through an injected
//! [`SchemaExecutor`], so the same controller serves any backend.
//!
//! Every script records its own resulting version. Before each step the
//! controller re-reads the installed version and aborts with
//! [`StorageError::MigrationVersionMismatch`] if it is not the step's
//! starting version. Dry runs load the same scripts and walk the same steps
//! against a simulated version, without executing anything.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::client::SqliteClient;
use crate::error::StorageError;

/// Schema version this build brings stores to.
pub const SCHEMA_VERSION: u32 = 2;

/// Name of the base schema script.
pub const SCHEMA_SCRIPT: &str = "schema";

/// Metadata key holding the installed version.
pub const VERSION_KEY: &str = "storage_schema_version";

/// Script name for the step `from -> to`.
pub fn migration_name(from: u32, to: u32) -> String {
    format!("migration_{:03}_{:03}", from, to)
}

/// Supplies schema and migration scripts by name.
pub trait ScriptLoader {
    /// Returns the script text, or [`StorageError::MigrationScriptMissing`].
    fn load(&self, name: &str) -> Result<String, StorageError>;
}

/// Applies scripts and reports the installed version.
pub trait SchemaExecutor {
    /// The recorded schema version, `None` if no schema was ever created.
    fn installed_version(&self) -> Result<Option<u32>, StorageError>;

    /// Executes one script durably.
    fn execute_script(&self, name: &str, sql: &str) -> Result<(), StorageError>;
}

/// Scripts compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedScripts;

impl ScriptLoader for EmbeddedScripts {
    fn load(&self, name: &str) -> Result<String, StorageError> {
        let sql = match name {
            "schema" => include_str!("migrations/schema.sql"),
            "migration_000_001" => include_str!("migrations/migration_000_001.sql"),
            "migration_001_002" => include_str!("migrations/migration_001_002.sql"),
            // Future migrations added here.
            _ => {
                return Err(StorageError::MigrationScriptMissing {
                    name: name.to_string(),
                })
            }
        };
        Ok(sql.to_string())
    }
}

/// Scripts read from `<dir>/<name>.sql`.
#[derive(Debug, Clone)]
pub struct DirectoryScripts {
    dir: PathBuf,
}

impl DirectoryScripts {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        DirectoryScripts {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl ScriptLoader for DirectoryScripts {
    fn load(&self, name: &str) -> Result<String, StorageError> {
        let path = self.dir.join(format!("{}.sql", name));
        if !path.is_file() {
            return Err(StorageError::MigrationScriptMissing {
                name: path.display().to_string(),
            });
        }
        Ok(std::fs::read_to_string(path)?)
    }
}

/// One step performed (or simulated) by the migrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum MigrationStep {
    CreateSchema { version: u32 },
    Migrate { from: u32, to: u32 },
}

/// Outcome of an initialization or migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub dry_run: bool,
    pub steps: Vec<MigrationStep>,
    /// Version after the run; simulated for dry runs.
    pub version: Option<u32>,
}

impl MigrationReport {
    fn new(dry_run: bool, version: Option<u32>) -> Self {
        MigrationReport {
            dry_run,
            steps: Vec::new(),
            version,
        }
    }

    /// True if nothing needed doing.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Schema version state machine.
pub struct Migrator {
    name: String,
    target_version: u32,
    loader: Box<dyn ScriptLoader>,
}

impl Migrator {
    pub fn new(name: impl Into<String>, target_version: u32, loader: impl ScriptLoader + 'static) -> Self {
        Migrator {
            name: name.into(),
            target_version,
            loader: Box::new(loader),
        }
    }

    /// The record store's own schema, from embedded scripts.
    pub fn records() -> Self {
        Migrator::new("records", SCHEMA_VERSION, EmbeddedScripts)
    }

    pub fn target_version(&self) -> u32 {
        self.target_version
    }

    /// Creates the schema if absent, then migrates to the target version.
    pub fn create_or_migrate(
        &self,
        executor: &dyn SchemaExecutor,
        dry_run: bool,
    ) -> Result<MigrationReport, StorageError> {
        let installed = executor.installed_version()?;
        let start = match installed {
            None => {
                let mut report = self.create_schema(executor, dry_run)?;
                if self.target_version > 0 {
                    let migrated = self.migrate(executor, 0, dry_run)?;
                    report.steps.extend(migrated.steps);
                    report.version = migrated.version;
                }
                return Ok(report);
            }
            Some(version) => version,
        };

        tracing::info!(schema = %self.name, version = start, "detected schema version");
        if start == self.target_version {
            tracing::info!(schema = %self.name, "schema is up-to-date");
            return Ok(MigrationReport::new(dry_run, installed));
        }
        if start > self.target_version {
            tracing::warn!(
                schema = %self.name,
                installed = start,
                target = self.target_version,
                "installed schema is newer than this build"
            );
            return Ok(MigrationReport::new(dry_run, installed));
        }
        self.migrate(executor, start, dry_run)
    }

    /// Applies the base schema, bringing the store to version 0.
    pub fn create_schema(
        &self,
        executor: &dyn SchemaExecutor,
        dry_run: bool,
    ) -> Result<MigrationReport, StorageError> {
        tracing::info!(schema = %self.name, script = SCHEMA_SCRIPT, dry_run, "creating schema at version 0");
        let sql = self.loader.load(SCHEMA_SCRIPT)?;
        if !dry_run {
            executor.execute_script(SCHEMA_SCRIPT, &sql)?;
            self.expect_version(executor, 0)?;
            tracing::info!(schema = %self.name, "created schema (version 0)");
        }

        let mut report = MigrationReport::new(dry_run, Some(0));
        report.steps.push(MigrationStep::CreateSchema { version: 0 });
        Ok(report)
    }

    /// Applies every step from `start_version` to the target, in order.
    pub fn migrate(
        &self,
        executor: &dyn SchemaExecutor,
        start_version: u32,
        dry_run: bool,
    ) -> Result<MigrationReport, StorageError> {
        let mut report = MigrationReport::new(dry_run, Some(start_version));

        for from in start_version..self.target_version {
            let to = from + 1;
            let current = if dry_run {
                report.version
            } else {
                executor.installed_version()?
            };
            if current != Some(from) {
                tracing::error!(schema = %self.name, expected = from, found = ?current, "schema version mismatch, aborting migration");
                return Err(self.mismatch(from, current));
            }

            let name = migration_name(from, to);
            tracing::info!(schema = %self.name, from, to, script = %name, "migrating schema");
            let sql = self.loader.load(&name)?;
            if !dry_run {
                executor.execute_script(&name, &sql)?;
            }
            report.steps.push(MigrationStep::Migrate { from, to });
            report.version = Some(to);
        }

        if !dry_run && !report.steps.is_empty() {
            self.expect_version(executor, self.target_version)?;
        }
        tracing::info!(
            schema = %self.name,
            "schema migration {}",
            if dry_run { "simulated" } else { "done" }
        );
        Ok(report)
    }

    fn expect_version(&self, executor: &dyn SchemaExecutor, expected: u32) -> Result<(), StorageError> {
        let found = executor.installed_version()?;
        if found != Some(expected) {
            return Err(self.mismatch(expected, found));
        }
        Ok(())
    }

    fn mismatch(&self, expected: u32, found: Option<u32>) -> StorageError {
        StorageError::MigrationVersionMismatch {
            name: self.name.clone(),
            expected,
            found,
        }
    }
}

impl SchemaExecutor for SqliteClient {
    fn installed_version(&self) -> Result<Option<u32>, StorageError> {
        self.connect(false, |ctx| {
            let has_metadata = ctx
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
                    &[],
                    |_| Ok(()),
                )?
                .is_some();
            if !has_metadata {
                return Ok(None);
            }
            ctx.query_row(
                "SELECT CAST(value AS INTEGER) FROM metadata WHERE name = :name",
                &[(":name", &VERSION_KEY)],
                |row| row.get::<_, u32>(0),
            )
        })
    }

    fn execute_script(&self, name: &str, sql: &str) -> Result<(), StorageError> {
        tracing::debug!(script = name, location = %self.location(), "executing schema script");
        // Runs outside any caller operation, so always commit.
        self.connect(true, |ctx| ctx.execute_batch(sql))
    }
}
