//! Storage engine for recstore records.
//!
//! Provides the [`RecordStore`] trait defining the storage contract that all
//! backends implement, plus the [`SqliteStore`] and [`InMemoryStore`] as
//! first-class backends.
//!
//! # Architecture
//!
//! - The **Execution Context Provider** ([`SqliteClient`]) hands each
//!   operation one transaction and guarantees release on every exit path.
//! - The **Migration Controller** ([`Migrator`]) advances the schema version
//!   one script at a time, using injected [`ScriptLoader`] and
//!   [`SchemaExecutor`] capabilities.
//! - The **CRUD and listing engines** live in the backends; listings are
//!   compiled to SQL by the [`sql`] query builder.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`config`]: StoreConfig from host settings or the environment
//! - [`types`]: ListPage and other storage-layer types
//! - [`traits`]: RecordStore trait definition
//! - [`client`]: SqliteClient and ExecutionContext
//! - [`schema`]: schema versions, script loaders, the Migrator
//! - [`sql`]: structured query compilation
//! - [`convert`]: row to record conversion
//! - [`memory`]: InMemoryStore implementation
//! - [`sqlite`]: SqliteStore implementation

pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod memory;
pub mod schema;
pub mod sql;
pub mod sqlite;
pub mod traits;
pub mod types;

// Re-export key types for ergonomic use.
pub use client::{ExecutionContext, SqliteClient};
pub use config::StoreConfig;
pub use error::StorageError;
pub use memory::InMemoryStore;
pub use schema::{
    DirectoryScripts, EmbeddedScripts, MigrationReport, MigrationStep, Migrator, SchemaExecutor,
    ScriptLoader, SCHEMA_VERSION,
};
pub use sqlite::SqliteStore;
pub use traits::RecordStore;
pub use types::ListPage;
