//! Core data model for recstore.
//!
//! This crate is storage-independent: it defines what a record is, how it is
//! addressed, how its payload is encoded for persistence, and the structured
//! query values that listing operations accept. Backends live in
//! `recstore-storage`.
//!
//! # Modules
//!
//! - [`error`]: CoreError enum for malformed records and cursors
//! - [`key`]: RecordKey and Scope addressing, wildcard parent patterns
//! - [`record`]: Record, Timestamp, and the reserved field names
//! - [`codec`]: payload encoding between the flat record shape and storage
//! - [`query`]: Field, Filter, Sort, Listed, PageCursor, ListQuery
//! - [`generator`]: record id generation

pub mod codec;
pub mod error;
pub mod generator;
pub mod key;
pub mod query;
pub mod record;

// Re-export key types for ergonomic use.
pub use error::CoreError;
pub use generator::{IdGenerator, Uuid4};
pub use key::{RecordKey, Scope};
pub use query::{Comparison, Direction, Field, Filter, ListQuery, Listed, PageCursor, Sort};
pub use record::{Payload, Record, Timestamp};
