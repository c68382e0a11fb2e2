//! Core error types for recstore-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! ways an externally supplied record or cursor can be malformed.

use thiserror::Error;

/// Errors produced while interpreting records and query values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The external record shape could not be interpreted.
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    /// A reserved field carried a value of the wrong type.
    #[error("invalid value for reserved field '{field}': expected {expected}")]
    InvalidReservedField {
        field: &'static str,
        expected: &'static str,
    },

    /// A pagination token could not be decoded.
    #[error("invalid cursor: {reason}")]
    InvalidCursor { reason: String },
}
