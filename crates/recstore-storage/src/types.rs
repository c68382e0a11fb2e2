//! Storage-layer result types shared by every backend.

use serde::Serialize;

use recstore_core::key::is_parent_pattern;
use recstore_core::{CoreError, Listed, PageCursor, Record, Scope, Sort};

use crate::config::MAX_FETCH_SIZE_LIMIT;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListPage {
    pub records: Vec<Record>,
    /// Rows matching scope, tombstone rule and filters, ignoring pagination.
    pub total: usize,
    /// Position to resume from; present only if more rows follow.
    pub next_cursor: Option<PageCursor>,
}

impl ListPage {
    /// Builds a page from `(parent_id, record)` rows fetched with one row
    /// of look-ahead.
    pub fn from_fetched(
        mut rows: Vec<(String, Record)>,
        fetch_limit: usize,
        sorting: &[Sort],
        total: usize,
    ) -> Self {
        let has_more = rows.len() > fetch_limit;
        rows.truncate(fetch_limit);
        let next_cursor = if has_more {
            rows.last().map(|(parent_id, last)| {
                PageCursor::from_record(Listed::new(parent_id, last), sorting)
            })
        } else {
            None
        };
        ListPage {
            records: rows.into_iter().map(|(_, record)| record).collect(),
            total,
            next_cursor,
        }
    }
}

/// Branch taken by an upsert, chosen by a single existence probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPlan {
    /// A row (live or tombstoned) exists at the key and is overwritten.
    UpdateExisting,
    /// No row exists; the write inserts one.
    CreateNew,
}

impl UpsertPlan {
    pub fn probe(exists: bool) -> Self {
        if exists {
            UpsertPlan::UpdateExisting
        } else {
            UpsertPlan::CreateNew
        }
    }
}

/// The scope a write targets. Wildcard parents only make sense for reads.
pub fn writable_scope(collection_id: &str, parent_id: &str) -> Result<Scope, CoreError> {
    if is_parent_pattern(parent_id) {
        return Err(CoreError::InvalidRecord {
            reason: format!("cannot write under parent pattern '{}'", parent_id),
        });
    }
    Ok(Scope::new(collection_id, parent_id))
}

/// Page size after applying the store's hard cap.
pub fn fetch_limit(requested: Option<usize>, max_fetch_size: usize) -> usize {
    requested
        .map_or(max_fetch_size, |limit| limit.min(max_fetch_size))
        .min(MAX_FETCH_SIZE_LIMIT)
}
