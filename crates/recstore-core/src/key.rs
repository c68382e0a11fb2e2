//! Record addressing.
//!
//! A record lives at a three-part key: the collection it belongs to, the
//! parent that owns it, and its own id. The (collection, parent) pair is a
//! [`Scope`]. Parents passed to listing operations may contain the
//! [`WILDCARD`] marker; stored parents never do.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Matches any (possibly empty) run of characters in a parent pattern.
pub const WILDCARD: char = '*';

/// The (collection, parent) pair partitioning the record space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    pub collection_id: String,
    pub parent_id: String,
}

impl Scope {
    pub fn new(collection_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Scope {
            collection_id: collection_id.into(),
            parent_id: parent_id.into(),
        }
    }

    /// Returns true if the parent is a pattern rather than a literal.
    pub fn is_pattern(&self) -> bool {
        is_parent_pattern(&self.parent_id)
    }

    /// Returns true if a stored row at `collection_id`/`parent_id` falls in
    /// this scope, honouring wildcard parents.
    pub fn contains(&self, collection_id: &str, parent_id: &str) -> bool {
        self.collection_id == collection_id && parent_matches(&self.parent_id, parent_id)
    }

    /// Builds the full key for a record id in this scope.
    pub fn key(&self, id: impl Into<String>) -> RecordKey {
        RecordKey {
            collection_id: self.collection_id.clone(),
            parent_id: self.parent_id.clone(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection_id, self.parent_id)
    }
}

/// Unique address of a record, live or tombstoned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub collection_id: String,
    pub parent_id: String,
    pub id: String,
}

impl RecordKey {
    pub fn new(
        collection_id: impl Into<String>,
        parent_id: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        RecordKey {
            collection_id: collection_id.into(),
            parent_id: parent_id.into(),
            id: id.into(),
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::new(self.collection_id.clone(), self.parent_id.clone())
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.collection_id, self.parent_id, self.id)
    }
}

/// Returns true if `parent` contains the wildcard marker.
pub fn is_parent_pattern(parent: &str) -> bool {
    parent.contains(WILDCARD)
}

/// Case-sensitive match of a stored parent against a literal or pattern.
pub fn parent_matches(pattern: &str, parent: &str) -> bool {
    if is_parent_pattern(pattern) {
        wildcard_match(pattern, parent, false)
    } else {
        pattern == parent
    }
}

/// Matches `text` against `pattern`, where [`WILDCARD`] stands for any run of
/// characters. With `ignore_ascii_case`, ASCII letters compare
/// case-insensitively.
pub fn wildcard_match(pattern: &str, text: &str, ignore_ascii_case: bool) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let eq = |a: char, b: char| {
        if ignore_ascii_case {
            a.eq_ignore_ascii_case(&b)
        } else {
            a == b
        }
    };

    // Greedy matcher with single-star backtracking.
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == WILDCARD {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && eq(pattern[p], text[t]) {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == WILDCARD {
        p += 1;
    }
    p == pattern.len()
}
