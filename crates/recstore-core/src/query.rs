//! Structured listing queries.
//!
//! Filters, sort orders and pagination cursors arrive already parsed; this
//! module defines their shape and their reference semantics. Backends either
//! evaluate them directly ([`Filter::matches`], [`compare_values`]) or
//! compile them to their own statement form with identical results.
//!
//! Value ordering is total: null/missing sorts first, then numbers and
//! booleans (as 0/1), then strings. Arrays and objects order as strings
//! holding their canonical JSON text.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::canonical_text;
use crate::error::CoreError;
use crate::key::{wildcard_match, WILDCARD};
use crate::record::{Record, DELETED_FIELD, ID_FIELD, MODIFIED_FIELD};

/// A field a query can address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Field {
    Id,
    LastModified,
    Deleted,
    /// A payload field; `.` separates nested object keys.
    Data(String),
}

impl Field {
    pub fn parse(name: &str) -> Self {
        match name {
            ID_FIELD => Field::Id,
            MODIFIED_FIELD => Field::LastModified,
            DELETED_FIELD => Field::Deleted,
            other => Field::Data(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Field::Id => ID_FIELD,
            Field::LastModified => MODIFIED_FIELD,
            Field::Deleted => DELETED_FIELD,
            Field::Data(path) => path,
        }
    }
}

impl From<String> for Field {
    fn from(name: String) -> Self {
        Field::parse(&name)
    }
}

impl From<&str> for Field {
    fn from(name: &str) -> Self {
        Field::parse(name)
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.name().to_string()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Predicate applied to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Null-safe equality.
    Eq(Value),
    /// Null-safe inequality; matches records lacking the field.
    NotEq(Value),
    Lt(Value),
    Gt(Value),
    /// Greater than or equal.
    Min(Value),
    /// Less than or equal.
    Max(Value),
    /// Equal to any listed value. Null entries are ignored.
    In(Vec<Value>),
    /// Equal to none of the listed values. Null entries are ignored.
    Exclude(Vec<Value>),
    /// ASCII case-insensitive match. Without a `*` the value matches as a
    /// substring; with one, `*` stands for any run of characters.
    Like(String),
    /// Field present and non-null (`true`) or absent/null (`false`).
    Has(bool),
}

/// One conjunct of a listing query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: Field,
    pub op: Comparison,
}

impl Filter {
    pub fn new(field: impl Into<Field>, op: Comparison) -> Self {
        Filter {
            field: field.into(),
            op,
        }
    }

    pub fn eq(field: impl Into<Field>, value: impl Into<Value>) -> Self {
        Filter::new(field, Comparison::Eq(value.into()))
    }

    /// Evaluates the predicate against a record.
    pub fn matches(&self, record: &Record) -> bool {
        let actual = record.field_value(&self.field);
        match &self.op {
            Comparison::Eq(expected) => values_equal(&actual, expected),
            Comparison::NotEq(expected) => !values_equal(&actual, expected),
            Comparison::Lt(bound) => ordered(&actual, bound, |o| o == Ordering::Less),
            Comparison::Gt(bound) => ordered(&actual, bound, |o| o == Ordering::Greater),
            Comparison::Min(bound) => ordered(&actual, bound, |o| o != Ordering::Less),
            Comparison::Max(bound) => ordered(&actual, bound, |o| o != Ordering::Greater),
            Comparison::In(values) => {
                !actual.is_null()
                    && non_null(values).any(|candidate| values_equal(&actual, candidate))
            }
            Comparison::Exclude(values) => {
                let mut candidates = non_null(values).peekable();
                if candidates.peek().is_none() {
                    return true;
                }
                !actual.is_null() && candidates.all(|candidate| !values_equal(&actual, candidate))
            }
            Comparison::Like(pattern) => match like_text(&actual) {
                Some(text) => wildcard_match(&like_pattern(pattern), &text, true),
                None => false,
            },
            Comparison::Has(present) => actual.is_null() != *present,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub field: Field,
    pub direction: Direction,
}

impl Sort {
    pub fn asc(field: impl Into<Field>) -> Self {
        Sort {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<Field>) -> Self {
        Sort {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// The sort order a listing actually uses.
///
/// Defaults to newest first, and always ends with an `id` key so that
/// pagination over equal sort values stays stable. Listings break any tie
/// left after these keys by parent (see [`compare_listed`]).
pub fn effective_sorting(sorting: &[Sort]) -> Vec<Sort> {
    let mut effective = if sorting.is_empty() {
        vec![Sort::desc(Field::LastModified)]
    } else {
        sorting.to_vec()
    };
    if !effective.iter().any(|s| s.field == Field::Id) {
        effective.push(Sort::asc(Field::Id));
    }
    effective
}

/// Compares two records under a sort order.
pub fn compare_records(a: &Record, b: &Record, sorting: &[Sort]) -> Ordering {
    for sort in sorting {
        let ordering = compare_values(&a.field_value(&sort.field), &b.field_value(&sort.field));
        let ordering = match sort.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// A record together with the parent it is stored under.
///
/// Under a wildcard parent two rows can agree on every sort value, `id`
/// included; listings then order them by parent, ascending.
#[derive(Debug, Clone, Copy)]
pub struct Listed<'a> {
    pub parent_id: &'a str,
    pub record: &'a Record,
}

impl<'a> Listed<'a> {
    pub fn new(parent_id: &'a str, record: &'a Record) -> Self {
        Listed { parent_id, record }
    }
}

/// Total listing order: `sorting`, then parent.
pub fn compare_listed(a: Listed<'_>, b: Listed<'_>, sorting: &[Sort]) -> Ordering {
    compare_records(a.record, b.record, sorting).then_with(|| a.parent_id.cmp(b.parent_id))
}

/// Keyset pagination cursor: the sort-key values of the last record a caller
/// has seen, one per key of the effective sort order, plus its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    pub values: Vec<Value>,
    pub parent_id: String,
}

impl PageCursor {
    pub fn new(values: Vec<Value>, parent_id: impl Into<String>) -> Self {
        PageCursor {
            values,
            parent_id: parent_id.into(),
        }
    }

    /// Captures the position of `listed` under `sorting`.
    pub fn from_record(listed: Listed<'_>, sorting: &[Sort]) -> Self {
        PageCursor {
            values: sorting
                .iter()
                .map(|s| listed.record.field_value(&s.field))
                .collect(),
            parent_id: listed.parent_id.to_string(),
        }
    }

    /// Returns true if `listed` sorts strictly after this cursor.
    pub fn precedes(&self, listed: Listed<'_>, sorting: &[Sort]) -> bool {
        for (sort, bound) in sorting.iter().zip(&self.values) {
            let ordering = compare_values(&listed.record.field_value(&sort.field), bound);
            let ordering = match sort.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            match ordering {
                Ordering::Greater => return true,
                Ordering::Less => return false,
                Ordering::Equal => continue,
            }
        }
        listed.parent_id > self.parent_id.as_str()
    }

    /// Opaque string form for handing back to clients: a JSON array of the
    /// sort values followed by the parent.
    pub fn to_token(&self) -> String {
        let mut items = self.values.clone();
        items.push(Value::String(self.parent_id.clone()));
        serde_json::to_string(&items).unwrap_or_default()
    }

    pub fn from_token(token: &str) -> Result<Self, CoreError> {
        let mut values: Vec<Value> =
            serde_json::from_str(token).map_err(|e| CoreError::InvalidCursor {
                reason: e.to_string(),
            })?;
        match values.pop() {
            Some(Value::String(parent_id)) => Ok(PageCursor { values, parent_id }),
            _ => Err(CoreError::InvalidCursor {
                reason: "token must end with the parent id".to_string(),
            }),
        }
    }
}

/// Everything a listing needs beyond its scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub sorting: Vec<Sort>,
    pub cursor: Option<PageCursor>,
    pub limit: Option<usize>,
    pub include_deleted: bool,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sorting.push(sort);
        self
    }

    pub fn after(mut self, cursor: PageCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn include_deleted(mut self, include: bool) -> Self {
        self.include_deleted = include;
        self
    }

    /// True if `record` passes the tombstone rule and every filter.
    pub fn matches(&self, record: &Record) -> bool {
        (self.include_deleted || !record.deleted) && self.filters.iter().all(|f| f.matches(record))
    }
}

/// Total order over JSON values used for sorting and range filters.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (rank(a), rank(b)) {
        (0, 0) => Ordering::Equal,
        (1, 1) => {
            let (x, y) = (as_number(a), as_number(b));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (2, 2) => as_text(a).cmp(&as_text(b)),
        (ra, rb) => ra.cmp(&rb),
    }
}

/// Null-safe equality under [`compare_values`].
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) | Value::Number(_) => 1,
        Value::String(_) | Value::Array(_) | Value::Object(_) => 2,
    }
}

fn as_number(value: &Value) -> f64 {
    match value {
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => canonical_text(other),
    }
}

fn ordered(actual: &Value, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    !actual.is_null() && !bound.is_null() && accept(compare_values(actual, bound))
}

fn non_null(values: &[Value]) -> impl Iterator<Item = &Value> {
    values.iter().filter(|v| !v.is_null())
}

/// Text a `Like` comparison sees for a field value.
fn like_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(as_text(other)),
    }
}

/// Normalizes a `Like` value into a wildcard pattern.
pub fn like_pattern(value: &str) -> String {
    if value.contains(WILDCARD) {
        value.to_string()
    } else {
        format!("{WILDCARD}{value}{WILDCARD}")
    }
}
