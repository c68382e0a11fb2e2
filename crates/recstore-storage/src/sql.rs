//! Compiles structured listing queries to SQLite statements.
//!
//! A [`QueryBuilder`] accumulates WHERE clauses and named parameters for one
//! statement. Every caller-supplied value, including JSON paths into the
//! payload, is bound as a parameter; only column names and operators are
//! spliced into the text. The compiled statements reproduce the reference
//! semantics of `recstore_core::query` exactly, so the SQLite and in-memory
//! backends agree on every listing.

use rusqlite::types::{ToSql, Value as SqlValue};
use serde_json::Value;

use recstore_core::codec::canonical_text;
use recstore_core::key::is_parent_pattern;
use recstore_core::query::{effective_sorting, like_pattern};
use recstore_core::{Comparison, Direction, Field, Filter, ListQuery, PageCursor, Scope, Sort};

use crate::error::StorageError;

/// Columns selected for every record row.
pub const ROW_COLUMNS: &str = "id, parent_id, data, last_modified, deleted";

/// SQL text plus its named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<(String, SqlValue)>,
}

impl SqlQuery {
    /// Parameters in the shape `rusqlite` accepts.
    pub fn named_params(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

/// The statements for one listing call.
#[derive(Debug, Clone)]
pub struct CompiledListing {
    /// Page rows, fetching one extra row to detect a following page.
    pub select: SqlQuery,
    /// Total rows matching scope, tombstone rule and filters.
    pub count: SqlQuery,
    /// Sort order the page was produced under.
    pub sorting: Vec<Sort>,
}

/// Builds the select and count statements for `query` over `scope`.
///
/// `fetch_limit` is the already-capped page size.
pub fn compile_listing(
    scope: &Scope,
    query: &ListQuery,
    fetch_limit: usize,
) -> Result<CompiledListing, StorageError> {
    let sorting = effective_sorting(&query.sorting);
    check_query(query, &sorting)?;

    let mut builder = QueryBuilder::new();
    builder.scope(scope);
    if !query.include_deleted {
        builder.push("deleted = 0");
    }
    for filter in &query.filters {
        builder.filter(filter);
    }

    let count = builder.clone().finish("SELECT COUNT(*) FROM records", "");

    if let Some(cursor) = &query.cursor {
        builder.after(cursor, &sorting);
    }
    let order_by = builder.order_by(&sorting);
    let look_ahead = i64::try_from(fetch_limit.saturating_add(1)).unwrap_or(i64::MAX);
    let limit = builder.bind(SqlValue::Integer(look_ahead));
    let select = builder.finish(
        &format!("SELECT {} FROM records", ROW_COLUMNS),
        &format!(" ORDER BY {} LIMIT {}", order_by, limit),
    );

    Ok(CompiledListing {
        select,
        count,
        sorting,
    })
}

/// Rejects listings the compiled statements could not evaluate faithfully:
/// a cursor that does not line up with `sorting`, or a payload field whose
/// name holds a `"`, which JSON paths cannot quote.
pub fn check_query(query: &ListQuery, sorting: &[Sort]) -> Result<(), StorageError> {
    if let Some(cursor) = &query.cursor {
        check_cursor(cursor, sorting)?;
    }
    let fields = query
        .filters
        .iter()
        .map(|f| &f.field)
        .chain(sorting.iter().map(|s| &s.field));
    for field in fields {
        if let Field::Data(path) = field {
            if path.contains('"') {
                return Err(StorageError::InvalidQuery {
                    reason: format!("field name '{}' may not contain '\"'", path),
                });
            }
        }
    }
    Ok(())
}

/// Rejects cursors that do not line up with the effective sort order.
pub fn check_cursor(cursor: &PageCursor, sorting: &[Sort]) -> Result<(), StorageError> {
    if cursor.values.len() != sorting.len() {
        return Err(StorageError::InvalidQuery {
            reason: format!(
                "cursor has {} value(s) but the sort order has {} key(s)",
                cursor.values.len(),
                sorting.len()
            ),
        });
    }
    Ok(())
}

/// Accumulates a conjunction of clauses and their parameters.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    clauses: Vec<String>,
    params: Vec<(String, SqlValue)>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value and returns its placeholder.
    pub fn bind(&mut self, value: SqlValue) -> String {
        let name = format!(":p{}", self.params.len());
        self.params.push((name.clone(), value));
        name
    }

    pub fn push(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    /// Restricts to a collection and a literal or wildcard parent.
    pub fn scope(&mut self, scope: &Scope) {
        let collection = self.bind(SqlValue::Text(scope.collection_id.clone()));
        self.push(format!("collection_id = {}", collection));
        if is_parent_pattern(&scope.parent_id) {
            let pattern = self.bind(SqlValue::Text(glob_pattern(&scope.parent_id)));
            self.push(format!("parent_id GLOB {}", pattern));
        } else {
            let parent = self.bind(SqlValue::Text(scope.parent_id.clone()));
            self.push(format!("parent_id = {}", parent));
        }
    }

    pub fn filter(&mut self, filter: &Filter) {
        let clause = self.filter_clause(filter);
        self.push(clause);
    }

    /// Restricts to rows strictly after `cursor` under `sorting`, with the
    /// parent as the final tie-break.
    pub fn after(&mut self, cursor: &PageCursor, sorting: &[Sort]) {
        let keys: Vec<(&Sort, &Value)> = sorting.iter().zip(&cursor.values).collect();
        let mut alternatives = Vec::with_capacity(keys.len() + 1);
        for i in 0..=keys.len() {
            let mut parts = Vec::with_capacity(i + 1);
            for (prev, prev_bound) in &keys[..i] {
                let expr = self.field_expr(&prev.field);
                let p = self.bind(to_sql_value(prev_bound));
                parts.push(format!("{} IS {}", expr, p));
            }
            match keys.get(i) {
                Some((sort, bound)) => parts.push(self.strictly_after(sort, bound)),
                None => {
                    let p = self.bind(SqlValue::Text(cursor.parent_id.clone()));
                    parts.push(format!("parent_id > {}", p));
                }
            }
            alternatives.push(format!("({})", parts.join(" AND ")));
        }
        self.push(format!("({})", alternatives.join(" OR ")));
    }

    /// Renders the ORDER BY list, ending with the parent tie-break.
    pub fn order_by(&mut self, sorting: &[Sort]) -> String {
        let mut terms: Vec<String> = sorting
            .iter()
            .map(|sort| {
                let expr = self.field_expr(&sort.field);
                let dir = match sort.direction {
                    Direction::Asc => "ASC",
                    Direction::Desc => "DESC",
                };
                format!("{} {}", expr, dir)
            })
            .collect();
        terms.push("parent_id ASC".to_string());
        terms.join(", ")
    }

    /// Assembles `head WHERE <clauses> tail`.
    pub fn finish(self, head: &str, tail: &str) -> SqlQuery {
        let mut sql = head.to_string();
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        sql.push_str(tail);
        SqlQuery {
            sql,
            params: self.params,
        }
    }

    /// Column or payload expression for a field.
    fn field_expr(&mut self, field: &Field) -> String {
        match field {
            Field::Id => "id".to_string(),
            Field::LastModified => "last_modified".to_string(),
            Field::Deleted => "deleted".to_string(),
            Field::Data(path) => {
                let p = self.bind(SqlValue::Text(json_path(path)));
                format!("json_extract(data, {})", p)
            }
        }
    }

    fn filter_clause(&mut self, filter: &Filter) -> String {
        // Clauses that cannot depend on the row bind nothing.
        if let Some(constant) = constant_clause(&filter.op) {
            return constant.to_string();
        }
        let expr = self.field_expr(&filter.field);
        match &filter.op {
            Comparison::Eq(value) => {
                let p = self.bind(to_sql_value(value));
                format!("{} IS {}", expr, p)
            }
            Comparison::NotEq(value) => {
                let p = self.bind(to_sql_value(value));
                format!("{} IS NOT {}", expr, p)
            }
            Comparison::Lt(value) => self.compare(&expr, "<", value),
            Comparison::Gt(value) => self.compare(&expr, ">", value),
            Comparison::Min(value) => self.compare(&expr, ">=", value),
            Comparison::Max(value) => self.compare(&expr, "<=", value),
            Comparison::In(values) => {
                let list = self.value_list(values);
                format!("{} IN ({})", expr, list)
            }
            Comparison::Exclude(values) => {
                let list = self.value_list(values);
                format!("{} NOT IN ({})", expr, list)
            }
            Comparison::Like(value) => {
                let p = self.bind(SqlValue::Text(like_to_sql(&like_pattern(value))));
                format!("{} LIKE {} ESCAPE '\\'", expr, p)
            }
            Comparison::Has(true) => format!("{} IS NOT NULL", expr),
            Comparison::Has(false) => format!("{} IS NULL", expr),
        }
    }

    fn compare(&mut self, expr: &str, op: &str, bound: &Value) -> String {
        let p = self.bind(to_sql_value(bound));
        format!("{} {} {}", expr, op, p)
    }

    /// Placeholders for the non-null values.
    fn value_list(&mut self, values: &[Value]) -> String {
        values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| self.bind(to_sql_value(v)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn strictly_after(&mut self, sort: &Sort, bound: &Value) -> String {
        if sort.direction == Direction::Desc && bound.is_null() {
            // Nothing sorts below NULL.
            return "0".to_string();
        }
        let expr = self.field_expr(&sort.field);
        match (sort.direction, bound.is_null()) {
            (Direction::Asc, true) => format!("{} IS NOT NULL", expr),
            (Direction::Asc, false) => self.compare(&expr, ">", bound),
            (Direction::Desc, _) => {
                let p = self.bind(to_sql_value(bound));
                format!("({} < {} OR {} IS NULL)", expr, p, expr)
            }
        }
    }
}

/// Row-independent outcome of a comparison, if it has one.
fn constant_clause(op: &Comparison) -> Option<&'static str> {
    let no_values = |values: &[Value]| values.iter().all(Value::is_null);
    match op {
        Comparison::Lt(bound)
        | Comparison::Gt(bound)
        | Comparison::Min(bound)
        | Comparison::Max(bound)
            if bound.is_null() =>
        {
            Some("0")
        }
        Comparison::In(values) if no_values(values) => Some("0"),
        Comparison::Exclude(values) if no_values(values) => Some("1"),
        _ => None,
    }
}

/// SQLite value a JSON value compares as.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(canonical_text(other)),
    }
}

/// JSON path for a dotted payload field, each label quoted.
pub fn json_path(field: &str) -> String {
    let mut path = String::from("$");
    for segment in field.split('.') {
        path.push_str(".\"");
        path.push_str(segment);
        path.push('"');
    }
    path
}

/// Translates a `*` parent pattern into a GLOB pattern matching literally
/// everywhere else.
pub fn glob_pattern(pattern: &str) -> String {
    let mut glob = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '?' => glob.push_str("[?]"),
            '[' => glob.push_str("[[]"),
            other => glob.push(other),
        }
    }
    glob
}

/// Translates a `*` wildcard pattern into a LIKE pattern escaped with `\`.
pub fn like_to_sql(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => like.push('%'),
            '%' | '_' | '\\' => {
                like.push('\\');
                like.push(c);
            }
            other => like.push(other),
        }
    }
    like
}
