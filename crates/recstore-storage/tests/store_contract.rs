//! Backend contract tests.
//!
//! Every check is written once against the [`RecordStore`] trait and run
//! against both the in-memory and the SQLite backend, so the two stay
//! observably identical. File-backed and readonly behaviour, which depend on
//! how each backend is opened, are tested per backend at the bottom.

use serde_json::{json, Value};

use recstore_core::{Comparison, Filter, ListQuery, Payload, Record, Sort, Timestamp};
use recstore_storage::config::MAX_FETCH_SIZE_LIMIT;
use recstore_storage::{InMemoryStore, RecordStore, SqliteStore, StorageError, StoreConfig};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn payload(value: Value) -> Payload {
    value.as_object().cloned().expect("test payloads are objects")
}

fn create<S: RecordStore>(store: &mut S, parent: &str, body: Value) -> Record {
    store.create("notes", parent, payload(body), None).unwrap()
}

fn ids(records: &[Record]) -> Vec<String> {
    records.iter().map(|r| r.id.clone()).collect()
}

/// Follows cursors until the listing is exhausted.
fn walk_pages<S: RecordStore>(store: &S, parent: &str, query: ListQuery) -> Vec<Vec<String>> {
    let mut pages = Vec::new();
    let mut query = query;
    loop {
        let page = store.list("notes", parent, &query).unwrap();
        pages.push(ids(&page.records));
        match page.next_cursor {
            Some(cursor) => query = query.after(cursor),
            None => return pages,
        }
    }
}

// ---------------------------------------------------------------------------
// Contract checks
// ---------------------------------------------------------------------------

fn concrete_scenario<S: RecordStore>(mut store: S) {
    let created = create(
        &mut store,
        "u1",
        json!({"id": "a1", "parent_id": "u1", "collection_id": "notes", "title": "hi"}),
    );
    assert_eq!(created.id, "a1");

    let fetched = store.get("notes", "u1", "a1").unwrap();
    assert_eq!(fetched.payload["title"], json!("hi"));
    assert!(fetched.last_modified.0 > 0);

    store
        .update("notes", "u1", "a1", payload(json!({"title": "bye"})))
        .unwrap();
    let updated = store.get("notes", "u1", "a1").unwrap();
    assert_eq!(updated.payload["title"], json!("bye"));
    assert!(updated.last_modified > fetched.last_modified);

    let tombstone = store.delete("notes", "u1", "a1", true).unwrap();
    assert!(tombstone.deleted);
    assert!(tombstone.payload.is_empty());
    let err = store.get("notes", "u1", "a1").unwrap_err();
    assert!(err.is_not_found());
}

fn round_trip<S: RecordStore>(mut store: S) {
    let body = json!({
        "title": "groceries",
        "tags": ["food", "weekly"],
        "meta": {"pinned": true, "rank": 2.5},
        "empty": null,
    });
    let created = create(&mut store, "u1", body.clone());
    let fetched = store.get("notes", "u1", &created.id).unwrap();
    assert_eq!(fetched, created);

    let mut expected = payload(body);
    expected.insert("id".into(), json!(created.id));
    expected.insert("last_modified".into(), json!(created.last_modified.0));
    assert_eq!(fetched.to_object(), expected);
}

fn reserved_fields_are_not_stored<S: RecordStore>(mut store: S) {
    let created = create(
        &mut store,
        "u1",
        json!({"id": "a1", "last_modified": 1, "deleted": false, "title": "hi"}),
    );
    assert_ne!(created.last_modified, Timestamp(1));
    assert_eq!(created.payload.keys().collect::<Vec<_>>(), vec!["title"]);

    let err = store
        .create("notes", "u1", payload(json!({"id": 42})), None)
        .unwrap_err();
    assert!(matches!(err, StorageError::Core(_)));
}

fn duplicate_create_conflicts<S: RecordStore>(mut store: S) {
    let first = create(&mut store, "u1", json!({"id": "a1", "title": "first"}));
    let err = store
        .create("notes", "u1", payload(json!({"id": "a1", "title": "second"})), None)
        .unwrap_err();
    match err {
        StorageError::Conflict { existing, .. } => assert_eq!(*existing, first),
        other => panic!("expected Conflict, got: {:?}", other),
    }
    assert_eq!(store.get("notes", "u1", "a1").unwrap(), first);

    // Same id under another parent is a different key.
    create(&mut store, "u2", json!({"id": "a1"}));
}

fn generated_ids_are_unique<S: RecordStore>(mut store: S) {
    let a = create(&mut store, "u1", json!({"n": 1}));
    let b = create(&mut store, "u1", json!({"n": 2}));
    assert_ne!(a.id, b.id);
    assert_eq!(a.id.len(), 36);
}

fn update_is_an_upsert<S: RecordStore>(mut store: S) {
    let created = store
        .update("notes", "u1", "fresh", payload(json!({"title": "new"})))
        .unwrap();
    assert_eq!(created.id, "fresh");
    assert_eq!(store.get("notes", "u1", "fresh").unwrap(), created);

    let replaced = store
        .update("notes", "u1", "fresh", payload(json!({"other": 1})))
        .unwrap();
    assert!(!replaced.payload.contains_key("title"));
    assert_eq!(replaced.payload["other"], json!(1));
}

fn update_with_deleted_marker_tombstones<S: RecordStore>(mut store: S) {
    create(&mut store, "u1", json!({"id": "a1", "title": "hi"}));
    let tombstone = store
        .update("notes", "u1", "a1", payload(json!({"deleted": true, "title": "x"})))
        .unwrap();
    assert!(tombstone.deleted);
    assert!(tombstone.payload.is_empty());
    assert!(store.get("notes", "u1", "a1").unwrap_err().is_not_found());

    let ghost = store
        .update("notes", "u1", "ghost", payload(json!({"deleted": true})))
        .unwrap();
    assert!(ghost.deleted);
    let all = store
        .list("notes", "u1", &ListQuery::new().include_deleted(true))
        .unwrap();
    assert_eq!(ids(&all.records), vec!["a1"]);
}

fn update_revives_tombstone<S: RecordStore>(mut store: S) {
    create(&mut store, "u1", json!({"id": "a1", "title": "hi"}));
    let tombstone = store.delete("notes", "u1", "a1", true).unwrap();

    let revived = store
        .update("notes", "u1", "a1", payload(json!({"title": "back"})))
        .unwrap();
    assert!(!revived.deleted);
    assert!(revived.last_modified > tombstone.last_modified);
    assert_eq!(revived.payload["title"], json!("back"));
    assert_eq!(store.get("notes", "u1", "a1").unwrap(), revived);

    let live = store.list("notes", "u1", &ListQuery::new()).unwrap();
    assert_eq!(live.records, vec![revived]);
}

fn soft_delete_visibility<S: RecordStore>(mut store: S) {
    create(&mut store, "u1", json!({"id": "a1"}));
    create(&mut store, "u1", json!({"id": "a2"}));
    let tombstone = store.delete("notes", "u1", "a1", true).unwrap();

    let live = store.list("notes", "u1", &ListQuery::new()).unwrap();
    assert_eq!(ids(&live.records), vec!["a2"]);
    assert_eq!(live.total, 1);

    let all = store
        .list("notes", "u1", &ListQuery::new().include_deleted(true))
        .unwrap();
    assert_eq!(all.total, 2);
    assert!(all.records.contains(&tombstone));

    // A tombstone is not a live record.
    let err = store.delete("notes", "u1", "a1", true).unwrap_err();
    assert!(err.is_not_found());
}

fn hard_delete_removes_row<S: RecordStore>(mut store: S) {
    let created = create(&mut store, "u1", json!({"id": "a1"}));
    let removed = store.delete("notes", "u1", "a1", false).unwrap();
    assert_eq!(removed, Record::tombstone("a1", created.last_modified));

    let all = store
        .list("notes", "u1", &ListQuery::new().include_deleted(true))
        .unwrap();
    assert_eq!(all.total, 0);

    let err = store.delete("notes", "u1", "a1", false).unwrap_err();
    assert!(matches!(err, StorageError::RecordNotFound { .. }));
    // The key is free again.
    create(&mut store, "u1", json!({"id": "a1"}));
}

fn last_modified_strictly_increases<S: RecordStore>(mut store: S) {
    let mut previous = create(&mut store, "u1", json!({"id": "a1", "n": 0})).last_modified;
    for n in 1..20 {
        let updated = store
            .update("notes", "u1", "a1", payload(json!({"n": n})))
            .unwrap();
        assert!(updated.last_modified > previous);
        previous = updated.last_modified;
    }
    let deleted = store.delete("notes", "u1", "a1", true).unwrap();
    assert!(deleted.last_modified > previous);
    assert_eq!(
        store.scope_timestamp("notes", "u1").unwrap(),
        Some(deleted.last_modified)
    );
    assert_eq!(store.scope_timestamp("notes", "nobody").unwrap(), None);
}

fn default_order_is_newest_first<S: RecordStore>(mut store: S) {
    for id in ["a", "b", "c"] {
        create(&mut store, "u1", json!({ "id": id }));
    }
    let page = store.list("notes", "u1", &ListQuery::new()).unwrap();
    assert_eq!(ids(&page.records), vec!["c", "b", "a"]);
}

fn pagination_walks_every_record_once<S: RecordStore>(mut store: S) {
    for n in 0..11 {
        create(&mut store, "u1", json!({ "id": format!("r{:02}", n), "group": n % 3 }));
    }
    let query = ListQuery::new()
        .sort(Sort::asc("group"))
        .sort(Sort::desc("id"))
        .limit(4);
    let pages = walk_pages(&store, "u1", query);
    assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 3]);

    let flat: Vec<String> = pages.concat();
    assert_eq!(
        flat,
        vec!["r09", "r06", "r03", "r00", "r10", "r07", "r04", "r01", "r08", "r05", "r02"]
    );
}

fn pagination_is_stable_under_inserts<S: RecordStore>(mut store: S) {
    for n in 0..7 {
        create(&mut store, "u1", json!({ "id": format!("r{}", n) }));
    }
    let query = ListQuery::new().limit(3);
    let first = store.list("notes", "u1", &query).unwrap();
    assert_eq!(first.total, 7);
    let cursor = first.next_cursor.clone().unwrap();
    let second = store.list("notes", "u1", &query.clone().after(cursor.clone())).unwrap();

    for n in 7..10 {
        create(&mut store, "u1", json!({ "id": format!("r{}", n) }));
    }
    let again = store.list("notes", "u1", &query.after(cursor)).unwrap();
    assert_eq!(again.records, second.records);
    assert_eq!(ids(&again.records), vec!["r3", "r2", "r1"]);
    assert_eq!(again.total, 10);
}

fn fetch_size_is_capped<S: RecordStore>(mut store: S) {
    // Stores under test are built with a cap of 5.
    for n in 0..8 {
        create(&mut store, "u1", json!({ "n": n }));
    }
    let page = store
        .list("notes", "u1", &ListQuery::new().limit(100))
        .unwrap();
    assert_eq!(page.records.len(), 5);
    assert_eq!(page.total, 8);
    assert!(page.next_cursor.is_some());

    let unbounded = store.list("notes", "u1", &ListQuery::new()).unwrap();
    assert_eq!(unbounded.records.len(), 5);
}

fn filters_and_total<S: RecordStore>(mut store: S) {
    create(&mut store, "u1", json!({"id": "a", "status": "open", "size": 3, "title": "Buy Milk"}));
    create(&mut store, "u1", json!({"id": "b", "status": "done", "size": 10, "title": "call bob"}));
    create(&mut store, "u1", json!({"id": "c", "status": "open", "title": "milk again"}));
    create(&mut store, "u1", json!({"id": "d", "status": null, "size": 7}));
    store.delete("notes", "u1", "b", true).unwrap();

    let check = |query: ListQuery, expected: &[&str]| {
        let page = store.list("notes", "u1", &query.sort(Sort::asc("id"))).unwrap();
        assert_eq!(ids(&page.records), expected);
        assert_eq!(page.total, expected.len());
    };

    check(ListQuery::new().filter(Filter::eq("status", "open")), &["a", "c"]);
    check(
        ListQuery::new().filter(Filter::new("status", Comparison::NotEq(json!("open")))),
        &["d"],
    );
    check(
        ListQuery::new().filter(Filter::new("size", Comparison::Min(json!(5)))),
        &["d"],
    );
    check(
        ListQuery::new().filter(Filter::new("size", Comparison::Lt(json!(100)))),
        &["a", "d"],
    );
    check(
        ListQuery::new().filter(Filter::new("title", Comparison::Like("milk".into()))),
        &["a", "c"],
    );
    check(
        ListQuery::new().filter(Filter::new("title", Comparison::Like("milk*".into()))),
        &["c"],
    );
    check(
        ListQuery::new().filter(Filter::new("size", Comparison::Has(false))),
        &["c"],
    );
    check(
        ListQuery::new().filter(Filter::new("id", Comparison::In(vec![json!("a"), json!("d"), json!(null)]))),
        &["a", "d"],
    );
    check(
        ListQuery::new().filter(Filter::new("status", Comparison::Exclude(vec![json!("open")]))),
        &[],
    );
    check(
        ListQuery::new().filter(Filter::new("status", Comparison::In(vec![]))),
        &[],
    );
    check(
        ListQuery::new()
            .include_deleted(true)
            .filter(Filter::new("deleted", Comparison::Eq(json!(true)))),
        &["b"],
    );
}

fn wildcard_parents<S: RecordStore>(mut store: S) {
    create(&mut store, "user-1", json!({"id": "a"}));
    create(&mut store, "user-2", json!({"id": "b"}));
    create(&mut store, "team-1", json!({"id": "c"}));
    create(&mut store, "USER-3", json!({"id": "d"}));

    let page = store
        .list("notes", "user-*", &ListQuery::new().sort(Sort::asc("id")))
        .unwrap();
    assert_eq!(ids(&page.records), vec!["a", "b"]);
    let everything = store.list("notes", "*", &ListQuery::new()).unwrap();
    assert_eq!(everything.total, 4);

    let err = store
        .create("notes", "user-*", payload(json!({"id": "x"})), None)
        .unwrap_err();
    assert!(matches!(err, StorageError::Core(_)));
    let err = store
        .update("notes", "*", "a", payload(json!({})))
        .unwrap_err();
    assert!(matches!(err, StorageError::Core(_)));
    assert!(store.scope_timestamp("notes", "user-*").unwrap().is_some());
}

fn wildcard_pagination_over_shared_ids<S: RecordStore>(mut store: S) {
    // Same id under every parent, identical sort values: only the parent
    // tells the rows apart.
    let parents: Vec<String> = (0..20).map(|n| format!("p{:02}", n)).collect();
    for parent in &parents {
        create(&mut store, parent, json!({"id": "x", "rank": 1, "owner": parent}));
    }

    for query in [
        ListQuery::new().sort(Sort::asc("rank")).limit(1),
        ListQuery::new().limit(1),
        ListQuery::new().limit(3),
    ] {
        let mut owners = Vec::new();
        let mut query = query;
        loop {
            let page = store.list("notes", "p*", &query).unwrap();
            assert_eq!(page.total, 20);
            owners.extend(
                page.records
                    .iter()
                    .map(|r| r.payload["owner"].as_str().unwrap().to_string()),
            );
            match page.next_cursor {
                Some(cursor) => query = query.after(cursor),
                None => break,
            }
        }
        let mut seen = owners.clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen, parents);
        assert_eq!(owners.len(), 20);
    }

    // Ties on every sort key fall back to ascending parent.
    let page = store
        .list("notes", "*", &ListQuery::new().sort(Sort::asc("rank")).limit(2))
        .unwrap();
    let owners: Vec<&Value> = page.records.iter().map(|r| &r.payload["owner"]).collect();
    assert_eq!(owners, vec![&json!("p00"), &json!("p01")]);
}

fn quoted_field_names_are_rejected<S: RecordStore>(mut store: S) {
    create(&mut store, "u1", json!({"id": "a", "say \"hi\"": 1}));
    let query = ListQuery::new().filter(Filter::eq("say \"hi\"", 1));
    let err = store.list("notes", "u1", &query).unwrap_err();
    assert!(matches!(err, StorageError::InvalidQuery { .. }));
    let err = store.delete_all("notes", "u1", &query, true).unwrap_err();
    assert!(matches!(err, StorageError::InvalidQuery { .. }));
    assert!(store.get("notes", "u1", "a").is_ok());
}

fn delete_all_and_purge<S: RecordStore>(mut store: S) {
    for (id, parent, done) in [("a", "u1", true), ("b", "u1", false), ("c", "u2", true)] {
        create(&mut store, parent, json!({"id": id, "done": done}));
    }
    let done = ListQuery::new().filter(Filter::eq("done", true));
    let deleted = store.delete_all("notes", "u*", &done, true).unwrap();
    let mut deleted_ids = ids(&deleted);
    deleted_ids.sort();
    assert_eq!(deleted_ids, vec!["a", "c"]);
    assert!(deleted.iter().all(|r| r.deleted && r.payload.is_empty()));

    let live = store.list("notes", "*", &ListQuery::new()).unwrap();
    assert_eq!(ids(&live.records), vec!["b"]);

    let cutoff = store.scope_timestamp("notes", "u1").unwrap();
    assert_eq!(store.purge_deleted("notes", "u2", Some(Timestamp(0))).unwrap(), 0);
    assert_eq!(store.purge_deleted("notes", "u1", cutoff).unwrap(), 0);
    assert_eq!(store.purge_deleted("notes", "u*", None).unwrap(), 2);
    let all = store
        .list("notes", "*", &ListQuery::new().include_deleted(true))
        .unwrap();
    assert_eq!(all.total, 1);

    let removed = store
        .delete_all("notes", "u1", &ListQuery::new(), false)
        .unwrap();
    assert_eq!(ids(&removed), vec!["b"]);
    assert_eq!(store.list("notes", "*", &ListQuery::new().include_deleted(true)).unwrap().total, 0);
}

fn flush_clears_everything<S: RecordStore>(mut store: S) {
    create(&mut store, "u1", json!({"id": "a"}));
    create(&mut store, "u2", json!({"id": "b"}));
    store.flush().unwrap();

    let all = store
        .list("notes", "*", &ListQuery::new().include_deleted(true))
        .unwrap();
    assert_eq!(all.total, 0);
    assert!(all.records.is_empty());
    assert_eq!(store.scope_timestamp("notes", "u1").unwrap(), None);
    assert!(store.initialize(false).unwrap().is_noop());
}

// ---------------------------------------------------------------------------
// Backend instantiation
// ---------------------------------------------------------------------------

macro_rules! contract_tests {
    ($backend:ident, $make:expr, $make_capped:expr) => {
        mod $backend {
            use super::*;

            #[test]
            fn test_concrete_scenario() {
                concrete_scenario($make);
            }

            #[test]
            fn test_round_trip() {
                round_trip($make);
            }

            #[test]
            fn test_reserved_fields_are_not_stored() {
                reserved_fields_are_not_stored($make);
            }

            #[test]
            fn test_duplicate_create_conflicts() {
                duplicate_create_conflicts($make);
            }

            #[test]
            fn test_generated_ids_are_unique() {
                generated_ids_are_unique($make);
            }

            #[test]
            fn test_update_is_an_upsert() {
                update_is_an_upsert($make);
            }

            #[test]
            fn test_update_with_deleted_marker_tombstones() {
                update_with_deleted_marker_tombstones($make);
            }

            #[test]
            fn test_update_revives_tombstone() {
                update_revives_tombstone($make);
            }

            #[test]
            fn test_soft_delete_visibility() {
                soft_delete_visibility($make);
            }

            #[test]
            fn test_hard_delete_removes_row() {
                hard_delete_removes_row($make);
            }

            #[test]
            fn test_last_modified_strictly_increases() {
                last_modified_strictly_increases($make);
            }

            #[test]
            fn test_default_order_is_newest_first() {
                default_order_is_newest_first($make);
            }

            #[test]
            fn test_pagination_walks_every_record_once() {
                pagination_walks_every_record_once($make);
            }

            #[test]
            fn test_pagination_is_stable_under_inserts() {
                pagination_is_stable_under_inserts($make);
            }

            #[test]
            fn test_fetch_size_is_capped() {
                fetch_size_is_capped($make_capped);
            }

            #[test]
            fn test_filters_and_total() {
                filters_and_total($make);
            }

            #[test]
            fn test_wildcard_parents() {
                wildcard_parents($make);
            }

            #[test]
            fn test_wildcard_pagination_over_shared_ids() {
                wildcard_pagination_over_shared_ids($make);
            }

            #[test]
            fn test_quoted_field_names_are_rejected() {
                quoted_field_names_are_rejected($make);
            }

            #[test]
            fn test_delete_all_and_purge() {
                delete_all_and_purge($make);
            }

            #[test]
            fn test_flush_clears_everything() {
                flush_clears_everything($make);
            }
        }
    };
}

contract_tests!(
    memory,
    InMemoryStore::new(),
    InMemoryStore::new().with_max_fetch_size(5).unwrap()
);

contract_tests!(
    sqlite,
    SqliteStore::in_memory().unwrap(),
    SqliteStore::from_config(&StoreConfig::in_memory().with_max_fetch_size(5).unwrap()).unwrap()
);

// ---------------------------------------------------------------------------
// Backend-specific behaviour
// ---------------------------------------------------------------------------

fn assert_read_only(result: Result<impl std::fmt::Debug, StorageError>) {
    match result {
        Err(StorageError::ReadOnly { .. }) => {}
        other => panic!("expected ReadOnly, got: {:?}", other),
    }
}

#[test]
fn test_memory_readonly_refuses_writes() {
    let mut store = InMemoryStore::new();
    create(&mut store, "u1", json!({"id": "a1"}));
    let mut store = store.with_readonly(true);

    assert_read_only(store.create("notes", "u1", payload(json!({})), None));
    assert_read_only(store.update("notes", "u1", "a1", payload(json!({}))));
    assert_read_only(store.delete("notes", "u1", "a1", true));
    assert_read_only(store.delete_all("notes", "u1", &ListQuery::new(), true));
    assert_read_only(store.purge_deleted("notes", "u1", None));
    assert_read_only(store.flush());
    assert!(store.get("notes", "u1", "a1").is_ok());
}

#[test]
fn test_sqlite_file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");
    let path = path.to_str().unwrap();

    let created = {
        let mut store = SqliteStore::new(path).unwrap();
        assert_eq!(store.location(), path);
        create(&mut store, "u1", json!({"id": "a1", "title": "kept"}))
    };

    let mut store = SqliteStore::new(path).unwrap();
    assert!(store.initialize(false).unwrap().is_noop());
    assert_eq!(store.get("notes", "u1", "a1").unwrap(), created);
    let next = create(&mut store, "u1", json!({"id": "a2"}));
    assert!(next.last_modified > created.last_modified);
}

#[test]
fn test_sqlite_readonly_refuses_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");
    let path = path.to_str().unwrap();
    {
        let mut store = SqliteStore::new(path).unwrap();
        create(&mut store, "u1", json!({"id": "a1"}));
    }

    let config = StoreConfig::at(path).with_readonly(true);
    let mut store = SqliteStore::from_config(&config).unwrap();
    assert!(store.is_readonly());

    assert_read_only(store.create("notes", "u1", payload(json!({})), None));
    assert_read_only(store.update("notes", "u1", "a1", payload(json!({}))));
    assert_read_only(store.delete("notes", "u1", "a1", false));
    assert_read_only(store.flush());
    assert_eq!(store.get("notes", "u1", "a1").unwrap().id, "a1");
    assert_eq!(store.list("notes", "u1", &ListQuery::new()).unwrap().total, 1);
}

#[test]
fn test_sqlite_readonly_cannot_create_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fresh.db");
    let config = StoreConfig::at(path.to_str().unwrap()).with_readonly(true);
    assert_read_only(SqliteStore::from_config(&config).map(|s| s.location().to_string()));
    assert_read_only(SqliteStore::open(&config).map(|s| s.location().to_string()));
    assert!(!path.exists());
}

#[test]
fn test_sqlite_readonly_open_leaves_database_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");
    let path_str = path.to_str().unwrap();
    {
        let mut store = SqliteStore::new(path_str).unwrap();
        create(&mut store, "u1", json!({"id": "a1"}));
    }
    let before = std::fs::read(&path).unwrap();

    let config = StoreConfig::at(path_str).with_readonly(true);
    let store = SqliteStore::from_config(&config).unwrap();
    assert_eq!(store.list("notes", "u1", &ListQuery::new()).unwrap().total, 1);
    drop(store);
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

/// Lists with the widest cap a store accepts.
fn widest_fetch_cap_lists_everything<S: RecordStore>(mut store: S) {
    for n in 0..3 {
        create(&mut store, "u1", json!({ "n": n }));
    }
    let page = store.list("notes", "u1", &ListQuery::new()).unwrap();
    assert_eq!(page.records.len(), 3);
    assert!(page.next_cursor.is_none());
    let page = store
        .list("notes", "u1", &ListQuery::new().limit(usize::MAX))
        .unwrap();
    assert_eq!(page.records.len(), 3);
}

#[test]
fn test_widest_fetch_cap() {
    widest_fetch_cap_lists_everything(
        InMemoryStore::new()
            .with_max_fetch_size(MAX_FETCH_SIZE_LIMIT)
            .unwrap(),
    );
    let config = StoreConfig::in_memory()
        .with_max_fetch_size(MAX_FETCH_SIZE_LIMIT)
        .unwrap();
    widest_fetch_cap_lists_everything(SqliteStore::from_config(&config).unwrap());
}

#[test]
fn test_out_of_range_fetch_cap_is_refused() {
    let mut config = StoreConfig::in_memory();
    config.max_fetch_size = usize::MAX;
    assert!(matches!(
        SqliteStore::open(&config).map(|s| s.max_fetch_size()),
        Err(StorageError::Config { .. })
    ));
    config.max_fetch_size = 0;
    assert!(InMemoryStore::from_config(&config).is_err());
}
