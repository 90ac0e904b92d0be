#![forbid(unsafe_code)]

use rusqlite::{Connection, params};
use sb_core::schema::{Column, ColumnType, LogicalTable};
use sb_storage::{
    ChangeOp, DeleteRequest, InsertRequest, SqliteStore, StoreError, UpdateRequest,
};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("sb_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn todos() -> LogicalTable {
    LogicalTable::try_new(
        "todos",
        Column::new("id", ColumnType::Text),
        vec![
            Column::new("title", ColumnType::Text),
            Column::new("done", ColumnType::Boolean),
        ],
    )
    .expect("todos table")
}

fn open_store(dir: &Path) -> SqliteStore {
    let mut store = SqliteStore::open(dir).expect("open store");
    store.define_table(todos()).expect("define todos");
    store
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object")
}

#[test]
fn one_entry_per_successful_mutation_in_commit_order() {
    let dir = temp_dir("one_entry_per_successful_mutation_in_commit_order");
    let mut store = open_store(&dir);

    store
        .insert(InsertRequest {
            table: "todos".to_string(),
            row: object(json!({"id": "t1", "title": "x", "done": false})),
        })
        .expect("insert");
    store
        .update(UpdateRequest {
            table: "todos".to_string(),
            key: json!("t1"),
            values: object(json!({"done": true})),
        })
        .expect("update");
    store
        .delete(DeleteRequest {
            table: "todos".to_string(),
            key: json!("t1"),
        })
        .expect("delete");

    let entries = store.changes_since(0, 100).expect("changes");
    assert_eq!(entries.len(), 3);

    assert_eq!(entries[0].op, ChangeOp::Insert);
    assert_eq!(
        entries[0].row,
        json!({"id": "t1", "title": "x", "done": false})
    );
    assert_eq!(entries[1].op, ChangeOp::Update);
    assert_eq!(
        entries[1].row,
        json!({"id": "t1", "title": "x", "done": true})
    );
    assert_eq!(entries[2].op, ChangeOp::Delete);
    assert_eq!(entries[2].row, json!({"id": "t1"}));

    for pair in entries.windows(2) {
        assert!(pair[0].id < pair[1].id, "ids must be increasing");
        assert!(pair[0].tx_id < pair[1].tx_id, "each mutation gets its own tx");
    }
    let mut write_ids: Vec<&str> = entries.iter().map(|entry| entry.write_id.as_str()).collect();
    write_ids.dedup();
    assert_eq!(write_ids.len(), 3, "every mutation mints a fresh write_id");
}

#[test]
fn failed_operations_append_nothing() {
    let dir = temp_dir("failed_operations_append_nothing");
    let mut store = open_store(&dir);

    store
        .insert(InsertRequest {
            table: "todos".to_string(),
            row: object(json!({"id": "t1", "title": "x", "done": false})),
        })
        .expect("insert");

    let err = store
        .insert(InsertRequest {
            table: "todos".to_string(),
            row: object(json!({"id": "t1", "title": "again", "done": false})),
        })
        .expect_err("conflicting insert");
    assert!(matches!(err, StoreError::Conflict { .. }));

    let err = store
        .update(UpdateRequest {
            table: "todos".to_string(),
            key: json!("absent"),
            values: object(json!({"done": true})),
        })
        .expect_err("update of absent key");
    assert!(matches!(err, StoreError::NotFound { .. }));

    let entries = store.changes_since(0, 100).expect("changes");
    assert_eq!(entries.len(), 1, "only the successful insert is logged");
}

#[test]
fn consumers_page_with_their_own_cursor() {
    let dir = temp_dir("consumers_page_with_their_own_cursor");
    let mut store = open_store(&dir);

    for index in 0..3 {
        store
            .insert(InsertRequest {
                table: "todos".to_string(),
                row: object(json!({"id": format!("t{index}"), "title": "x", "done": false})),
            })
            .expect("insert");
    }

    let first_page = store.changes_since(0, 2).expect("first page");
    assert_eq!(first_page.len(), 2);
    let cursor = first_page.last().expect("page entry").id;
    let second_page = store.changes_since(cursor, 2).expect("second page");
    assert_eq!(second_page.len(), 1);
    assert!(second_page[0].id > cursor);

    // A second consumer starting from scratch sees everything again; the
    // core keeps no per-consumer state.
    assert_eq!(store.changes_since(0, 100).expect("full read").len(), 3);
}

#[test]
fn uncommitted_log_writes_are_not_persisted_after_reopen() {
    let dir = temp_dir("uncommitted_log_writes_are_not_persisted_after_reopen");
    {
        let _store = open_store(&dir);
    }

    let db_path = dir.join("syncbase.db");
    {
        let mut conn = Connection::open(&db_path).expect("open db");
        let tx = conn.transaction().expect("begin tx");
        tx.execute(
            "INSERT INTO changes(tbl, op, row_json, write_id, tx_id, ts_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params!["todos", "insert", "{}", "w_x", 1i64, 0i64],
        )
        .expect("staged insert");
        // Dropped without commit.
    }

    let store = SqliteStore::open(&dir).expect("reopen store");
    assert!(store.changes_since(0, 100).expect("changes").is_empty());
}
