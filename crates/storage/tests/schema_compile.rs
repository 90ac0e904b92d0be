#![forbid(unsafe_code)]

use rusqlite::Connection;
use sb_core::schema::{Column, ColumnType, LogicalTable, SchemaError};
use sb_storage::{InsertRequest, SqliteStore, StoreError, compile};
use serde_json::{Map, Value, json};
use std::path::PathBuf;

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
            Column::new("list_id", ColumnType::Text).nullable().references("lists"),
        ],
    )
    .expect("todos table")
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("object")
}

#[test]
fn compilation_is_deterministic() {
    let first = compile(&todos());
    let second = compile(&todos());
    assert_eq!(first, second);
    assert_eq!(first.ddl(), second.ddl(), "recompiling must be byte-identical");
}

#[test]
fn compiled_layout_names_the_three_physical_objects() {
    let compiled = compile(&todos());
    assert_eq!(compiled.baseline_table(), "todos_base");
    assert_eq!(compiled.overlay_table(), "todos_local");
    assert_eq!(compiled.view_name(), "todos");

    let ddl = compiled.ddl();
    assert!(ddl.contains("CREATE TABLE IF NOT EXISTS todos_base"));
    assert!(ddl.contains("CREATE TABLE IF NOT EXISTS todos_local"));
    assert!(ddl.contains("CREATE VIEW IF NOT EXISTS todos"));
    assert!(ddl.contains("changed_columns TEXT NOT NULL"));
    assert!(ddl.contains("is_deleted INTEGER NOT NULL DEFAULT 0"));
}

#[test]
fn references_resolve_to_merged_views_not_physical_tables() {
    let compiled = compile(&todos());
    let refs = compiled.foreign_keys();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].column, "list_id");
    assert_eq!(refs[0].view, "lists");

    // Physical tables carry no constraint; resolution is deferred to read
    // time against the referenced table's view.
    assert!(!compiled.ddl().contains("REFERENCES"));
    assert!(!compiled.ddl().contains("lists_base"));
    assert!(!compiled.ddl().contains("lists_local"));
}

#[test]
fn redeploying_an_unchanged_definition_is_a_no_op() {
    let dir = temp_dir("redeploying_an_unchanged_definition_is_a_no_op");
    let mut store = SqliteStore::open(&dir).expect("open store");
    store.define_table(todos()).expect("first deploy");
    store.define_table(todos()).expect("second deploy");

    store
        .insert(InsertRequest {
            table: "todos".to_string(),
            row: object(json!({"id": "t1", "title": "x", "done": false})),
        })
        .expect("insert");
    drop(store);

    // Reopening recompiles the persisted definition and serves the same
    // table.
    let mut store = SqliteStore::open(&dir).expect("reopen store");
    let row = store
        .read("todos", &json!("t1"))
        .expect("read")
        .expect("row survives reopen");
    assert_eq!(row.get("title"), Some(&json!("x")));
    store.define_table(todos()).expect("redeploy after reopen");
}

#[test]
fn redefining_a_table_with_a_different_shape_is_rejected() {
    let dir = temp_dir("redefining_a_table_with_a_different_shape_is_rejected");
    let mut store = SqliteStore::open(&dir).expect("open store");
    store.define_table(todos()).expect("first deploy");

    let reshaped = LogicalTable::try_new(
        "todos",
        Column::new("id", ColumnType::Text),
        vec![Column::new("title", ColumnType::Text)],
    )
    .expect("reshaped table");
    let err = store.define_table(reshaped).expect_err("reshaped deploy");
    assert!(matches!(err, StoreError::InvalidInput(_)));
}

#[test]
fn merged_view_reads_rows_landed_directly_in_baseline() {
    let dir = temp_dir("merged_view_reads_rows_landed_directly_in_baseline");
    let mut store = SqliteStore::open(&dir).expect("open store");
    store.define_table(todos()).expect("define todos");

    // Rows written by an authority acting directly on the baseline table are
    // visible through the merged view without any overlay involvement.
    let conn = Connection::open(dir.join("syncbase.db")).expect("open raw db");
    conn.execute(
        "INSERT INTO todos_base(id, title, done, list_id, write_id) \
         VALUES ('t9', 'landed', 1, NULL, NULL)",
        [],
    )
    .expect("raw baseline insert");

    let row = store
        .read("todos", &json!("t9"))
        .expect("read")
        .expect("row present");
    assert_eq!(
        Value::Object(row),
        json!({"id": "t9", "title": "landed", "done": true, "list_id": null})
    );
}

#[test]
fn registry_table_names_cannot_be_defined() {
    // A logical table named "changes" would collide with the change-log
    // table: the CREATE VIEW would silently no-op and reads would hit the
    // ledger. The definition must never get as far as the store.
    for name in ["meta", "counters", "tables", "changes"] {
        let err = LogicalTable::try_new(
            name,
            Column::new("id", ColumnType::Integer),
            vec![Column::new("title", ColumnType::Text)],
        )
        .expect_err("reserved name");
        assert!(matches!(err, SchemaError::ReservedTableName { .. }));
    }

    // The change log itself is untouched by the attempt.
    let dir = temp_dir("registry_table_names_cannot_be_defined");
    let store = SqliteStore::open(&dir).expect("open store");
    assert!(store.changes_since(0, 100).expect("changes").is_empty());
}

#[test]
fn key_only_tables_compile_and_round_trip() {
    let dir = temp_dir("key_only_tables_compile_and_round_trip");
    let mut store = SqliteStore::open(&dir).expect("open store");
    let tags = LogicalTable::try_new("tags", Column::new("name", ColumnType::Text), Vec::new())
        .expect("tags table");
    store.define_table(tags).expect("define tags");

    store
        .insert(InsertRequest {
            table: "tags".to_string(),
            row: object(json!({"name": "urgent"})),
        })
        .expect("insert");
    let row = store
        .read("tags", &json!("urgent"))
        .expect("read")
        .expect("row present");
    assert_eq!(Value::Object(row), json!({"name": "urgent"}));
}
