#![forbid(unsafe_code)]

//! Store-level registry: the change log, counters, and the persisted logical
//! table definitions that `open` recompiles so a reopened store serves the
//! same tables it was deployed with.

use super::super::StoreError;
use super::super::schema::{CompiledTable, compile};
use rusqlite::{Connection, Transaction, params};
use sb_core::schema::{Column, ColumnType, LogicalTable};
use serde_json::{Value, json};
use std::collections::BTreeMap;

const REGISTRY_SQL: &str = r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS counters (
          name TEXT PRIMARY KEY,
          value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tables (
          name TEXT PRIMARY KEY,
          definition_json TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS changes (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          tbl TEXT NOT NULL,
          op TEXT NOT NULL,
          row_json TEXT NOT NULL,
          write_id TEXT NOT NULL,
          tx_id INTEGER NOT NULL,
          ts_ms INTEGER NOT NULL
        );
"#;

pub(in crate::store) fn install_registry(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(REGISTRY_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params!["schema_version", "v0"],
    )?;
    Ok(())
}

fn column_json(column: &Column) -> Value {
    json!({
        "name": column.name(),
        "type": column.ty().as_str(),
        "nullable": column.is_nullable(),
        "references": column.referenced_table(),
    })
}

pub(in crate::store) fn encode_table(table: &LogicalTable) -> String {
    json!({
        "name": table.name(),
        "primary_key": column_json(table.primary_key()),
        "columns": table.columns().iter().map(column_json).collect::<Vec<_>>(),
    })
    .to_string()
}

fn decode_column(value: &Value) -> Result<Column, StoreError> {
    let malformed = StoreError::InvalidInput("malformed table definition");
    let name = value["name"].as_str().ok_or(malformed)?;
    let ty = value["type"]
        .as_str()
        .and_then(ColumnType::parse)
        .ok_or(StoreError::InvalidInput("malformed table definition"))?;
    let mut column = Column::new(name, ty);
    if value["nullable"].as_bool() == Some(true) {
        column = column.nullable();
    }
    if let Some(target) = value["references"].as_str() {
        column = column.references(target);
    }
    Ok(column)
}

pub(in crate::store) fn decode_table(raw: &str) -> Result<LogicalTable, StoreError> {
    let value: Value = serde_json::from_str(raw)?;
    let name = value["name"]
        .as_str()
        .ok_or(StoreError::InvalidInput("malformed table definition"))?;
    let primary_key = decode_column(&value["primary_key"])?;
    let columns = value["columns"]
        .as_array()
        .ok_or(StoreError::InvalidInput("malformed table definition"))?
        .iter()
        .map(decode_column)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(LogicalTable::try_new(name, primary_key, columns)?)
}

pub(in crate::store) fn load_tables(
    conn: &Connection,
) -> Result<BTreeMap<String, CompiledTable>, StoreError> {
    let mut stmt = conn.prepare("SELECT name, definition_json FROM tables ORDER BY name")?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(0)?;
        let definition_json: String = row.get(1)?;
        let table = decode_table(&definition_json)?;
        tables.insert(name, compile(&table));
    }
    Ok(tables)
}

pub(in crate::store) fn register_table_tx(
    tx: &Transaction<'_>,
    name: &str,
    definition_json: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR IGNORE INTO tables(name, definition_json, created_at_ms) VALUES (?1, ?2, ?3)",
        params![name, definition_json, now_ms],
    )?;
    Ok(())
}
