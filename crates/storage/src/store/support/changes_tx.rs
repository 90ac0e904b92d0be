#![forbid(unsafe_code)]

use super::super::types::{ChangeLogEntry, ChangeOp};
use super::super::StoreError;
use rusqlite::{Transaction, params};
use serde_json::Value;

/// Appends one ledger row inside the mutation's own transaction, so the log
/// and the overlay state commit or roll back together.
pub(in crate::store) fn append_change_tx(
    tx: &Transaction<'_>,
    table: &str,
    op: ChangeOp,
    row: Value,
    write_id: &str,
    tx_id: i64,
    ts_ms: i64,
) -> Result<ChangeLogEntry, StoreError> {
    tx.execute(
        r#"
        INSERT INTO changes(tbl, op, row_json, write_id, tx_id, ts_ms)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![table, op.as_str(), row.to_string(), write_id, tx_id, ts_ms],
    )?;
    Ok(ChangeLogEntry {
        id: tx.last_insert_rowid(),
        table: table.to_string(),
        op,
        row,
        write_id: write_id.to_string(),
        tx_id,
        ts_ms,
    })
}
