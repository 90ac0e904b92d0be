#![forbid(unsafe_code)]

use super::super::StoreError;
use super::super::schema::CompiledTable;
use super::values::{decode_row, from_sql_value, to_sql_value};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Transaction, params, params_from_iter};
use sb_core::schema::ColumnType;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// One physical overlay row: the locally intended value for every column,
/// the set of columns whose value takes precedence over baseline, the
/// soft-delete flag and the write identifier of the last local write.
#[derive(Clone, Debug, PartialEq)]
pub(in crate::store) struct OverlayRow {
    pub values: Map<String, Value>,
    pub changed_columns: BTreeSet<String>,
    pub is_deleted: bool,
    pub write_id: String,
}

pub(in crate::store) fn load_baseline_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    key: &SqlValue,
) -> Result<Option<Map<String, Value>>, StoreError> {
    let mut stmt = tx.prepare(compiled.select_baseline_sql())?;
    let mut rows = stmt.query(params![key])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    Ok(Some(decode_row(row, compiled.table())?))
}

pub(in crate::store) fn load_overlay_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    key: &SqlValue,
) -> Result<Option<OverlayRow>, StoreError> {
    let mut stmt = tx.prepare(compiled.select_overlay_sql())?;
    let mut rows = stmt.query(params![key])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };

    let values = decode_row(row, compiled.table())?;
    let tail = compiled.table().columns().len() + 1;
    let changed_raw = match from_sql_value("changed_columns", ColumnType::Text, row.get_ref(tail)?)?
    {
        Value::String(raw) => raw,
        _ => return Err(StoreError::InvalidInput("corrupt changed_columns")),
    };
    let changed_columns: BTreeSet<String> = serde_json::from_str(&changed_raw)?;
    let is_deleted = row.get::<_, i64>(tail + 1)? != 0;
    let write_id = row.get::<_, String>(tail + 2)?;

    Ok(Some(OverlayRow {
        values,
        changed_columns,
        is_deleted,
        write_id,
    }))
}

pub(in crate::store) fn upsert_overlay_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    overlay: &OverlayRow,
) -> Result<(), StoreError> {
    let table = compiled.table();
    let mut bindings: Vec<SqlValue> = Vec::with_capacity(table.columns().len() + 4);
    bindings.push(to_sql_value(
        overlay
            .values
            .get(table.primary_key().name())
            .unwrap_or(&Value::Null),
    ));
    for column in table.columns() {
        bindings.push(to_sql_value(
            overlay.values.get(column.name()).unwrap_or(&Value::Null),
        ));
    }
    bindings.push(SqlValue::Text(serde_json::to_string(
        &overlay.changed_columns,
    )?));
    bindings.push(SqlValue::Integer(i64::from(overlay.is_deleted)));
    bindings.push(SqlValue::Text(overlay.write_id.clone()));

    tx.execute(compiled.upsert_overlay_sql(), params_from_iter(bindings))?;
    Ok(())
}

pub(in crate::store) fn delete_overlay_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    key: &SqlValue,
) -> Result<(), StoreError> {
    tx.execute(compiled.delete_overlay_sql(), params![key])?;
    Ok(())
}

pub(in crate::store) fn upsert_baseline_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    row: &Map<String, Value>,
    write_id: Option<&str>,
) -> Result<(), StoreError> {
    let table = compiled.table();
    let mut bindings: Vec<SqlValue> = Vec::with_capacity(table.columns().len() + 2);
    bindings.push(to_sql_value(
        row.get(table.primary_key().name()).unwrap_or(&Value::Null),
    ));
    for column in table.columns() {
        bindings.push(to_sql_value(row.get(column.name()).unwrap_or(&Value::Null)));
    }
    bindings.push(match write_id {
        Some(write_id) => SqlValue::Text(write_id.to_string()),
        None => SqlValue::Null,
    });

    tx.execute(compiled.upsert_baseline_sql(), params_from_iter(bindings))?;
    Ok(())
}

pub(in crate::store) fn delete_baseline_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    key: &SqlValue,
) -> Result<(), StoreError> {
    tx.execute(compiled.delete_baseline_sql(), params![key])?;
    Ok(())
}
