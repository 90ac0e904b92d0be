#![forbid(unsafe_code)]

//! Write routing against the merged table.
//!
//! Application writes never touch the baseline: each insert/update/delete is
//! translated into overlay mutations plus one change-log append, all inside
//! the caller's transaction. Column-level provenance lives in the overlay's
//! `changed_columns` set: a column is listed there only while its overlay
//! value differs from the current baseline value, so a write that lands back
//! on the baseline value converges the column out of the set, and a fully
//! converged live overlay row is dropped.

use super::super::StoreError;
use super::super::schema::CompiledTable;
use super::super::types::{ChangeLogEntry, ChangeOp};
use super::changes_tx::append_change_tx;
use super::rows_tx::{
    OverlayRow, delete_overlay_tx, load_baseline_tx, load_overlay_tx, upsert_overlay_tx,
};
use super::values::{key_display, normalize_key, normalize_value};
use rusqlite::Transaction;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Validates an input row against the table definition and produces the full
/// normalized column map (unspecified columns become NULL).
pub(in crate::store) fn normalize_input_row(
    compiled: &CompiledTable,
    row: &Map<String, Value>,
    enforce_not_null: bool,
) -> Result<(Value, SqlValue, Map<String, Value>), StoreError> {
    let table = compiled.table();
    for name in row.keys() {
        if !table.has_column(name) {
            return Err(StoreError::UnknownColumn {
                table: table.name().to_string(),
                column: name.clone(),
            });
        }
    }

    let pk = table.primary_key();
    let key = row.get(pk.name()).cloned().unwrap_or(Value::Null);
    if key.is_null() {
        return Err(StoreError::InvalidInput("missing primary key value"));
    }
    let (key, key_sql) = normalize_key(compiled, &key)?;

    let mut full = Map::new();
    full.insert(pk.name().to_string(), key.clone());
    for column in table.columns() {
        let value = match row.get(column.name()) {
            Some(value) => normalize_value(column.name(), column.ty(), value)?,
            None => Value::Null,
        };
        if enforce_not_null && value.is_null() && !column.is_nullable() {
            return Err(StoreError::NotNullViolation {
                column: column.name().to_string(),
            });
        }
        full.insert(column.name().to_string(), value);
    }

    Ok((key, key_sql, full))
}

fn all_non_key_columns(compiled: &CompiledTable) -> BTreeSet<String> {
    compiled
        .table()
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect()
}

/// Recomputes the set of columns whose overlay value still diverges from
/// baseline. An absent baseline counts every column as diverging.
fn diverging_columns(
    compiled: &CompiledTable,
    values: &Map<String, Value>,
    baseline: Option<&Map<String, Value>>,
) -> BTreeSet<String> {
    let Some(baseline) = baseline else {
        return all_non_key_columns(compiled);
    };
    compiled
        .table()
        .columns()
        .iter()
        .filter(|column| {
            values.get(column.name()).unwrap_or(&Value::Null)
                != baseline.get(column.name()).unwrap_or(&Value::Null)
        })
        .map(|column| column.name().to_string())
        .collect()
}

pub(in crate::store) fn insert_row_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    row: &Map<String, Value>,
    write_id: String,
    tx_id: i64,
    ts_ms: i64,
) -> Result<ChangeLogEntry, StoreError> {
    let (key, key_sql, values) = normalize_input_row(compiled, row, true)?;

    // The precondition is judged on visible state: a tombstoned overlay row
    // does not block the insert, it gets replaced by the live row.
    let overlay = load_overlay_tx(tx, compiled, &key_sql)?;
    let baseline = load_baseline_tx(tx, compiled, &key_sql)?;
    let visible = match &overlay {
        Some(overlay) => !overlay.is_deleted,
        None => baseline.is_some(),
    };
    if visible {
        return Err(StoreError::Conflict {
            table: compiled.table().name().to_string(),
            key: key_display(&key),
        });
    }

    // No baseline means every non-key column is pending; a baseline can only
    // be present here under a tombstone, in which case converged columns stay
    // out of the set.
    upsert_overlay_tx(
        tx,
        compiled,
        &OverlayRow {
            values: values.clone(),
            changed_columns: diverging_columns(compiled, &values, baseline.as_ref()),
            is_deleted: false,
            write_id: write_id.clone(),
        },
    )?;

    append_change_tx(
        tx,
        compiled.table().name(),
        ChangeOp::Insert,
        Value::Object(values),
        &write_id,
        tx_id,
        ts_ms,
    )
}

pub(in crate::store) fn update_row_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    key: &Value,
    values: &Map<String, Value>,
    write_id: String,
    tx_id: i64,
    ts_ms: i64,
) -> Result<ChangeLogEntry, StoreError> {
    let table = compiled.table();
    let (key, key_sql) = normalize_key(compiled, key)?;

    let mut supplied = Map::new();
    for (name, value) in values {
        if name.as_str() == table.primary_key().name() {
            return Err(StoreError::InvalidInput("primary key cannot be updated"));
        }
        let Some(column) = table.column(name) else {
            return Err(StoreError::UnknownColumn {
                table: table.name().to_string(),
                column: name.clone(),
            });
        };
        let value = normalize_value(column.name(), column.ty(), value)?;
        if value.is_null() && !column.is_nullable() {
            return Err(StoreError::NotNullViolation {
                column: column.name().to_string(),
            });
        }
        supplied.insert(name.clone(), value);
    }

    let baseline = load_baseline_tx(tx, compiled, &key_sql)?;
    let overlay = load_overlay_tx(tx, compiled, &key_sql)?;

    let not_found = || StoreError::NotFound {
        table: table.name().to_string(),
        key: key_display(&key),
    };
    if overlay.as_ref().is_some_and(|overlay| overlay.is_deleted) {
        // Tombstoned locally: not visible until a new insert.
        return Err(not_found());
    }
    if overlay.is_none() && baseline.is_none() {
        return Err(not_found());
    }

    // Resulting overlay value per column: the supplied value wins, otherwise
    // an existing pending value is preserved, otherwise baseline.
    let mut resulting = Map::new();
    resulting.insert(table.primary_key().name().to_string(), key.clone());
    for column in table.columns() {
        let name = column.name();
        let value = supplied
            .get(name)
            .or_else(|| overlay.as_ref().and_then(|overlay| overlay.values.get(name)))
            .or_else(|| baseline.as_ref().and_then(|baseline| baseline.get(name)))
            .cloned()
            .unwrap_or(Value::Null);
        resulting.insert(name.to_string(), value);
    }

    let changed_columns = diverging_columns(compiled, &resulting, baseline.as_ref());

    if changed_columns.is_empty() {
        // Fully converged back onto baseline; the overlay row has no reason
        // to exist anymore.
        if overlay.is_some() {
            delete_overlay_tx(tx, compiled, &key_sql)?;
        }
    } else {
        upsert_overlay_tx(
            tx,
            compiled,
            &OverlayRow {
                values: resulting.clone(),
                changed_columns,
                is_deleted: false,
                write_id: write_id.clone(),
            },
        )?;
    }

    append_change_tx(
        tx,
        table.name(),
        ChangeOp::Update,
        Value::Object(resulting),
        &write_id,
        tx_id,
        ts_ms,
    )
}

pub(in crate::store) fn delete_row_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    key: &Value,
    write_id: String,
    tx_id: i64,
    ts_ms: i64,
) -> Result<ChangeLogEntry, StoreError> {
    let table = compiled.table();
    let (key, key_sql) = normalize_key(compiled, key)?;

    let not_found = || StoreError::NotFound {
        table: table.name().to_string(),
        key: key_display(&key),
    };

    let overlay = load_overlay_tx(tx, compiled, &key_sql)?;
    match overlay {
        Some(overlay) if overlay.is_deleted => return Err(not_found()),
        Some(overlay) => {
            upsert_overlay_tx(
                tx,
                compiled,
                &OverlayRow {
                    values: overlay.values,
                    changed_columns: overlay.changed_columns,
                    is_deleted: true,
                    write_id: write_id.clone(),
                },
            )?;
        }
        None => {
            if load_baseline_tx(tx, compiled, &key_sql)?.is_none() {
                return Err(not_found());
            }
            // Tombstone over a baseline-only row.
            let mut values = Map::new();
            values.insert(table.primary_key().name().to_string(), key.clone());
            for column in table.columns() {
                values.insert(column.name().to_string(), Value::Null);
            }
            upsert_overlay_tx(
                tx,
                compiled,
                &OverlayRow {
                    values,
                    changed_columns: BTreeSet::new(),
                    is_deleted: true,
                    write_id: write_id.clone(),
                },
            )?;
        }
    }

    let mut snapshot = Map::new();
    snapshot.insert(table.primary_key().name().to_string(), key);
    append_change_tx(
        tx,
        table.name(),
        ChangeOp::Delete,
        Value::Object(snapshot),
        &write_id,
        tx_id,
        ts_ms,
    )
}
