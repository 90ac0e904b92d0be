#![forbid(unsafe_code)]

//! Reconciliation: retiring overlay state once the baseline confirms it.
//!
//! Runs inside the same transaction that lands a confirmed row. A
//! confirmation whose write_id matches the overlay's retires the overlay in
//! full: the pending write has round-tripped and is authoritative now. A
//! non-matching write_id means a newer local edit raced ahead; the pending
//! values stay untouched and only `changed_columns` is narrowed to the
//! columns still diverging from the fresh baseline. Nothing here is a
//! user-visible error.

use super::super::StoreError;
use super::super::schema::CompiledTable;
use super::engine_tx::normalize_input_row;
use super::rows_tx::{
    OverlayRow, delete_baseline_tx, delete_overlay_tx, load_overlay_tx, upsert_baseline_tx,
    upsert_overlay_tx,
};
use super::values::normalize_key;
use rusqlite::Transaction;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub(in crate::store) fn baseline_upsert_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    row: &Map<String, Value>,
    write_id: Option<&str>,
) -> Result<(), StoreError> {
    // The authority's row is taken as-is; logical non-null is an input rule
    // for local inserts, not a reason to reject confirmed state.
    let (_, key_sql, values) = normalize_input_row(compiled, row, false)?;

    upsert_baseline_tx(tx, compiled, &values, write_id)?;

    let Some(overlay) = load_overlay_tx(tx, compiled, &key_sql)? else {
        return Ok(());
    };

    if write_id.is_some_and(|write_id| write_id == overlay.write_id) {
        // The pending write round-tripped; the override is retired in full.
        delete_overlay_tx(tx, compiled, &key_sql)?;
        return Ok(());
    }

    // Unrelated confirmation: keep the pending edit, but drop any changed
    // column that happens to agree with the new baseline.
    let narrowed: BTreeSet<String> = overlay
        .changed_columns
        .iter()
        .filter(|name| {
            overlay.values.get(name.as_str()).unwrap_or(&Value::Null)
                != values.get(name.as_str()).unwrap_or(&Value::Null)
        })
        .cloned()
        .collect();

    if narrowed.is_empty() && !overlay.is_deleted {
        delete_overlay_tx(tx, compiled, &key_sql)?;
    } else if narrowed != overlay.changed_columns {
        upsert_overlay_tx(
            tx,
            compiled,
            &OverlayRow {
                changed_columns: narrowed,
                ..overlay
            },
        )?;
    }
    Ok(())
}

/// Once the authority has no record of the row, any local pending state for
/// it is discarded, pending edits included.
pub(in crate::store) fn baseline_delete_tx(
    tx: &Transaction<'_>,
    compiled: &CompiledTable,
    key: &Value,
) -> Result<(), StoreError> {
    let (_, key_sql) = normalize_key(compiled, key)?;
    delete_baseline_tx(tx, compiled, &key_sql)?;
    delete_overlay_tx(tx, compiled, &key_sql)?;
    Ok(())
}
