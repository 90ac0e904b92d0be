#![forbid(unsafe_code)]

//! Conversions between the JSON row values crossing the public API, the
//! canonical in-memory form used for column comparisons, and SQLite storage
//! values. Normalization happens once at the boundary so that divergence
//! checks are plain `==` afterwards.

use super::super::StoreError;
use super::super::schema::CompiledTable;
use rusqlite::Row;
use rusqlite::types::{Value as SqlValue, ValueRef};
use sb_core::schema::{ColumnType, LogicalTable};
use serde_json::{Map, Value};

pub(in crate::store) fn normalize_value(
    column: &str,
    ty: ColumnType,
    value: &Value,
) -> Result<Value, StoreError> {
    let mismatch = || StoreError::TypeMismatch {
        column: column.to_string(),
    };
    match (ty, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ColumnType::Integer, Value::Number(number)) => {
            number.as_i64().map(Value::from).ok_or_else(mismatch)
        }
        (ColumnType::Real, Value::Number(number)) => {
            number.as_f64().map(Value::from).ok_or_else(mismatch)
        }
        (ColumnType::Text, Value::String(text)) => Ok(Value::String(text.clone())),
        (ColumnType::Boolean, Value::Bool(flag)) => Ok(Value::Bool(*flag)),
        _ => Err(mismatch()),
    }
}

/// Binds a normalized JSON value as a SQLite storage value.
pub(in crate::store) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => SqlValue::Real(number.as_f64().unwrap_or(0.0)),
        },
        Value::String(text) => SqlValue::Text(text.clone()),
        _ => SqlValue::Null,
    }
}

pub(in crate::store) fn from_sql_value(
    column: &str,
    ty: ColumnType,
    value: ValueRef<'_>,
) -> Result<Value, StoreError> {
    let mismatch = || StoreError::TypeMismatch {
        column: column.to_string(),
    };
    match (ty, value) {
        (_, ValueRef::Null) => Ok(Value::Null),
        (ColumnType::Integer, ValueRef::Integer(integer)) => Ok(Value::from(integer)),
        (ColumnType::Boolean, ValueRef::Integer(integer)) => Ok(Value::Bool(integer != 0)),
        (ColumnType::Real, ValueRef::Integer(integer)) => Ok(Value::from(integer as f64)),
        (ColumnType::Real, ValueRef::Real(real)) => Ok(Value::from(real)),
        (ColumnType::Text, ValueRef::Text(_)) => {
            Ok(Value::String(value.as_str().map_err(|_| mismatch())?.to_string()))
        }
        _ => Err(mismatch()),
    }
}

/// Decodes one result row whose select list is the primary key followed by
/// the non-key columns in definition order.
pub(in crate::store) fn decode_row(
    row: &Row<'_>,
    table: &LogicalTable,
) -> Result<Map<String, Value>, StoreError> {
    let mut out = Map::new();
    let pk = table.primary_key();
    out.insert(
        pk.name().to_string(),
        from_sql_value(pk.name(), pk.ty(), row.get_ref(0)?)?,
    );
    for (index, column) in table.columns().iter().enumerate() {
        out.insert(
            column.name().to_string(),
            from_sql_value(column.name(), column.ty(), row.get_ref(index + 1)?)?,
        );
    }
    Ok(out)
}

/// Normalizes a primary key value and produces its SQLite binding. NULL keys
/// are rejected up front; every row is addressed by a concrete key.
pub(in crate::store) fn normalize_key(
    compiled: &CompiledTable,
    key: &Value,
) -> Result<(Value, SqlValue), StoreError> {
    let pk = compiled.table().primary_key();
    let normalized = normalize_value(pk.name(), pk.ty(), key)?;
    if normalized.is_null() {
        return Err(StoreError::InvalidInput("primary key must not be null"));
    }
    let sql = to_sql_value(&normalized);
    Ok((normalized, sql))
}

pub(in crate::store) fn key_display(key: &Value) -> String {
    key.to_string()
}
