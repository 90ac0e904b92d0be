#![forbid(unsafe_code)]

use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq)]
pub struct InsertRequest {
    pub table: String,
    pub row: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateRequest {
    pub table: String,
    pub key: Value,
    /// Columns to change; unspecified columns keep their current value.
    pub values: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteRequest {
    pub table: String,
    pub key: Value,
}

/// A confirmed row landing from the external authority. `write_id` is the
/// original local write identifier when the row confirms a locally-originated
/// change, `None` for purely remote-originated state.
#[derive(Clone, Debug, PartialEq)]
pub struct BaselineUpsertRequest {
    pub table: String,
    pub row: Map<String, Value>,
    pub write_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BaselineDeleteRequest {
    pub table: String,
    pub key: Value,
}
