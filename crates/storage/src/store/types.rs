#![forbid(unsafe_code)]

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One appended ledger row. `row` is the full effective row for insert/update
/// and `{<pk>: key}` for delete; `tx_id` groups entries written by the same
/// store transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeLogEntry {
    pub id: i64,
    pub table: String,
    pub op: ChangeOp,
    pub row: Value,
    pub write_id: String,
    pub tx_id: i64,
    pub ts_ms: i64,
}
