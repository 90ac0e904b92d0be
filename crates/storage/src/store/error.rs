#![forbid(unsafe_code)]

use sb_core::schema::SchemaError;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    Json(serde_json::Error),
    Schema(SchemaError),
    InvalidInput(&'static str),
    UnknownTable { table: String },
    UnknownColumn { table: String, column: String },
    TypeMismatch { column: String },
    NotNullViolation { column: String },
    Conflict { table: String, key: String },
    NotFound { table: String, key: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
            Self::Schema(err) => write!(f, "schema: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::UnknownTable { table } => write!(f, "unknown table {table:?}"),
            Self::UnknownColumn { table, column } => {
                write!(f, "unknown column {column:?} on table {table:?}")
            }
            Self::TypeMismatch { column } => {
                write!(f, "value does not match the declared type of column {column:?}")
            }
            Self::NotNullViolation { column } => {
                write!(f, "column {column:?} is not nullable")
            }
            Self::Conflict { table, key } => {
                write!(f, "key already exists (table={table}, key={key})")
            }
            Self::NotFound { table, key } => {
                write!(f, "key not found (table={table}, key={key})")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}
