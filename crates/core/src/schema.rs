#![forbid(unsafe_code)]

//! Logical table definitions.
//!
//! A [`LogicalTable`] describes one application-visible table: a primary key
//! and an ordered list of non-key columns. The storage layer compiles it into
//! a baseline table (server-confirmed state), an overlay table (locally
//! pending state) and a merged view, but none of that physical split is
//! visible here. Definitions are validated on construction and immutable
//! afterwards.

use crate::names::{NameError, validate_identifier};

/// Suffixes reserved for the physical baseline/overlay tables derived from a
/// logical table name.
pub const RESERVED_SUFFIXES: [&str; 2] = ["_base", "_local"];

/// Names owned by the store's own bookkeeping tables. A logical table with one
/// of these names would shadow (or be shadowed by) the registry.
pub const RESERVED_TABLE_NAMES: [&str; 4] = ["meta", "counters", "tables", "changes"];

/// Column names the physical overlay table uses for provenance tracking.
pub const RESERVED_COLUMN_NAMES: [&str; 3] = ["changed_columns", "is_deleted", "write_id"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Boolean => "boolean",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "integer" => Some(Self::Integer),
            "real" => Some(Self::Real),
            "text" => Some(Self::Text),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    name: String,
    ty: ColumnType,
    nullable: bool,
    references: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            references: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks this column as a reference to another logical table's primary
    /// key. References always target the logical table; the storage layer
    /// resolves them against the merged view, never against the physical
    /// baseline/overlay split.
    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.references = Some(table.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ColumnType {
        self.ty
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn referenced_table(&self) -> Option<&str> {
        self.references.as_deref()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogicalTable {
    name: String,
    primary_key: Column,
    columns: Vec<Column>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaError {
    InvalidTableName { name: String, reason: NameError },
    ReservedTableSuffix { name: String },
    ReservedTableName { name: String },
    ReservedColumnName { column: String },
    MissingPrimaryKey { table: String },
    NullablePrimaryKey { column: String },
    InvalidColumnName { column: String, reason: NameError },
    DuplicateColumn { column: String },
    PrimaryKeyListedAsColumn { column: String },
    InvalidReference { column: String, reason: NameError },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTableName { name, reason } => {
                write!(f, "invalid table name {name:?}: {reason}")
            }
            Self::ReservedTableSuffix { name } => {
                write!(f, "table name {name:?} ends with a reserved physical suffix")
            }
            Self::ReservedTableName { name } => {
                write!(f, "table name {name:?} is reserved for store bookkeeping")
            }
            Self::ReservedColumnName { column } => {
                write!(f, "column name {column:?} is reserved for overlay bookkeeping")
            }
            Self::MissingPrimaryKey { table } => {
                write!(f, "table {table:?} has no primary key")
            }
            Self::NullablePrimaryKey { column } => {
                write!(f, "primary key {column:?} must not be nullable")
            }
            Self::InvalidColumnName { column, reason } => {
                write!(f, "invalid column name {column:?}: {reason}")
            }
            Self::DuplicateColumn { column } => {
                write!(f, "duplicate column {column:?}")
            }
            Self::PrimaryKeyListedAsColumn { column } => {
                write!(f, "primary key {column:?} must not appear in the column list")
            }
            Self::InvalidReference { column, reason } => {
                write!(f, "invalid referenced table on column {column:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

impl LogicalTable {
    pub fn try_new(
        name: impl Into<String>,
        primary_key: Column,
        columns: Vec<Column>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();

        validate_identifier(&name).map_err(|reason| SchemaError::InvalidTableName {
            name: name.clone(),
            reason,
        })?;
        if RESERVED_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(suffix))
        {
            return Err(SchemaError::ReservedTableSuffix { name });
        }
        if RESERVED_TABLE_NAMES.contains(&name.as_str()) {
            return Err(SchemaError::ReservedTableName { name });
        }
        if primary_key.name().is_empty() {
            return Err(SchemaError::MissingPrimaryKey { table: name });
        }
        validate_identifier(primary_key.name()).map_err(|reason| {
            SchemaError::InvalidColumnName {
                column: primary_key.name().to_string(),
                reason,
            }
        })?;
        if primary_key.is_nullable() {
            return Err(SchemaError::NullablePrimaryKey {
                column: primary_key.name().to_string(),
            });
        }
        if RESERVED_COLUMN_NAMES.contains(&primary_key.name()) {
            return Err(SchemaError::ReservedColumnName {
                column: primary_key.name().to_string(),
            });
        }

        let mut seen = std::collections::BTreeSet::new();
        for column in &columns {
            validate_identifier(column.name()).map_err(|reason| {
                SchemaError::InvalidColumnName {
                    column: column.name().to_string(),
                    reason,
                }
            })?;
            if RESERVED_COLUMN_NAMES.contains(&column.name()) {
                return Err(SchemaError::ReservedColumnName {
                    column: column.name().to_string(),
                });
            }
            if column.name() == primary_key.name() {
                return Err(SchemaError::PrimaryKeyListedAsColumn {
                    column: column.name().to_string(),
                });
            }
            if !seen.insert(column.name().to_string()) {
                return Err(SchemaError::DuplicateColumn {
                    column: column.name().to_string(),
                });
            }
            if let Some(target) = column.referenced_table() {
                validate_identifier(target).map_err(|reason| SchemaError::InvalidReference {
                    column: column.name().to_string(),
                    reason,
                })?;
            }
        }

        Ok(Self {
            name,
            primary_key,
            columns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &Column {
        &self.primary_key
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name() == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        name == self.primary_key.name() || self.column(name).is_some()
    }
}
