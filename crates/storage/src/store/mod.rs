#![forbid(unsafe_code)]

mod error;
mod requests;
pub mod schema;
mod support;
mod types;

pub use error::StoreError;
pub use requests::*;
pub use schema::{CompiledTable, ForeignKeyRef, compile};
pub use types::{ChangeLogEntry, ChangeOp};

use rusqlite::{Connection, params};
use sb_core::schema::LogicalTable;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use support::*;

const DB_FILE: &str = "syncbase.db";

/// The merge store façade. Applications read and write logical tables as if
/// each were a single table; every write routes into the overlay plus the
/// change log, confirmed state lands through the baseline methods, and reads
/// go through the merged view.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
    tables: BTreeMap<String, CompiledTable>,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&storage_dir)?;

        let db_path = storage_dir.join(DB_FILE);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        install_registry(&conn)?;
        let tables = load_tables(&conn)?;

        Ok(Self {
            conn,
            storage_dir,
            tables,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Compiles and installs a logical table. Defining the same table again
    /// is a no-op (safe redeployment); redefining it with a different shape
    /// is rejected, schema migration is out of scope.
    pub fn define_table(&mut self, table: LogicalTable) -> Result<(), StoreError> {
        let definition_json = encode_table(&table);
        if let Some(existing) = self.tables.get(table.name()) {
            if encode_table(existing.table()) == definition_json {
                return Ok(());
            }
            return Err(StoreError::InvalidInput(
                "table is already defined with a different shape",
            ));
        }

        let compiled = compile(&table);
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        tx.execute_batch(compiled.ddl())?;
        register_table_tx(&tx, table.name(), &definition_json, now_ms)?;
        tx.commit()?;

        self.tables.insert(table.name().to_string(), compiled);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&CompiledTable> {
        self.tables.get(name)
    }

    pub fn insert(&mut self, request: InsertRequest) -> Result<ChangeLogEntry, StoreError> {
        let compiled = self.compiled(&request.table)?.clone();
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let tx_id = next_tx_id_tx(&tx)?;
        let write_id = mint_write_id_tx(&tx)?;
        let entry = insert_row_tx(&tx, &compiled, &request.row, write_id, tx_id, now_ms)?;
        tx.commit()?;
        Ok(entry)
    }

    pub fn update(&mut self, request: UpdateRequest) -> Result<ChangeLogEntry, StoreError> {
        let compiled = self.compiled(&request.table)?.clone();
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let tx_id = next_tx_id_tx(&tx)?;
        let write_id = mint_write_id_tx(&tx)?;
        let entry = update_row_tx(
            &tx,
            &compiled,
            &request.key,
            &request.values,
            write_id,
            tx_id,
            now_ms,
        )?;
        tx.commit()?;
        Ok(entry)
    }

    pub fn delete(&mut self, request: DeleteRequest) -> Result<ChangeLogEntry, StoreError> {
        let compiled = self.compiled(&request.table)?.clone();
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let tx_id = next_tx_id_tx(&tx)?;
        let write_id = mint_write_id_tx(&tx)?;
        let entry = delete_row_tx(&tx, &compiled, &request.key, write_id, tx_id, now_ms)?;
        tx.commit()?;
        Ok(entry)
    }

    pub fn read(&self, table: &str, key: &Value) -> Result<Option<Map<String, Value>>, StoreError> {
        let compiled = self.compiled(table)?;
        let (_, key_sql) = normalize_key(compiled, key)?;
        let mut stmt = self.conn.prepare(compiled.read_view_sql())?;
        let mut rows = stmt.query(params![key_sql])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        Ok(Some(decode_row(row, compiled.table())?))
    }

    pub fn scan(&self, table: &str) -> Result<Vec<Map<String, Value>>, StoreError> {
        self.scan_filtered(table, |_| true)
    }

    pub fn scan_filtered<F>(
        &self,
        table: &str,
        predicate: F,
    ) -> Result<Vec<Map<String, Value>>, StoreError>
    where
        F: Fn(&Map<String, Value>) -> bool,
    {
        let compiled = self.compiled(table)?;
        let mut stmt = self.conn.prepare(compiled.scan_view_sql())?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let decoded = decode_row(row, compiled.table())?;
            if predicate(&decoded) {
                out.push(decoded);
            }
        }
        Ok(out)
    }

    /// Lands a confirmed row from the external authority and runs the
    /// reconciliation step against any pending overlay state.
    pub fn baseline_upsert(&mut self, request: BaselineUpsertRequest) -> Result<(), StoreError> {
        let compiled = self.compiled(&request.table)?.clone();
        let tx = self.conn.transaction()?;
        baseline_upsert_tx(&tx, &compiled, &request.row, request.write_id.as_deref())?;
        tx.commit()?;
        Ok(())
    }

    /// The authority no longer has the row; baseline and any pending overlay
    /// state are both dropped.
    pub fn baseline_delete(&mut self, request: BaselineDeleteRequest) -> Result<(), StoreError> {
        let compiled = self.compiled(&request.table)?.clone();
        let tx = self.conn.transaction()?;
        baseline_delete_tx(&tx, &compiled, &request.key)?;
        tx.commit()?;
        Ok(())
    }

    /// Change-log read path: entries with id greater than `after_id`, in
    /// increasing id order. Consumers keep their own cursor.
    pub fn changes_since(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<ChangeLogEntry>, StoreError> {
        let limit = to_sqlite_i64(limit)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, tbl, op, row_json, write_id, tx_id, ts_ms FROM changes \
             WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![after_id, limit])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let op_raw: String = row.get(2)?;
            let op = ChangeOp::parse(&op_raw)
                .ok_or(StoreError::InvalidInput("corrupt change op"))?;
            let row_json: String = row.get(3)?;
            out.push(ChangeLogEntry {
                id: row.get(0)?,
                table: row.get(1)?,
                op,
                row: serde_json::from_str(&row_json)?,
                write_id: row.get(4)?,
                tx_id: row.get(5)?,
                ts_ms: row.get(6)?,
            });
        }
        Ok(out)
    }

    fn compiled(&self, table: &str) -> Result<&CompiledTable, StoreError> {
        self.tables.get(table).ok_or_else(|| StoreError::UnknownTable {
            table: table.to_string(),
        })
    }
}

fn to_sqlite_i64(value: usize) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::InvalidInput("numeric overflow"))
}
