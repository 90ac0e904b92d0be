#![forbid(unsafe_code)]

//! Schema compiler.
//!
//! Turns a validated [`LogicalTable`] into its physical layout: the baseline
//! table `<name>_base` (server-confirmed state, written only by the
//! replicator path), the overlay table `<name>_local` (locally pending state
//! with per-column provenance) and the merged view `<name>` that applications
//! read. Compilation is a pure function of the definition: the same input
//! always produces byte-identical output, and all emitted DDL is
//! `IF NOT EXISTS` so redeploying an unchanged definition is a no-op.
//!
//! No database trigger is emitted; the store itself is the write
//! interceptor. The compiled output also carries the statement text the
//! interceptor runs, so everything SQL-shaped for a table lives here.

use sb_core::schema::{Column, ColumnType, LogicalTable};

/// A column that references another logical table. The reference resolves
/// against the referenced table's *merged view*, never against its physical
/// baseline/overlay split; physical tables carry no constraint because each
/// side must accept rows the other side does not have yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub column: String,
    pub view: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledTable {
    table: LogicalTable,
    baseline_table: String,
    overlay_table: String,
    view_name: String,
    ddl: String,
    foreign_keys: Vec<ForeignKeyRef>,
    select_baseline_sql: String,
    select_overlay_sql: String,
    upsert_baseline_sql: String,
    upsert_overlay_sql: String,
    delete_baseline_sql: String,
    delete_overlay_sql: String,
    read_view_sql: String,
    scan_view_sql: String,
}

pub fn compile(table: &LogicalTable) -> CompiledTable {
    let baseline_table = format!("{}_base", table.name());
    let overlay_table = format!("{}_local", table.name());
    let view_name = table.name().to_string();

    let foreign_keys = table
        .columns()
        .iter()
        .filter_map(|column| {
            column.referenced_table().map(|target| ForeignKeyRef {
                column: column.name().to_string(),
                view: target.to_string(),
            })
        })
        .collect();

    let ddl = render_ddl(table, &baseline_table, &overlay_table, &view_name);

    let pk = table.primary_key().name();
    let select_list = select_list(table);
    let all_columns = physical_columns(table);

    let select_baseline_sql = format!(
        "SELECT {select_list} FROM {baseline_table} WHERE {pk} = ?1"
    );
    let select_overlay_sql = format!(
        "SELECT {select_list}, changed_columns, is_deleted, write_id FROM {overlay_table} WHERE {pk} = ?1"
    );
    let upsert_baseline_sql = format!(
        "INSERT OR REPLACE INTO {baseline_table}({list}, write_id) VALUES ({placeholders})",
        list = all_columns.join(", "),
        placeholders = placeholders(all_columns.len() + 1),
    );
    let upsert_overlay_sql = format!(
        "INSERT OR REPLACE INTO {overlay_table}({list}, changed_columns, is_deleted, write_id) VALUES ({placeholders})",
        list = all_columns.join(", "),
        placeholders = placeholders(all_columns.len() + 3),
    );
    let delete_baseline_sql = format!("DELETE FROM {baseline_table} WHERE {pk} = ?1");
    let delete_overlay_sql = format!("DELETE FROM {overlay_table} WHERE {pk} = ?1");
    let read_view_sql = format!("SELECT {select_list} FROM {view_name} WHERE {pk} = ?1");
    let scan_view_sql = format!("SELECT {select_list} FROM {view_name} ORDER BY {pk}");

    CompiledTable {
        table: table.clone(),
        baseline_table,
        overlay_table,
        view_name,
        ddl,
        foreign_keys,
        select_baseline_sql,
        select_overlay_sql,
        upsert_baseline_sql,
        upsert_overlay_sql,
        delete_baseline_sql,
        delete_overlay_sql,
        read_view_sql,
        scan_view_sql,
    }
}

impl CompiledTable {
    pub fn table(&self) -> &LogicalTable {
        &self.table
    }

    pub fn baseline_table(&self) -> &str {
        &self.baseline_table
    }

    pub fn overlay_table(&self) -> &str {
        &self.overlay_table
    }

    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    pub fn ddl(&self) -> &str {
        &self.ddl
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyRef] {
        &self.foreign_keys
    }

    pub(in crate::store) fn select_baseline_sql(&self) -> &str {
        &self.select_baseline_sql
    }

    pub(in crate::store) fn select_overlay_sql(&self) -> &str {
        &self.select_overlay_sql
    }

    pub(in crate::store) fn upsert_baseline_sql(&self) -> &str {
        &self.upsert_baseline_sql
    }

    pub(in crate::store) fn upsert_overlay_sql(&self) -> &str {
        &self.upsert_overlay_sql
    }

    pub(in crate::store) fn delete_baseline_sql(&self) -> &str {
        &self.delete_baseline_sql
    }

    pub(in crate::store) fn delete_overlay_sql(&self) -> &str {
        &self.delete_overlay_sql
    }

    pub(in crate::store) fn read_view_sql(&self) -> &str {
        &self.read_view_sql
    }

    pub(in crate::store) fn scan_view_sql(&self) -> &str {
        &self.scan_view_sql
    }
}

fn sql_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer | ColumnType::Boolean => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Text => "TEXT",
    }
}

/// Primary key followed by the non-key columns, in definition order.
fn physical_columns(table: &LogicalTable) -> Vec<String> {
    let mut names = Vec::with_capacity(table.columns().len() + 1);
    names.push(table.primary_key().name().to_string());
    for column in table.columns() {
        names.push(column.name().to_string());
    }
    names
}

fn select_list(table: &LogicalTable) -> String {
    physical_columns(table).join(", ")
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_def(column: &Column) -> String {
    // Physical columns are nullable regardless of the logical flag: an
    // overlay row created by a partial update against an absent baseline
    // legitimately holds NULLs. Logical non-null is enforced on insert input.
    format!("  {} {}", column.name(), sql_type(column.ty()))
}

fn render_ddl(
    table: &LogicalTable,
    baseline_table: &str,
    overlay_table: &str,
    view_name: &str,
) -> String {
    let pk = table.primary_key();
    let pk_name = pk.name();
    let pk_def = format!("  {} {} PRIMARY KEY", pk_name, sql_type(pk.ty()));

    let mut out = String::new();

    out.push_str(&format!("CREATE TABLE IF NOT EXISTS {baseline_table} (\n"));
    out.push_str(&pk_def);
    for column in table.columns() {
        out.push_str(",\n");
        out.push_str(&column_def(column));
    }
    out.push_str(",\n  write_id TEXT\n);\n\n");

    out.push_str(&format!("CREATE TABLE IF NOT EXISTS {overlay_table} (\n"));
    out.push_str(&pk_def);
    for column in table.columns() {
        out.push_str(",\n");
        out.push_str(&column_def(column));
    }
    out.push_str(",\n  changed_columns TEXT NOT NULL");
    out.push_str(",\n  is_deleted INTEGER NOT NULL DEFAULT 0");
    out.push_str(",\n  write_id TEXT NOT NULL\n);\n\n");

    out.push_str(&render_view(table, baseline_table, overlay_table, view_name));
    out
}

/// The merged view: baseline rows with overlay columns spliced in where the
/// column is listed in `changed_columns`, plus overlay-only rows (no baseline
/// yet). Tombstoned rows are hidden from both arms. Written as LEFT JOIN +
/// anti-join UNION ALL so it runs on SQLite builds without FULL OUTER JOIN.
fn render_view(
    table: &LogicalTable,
    baseline_table: &str,
    overlay_table: &str,
    view_name: &str,
) -> String {
    let pk_name = table.primary_key().name();

    let mut merged_cols = vec![format!("  b.{pk_name} AS {pk_name}")];
    let mut overlay_cols = vec![format!("  l.{pk_name} AS {pk_name}")];
    for column in table.columns() {
        let name = column.name();
        merged_cols.push(format!(
            "  CASE WHEN l.{pk_name} IS NOT NULL AND EXISTS (SELECT 1 FROM json_each(l.changed_columns) WHERE json_each.value = '{name}') THEN l.{name} ELSE b.{name} END AS {name}"
        ));
        overlay_cols.push(format!("  l.{name} AS {name}"));
    }

    format!(
        "CREATE VIEW IF NOT EXISTS {view_name} AS\nSELECT\n{merged}\nFROM {baseline_table} b\nLEFT JOIN {overlay_table} l ON l.{pk_name} = b.{pk_name}\nWHERE COALESCE(l.is_deleted, 0) = 0\nUNION ALL\nSELECT\n{overlay}\nFROM {overlay_table} l\nWHERE l.is_deleted = 0\n  AND NOT EXISTS (SELECT 1 FROM {baseline_table} b WHERE b.{pk_name} = l.{pk_name});\n",
        merged = merged_cols.join(",\n"),
        overlay = overlay_cols.join(",\n"),
    )
}
