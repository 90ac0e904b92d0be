#![forbid(unsafe_code)]

mod changes_tx;
mod counters;
mod engine_tx;
mod reconcile_tx;
mod registry;
mod rows_tx;
mod time;
mod values;

pub(super) use counters::{mint_write_id_tx, next_tx_id_tx};
pub(super) use engine_tx::{delete_row_tx, insert_row_tx, update_row_tx};
pub(super) use reconcile_tx::{baseline_delete_tx, baseline_upsert_tx};
pub(super) use registry::{encode_table, install_registry, load_tables, register_table_tx};
pub(super) use time::now_ms;
pub(super) use values::{decode_row, normalize_key};
