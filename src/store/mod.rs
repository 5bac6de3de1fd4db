pub mod baserow;
pub mod sqlite;

use crate::catalogue::Record;
use crate::error::{Error, TransportError};
use crate::payload::WritePayload;
use crate::settings::StoreTarget;

/// Rows per write request. Baserow rejects larger batches.
pub const BATCH_SIZE: usize = 200;
/// Rows per read page.
pub const PAGE_SIZE: usize = 200;

/// A remote (or local) table of catalogue rows.
pub trait TableStore {
    /// Every row of `table`, following pagination to the end.
    fn fetch_all_rows(&self, table: &str) -> Result<Vec<Record>, TransportError>;

    /// Updates rows by id in chunks of [`BATCH_SIZE`]. A failed chunk is
    /// logged and the remaining chunks are still sent.
    fn batch_upsert(&self, table: &str, rows: &[WritePayload]) -> UpsertReport;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertReport {
    pub chunks: usize,
    pub failed_chunks: usize,
    pub rows_written: usize,
}

impl UpsertReport {
    pub fn success(&self) -> bool {
        self.failed_chunks == 0
    }
}

/// Opens the configured backend and returns it with its table reference.
pub fn open(target: &StoreTarget) -> Result<(Box<dyn TableStore>, String), Error> {
    match target {
        StoreTarget::Baserow {
            base_url,
            api_token,
            table_id,
        } => {
            let store = baserow::BaserowStore::new(base_url, api_token)?;
            Ok((Box::new(store), table_id.to_string()))
        }
        StoreTarget::Sqlite { path, table } => {
            let store = sqlite::SqliteStore::open(path)?;
            Ok((Box::new(store), table.clone()))
        }
    }
}
