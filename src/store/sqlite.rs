//! Catalogue table kept in a local SQLite file.
//!
//! Rows are keyed by an integer `id` column. Written columns that the table
//! does not have yet are added as `TEXT`.

use std::collections::BTreeSet;
use std::path::Path;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ToSql};
use serde_json::Value;
use tracing::{error, info, warn};

use super::{TableStore, UpsertReport, BATCH_SIZE, PAGE_SIZE};
use crate::catalogue::Record;
use crate::error::TransportError;
use crate::payload::WritePayload;

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        SqliteStore { conn }
    }

    fn columns(&self, table: &str) -> Result<BTreeSet<String>, TransportError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote(table)))?;
        let cols = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(cols)
    }

    fn ensure_columns(&self, table: &str, rows: &[WritePayload]) -> Result<(), TransportError> {
        let existing = self.columns(table)?;
        let wanted: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| r.fields.keys().copied())
            .collect();
        for col in wanted.into_iter().filter(|c| !existing.contains(*c)) {
            info!(table, column = col, "Adding missing column");
            self.conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} TEXT", quote(table), quote(col)),
                [],
            )?;
        }
        Ok(())
    }

    fn update_chunk(&self, table: &str, chunk: &[WritePayload]) -> Result<(), TransportError> {
        let tx = self.conn.unchecked_transaction()?;
        for row in chunk {
            if row.fields.is_empty() {
                continue;
            }
            let set_clause: Vec<String> = row
                .fields
                .keys()
                .enumerate()
                .map(|(i, k)| format!("{} = ?{}", quote(k), i + 1))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?{}",
                quote(table),
                set_clause.join(", "),
                row.fields.len() + 1
            );
            let id = row.row_id as i64;
            let mut params: Vec<&dyn ToSql> =
                row.fields.values().map(|v| v as &dyn ToSql).collect();
            params.push(&id);
            if tx.execute(&sql, params.as_slice())? == 0 {
                warn!(table, row_id = row.row_id, "No row with this id");
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl TableStore for SqliteStore {
    fn fetch_all_rows(&self, table: &str) -> Result<Vec<Record>, TransportError> {
        info!(table, "Fetching SQLite table");
        let sql = format!("SELECT * FROM {} ORDER BY id LIMIT ?1 OFFSET ?2", quote(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = Vec::new();
        loop {
            let page = stmt
                .query_map([PAGE_SIZE as i64, rows.len() as i64], |row| {
                    let mut record = Record::new();
                    for (i, name) in names.iter().enumerate() {
                        record.insert(name.clone(), to_json(row.get_ref(i)?));
                    }
                    Ok(record)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            let last = page.len() < PAGE_SIZE;
            rows.extend(page);
            if last {
                break;
            }
        }
        info!(table, rows = rows.len(), "Fetched rows");
        Ok(rows)
    }

    fn batch_upsert(&self, table: &str, rows: &[WritePayload]) -> UpsertReport {
        let mut report = UpsertReport::default();
        if rows.is_empty() {
            info!("No rows to update");
            return report;
        }
        if let Err(e) = self.ensure_columns(table, rows) {
            error!(table, error = %e, "Cannot prepare columns; nothing written");
            report.chunks = rows.len().div_ceil(BATCH_SIZE);
            report.failed_chunks = report.chunks;
            return report;
        }

        for (i, chunk) in rows.chunks(BATCH_SIZE).enumerate() {
            report.chunks += 1;
            match self.update_chunk(table, chunk) {
                Ok(()) => report.rows_written += chunk.len(),
                Err(e) => {
                    error!(table, chunk = i + 1, error = %e, "Failed to update chunk");
                    report.failed_chunks += 1;
                }
            }
        }
        report
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match SqlValue::from(value) {
        SqlValue::Null | SqlValue::Blob(_) => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => Value::from(f),
        SqlValue::Text(s) => Value::String(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn seeded(rows: usize) -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE catalogue (
                id INTEGER PRIMARY KEY,
                "Marketplace ASIN/Product ID" TEXT,
                "Title" TEXT
            );"#,
        )
        .unwrap();
        for i in 1..=rows {
            conn.execute(
                r#"INSERT INTO catalogue (id, "Marketplace ASIN/Product ID") VALUES (?1, ?2)"#,
                rusqlite::params![i as i64, format!("B{:04}", i)],
            )
            .unwrap();
        }
        SqliteStore::from_connection(conn)
    }

    fn payload(row_id: u64, fields: &[(&'static str, &str)]) -> WritePayload {
        WritePayload {
            row_id,
            fields: fields
                .iter()
                .map(|(k, v)| (*k, v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn fetch_pages_through_whole_table() {
        let store = seeded(PAGE_SIZE + 5);
        let rows = store.fetch_all_rows("catalogue").unwrap();
        assert_eq!(rows.len(), PAGE_SIZE + 5);
        assert_eq!(rows[0]["id"], 1);
        assert_eq!(rows[0]["Marketplace ASIN/Product ID"], "B0001");
        assert_eq!(rows[0]["Title"], Value::Null);
    }

    #[test]
    fn upsert_updates_by_id_and_adds_columns() {
        let store = seeded(3);
        let report = store.batch_upsert(
            "catalogue",
            &[
                payload(1, &[("Title", "Kettle"), ("Enrichment Status", "Success")]),
                payload(3, &[("Enrichment Status", "Scrape Failed")]),
            ],
        );
        assert!(report.success());
        assert_eq!(report.rows_written, 2);

        let rows = store.fetch_all_rows("catalogue").unwrap();
        assert_eq!(rows[0]["Title"], "Kettle");
        assert_eq!(rows[0]["Enrichment Status"], "Success");
        assert_eq!(rows[1]["Enrichment Status"], Value::Null);
        assert_eq!(rows[2]["Enrichment Status"], "Scrape Failed");
        assert_eq!(rows[2]["Title"], Value::Null);
    }

    #[test]
    fn failed_chunk_does_not_stop_later_chunks() {
        let store = seeded(BATCH_SIZE + 1);
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_first BEFORE UPDATE ON catalogue
                 WHEN NEW.id = 1 BEGIN SELECT RAISE(ABORT, 'locked'); END;",
            )
            .unwrap();
        let rows: Vec<WritePayload> = (1..=BATCH_SIZE as u64 + 1)
            .map(|id| payload(id, &[("Title", "x")]))
            .collect();

        let report = store.batch_upsert("catalogue", &rows);
        assert_eq!(
            report,
            UpsertReport {
                chunks: 2,
                failed_chunks: 1,
                rows_written: 1,
            }
        );

        let stored = store.fetch_all_rows("catalogue").unwrap();
        // first chunk rolled back as a whole
        assert_eq!(stored[1]["Title"], Value::Null);
        assert_eq!(stored[BATCH_SIZE]["Title"], "x");
    }

    #[test]
    fn missing_table_fails_every_chunk() {
        let store = seeded(1);
        let report = store.batch_upsert("nope", &[payload(1, &[("Title", "x")])]);
        assert!(!report.success());
        assert_eq!(report.failed_chunks, 1);
        assert!(store.fetch_all_rows("nope").is_err());
    }
}
