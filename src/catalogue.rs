//! Catalogue rows as read from the table store, reduced to what enrichment
//! needs: the store's row id and the product identifier.

use std::collections::HashMap;

use itertools::Itertools;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Marketplace product code (ASIN). Always trimmed and non-empty.
pub type Identifier = String;

/// A raw row from the store, keyed by column name.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueRow {
    pub row_id: u64,
    pub identifier: Option<Identifier>,
}

/// All rows of the catalogue plus an identifier → row ids index.
pub struct Catalogue {
    rows: Vec<CatalogueRow>,
    by_identifier: HashMap<Identifier, Vec<u64>>,
}

impl Catalogue {
    pub fn from_records(records: Vec<Record>, identifier_column: &str) -> Self {
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let Some(row_id) = record.get("id").and_then(row_id_of) else {
                warn!(record = ?record, "Skipping catalogue row without a usable id");
                continue;
            };
            let identifier = record.get(identifier_column).and_then(identifier_of);
            rows.push(CatalogueRow { row_id, identifier });
        }
        Self::from_rows(rows)
    }

    pub fn from_rows(rows: Vec<CatalogueRow>) -> Self {
        let mut by_identifier: HashMap<Identifier, Vec<u64>> = HashMap::new();
        for row in &rows {
            if let Some(id) = &row.identifier {
                by_identifier.entry(id.clone()).or_default().push(row.row_id);
            }
        }
        debug!(
            rows = rows.len(),
            unique = by_identifier.len(),
            "Catalogue indexed"
        );
        Catalogue {
            rows,
            by_identifier,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that carry an identifier.
    pub fn identified_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.identifier.is_some()).count()
    }

    /// Unique identifiers in first-seen row order.
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.rows
            .iter()
            .filter_map(|r| r.identifier.clone())
            .unique()
            .collect()
    }

    /// Every row id sharing this identifier, in row order.
    pub fn row_ids(&self, identifier: &str) -> &[u64] {
        self.by_identifier
            .get(identifier)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn row_id_of(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn identifier_of(value: &Value) -> Option<Identifier> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMN: &str = "Marketplace ASIN/Product ID";

    fn records(values: Vec<Value>) -> Vec<Record> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[test]
    fn blank_and_null_identifiers_are_dropped() {
        let catalogue = Catalogue::from_records(
            records(vec![
                json!({"id": 1, COLUMN: "B01"}),
                json!({"id": 2, COLUMN: null}),
                json!({"id": 3, COLUMN: "   "}),
                json!({"id": 4}),
            ]),
            COLUMN,
        );
        assert_eq!(catalogue.len(), 4);
        assert_eq!(catalogue.identified_rows(), 1);
        assert_eq!(catalogue.identifiers(), vec!["B01".to_string()]);
    }

    #[test]
    fn duplicates_keep_first_seen_order_and_fan_out() {
        let catalogue = Catalogue::from_records(
            records(vec![
                json!({"id": 10, COLUMN: "B02"}),
                json!({"id": 11, COLUMN: " B01 "}),
                json!({"id": 12, COLUMN: "B02"}),
            ]),
            COLUMN,
        );
        assert_eq!(catalogue.identifiers(), vec!["B02", "B01"]);
        assert_eq!(catalogue.row_ids("B02"), &[10, 12]);
        assert_eq!(catalogue.row_ids("B01"), &[11]);
        assert!(catalogue.row_ids("B99").is_empty());
    }

    #[test]
    fn rows_without_id_are_skipped() {
        let catalogue = Catalogue::from_records(
            records(vec![
                json!({COLUMN: "B01"}),
                json!({"id": "7", COLUMN: "B02"}),
            ]),
            COLUMN,
        );
        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue.row_ids("B02"), &[7]);
    }
}
