//! Row updates built from enrichment outcomes.
//!
//! Only fields that were actually produced are written, so an empty scrape
//! never blanks an existing column.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::catalogue::Catalogue;
use crate::extract::ProductRecord;
use crate::pipeline::{Attempt, EnrichmentOutcome};

pub mod columns {
    pub const ENRICHMENT_STATUS: &str = "Enrichment Status";
    pub const LAST_ENRICHED_AT: &str = "Last Enriched At";
    pub const LISTING_STATUS: &str = "Listing Status";
    pub const TITLE: &str = "Title";
    pub const BRAND: &str = "Brand";
    pub const PRICE: &str = "Price";
    pub const RATING: &str = "Rating";
    pub const REVIEW_COUNT: &str = "Review Count";
    pub const BULLET_POINTS: &str = "Bullet Points";
    pub const DESCRIPTION: &str = "Product Description";
    pub const ALL_IMAGE_URLS: &str = "All Image URLs";
    pub const PRIMARY_IMAGE: &str = "Product Image 1";
}

/// Listing status written for products that no longer exist.
pub const DELETED: &str = "Deleted";

pub type FieldMap = BTreeMap<&'static str, String>;

/// One row update: the store's row id plus the columns to set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WritePayload {
    #[serde(rename = "id")]
    pub row_id: u64,
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// Columns to set for one outcome. `record` is ignored unless the outcome is
/// a success.
pub fn fields_for(
    outcome: EnrichmentOutcome,
    record: Option<&ProductRecord>,
    enriched_at: &str,
) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert(columns::ENRICHMENT_STATUS, outcome.label().to_string());
    fields.insert(columns::LAST_ENRICHED_AT, enriched_at.to_string());

    match (outcome, record) {
        (EnrichmentOutcome::NotFound, _) => {
            fields.insert(columns::LISTING_STATUS, DELETED.to_string());
        }
        (EnrichmentOutcome::Success | EnrichmentOutcome::SuccessOnRetry, Some(record)) => {
            fields.insert(columns::LISTING_STATUS, record.status().to_string());
            record_fields(record, &mut fields);
        }
        _ => {}
    }
    fields
}

fn record_fields(record: &ProductRecord, fields: &mut FieldMap) {
    let mut put = |column: &'static str, value: Option<&str>| {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            fields.insert(column, v.to_string());
        }
    };
    put(columns::TITLE, record.title.as_deref());
    put(columns::BRAND, record.brand.as_deref());
    put(columns::PRICE, record.price.as_deref());
    put(columns::RATING, record.rating.as_deref());
    put(columns::REVIEW_COUNT, record.review_count.as_deref());
    put(columns::DESCRIPTION, record.description.as_deref());

    let bullets = joined(&record.bullet_points, "\n");
    put(columns::BULLET_POINTS, Some(bullets.as_str()));

    let images = joined(&record.image_urls, ", ");
    put(columns::ALL_IMAGE_URLS, Some(images.as_str()));
    let primary = record
        .image_urls
        .iter()
        .map(|u| u.trim())
        .find(|u| !u.is_empty());
    put(columns::PRIMARY_IMAGE, primary);
}

fn joined(parts: &[String], sep: &str) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

/// One payload per catalogue row carrying an attempted identifier.
pub fn build(attempts: &[Attempt], catalogue: &Catalogue, enriched_at: &str) -> Vec<WritePayload> {
    attempts
        .iter()
        .flat_map(|attempt| {
            let fields = fields_for(attempt.outcome, attempt.record.as_ref(), enriched_at);
            catalogue
                .row_ids(&attempt.identifier)
                .iter()
                .map(move |&row_id| WritePayload {
                    row_id,
                    fields: fields.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::CatalogueRow;

    const AT: &str = "2026-10-18T12:00:00Z";

    fn kettle() -> ProductRecord {
        ProductRecord {
            title: Some("Kettle".into()),
            brand: Some("  ".into()),
            price: Some("₹1,299.".into()),
            rating: None,
            review_count: Some("12 ratings".into()),
            bullet_points: vec!["Fast".into(), " ".into(), "Safe".into()],
            description: None,
            image_urls: vec!["https://img/a.jpg".into(), "https://img/b.jpg".into()],
        }
    }

    #[test]
    fn success_carries_only_present_fields() {
        let fields = fields_for(EnrichmentOutcome::Success, Some(&kettle()), AT);
        assert_eq!(fields[columns::ENRICHMENT_STATUS], "Success");
        assert_eq!(fields[columns::LAST_ENRICHED_AT], AT);
        assert_eq!(fields[columns::LISTING_STATUS], "Active");
        assert_eq!(fields[columns::TITLE], "Kettle");
        assert_eq!(fields[columns::PRICE], "₹1,299.");
        assert_eq!(fields[columns::BULLET_POINTS], "Fast\nSafe");
        assert_eq!(
            fields[columns::ALL_IMAGE_URLS],
            "https://img/a.jpg, https://img/b.jpg"
        );
        assert_eq!(fields[columns::PRIMARY_IMAGE], "https://img/a.jpg");
        assert!(!fields.contains_key(columns::BRAND));
        assert!(!fields.contains_key(columns::RATING));
        assert!(!fields.contains_key(columns::DESCRIPTION));
    }

    #[test]
    fn not_found_marks_deleted_without_product_fields() {
        let fields = fields_for(EnrichmentOutcome::NotFound, None, AT);
        assert_eq!(fields[columns::ENRICHMENT_STATUS], "ASIN Not Found");
        assert_eq!(fields[columns::LISTING_STATUS], DELETED);
        assert!(!fields.contains_key(columns::TITLE));
        assert!(!fields.contains_key(columns::PRICE));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn scrape_failed_sets_status_and_timestamp_only() {
        let fields = fields_for(EnrichmentOutcome::ScrapeFailed, Some(&kettle()), AT);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[columns::ENRICHMENT_STATUS], "Scrape Failed");
    }

    #[test]
    fn retry_success_is_labelled() {
        let fields = fields_for(EnrichmentOutcome::SuccessOnRetry, Some(&kettle()), AT);
        assert_eq!(fields[columns::ENRICHMENT_STATUS], "Success (on retry)");
        assert_eq!(fields[columns::TITLE], "Kettle");
    }

    #[test]
    fn build_fans_out_to_every_row() {
        let catalogue = Catalogue::from_rows(vec![
            CatalogueRow { row_id: 1, identifier: Some("A1".into()) },
            CatalogueRow { row_id: 2, identifier: Some("B1".into()) },
            CatalogueRow { row_id: 3, identifier: Some("A1".into()) },
        ]);
        let attempts = vec![
            Attempt {
                identifier: "A1".into(),
                outcome: EnrichmentOutcome::Success,
                record: Some(kettle()),
            },
            Attempt {
                identifier: "B1".into(),
                outcome: EnrichmentOutcome::NotFound,
                record: None,
            },
        ];
        let payload = build(&attempts, &catalogue, AT);
        let ids: Vec<u64> = payload.iter().map(|p| p.row_id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
        assert_eq!(payload[0].fields, payload[1].fields);
        assert_eq!(payload[2].fields[columns::LISTING_STATUS], DELETED);
    }

    #[test]
    fn serializes_flat_with_id() {
        let row = WritePayload {
            row_id: 7,
            fields: fields_for(EnrichmentOutcome::NotFound, None, AT),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["Listing Status"], "Deleted");
        assert_eq!(value["Enrichment Status"], "ASIN Not Found");
    }
}
