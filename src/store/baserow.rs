//! Baserow REST API: paginated row listing and batch row updates.

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::{TableStore, UpsertReport, BATCH_SIZE, PAGE_SIZE};
use crate::catalogue::Record;
use crate::error::{ConfigError, Error, TransportError};
use crate::payload::WritePayload;

pub struct BaserowStore {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct RowPage {
    #[serde(default)]
    results: Vec<Record>,
    next: Option<String>,
}

impl BaserowStore {
    pub fn new(base_url: &str, api_token: &str) -> Result<Self, Error> {
        let api_token = api_token.trim();
        if api_token.is_empty() {
            return Err(ConfigError::Missing("baserow.api_token").into());
        }
        let mut auth = HeaderValue::from_str(&format!("Token {api_token}"))
            .map_err(|_| ConfigError::Invalid("baserow.api_token is not a valid header".into()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("HTTP client: {e}")))?;
        Ok(BaserowStore {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn list_url(&self, table: &str, page: usize) -> String {
        format!(
            "{}/api/database/rows/table/{}/?user_field_names=true&page={}&size={}",
            self.base_url, table, page, PAGE_SIZE
        )
    }

    fn batch_url(&self, table: &str) -> String {
        format!(
            "{}/api/database/rows/table/{}/batch/?user_field_names=true",
            self.base_url, table
        )
    }
}

fn check(url: &str, response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(TransportError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body: response.text().unwrap_or_default(),
    })
}

impl TableStore for BaserowStore {
    fn fetch_all_rows(&self, table: &str) -> Result<Vec<Record>, TransportError> {
        info!(table, "Fetching Baserow table");
        let mut rows = Vec::new();
        let mut page = 1;
        loop {
            let url = self.list_url(table, page);
            let response = self
                .client
                .get(&url)
                .send()
                .map_err(|source| TransportError::Request {
                    url: url.clone(),
                    source,
                })
                .and_then(|r| check(&url, r))
                .inspect_err(|e| error!(table, page, error = %e, "Error fetching rows"))?;
            let body: RowPage = response.json().map_err(|e| TransportError::Decode {
                url: url.clone(),
                reason: e.to_string(),
            })?;

            let done = body.next.is_none() || body.results.is_empty();
            rows.extend(body.results);
            if done {
                break;
            }
            page += 1;
        }

        if rows.is_empty() {
            warn!(table, "No rows found");
        } else {
            info!(table, rows = rows.len(), "Fetched rows");
        }
        Ok(rows)
    }

    fn batch_upsert(&self, table: &str, rows: &[WritePayload]) -> UpsertReport {
        let mut report = UpsertReport::default();
        if rows.is_empty() {
            info!("No rows to update");
            return report;
        }

        let url = self.batch_url(table);
        let total = rows.len().div_ceil(BATCH_SIZE);
        for (i, chunk) in rows.chunks(BATCH_SIZE).enumerate() {
            report.chunks += 1;
            info!(
                "Updating chunk {}/{} with {} items",
                i + 1,
                total,
                chunk.len()
            );
            let sent = self
                .client
                .patch(&url)
                .json(&json!({ "items": chunk }))
                .send()
                .map_err(|source| TransportError::Request {
                    url: url.clone(),
                    source,
                })
                .and_then(|r| check(&url, r));
            match sent {
                Ok(_) => report.rows_written += chunk.len(),
                Err(e) => {
                    error!(table, chunk = i + 1, error = %e, "Failed to update chunk");
                    report.failed_chunks += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_token_is_rejected() {
        let err = BaserowStore::new("https://api.baserow.io", "  ").err().unwrap();
        assert!(matches!(
            err,
            Error::Config(ConfigError::Missing("baserow.api_token"))
        ));
    }

    #[test]
    fn urls_follow_rest_layout() {
        let store = BaserowStore::new("https://api.baserow.io/", "tok").unwrap();
        assert_eq!(
            store.list_url("812", 3),
            "https://api.baserow.io/api/database/rows/table/812/?user_field_names=true&page=3&size=200"
        );
        assert_eq!(
            store.batch_url("812"),
            "https://api.baserow.io/api/database/rows/table/812/batch/?user_field_names=true"
        );
    }

    #[test]
    fn row_page_tolerates_missing_results() {
        let page: RowPage = serde_json::from_str(r#"{"count": 0, "next": null}"#).unwrap();
        assert!(page.results.is_empty());
        assert!(page.next.is_none());

        let page: RowPage = serde_json::from_str(
            r#"{"count": 2, "next": "https://x/?page=2", "results": [{"id": 1, "Title": "a"}]}"#,
        )
        .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0]["id"], 1);
    }

    #[test]
    fn empty_update_is_a_noop_success() {
        let store = BaserowStore::new("http://127.0.0.1:9", "tok").unwrap();
        let report = store.batch_upsert("1", &[]);
        assert!(report.success());
        assert_eq!(report.chunks, 0);
    }
}
