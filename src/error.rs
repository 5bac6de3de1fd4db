use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a run. Per-identifier faults never end up here;
/// the pipeline absorbs them (see [`ExtractionFault`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("failed to open extractor session: {0}")]
    Session(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("configuration incomplete: {0}")]
    Missing(&'static str),
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

/// Table store faults (network, HTTP status, local database).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A recoverable, per-identifier failure to fetch or read a product page.
#[derive(Debug, Error)]
pub enum ExtractionFault {
    #[error("fetching {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("page was found but has no title")]
    MissingTitle,
    #[error("extractor session already closed")]
    SessionClosed,
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("reading checkpoint {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint {} is not a JSON array of identifiers: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding checkpoint: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("writing checkpoint {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("removing checkpoint {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
