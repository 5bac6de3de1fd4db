pub mod amazon;

use std::fmt;
use std::ops::{Deref, DerefMut};

use tracing::info;

use crate::catalogue::Identifier;
use crate::error::ExtractionFault;

/// Whether the listing is still live on the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingStatus {
    Active,
    Inactive,
}

impl ListingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingStatus::Active => "Active",
            ListingStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields read from a product page. Any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductRecord {
    pub title: Option<String>,
    pub brand: Option<String>,
    pub price: Option<String>,
    pub rating: Option<String>,
    pub review_count: Option<String>,
    pub bullet_points: Vec<String>,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
}

impl ProductRecord {
    /// The title, if present and not blank.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn status(&self) -> ListingStatus {
        if self.title().is_some() {
            ListingStatus::Active
        } else {
            ListingStatus::Inactive
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// The marketplace has no page for this identifier any more.
    NotFound { identifier: Identifier },
    Found {
        identifier: Identifier,
        record: ProductRecord,
    },
}

/// Fetches one product page per call. Implementations own their pacing.
pub trait RecordExtractor {
    /// `Ok(NotFound)` for pages that legitimately no longer exist;
    /// `Err` only for transient faults.
    fn extract(&mut self, identifier: &str) -> Result<ExtractionResult, ExtractionFault>;

    /// Releases the underlying session. Called exactly once by [`Session`].
    fn release(&mut self) {}
}

/// Scoped ownership of an extractor: `release` runs when the session is
/// dropped, including during unwinding.
pub struct Session<E: RecordExtractor> {
    extractor: E,
}

impl<E: RecordExtractor> Session<E> {
    pub fn new(extractor: E) -> Self {
        info!("Extractor session opened");
        Session { extractor }
    }
}

impl<E: RecordExtractor> Deref for Session<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.extractor
    }
}

impl<E: RecordExtractor> DerefMut for Session<E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.extractor
    }
}

impl<E: RecordExtractor> Drop for Session<E> {
    fn drop(&mut self) {
        self.extractor.release();
        info!("Extractor session closed");
    }
}
