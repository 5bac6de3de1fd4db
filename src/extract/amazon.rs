//! Product detail pages at `https://www.<domain>/dp/<ASIN>`.

use std::thread;
use std::time::Duration;

use itertools::Itertools;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::{ExtractionResult, ProductRecord, RecordExtractor};
use crate::error::{Error, ExtractionFault};
use crate::settings::ScraperSettings;

const NOT_FOUND_MARKERS: [&str; 2] = ["page not found", "sorry! we couldn't find that page"];
const FULL_SIZE_SUFFIX: &str = "._AC_SL1500_.jpg";

/// CSS selectors for the product page, compiled once per session.
pub struct Selectors {
    page_title: Selector,
    product_title: Selector,
    byline: Selector,
    price_whole: Selector,
    price_symbol: Selector,
    rating: Selector,
    review_count: Selector,
    bullets: Selector,
    thumbnails: Selector,
    landing_image: Selector,
    description: Selector,
}

impl Selectors {
    pub fn compile() -> Result<Self, Error> {
        Ok(Selectors {
            page_title: parse("title")?,
            product_title: parse("#productTitle")?,
            byline: parse("#bylineInfo")?,
            price_whole: parse(".a-price-whole")?,
            price_symbol: parse(".a-price-symbol")?,
            rating: parse("#acrPopover")?,
            review_count: parse("#acrCustomerReviewText")?,
            bullets: parse("#feature-bullets li")?,
            thumbnails: parse("li.thumbnail img")?,
            landing_image: parse("#landingImage")?,
            description: parse("#productDescription")?,
        })
    }
}

fn parse(css: &str) -> Result<Selector, Error> {
    Selector::parse(css).map_err(|e| Error::Session(format!("bad selector {css:?}: {e}")))
}

pub struct AmazonExtractor {
    client: Option<Client>,
    base_url: String,
    min_delay: f64,
    max_delay: f64,
    selectors: Selectors,
}

impl AmazonExtractor {
    pub fn open(settings: &ScraperSettings) -> Result<Self, Error> {
        info!(domain = %settings.domain, "Setting up HTTP session");
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| Error::Session(e.to_string()))?;

        Ok(AmazonExtractor {
            client: Some(client),
            base_url: format!("https://www.{}/dp/", settings.domain.trim()),
            min_delay: settings.min_delay_seconds,
            max_delay: settings.max_delay_seconds,
            selectors: Selectors::compile()?,
        })
    }

    fn pause(&self) {
        let secs = if self.max_delay > self.min_delay {
            self.min_delay + fastrand::f64() * (self.max_delay - self.min_delay)
        } else {
            self.min_delay
        };
        if secs > 0.0 {
            thread::sleep(Duration::from_secs_f64(secs));
        }
    }
}

impl RecordExtractor for AmazonExtractor {
    fn extract(&mut self, identifier: &str) -> Result<ExtractionResult, ExtractionFault> {
        let client = self.client.as_ref().ok_or(ExtractionFault::SessionClosed)?;
        let url = format!("{}{}", self.base_url, identifier);
        debug!(%url, "Fetching product page");

        let fetched = client
            .get(&url)
            .send()
            .map_err(|source| ExtractionFault::Request {
                url: url.clone(),
                source,
            })
            .and_then(|response| match response.status() {
                StatusCode::NOT_FOUND => Ok(None),
                status if !status.is_success() => Err(ExtractionFault::Status {
                    url: url.clone(),
                    status: status.as_u16(),
                }),
                _ => response
                    .text()
                    .map(Some)
                    .map_err(|source| ExtractionFault::Request {
                        url: url.clone(),
                        source,
                    }),
            });
        self.pause();

        match fetched? {
            None => {
                warn!(asin = identifier, "Product page returned 404");
                Ok(ExtractionResult::NotFound {
                    identifier: identifier.to_string(),
                })
            }
            Some(html) => Ok(parse_product_page(identifier, &html, &self.selectors)),
        }
    }

    fn release(&mut self) {
        if self.client.take().is_some() {
            info!("Closing the HTTP session");
        }
    }
}

/// Reads a product page. Never fails: missing elements leave fields empty.
pub fn parse_product_page(identifier: &str, html: &str, sel: &Selectors) -> ExtractionResult {
    let doc = Html::parse_document(html);

    let page_title = first_text(&doc, &sel.page_title)
        .unwrap_or_default()
        .to_lowercase();
    if NOT_FOUND_MARKERS.iter().any(|m| page_title.contains(m)) {
        warn!(asin = identifier, "Page Not Found");
        return ExtractionResult::NotFound {
            identifier: identifier.to_string(),
        };
    }

    let price = match (
        first_text(&doc, &sel.price_symbol),
        first_text(&doc, &sel.price_whole),
    ) {
        (Some(symbol), Some(whole)) => Some(format!("{symbol}{whole}")),
        _ => None,
    };

    let rating = doc
        .select(&sel.rating)
        .next()
        .and_then(|el| el.value().attr("title"))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let bullet_points = doc
        .select(&sel.bullets)
        .map(text_of)
        .filter(|t| !t.is_empty())
        .collect();

    let record = ProductRecord {
        title: first_text(&doc, &sel.product_title),
        brand: first_text(&doc, &sel.byline),
        price,
        rating,
        review_count: first_text(&doc, &sel.review_count),
        bullet_points,
        description: first_text(&doc, &sel.description),
        image_urls: image_urls(&doc, sel),
    };

    ExtractionResult::Found {
        identifier: identifier.to_string(),
        record,
    }
}

/// Thumbnail images at full size, or the landing image when there are none.
fn image_urls(doc: &Html, sel: &Selectors) -> Vec<String> {
    let thumbs: Vec<String> = doc
        .select(&sel.thumbnails)
        .filter_map(|img| img.value().attr("src"))
        .map(full_size)
        .unique()
        .collect();
    if !thumbs.is_empty() {
        return thumbs;
    }
    doc.select(&sel.landing_image)
        .filter_map(|img| img.value().attr("src"))
        .map(|src| src.trim().to_string())
        .filter(|src| !src.is_empty())
        .take(1)
        .collect()
}

fn full_size(src: &str) -> String {
    let stem = src.trim().split("._").next().unwrap_or_default();
    format!("{stem}{FULL_SIZE_SUFFIX}")
}

fn first_text(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .map(text_of)
        .filter(|t| !t.is_empty())
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().split_whitespace().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn parse_fixture(name: &str) -> ExtractionResult {
        let sel = Selectors::compile().unwrap();
        parse_product_page("B0TEST0001", &fixture(name), &sel)
    }

    #[test]
    fn full_product_page() {
        let ExtractionResult::Found { identifier, record } = parse_fixture("product_full") else {
            panic!("expected a found page");
        };
        assert_eq!(identifier, "B0TEST0001");
        assert_eq!(
            record.title.as_deref(),
            Some("Stainless Steel Electric Kettle, 1.5 L")
        );
        assert_eq!(record.brand.as_deref(), Some("Visit the Prestige Store"));
        assert_eq!(record.price.as_deref(), Some("₹1,299."));
        assert_eq!(record.rating.as_deref(), Some("4.3 out of 5 stars"));
        assert_eq!(record.review_count.as_deref(), Some("12,345 ratings"));
        assert_eq!(
            record.bullet_points,
            vec!["1500 W concealed element", "Auto shut-off"]
        );
        assert_eq!(
            record.description.as_deref(),
            Some("Boils water fast. Easy to clean.")
        );
        assert_eq!(
            record.image_urls,
            vec![
                "https://m.media-amazon.com/images/I/61abc._AC_SL1500_.jpg",
                "https://m.media-amazon.com/images/I/71def._AC_SL1500_.jpg",
            ]
        );
        assert_eq!(record.status(), crate::extract::ListingStatus::Active);
    }

    #[test]
    fn not_found_by_page_title() {
        assert_eq!(
            parse_fixture("product_not_found"),
            ExtractionResult::NotFound {
                identifier: "B0TEST0001".into()
            }
        );
    }

    #[test]
    fn page_without_title_still_found() {
        let ExtractionResult::Found { record, .. } = parse_fixture("product_no_title") else {
            panic!("expected a found page");
        };
        assert_eq!(record.title(), None);
        assert_eq!(record.price, None);
        assert_eq!(
            record.image_urls,
            vec!["https://m.media-amazon.com/images/I/81xyz._SX679_.jpg"]
        );
    }

    #[test]
    fn thumbnail_rewritten_to_full_size() {
        assert_eq!(
            full_size(" https://m.media-amazon.com/images/I/41q._SS40_.jpg "),
            "https://m.media-amazon.com/images/I/41q._AC_SL1500_.jpg"
        );
    }
}
