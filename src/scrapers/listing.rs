//! HTTP fetcher for the notice listing pages.
//!
//! Each listing page is a static HTML document with one heading element per
//! notice, and the notice link nested inside the heading:
//!
//! ```html
//! <h4><a href="./202301/t20230101_1.html">闵行区 ... 征收土地方案公告</a></h4>
//! ```
//!
//! The heading selector is configurable; the default mirrors the position of
//! the listing block on the live site.

use crate::config::ConfigError;
use crate::models::PageCandidate;
use crate::scrapers::{FetchError, PageFetcher};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// CSS path of the listing headings on the live site.
pub const DEFAULT_ITEM_SELECTOR: &str = "body > div:nth-of-type(2) > div:nth-of-type(3) > div > div > div > div > div:nth-of-type(2) > h4";

/// Desktop browser user agent; the site serves a reduced page to unknown agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("link selector is valid"));

/// Downloads listing pages with `reqwest` and selects items with `scraper`.
#[derive(Debug, Clone)]
pub struct ListingFetcher {
    client: reqwest::Client,
    item_selector: Selector,
}

impl ListingFetcher {
    /// Build a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Fails when `item_selector` is not valid CSS or the client cannot be built.
    pub fn new(user_agent: &str, timeout: Duration, item_selector: &str) -> Result<Self, ConfigError> {
        let item_selector = parse_selector(item_selector)?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;
        Ok(Self {
            client,
            item_selector,
        })
    }
}

impl PageFetcher for ListingFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch_page(&self, url: &str) -> Result<Vec<PageCandidate>, FetchError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
        let candidates = parse_listing(&body, &self.item_selector);
        if candidates.is_empty() {
            warn!(bytes = body.len(), "Listing selector matched nothing");
            return Err(FetchError::EmptyListing { url: url.to_string() });
        }

        debug!(
            count = candidates.len(),
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Parsed listing page"
        );
        Ok(candidates)
    }
}

/// Parse a CSS selector, keeping the message of a syntax error.
pub fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Extract the listing items of one page in document order.
///
/// The label is the item's whitespace-trimmed text. The link is the item's
/// own `href` when the item is an anchor, otherwise the first nested
/// `a[href]`.
pub fn parse_listing(html: &str, item_selector: &Selector) -> Vec<PageCandidate> {
    let document = Html::parse_document(html);
    document
        .select(item_selector)
        .map(|item| PageCandidate {
            label: item.text().collect::<String>().trim().to_string(),
            href: item_href(item),
        })
        .collect()
}

fn item_href(item: ElementRef<'_>) -> Option<String> {
    if let Some(href) = item.value().attr("href") {
        return Some(href.to_string());
    }
    item.select(&LINK_SELECTOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string)
}
