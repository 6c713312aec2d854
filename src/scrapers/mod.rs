//! Page fetchers for the notice listing.
//!
//! A [`PageFetcher`] turns one listing page URL into the ordered list of
//! candidate items on that page. The crawl engine only ever talks to this
//! trait, so the fetch mechanism can be swapped freely:
//!
//! | Fetcher | Module | Notes |
//! |---------|--------|-------|
//! | HTTP + HTML parsing | [`listing`] | `reqwest` download, `scraper` CSS selection |
//! | Retry decorator | [`retry`] | Exponential backoff with jitter around any fetcher |
//!
//! Failures are reported as [`FetchError`], never as an empty list.

use crate::models::PageCandidate;
use thiserror::Error;

pub mod listing;
pub mod retry;

/// Why a listing page could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("request for {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    /// The page address could not be built from the base URL.
    #[error("invalid page address {0}")]
    InvalidUrl(String),
    /// The page loaded but held no listing items, which means it did not
    /// render as a listing (layout change, block page, truncated body).
    #[error("{url} contains no listing items")]
    EmptyListing { url: String },
}

impl FetchError {
    /// Whether another attempt at the same page may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Request { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_body() || source.is_request()
            }
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::InvalidUrl(_) => false,
            FetchError::EmptyListing { .. } => true,
        }
    }

    /// Whether the page simply does not exist, which past the first page
    /// means the listing has fewer pages than requested.
    pub fn is_missing_page(&self) -> bool {
        matches!(
            self,
            FetchError::Status { status: 404, .. } | FetchError::EmptyListing { .. }
        )
    }
}

/// Capability to fetch the candidates on one listing page.
pub trait PageFetcher {
    /// Fetch `url` and return its listing items in page order.
    async fn fetch_page(&self, url: &str) -> Result<Vec<PageCandidate>, FetchError>;
}

impl<T: PageFetcher> PageFetcher for &T {
    async fn fetch_page(&self, url: &str) -> Result<Vec<PageCandidate>, FetchError> {
        (**self).fetch_page(url).await
    }
}
