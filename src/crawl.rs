//! Incremental crawl of the notice listing.
//!
//! A [`CrawlSession`] walks listing pages `0..=page_count` in order, keeps the
//! items whose label contains the keyword, and stops as soon as it meets a URL
//! that was already collected by the previous cycle.
//!
//! # Early stop
//!
//! The listing is assumed to be published newest-first in a stable order, so
//! a known URL means everything after it was captured before. If the site
//! reorders or backfills older notices after newer ones, those notices are
//! missed until a cycle runs without any known identifiers. That trade-off is
//! accepted to keep repeated cycles down to one or two page fetches.

use crate::config::ConfigError;
use crate::date_tag;
use crate::models::{CycleResult, Entry, PageCandidate};
use crate::scrapers::{FetchError, PageFetcher};
use crate::utils::truncate_for_log;
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// A cycle that could not complete. Nothing it collected is kept.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("cycle aborted on page {page}: {source}")]
    Fetch {
        page: usize,
        #[source]
        source: FetchError,
    },
}

/// Where a cycle met an already-known URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarlyStop {
    pub page: usize,
    /// Index of the item within the page, counting every candidate.
    pub position: usize,
    pub url: String,
}

/// A completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub entries: CycleResult,
    pub pages_fetched: usize,
    pub early_stop: Option<EarlyStop>,
    /// First page past the end of the listing, when the site has fewer
    /// pages than configured.
    pub end_of_listing: Option<usize>,
}

/// Keyword filter on listing labels; an empty keyword matches everything.
pub fn matches_keyword(label: &str, keyword: &str) -> bool {
    keyword.is_empty() || label.contains(keyword)
}

/// One configured crawl: which site, how many pages, which keyword.
#[derive(Debug, Clone)]
pub struct CrawlSession {
    base_url: Url,
    page_count: usize,
    keyword: String,
}

impl CrawlSession {
    /// `page_count` is the number of pages after the first, so
    /// `page_count + 1` pages are fetched at most.
    pub fn new(base_url: &str, page_count: usize, keyword: impl Into<String>) -> Result<Self, ConfigError> {
        let mut base_url = Url::parse(base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            page_count,
            keyword: keyword.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Address of listing page `page`: `index.html` first, then `index_{n}.html`.
    pub fn page_url(&self, page: usize) -> Result<Url, FetchError> {
        let file = if page == 0 {
            "index.html".to_string()
        } else {
            format!("index_{page}.html")
        };
        self.base_url
            .join(&file)
            .map_err(|e| FetchError::InvalidUrl(format!("{}{file}: {e}", self.base_url)))
    }

    /// Resolve a raw link against the site base.
    ///
    /// A link that cannot be resolved is kept verbatim so it still works as
    /// an identity.
    pub fn resolve(&self, href: &str) -> String {
        match self.base_url.join(href) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!(%href, error = %e, "Could not resolve link; keeping it verbatim");
                href.to_string()
            }
        }
    }

    /// The candidates of one page that pass the keyword filter, in page order.
    pub fn filter<'a>(&'a self, candidates: &'a [PageCandidate]) -> impl Iterator<Item = (usize, &'a PageCandidate)> + 'a {
        candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| matches_keyword(&c.label, &self.keyword))
    }

    /// Run one cycle against `known`, the identifiers captured when the cycle
    /// started.
    ///
    /// A missing page after the first one (HTTP 404 or a page without listing
    /// items) ends the walk normally; see [`FetchError::is_missing_page`].
    ///
    /// # Errors
    ///
    /// Any other page fetch failure, and any failure on the first page,
    /// aborts the whole cycle with [`CrawlError::Fetch`].
    #[instrument(level = "info", skip_all, fields(keyword = %self.keyword, pages = self.page_count + 1, known = known.len()))]
    pub async fn run<F>(&self, fetcher: &F, known: &HashSet<String>) -> Result<CycleOutcome, CrawlError>
    where
        F: PageFetcher,
    {
        let t0 = Instant::now();
        let mut entries = CycleResult::new();
        let mut pages_fetched = 0;
        let mut early_stop = None;
        let mut end_of_listing = None;

        'pages: for page in 0..=self.page_count {
            let url = self
                .page_url(page)
                .map_err(|source| CrawlError::Fetch { page, source })?;

            let page_t0 = Instant::now();
            let candidates = match fetcher.fetch_page(url.as_str()).await {
                Ok(candidates) => candidates,
                Err(e) if page > 0 && e.is_missing_page() => {
                    info!(page, error = %e, "Listing ends before the configured page count");
                    end_of_listing = Some(page);
                    break;
                }
                Err(source) => return Err(CrawlError::Fetch { page, source }),
            };
            pages_fetched += 1;
            debug!(page, elapsed_ms = page_t0.elapsed().as_millis() as u64, "Fetched listing page");

            let mut matched = 0usize;
            for (position, candidate) in self.filter(&candidates) {
                let Some(href) = candidate.href.as_deref() else {
                    warn!(page, position, label = %truncate_for_log(&candidate.label, 60), "Matching item has no link; skipping");
                    continue;
                };

                let abs_url = self.resolve(href);
                if known.contains(&abs_url) {
                    info!(page, position, url = %abs_url, "Reached a notice from the previous cycle; stopping early");
                    early_stop = Some(EarlyStop {
                        page,
                        position,
                        url: abs_url,
                    });
                    break 'pages;
                }

                entries.push(Entry::new(candidate.label.clone(), abs_url, date_tag::extract(Some(href))));
                matched += 1;
            }
            debug!(page, matched, total = candidates.len(), "Filtered listing page");
        }

        info!(
            count = entries.len(),
            pages_fetched,
            early_stop = early_stop.is_some(),
            end_of_listing = ?end_of_listing,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Crawl cycle complete"
        );
        Ok(CycleOutcome {
            entries,
            pages_fetched,
            early_stop,
            end_of_listing,
        })
    }
}
