//! Data models for scraped notices.
//!
//! - [`PageCandidate`]: one raw listing item as returned by a page fetcher
//! - [`Entry`]: a keyword-matched notice with its absolute URL and date tag
//! - [`CycleResult`]: the entries produced by one crawl cycle, in discovery order

use serde::{Deserialize, Serialize};

/// Sentinel date tag used when a link carries no `tYYYYMMDD_` marker.
pub const UNKNOWN_DATE: &str = "Unknown Date";

/// A raw listing item before filtering.
///
/// `href` is `None` when the item has no link element; such items have no
/// identity and are skipped by the crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCandidate {
    pub label: String,
    pub href: Option<String>,
}

impl PageCandidate {
    pub fn new(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: Some(href.into()),
        }
    }
}

/// A matched notice.
///
/// The URL is the identity of an entry across cycles. Entries are immutable
/// once built, so fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Entry {
    label: String,
    url: String,
    date_tag: String,
}

impl Entry {
    pub fn new(label: impl Into<String>, url: impl Into<String>, date_tag: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            date_tag: date_tag.into(),
        }
    }

    /// The listing text of the notice.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Absolute URL of the notice page.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Either `YYYY年MM月DD日` or [`UNKNOWN_DATE`].
    pub fn date_tag(&self) -> &str {
        &self.date_tag
    }
}

/// Entries from one full crawl, ordered by page then by position on the page.
pub type CycleResult = Vec<Entry>;
