//! Report outputs for the latest results.
//!
//! # Submodules
//!
//! - [`html`]: Self-contained HTML dashboard, sorted newest first
//! - [`json`]: JSON snapshot of the same entries for API consumers
//!
//! # Output Structure
//!
//! ```text
//! docs/
//! ├── dashboard.html
//! └── entries.json
//! ```
//!
//! Reports are only rewritten after a completed cycle; when a cycle aborts,
//! the previous files stay in place.

use crate::cache::ResultCache;
use crate::utils::format_timestamp;
use chrono::FixedOffset;
use std::error::Error;
use tracing::{error, instrument};

pub mod html;
pub mod json;

/// Where and how the reports are written.
#[derive(Debug, Clone)]
pub struct ReportPublisher {
    pub title: String,
    pub html_path: String,
    pub json_path: Option<String>,
    pub offset: FixedOffset,
}

impl ReportPublisher {
    /// Render the cache's latest results to the configured files.
    ///
    /// Both files are attempted; the first failure is returned.
    #[instrument(level = "info", skip_all, fields(html_path = %self.html_path))]
    pub async fn publish(&self, cache: &ResultCache) -> Result<(), Box<dyn Error>> {
        let view = cache.view();
        let updated_at = view.updated_at.map(|at| format_timestamp(at, self.offset));
        let page = html::render_dashboard(&view.entries, &self.title, updated_at.as_deref());

        let html_result = html::write_dashboard(&page, &self.html_path).await;
        if let Err(e) = &html_result {
            error!(path = %self.html_path, error = %e, "Failed to write static dashboard");
        }

        if let Some(json_path) = &self.json_path {
            let snapshot = json::EntriesSnapshot::new(&view.entries, view.updated_at, self.offset);
            if let Err(e) = json::write_snapshot(&snapshot, json_path).await {
                error!(path = %json_path, error = %e, "Failed to write JSON snapshot");
                html_result?;
                return Err(e);
            }
        }

        html_result
    }
}
