//! JSON snapshot of the latest results.
//!
//! Written next to the HTML dashboard for API consumers and served by the
//! dashboard's `/api/entries` route:
//!
//! ```json
//! {
//!   "updated_at": "2024-03-02T09:00:00+08:00",
//!   "count": 1,
//!   "entries": [{ "label": "...", "url": "...", "date_tag": "2024年03月01日" }]
//! }
//! ```

use crate::models::Entry;
use crate::outputs::html::sorted_for_report;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

/// The latest results as written to `entries.json` and served by
/// `/api/entries`.
///
/// Entries are in report order (see [`sorted_for_report`]) and `count` is
/// their number, so clients can check for truncation.
#[derive(Debug, Deserialize, Serialize)]
pub struct EntriesSnapshot {
    /// Time of the last successful cycle in the report offset.
    pub updated_at: Option<DateTime<FixedOffset>>,
    pub count: usize,
    /// Entries in report order.
    pub entries: Vec<Entry>,
}

impl EntriesSnapshot {
    /// Build a snapshot from cached entries.
    ///
    /// # Arguments
    ///
    /// * `entries` - Entries in discovery order; they are sorted here
    /// * `updated_at` - Time of the last rotation, if any
    /// * `offset` - UTC offset the timestamp is shown in
    pub fn new(entries: &[Entry], updated_at: Option<DateTime<Utc>>, offset: FixedOffset) -> Self {
        let entries = sorted_for_report(entries);
        Self {
            updated_at: updated_at.map(|at| at.with_timezone(&offset)),
            count: entries.len(),
            entries,
        }
    }
}

/// Write `snapshot` as pretty JSON to `path`, creating parent directories.
///
/// # Returns
///
/// `Ok(())` on success, or an error if serialization, directory creation or
/// the write fails.
#[instrument(level = "info", skip_all, fields(%path))]
pub async fn write_snapshot(snapshot: &EntriesSnapshot, path: &str) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(snapshot)?;

    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(dir = %parent.display(), error = %e, "Failed to create JSON dir");
                return Err(e.into());
            }
        }
    }

    fs::write(path, json).await?;
    info!(count = snapshot.count, "Wrote JSON snapshot");
    Ok(())
}
