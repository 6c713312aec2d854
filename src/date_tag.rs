//! Date tags from notice links.
//!
//! Notice pages on the listing site are published under file names such as
//! `t20230101_12345.html`. The eight digits after the `t` are the publication
//! date and are turned into a `YYYY年MM月DD日` tag for display and sorting.

use crate::models::UNKNOWN_DATE;
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"t(\d{4})(\d{2})(\d{2})_").expect("date marker regex is valid"));

/// Extract the date tag from a raw link.
///
/// The digit groups are copied verbatim; there is no calendar validation, so
/// `t20231340_` yields `2023年13月40日`. Links without a marker, empty links and
/// absent links all yield [`UNKNOWN_DATE`].
pub fn extract(identifier: Option<&str>) -> String {
    identifier
        .and_then(|id| DATE_MARKER.captures(id))
        .map(|caps| format!("{}年{}月{}日", &caps[1], &caps[2], &caps[3]))
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}
