//! Runtime configuration.
//!
//! Settings come from built-in defaults, optionally overlaid by a YAML file
//! (`--config`), then by command-line flags and environment variables.
//!
//! ```yaml
//! base_url: https://hd.ghzyj.sh.gov.cn/2017/zdxxgk/
//! keyword: 闵行
//! page_count: 30
//! report_path: docs/dashboard.html
//! schedule:
//!   kind: daily
//!   times: ["09:00", "18:00"]
//! ```

use crate::cli::Overrides;
use crate::crawl::CrawlSession;
use crate::outputs::ReportPublisher;
use crate::schedule::Schedule;
use crate::scrapers::listing::{DEFAULT_ITEM_SELECTOR, DEFAULT_USER_AGENT, ListingFetcher};
use crate::scrapers::retry::RetryFetch;
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid base url {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid item selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("invalid schedule time {0:?}, expected HH:MM")]
    InvalidTime(String),
    #[error("schedule has no run times")]
    EmptySchedule,
    #[error("schedule interval must be at least one second")]
    ZeroInterval,
    #[error("utc offset {0} hours is out of range")]
    InvalidOffset(i32),
    #[error("invalid dashboard address {0:?}")]
    InvalidAddr(String),
    #[error("cannot build http client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// When cycles run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleSettings {
    /// Fixed period between cycle starts.
    Interval { every_secs: u64 },
    /// Wall-clock times (`HH:MM`) in the configured UTC offset.
    Daily { times: Vec<String> },
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings::Daily {
            times: vec!["09:00".to_string(), "18:00".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory that holds `index.html` and `index_N.html`.
    pub base_url: String,
    /// Labels must contain this; empty matches everything.
    pub keyword: String,
    /// Pages fetched after the first one.
    pub page_count: usize,
    /// CSS selector of one listing item.
    pub item_selector: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Extra attempts per page before a cycle is aborted.
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    /// Cap on one backoff delay.
    pub retry_max_delay_ms: u64,
    pub report_title: String,
    pub report_path: String,
    pub json_path: Option<String>,
    /// Offset used for report timestamps and daily schedule times.
    pub utc_offset_hours: i32,
    pub schedule: ScheduleSettings,
    /// Serve the live dashboard on this address in watch mode.
    pub dashboard_addr: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://hd.ghzyj.sh.gov.cn/2017/zdxxgk/".to_string(),
            keyword: "闵行".to_string(),
            page_count: 30,
            item_selector: DEFAULT_ITEM_SELECTOR.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            report_title: "上海市闵行区人民政府征收土地方案公告".to_string(),
            report_path: "docs/dashboard.html".to_string(),
            json_path: Some("docs/entries.json".to_string()),
            utc_offset_hours: 8,
            schedule: ScheduleSettings::default(),
            dashboard_addr: None,
        }
    }
}

impl Settings {
    /// Defaults, overlaid by the YAML file at `path` when given.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let settings = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        info!(%path, "Loaded configuration");
        Ok(settings)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Apply command-line overrides on top of the loaded settings.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(base_url) = &overrides.base_url {
            self.base_url = base_url.clone();
        }
        if let Some(keyword) = &overrides.keyword {
            self.keyword = keyword.clone();
        }
        if let Some(pages) = overrides.pages {
            self.page_count = pages;
        }
        if let Some(selector) = &overrides.selector {
            self.item_selector = selector.clone();
        }
        if let Some(report) = &overrides.report {
            self.report_path = report.clone();
        }
        if let Some(json) = &overrides.json {
            self.json_path = Some(json.clone());
        }
        if overrides.no_json {
            self.json_path = None;
        }
    }

    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset(self.utc_offset_hours))
    }

    pub fn schedule(&self) -> Result<Schedule, ConfigError> {
        match &self.schedule {
            ScheduleSettings::Interval { every_secs: 0 } => Err(ConfigError::ZeroInterval),
            ScheduleSettings::Interval { every_secs } => Ok(Schedule::Interval(Duration::from_secs(*every_secs))),
            ScheduleSettings::Daily { times } => {
                let times = times
                    .iter()
                    .map(|t| NaiveTime::parse_from_str(t.trim(), "%H:%M").map_err(|_| ConfigError::InvalidTime(t.clone())))
                    .collect::<Result<Vec<_>, _>>()?;
                Schedule::daily(times, self.offset()?)
            }
        }
    }

    pub fn session(&self) -> Result<CrawlSession, ConfigError> {
        CrawlSession::new(&self.base_url, self.page_count, self.keyword.clone())
    }

    pub fn fetcher(&self) -> Result<RetryFetch<ListingFetcher>, ConfigError> {
        let listing = ListingFetcher::new(
            &self.user_agent,
            Duration::from_secs(self.request_timeout_secs),
            &self.item_selector,
        )?;
        Ok(RetryFetch::new(
            listing,
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(self.retry_max_delay_ms)))
    }

    pub fn publisher(&self) -> Result<ReportPublisher, ConfigError> {
        Ok(ReportPublisher {
            title: self.report_title.clone(),
            html_path: self.report_path.clone(),
            json_path: self.json_path.clone(),
            offset: self.offset()?,
        })
    }

    pub fn dashboard_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        self.dashboard_addr
            .as_deref()
            .map(|addr| addr.parse().map_err(|_| ConfigError::InvalidAddr(addr.to_string())))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build_every_component() {
        let settings = Settings::default();
        assert!(settings.session().is_ok());
        assert!(settings.fetcher().is_ok());
        assert!(settings.publisher().is_ok());
        assert_eq!(settings.offset().unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(settings.dashboard_addr().unwrap(), None);
        assert!(matches!(settings.schedule().unwrap(), Schedule::Daily { .. }));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = Settings::from_yaml(
            "keyword: 浦东\npage_count: 3\nschedule:\n  kind: interval\n  every_secs: 43200\n",
        )
        .unwrap();
        assert_eq!(settings.keyword, "浦东");
        assert_eq!(settings.page_count, 3);
        assert_eq!(settings.report_path, "docs/dashboard.html");
        assert_eq!(
            settings.schedule().unwrap(),
            Schedule::Interval(Duration::from_secs(43200))
        );
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notice_watch.yaml");
        std::fs::write(&path, "keyword: ''\njson_path: null\n").unwrap();

        let settings = Settings::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(settings.keyword, "");
        assert_eq!(settings.json_path, None);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Settings::load(Some("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_overrides_win() {
        let mut settings = Settings::default();
        settings.apply(&Overrides {
            keyword: Some("".to_string()),
            pages: Some(0),
            report: Some("out/report.html".to_string()),
            no_json: true,
            ..Overrides::default()
        });
        assert_eq!(settings.keyword, "");
        assert_eq!(settings.page_count, 0);
        assert_eq!(settings.report_path, "out/report.html");
        assert_eq!(settings.json_path, None);
    }

    #[test]
    fn test_invalid_values() {
        let mut settings = Settings::default();
        settings.schedule = ScheduleSettings::Daily {
            times: vec!["25:00".to_string()],
        };
        assert!(matches!(settings.schedule(), Err(ConfigError::InvalidTime(_))));

        settings.schedule = ScheduleSettings::Daily { times: vec![] };
        assert!(matches!(settings.schedule(), Err(ConfigError::EmptySchedule)));

        settings.schedule = ScheduleSettings::Interval { every_secs: 0 };
        assert!(matches!(settings.schedule(), Err(ConfigError::ZeroInterval)));

        settings.utc_offset_hours = 30;
        assert!(matches!(settings.offset(), Err(ConfigError::InvalidOffset(30))));

        settings.dashboard_addr = Some("nowhere".to_string());
        assert!(matches!(settings.dashboard_addr(), Err(ConfigError::InvalidAddr(_))));

        settings.item_selector = "h4[".to_string();
        assert!(matches!(settings.fetcher(), Err(ConfigError::InvalidSelector { .. })));
    }
}
