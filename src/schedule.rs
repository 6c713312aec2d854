//! Cycle scheduling.
//!
//! A [`Scheduler`] owns the crawl session and fetcher and is the only writer
//! of the [`ResultCache`]. At most one cycle runs at a time: a trigger that
//! arrives while a cycle is in flight is dropped, not queued.

use crate::cache::ResultCache;
use crate::config::ConfigError;
use crate::crawl::{CrawlError, CrawlSession, CycleOutcome};
use crate::models::Entry;
use crate::outputs::ReportPublisher;
use crate::scrapers::PageFetcher;
use chrono::{DateTime, Days, FixedOffset, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::{error, info, instrument, warn};

/// Stand-in deadline for run times the monotonic clock cannot represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// When the next cycle should start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed period between cycle starts, anchored to the previous start.
    Interval(Duration),
    /// Fixed wall-clock times every day, sorted ascending.
    Daily {
        times: Vec<NaiveTime>,
        offset: FixedOffset,
    },
}

impl Schedule {
    pub fn daily(mut times: Vec<NaiveTime>, offset: FixedOffset) -> Result<Self, ConfigError> {
        if times.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        times.sort();
        times.dedup();
        Ok(Schedule::Daily { times, offset })
    }

    /// First run time strictly after `now`.
    pub fn next_fire(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Schedule::Interval(period) => chrono::Duration::from_std(*period)
                .ok()
                .and_then(|period| now.checked_add_signed(period))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            Schedule::Daily { times, offset } => {
                let today = now.with_timezone(offset).date_naive();
                [Some(today), today.checked_add_days(Days::new(1))]
                    .into_iter()
                    .flatten()
                    .flat_map(|day| times.iter().map(move |t| day.and_time(*t)))
                    .filter_map(|local| offset.from_local_datetime(&local).single())
                    .map(|at| at.with_timezone(&Utc))
                    .find(|at| *at > now)
                    .unwrap_or(now + chrono::Duration::days(1))
            }
        }
    }

    /// The first scheduled run after `last_fire` that is still ahead of
    /// `now`. Runs a long cycle overran are skipped, not caught up.
    pub fn following(&self, last_fire: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut next = self.next_fire(last_fire);
        while next <= now {
            let after = self.next_fire(next);
            if after <= next {
                return self.next_fire(now);
            }
            next = after;
        }
        next
    }
}

/// What one trigger did.
#[derive(Debug)]
pub enum CycleStatus {
    /// The cycle finished and its results were rotated in.
    Completed(CycleOutcome),
    /// A fetch failed; the cache was left untouched.
    Aborted(CrawlError),
    /// Another cycle was still running.
    Skipped,
}

impl CycleStatus {
    /// Entries produced by this invocation; empty unless it completed.
    pub fn entries(&self) -> &[Entry] {
        match self {
            CycleStatus::Completed(outcome) => &outcome.entries,
            CycleStatus::Aborted(_) | CycleStatus::Skipped => &[],
        }
    }
}

/// Runs crawl cycles and stores their results.
///
/// Owns the [`CrawlSession`] and the fetcher it uses, and is the only writer
/// of the shared [`ResultCache`]. A [`ReportPublisher`] can be attached to
/// rewrite the static reports after each completed cycle.
///
/// # Type Parameters
///
/// * `F` - The [`PageFetcher`] used for every cycle, usually
///   `RetryFetch<ListingFetcher>`
pub struct Scheduler<F> {
    session: CrawlSession,
    fetcher: F,
    cache: Arc<ResultCache>,
    publisher: Option<ReportPublisher>,
    running: Mutex<()>,
}

impl<F> Scheduler<F>
where
    F: PageFetcher,
{
    pub fn new(session: CrawlSession, fetcher: F, cache: Arc<ResultCache>) -> Self {
        Self {
            session,
            fetcher,
            cache,
            publisher: None,
            running: Mutex::new(()),
        }
    }

    /// Rewrite the static reports after every completed cycle.
    pub fn with_publisher(mut self, publisher: ReportPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Run one cycle unless one is already in flight.
    ///
    /// # Returns
    ///
    /// [`CycleStatus::Completed`] after the cache was rotated (and reports
    /// published), [`CycleStatus::Aborted`] when a fetch failed and nothing
    /// changed, [`CycleStatus::Skipped`] when another cycle holds the guard.
    #[instrument(level = "info", skip_all)]
    pub async fn trigger(&self) -> CycleStatus {
        let Ok(_running) = self.running.try_lock() else {
            warn!("A crawl cycle is still running; dropping this trigger");
            return CycleStatus::Skipped;
        };

        let known = self.cache.snapshot_known_identifiers();
        match self.session.run(&self.fetcher, &known).await {
            Ok(outcome) => {
                self.cache.rotate(outcome.entries.clone());
                if let Some(publisher) = &self.publisher {
                    if let Err(e) = publisher.publish(&self.cache).await {
                        error!(error = %e, "Failed to publish reports");
                    }
                }
                CycleStatus::Completed(outcome)
            }
            Err(e) => {
                error!(error = %e, "Crawl cycle aborted; keeping previous results");
                CycleStatus::Aborted(e)
            }
        }
    }

    /// Run a cycle now, then on every scheduled time, forever.
    ///
    /// Run times are computed from the previous run time, so cycle length
    /// does not shift the schedule.
    pub async fn run_forever(&self, schedule: &Schedule) {
        // Wall-clock times are mapped onto the runtime's monotonic clock.
        let (origin_utc, origin) = (Utc::now(), Instant::now());
        let now = || origin_utc + chrono::Duration::from_std(origin.elapsed()).unwrap_or(chrono::Duration::zero());

        let mut last_fire = origin_utc;
        self.trigger().await;
        loop {
            let next = schedule.following(last_fire, now());
            if next != schedule.next_fire(last_fire) {
                warn!(last = %last_fire.to_rfc3339(), "Crawl cycle overran the next run time; skipping it");
            }
            let offset = (next - origin_utc).to_std().unwrap_or_default();
            info!(next = %next.to_rfc3339(), "Next crawl cycle scheduled");
            let deadline = origin
                .checked_add(offset)
                .unwrap_or_else(|| Instant::now() + FAR_FUTURE);
            sleep_until(deadline).await;
            last_fire = next;
            self.trigger().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::fixtures::FixtureFetcher;
    use crate::models::PageCandidate;
    use crate::scrapers::FetchError;
    use chrono::Timelike;
    use tokio::sync::Notify;

    const BASE: &str = "https://hd.ghzyj.sh.gov.cn/2017/zdxxgk/";

    fn shanghai() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn session() -> CrawlSession {
        CrawlSession::new(BASE, 0, "闵行").unwrap()
    }

    #[test]
    fn test_interval_next_fire() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let schedule = Schedule::Interval(Duration::from_secs(12 * 3600));
        assert_eq!(schedule.next_fire(now), Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_daily_next_fire_same_day() {
        let schedule = Schedule::daily(vec![hm(18, 0), hm(9, 0)], shanghai()).unwrap();
        // 08:00 in Shanghai
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let next = schedule.next_fire(now).with_timezone(&shanghai());
        assert_eq!((next.hour(), next.minute()), (9, 0));
        assert_eq!(next.date_naive(), now.with_timezone(&shanghai()).date_naive());
    }

    #[test]
    fn test_daily_next_fire_is_strictly_after_now() {
        let schedule = Schedule::daily(vec![hm(9, 0), hm(18, 0)], shanghai()).unwrap();
        // exactly 09:00 in Shanghai
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
        let next = schedule.next_fire(now).with_timezone(&shanghai());
        assert_eq!((next.hour(), next.minute()), (18, 0));
    }

    #[test]
    fn test_daily_next_fire_rolls_to_tomorrow() {
        let schedule = Schedule::daily(vec![hm(9, 0), hm(18, 0)], shanghai()).unwrap();
        // 20:00 in Shanghai
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(schedule.next_fire(now), Utc.with_ymd_and_hms(2024, 3, 2, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_following_skips_overrun_runs() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let hourly = Schedule::Interval(Duration::from_secs(3600));
        assert_eq!(
            hourly.following(start, start + chrono::Duration::minutes(10)),
            start + chrono::Duration::hours(1)
        );
        assert_eq!(
            hourly.following(start, start + chrono::Duration::minutes(90)),
            start + chrono::Duration::hours(2)
        );

        let daily = Schedule::daily(vec![hm(9, 0), hm(18, 0)], shanghai()).unwrap();
        // 09:00 run that lasted until 19:00 Shanghai time
        let nine = Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
        let seven_pm = Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap();
        assert_eq!(daily.following(nine, seven_pm), Utc.with_ymd_and_hms(2024, 3, 2, 1, 0, 0).unwrap());
    }

    #[test]
    fn test_following_with_zero_interval_terminates() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let now = start + chrono::Duration::minutes(5);
        assert_eq!(Schedule::Interval(Duration::ZERO).following(start, now), now);
    }

    #[test]
    fn test_daily_requires_times() {
        assert!(matches!(Schedule::daily(vec![], shanghai()), Err(ConfigError::EmptySchedule)));
    }

    #[tokio::test]
    async fn test_trigger_rotates_cache() {
        let fetcher = FixtureFetcher::new().page(
            &format!("{BASE}index.html"),
            &[("A 闵行", "h1.html"), ("B", "h2.html")],
        );
        let scheduler = Scheduler::new(session(), fetcher, Arc::new(ResultCache::new()));

        let status = scheduler.trigger().await;
        assert_eq!(status.entries().len(), 1);
        assert_eq!(scheduler.cache().get_latest().len(), 1);

        // Second cycle: A is in `latest` but not yet a known identifier.
        let status = scheduler.trigger().await;
        assert_eq!(status.entries().len(), 1);
        assert_eq!(scheduler.cache().snapshot_known_identifiers().len(), 1);

        // Third cycle: A is now known, so the cycle stops at once.
        let status = scheduler.trigger().await;
        assert!(status.entries().is_empty());
        assert!(matches!(status, CycleStatus::Completed(ref o) if o.early_stop.is_some()));
        assert!(scheduler.cache().get_latest().is_empty());
    }

    #[tokio::test]
    async fn test_aborted_cycle_keeps_cache() {
        let cache = Arc::new(ResultCache::new());
        cache.rotate(vec![Entry::new("Old 闵行", format!("{BASE}old.html"), "2023年01月01日")]);
        let fetcher = FixtureFetcher::new().failing(&format!("{BASE}index.html"));
        let scheduler = Scheduler::new(session(), fetcher, Arc::clone(&cache));

        let status = scheduler.trigger().await;

        assert!(matches!(status, CycleStatus::Aborted(CrawlError::Fetch { page: 0, .. })));
        assert!(status.entries().is_empty());
        assert_eq!(cache.get_latest().len(), 1);
        assert!(cache.snapshot_known_identifiers().is_empty());
    }

    #[tokio::test]
    async fn test_aborted_cycle_does_not_rewrite_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let html_path = tmp.path().join("dashboard.html");
        let publisher = ReportPublisher {
            title: "公告".to_string(),
            html_path: html_path.to_str().unwrap().to_string(),
            json_path: None,
            offset: shanghai(),
        };
        let fetcher = FixtureFetcher::new().failing(&format!("{BASE}index.html"));
        let scheduler = Scheduler::new(session(), fetcher, Arc::new(ResultCache::new())).with_publisher(publisher);

        scheduler.trigger().await;

        assert!(!html_path.exists());
    }

    /// Blocks inside `fetch_page` until released.
    struct GatedFetcher {
        entered: Notify,
        release: Notify,
    }

    impl PageFetcher for GatedFetcher {
        async fn fetch_page(&self, _url: &str) -> Result<Vec<PageCandidate>, FetchError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![PageCandidate::new("A 闵行", "h1.html")])
        }
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_dropped() {
        let fetcher = GatedFetcher {
            entered: Notify::new(),
            release: Notify::new(),
        };
        let scheduler = Scheduler::new(session(), fetcher, Arc::new(ResultCache::new()));

        let first = scheduler.trigger();
        let second = async {
            scheduler.fetcher.entered.notified().await;
            let status = scheduler.trigger().await;
            scheduler.fetcher.release.notify_one();
            status
        };
        let (first, second) = tokio::join!(first, second);

        assert!(matches!(first, CycleStatus::Completed(_)));
        assert!(matches!(second, CycleStatus::Skipped));
        assert_eq!(scheduler.cache().get_latest().len(), 1);
    }

    /// Takes ten minutes of runtime clock per page and records start times.
    struct SlowFetcher {
        started: std::sync::Mutex<Vec<Instant>>,
    }

    impl PageFetcher for SlowFetcher {
        async fn fetch_page(&self, _url: &str) -> Result<Vec<PageCandidate>, FetchError> {
            self.started.lock().unwrap().push(Instant::now());
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(vec![PageCandidate::new("A 闵行", "h1.html")])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_runs_are_anchored_to_previous_start() {
        let fetcher = SlowFetcher {
            started: std::sync::Mutex::new(Vec::new()),
        };
        let scheduler = Scheduler::new(session(), fetcher, Arc::new(ResultCache::new()));
        let schedule = Schedule::Interval(Duration::from_secs(3600));

        let ran = tokio::time::timeout(Duration::from_secs(3 * 3600 + 60), scheduler.run_forever(&schedule)).await;
        assert!(ran.is_err());

        let started = scheduler.fetcher.started.lock().unwrap().clone();
        let offsets: Vec<_> = started.iter().map(|at| at.duration_since(started[0])).collect();
        assert_eq!(
            offsets,
            (0..4).map(|h| Duration::from_secs(h * 3600)).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_short_listing_completes_and_rotates() {
        use crate::scrapers::listing::{DEFAULT_USER_AGENT, ListingFetcher};
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zdxxgk/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="list"><h4><a href="t20240301_1.html">A 闵行</a></h4></div>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/zdxxgk/index_1.html"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let session = CrawlSession::new(&format!("{}/zdxxgk/", server.uri()), 1, "闵行").unwrap();
        let fetcher = ListingFetcher::new(DEFAULT_USER_AGENT, Duration::from_secs(5), "div.list h4").unwrap();
        let scheduler = Scheduler::new(session, fetcher, Arc::new(ResultCache::new()));

        let status = scheduler.trigger().await;
        assert!(matches!(status, CycleStatus::Completed(ref o) if o.end_of_listing == Some(1)));
        assert_eq!(scheduler.cache().get_latest().len(), 1);

        // Second cycle fills the known identifiers, third stops on them.
        assert!(matches!(scheduler.trigger().await, CycleStatus::Completed(_)));
        let status = scheduler.trigger().await;
        assert!(matches!(status, CycleStatus::Completed(ref o) if o.early_stop.is_some()));
        assert!(scheduler.cache().get_latest().is_empty());
        assert_eq!(
            *scheduler.cache().snapshot_known_identifiers(),
            std::collections::HashSet::from([format!("{}/zdxxgk/t20240301_1.html", server.uri())])
        );
    }
}
