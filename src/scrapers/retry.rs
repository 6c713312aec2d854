//! Retry decorator for page fetchers.
//!
//! [`RetryFetch`] wraps any [`PageFetcher`] and retries retryable failures
//! with exponential backoff and jitter:
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! Only once retries are exhausted does the failure reach the crawl, which
//! then aborts the cycle.

use crate::models::PageCandidate;
use crate::scrapers::{FetchError, PageFetcher};
use rand::{Rng, rng};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// A [`PageFetcher`] that retries its inner fetcher.
///
/// Failures for which [`FetchError::is_retryable`] is false are returned at
/// once. Others are retried up to `max_retries` times with the backoff shown
/// in the module docs.
///
/// # Fields
///
/// * `max_retries` - Extra attempts after the first one
/// * `base_delay` - Delay before the first retry, doubled for each next one
/// * `max_delay` - Cap on a single delay before jitter (default 30s)
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
    max_jitter_ms: u64,
}

impl<T> RetryFetch<T>
where
    T: PageFetcher,
{
    /// Wrap `inner`, allowing `max_retries` extra attempts per page.
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
            max_jitter_ms: 250,
        }
    }

    /// Cap on a single backoff delay (before jitter).
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms = if self.max_jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=self.max_jitter_ms)
        };
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> PageFetcher for RetryFetch<T>
where
    T: PageFetcher,
{
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch_page(&self, url: &str) -> Result<Vec<PageCandidate>, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch_page(url).await {
                Ok(candidates) => return Ok(candidates),
                Err(e) => {
                    attempt += 1;
                    let elapsed_ms_total = total_t0.elapsed().as_millis() as u64;

                    if !e.is_retryable() || attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total,
                            error = %e,
                            "fetch_page() giving up"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total,
                        ?delay,
                        error = %e,
                        "fetch_page() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}
