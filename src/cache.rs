//! Cross-cycle result cache.
//!
//! The cache keeps the entries of the most recent completed cycle and the
//! URLs of the cycle before it. Both live in one generation that is swapped
//! whole on [`ResultCache::rotate`], so a reader always sees a matching
//! `latest` / known-identifier pair.
//!
//! The crawl trigger is the only writer. Dashboard and report readers only
//! call [`ResultCache::get_latest`], [`ResultCache::view`] and
//! [`ResultCache::snapshot_known_identifiers`].

use crate::models::CycleResult;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, instrument};

#[derive(Debug, Default)]
struct Generation {
    latest: Arc<CycleResult>,
    known_identifiers: Arc<HashSet<String>>,
    updated_at: Option<DateTime<Utc>>,
}

/// A consistent read of the latest results and when they were stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheView {
    pub entries: CycleResult,
    pub updated_at: Option<DateTime<Utc>>,
}

/// In-memory store shared by the crawl trigger and the report readers.
///
/// Holds one generation: the entries of the last completed cycle, the
/// URLs of the cycle before it, and the rotation time. Readers get copies or
/// shared snapshots and never hold the lock across an `.await`.
///
/// # Example
///
/// ```ignore
/// let cache = ResultCache::new();
/// cache.rotate(first_cycle);
/// cache.rotate(second_cycle);
/// // URLs of `first_cycle`
/// let known = cache.snapshot_known_identifiers();
/// ```
#[derive(Debug, Default)]
pub struct ResultCache {
    current: RwLock<Generation>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a completed cycle.
    ///
    /// The known identifiers become the URLs of the results being replaced.
    /// Never call this for an aborted cycle.
    ///
    /// # Arguments
    ///
    /// * `new_result` - Entries of the cycle that just completed, in discovery order
    #[instrument(level = "info", skip_all, fields(count = new_result.len()))]
    pub fn rotate(&self, new_result: CycleResult) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let known: HashSet<String> = current.latest.iter().map(|e| e.url().to_string()).collect();
        debug!(known = known.len(), "Rotating result cache");
        *current = Generation {
            latest: Arc::new(new_result),
            known_identifiers: Arc::new(known),
            updated_at: Some(Utc::now()),
        };
    }

    /// Identifiers for the next cycle's early-stop check; empty until the
    /// second rotation.
    pub fn snapshot_known_identifiers(&self) -> Arc<HashSet<String>> {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&current.known_identifiers)
    }

    /// A copy of the latest results; changing it never touches the cache.
    pub fn get_latest(&self) -> CycleResult {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        current.latest.as_ref().clone()
    }

    /// Time of the last rotation, if any.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).updated_at
    }

    /// Latest results together with their rotation time, read under one lock.
    pub fn view(&self) -> CacheView {
        let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
        CacheView {
            entries: current.latest.as_ref().clone(),
            updated_at: current.updated_at,
        }
    }
}
