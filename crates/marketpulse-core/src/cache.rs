//! In-memory TTL cache for validated series.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::time::Instant;

use crate::domain::{Instrument, MarketObservation, TimeRange};

/// Default time-to-live of a cached series.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Defines how a series request interacts with the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve a live entry if present; otherwise fetch and store the result.
    #[default]
    Use,
    /// Skip the read, fetch, and overwrite the entry.
    Refresh,
    /// Neither read from nor write to the cache.
    Bypass,
}

impl CacheMode {
    pub const fn reads(self) -> bool {
        matches!(self, Self::Use)
    }

    pub const fn writes(self) -> bool {
        !matches!(self, Self::Bypass)
    }
}

/// Composite cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub instrument: Instrument,
    pub time_range: TimeRange,
}

impl CacheKey {
    pub const fn new(instrument: Instrument, time_range: TimeRange) -> Self {
        Self {
            instrument,
            time_range,
        }
    }
}

/// Snapshot of a validated series. Replaced wholesale, never mutated.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub instrument: Instrument,
    pub time_range: TimeRange,
    pub series: Arc<[MarketObservation]>,
    pub written_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.written_at) < ttl
    }
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<CacheKey, CacheEntry>,
    ttl: Duration,
}

impl CacheInner {
    fn new(ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            ttl,
        }
    }

    fn peek(&self, key: &CacheKey, now: Instant) -> Option<Arc<[MarketObservation]>> {
        self.map
            .get(key)
            .filter(|entry| entry.is_live(now, self.ttl))
            .map(|entry| Arc::clone(&entry.series))
    }

    fn clear_expired(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        let ttl = self.ttl;
        self.map.retain(|_, entry| entry.is_live(now, ttl));
        before - self.map.len()
    }
}

/// Thread-safe series cache keyed by instrument and time range.
///
/// Expired entries are treated as absent and evicted lazily on the read path.
/// [`SeriesCache::fill_lock`] serializes check-fetch-insert sequences per key
/// so one key is filled at most once per TTL window.
#[derive(Debug, Clone)]
pub struct SeriesCache {
    inner: Arc<RwLock<CacheInner>>,
    fill_locks: Arc<Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>>,
}

impl Default for SeriesCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl SeriesCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::new(ttl))),
            fill_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn ttl(&self) -> Duration {
        self.inner.read().await.ttl
    }

    /// Returns the cached series if it is younger than the TTL.
    pub async fn get(
        &self,
        instrument: Instrument,
        time_range: TimeRange,
    ) -> Option<Arc<[MarketObservation]>> {
        let key = CacheKey::new(instrument, time_range);
        let now = Instant::now();

        {
            let store = self.inner.read().await;
            match store.map.get(&key) {
                None => return None,
                Some(entry) if entry.is_live(now, store.ttl) => {
                    return Some(Arc::clone(&entry.series))
                }
                Some(_) => {}
            }
        }

        let mut store = self.inner.write().await;
        // Another writer may have refreshed the entry in between.
        if let Some(series) = store.peek(&key, now) {
            return Some(series);
        }
        if store.map.remove(&key).is_some() {
            tracing::debug!(%instrument, %time_range, "evicted expired series");
        }
        None
    }

    /// Stores a series, replacing any previous entry for the key.
    pub async fn set(
        &self,
        instrument: Instrument,
        time_range: TimeRange,
        series: impl Into<Arc<[MarketObservation]>>,
    ) {
        let entry = CacheEntry {
            instrument,
            time_range,
            series: series.into(),
            written_at: Instant::now(),
        };
        let mut store = self.inner.write().await;
        store
            .map
            .insert(CacheKey::new(instrument, time_range), entry);
    }

    /// Full entry for a key, including expired ones not yet evicted.
    pub async fn entry(&self, instrument: Instrument, time_range: TimeRange) -> Option<CacheEntry> {
        let store = self.inner.read().await;
        store
            .map
            .get(&CacheKey::new(instrument, time_range))
            .cloned()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn clear_expired(&self) -> usize {
        let mut store = self.inner.write().await;
        store.clear_expired(Instant::now())
    }

    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Per-key lock held while a caller fills a missing entry.
    pub async fn fill_lock(
        &self,
        instrument: Instrument,
        time_range: TimeRange,
    ) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.fill_locks.lock().await;
            Arc::clone(
                locks
                    .entry(CacheKey::new(instrument, time_range))
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(value: f64) -> Vec<MarketObservation> {
        vec![MarketObservation {
            timestamp: String::from("2024-01-01T00:00:00Z"),
            value,
            volume: 1,
            change: 0.0,
            volatility: 0.0,
            trend: 0.0,
            ma5: value,
            ma20: value,
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_basic_operations() {
        let cache = SeriesCache::new(Duration::from_secs(60));

        assert!(cache.get(Instrument::CrudeOil, TimeRange::OneDay).await.is_none());

        cache.set(Instrument::CrudeOil, TimeRange::OneDay, series(1.0)).await;
        let hit = cache.get(Instrument::CrudeOil, TimeRange::OneDay).await;
        assert_eq!(hit.as_deref(), Some(series(1.0).as_slice()));

        cache.set(Instrument::CrudeOil, TimeRange::OneDay, series(2.0)).await;
        let hit = cache.get(Instrument::CrudeOil, TimeRange::OneDay).await;
        assert_eq!(hit.as_deref(), Some(series(2.0).as_slice()));

        // Keys are composite.
        assert!(cache.get(Instrument::CrudeOil, TimeRange::OneWeek).await.is_none());
        assert!(cache.get(Instrument::NaturalGas, TimeRange::OneDay).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_expiration_is_lazy() {
        let cache = SeriesCache::new(Duration::from_secs(300));
        cache.set(Instrument::Renewable, TimeRange::OneMonth, series(1.0)).await;

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get(Instrument::Renewable, TimeRange::OneMonth).await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        // Still physically stored until the read path evicts it.
        assert_eq!(cache.len().await, 1);
        assert!(cache.get(Instrument::Renewable, TimeRange::OneMonth).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_clear_expired() {
        let cache = SeriesCache::new(Duration::from_secs(10));
        cache.set(Instrument::CrudeOil, TimeRange::OneDay, series(1.0)).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.set(Instrument::NaturalGas, TimeRange::OneDay, series(1.0)).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.clear_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.entry(Instrument::NaturalGas, TimeRange::OneDay).await.is_some());
    }

    #[tokio::test]
    async fn test_cache_clear_all() {
        let cache = SeriesCache::default();
        cache.set(Instrument::CrudeOil, TimeRange::OneDay, series(1.0)).await;
        cache.set(Instrument::Industrial, TimeRange::OneYear, series(1.0)).await;

        assert_eq!(cache.len().await, 2);
        cache.clear().await;
        assert!(cache.is_empty().await);
        assert_eq!(cache.ttl().await, DEFAULT_CACHE_TTL);
    }

    #[tokio::test]
    async fn test_fill_lock_is_per_key() {
        let cache = SeriesCache::default();
        let held = cache.fill_lock(Instrument::CrudeOil, TimeRange::OneDay).await;

        // A different key is not blocked.
        let _other = cache.fill_lock(Instrument::CrudeOil, TimeRange::OneWeek).await;

        let contender = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let _guard = cache.fill_lock(Instrument::CrudeOil, TimeRange::OneDay).await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(held);
        contender.await.expect("contender completes once the lock is released");
    }

    #[test]
    fn test_cache_mode_default() {
        let mode = CacheMode::default();
        assert_eq!(mode, CacheMode::Use);
        assert!(CacheMode::Refresh.writes() && !CacheMode::Refresh.reads());
        assert!(!CacheMode::Bypass.writes());
    }
}
