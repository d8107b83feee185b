//! In-memory implementation of the `CacheStore` trait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use chronicle_core::cache::{CacheStats, CacheStore, full_key, namespace_prefix};
use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::error::CacheError;

use crate::sweeper::SweepHandle;

/// Capacity used when none is configured.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Sweep period used when none is configured.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Cache sizing and sweep settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of stored entries.
    pub max_entries: usize,
    /// Period of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// A stored value with its expiry bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached value.
    pub value: V,
    /// Expiry instant; `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    /// Insertion time, used to pick the eviction victim.
    pub created_at: DateTime<Utc>,
    seq: u64,
}

impl<V> CacheEntry<V> {
    /// An entry is logically absent once `now` is past its expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    next_seq: u64,
}

/// Bounded, namespaced cache with TTL expiry.
///
/// When full, inserting a new key evicts the entry with the oldest
/// `created_at` (insertion time, not last access). Expired entries are
/// dropped lazily on `get` and eagerly by [`InMemoryCache::sweep_expired`],
/// which the background sweep calls on every tick.
///
/// State is per instance and guarded by a mutex that is never held across
/// an `.await`.
pub struct InMemoryCache<V> {
    state: Mutex<CacheState<V>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl<V> std::fmt::Debug for InMemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<V> InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache reading time from the system clock. No sweep runs
    /// until [`InMemoryCache::start_sweeper`] is called.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a cache reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
                next_seq: 0,
            }),
            config,
            clock,
        }
    }

    /// Creates a shared cache and starts its background sweep. The sweep
    /// stops when the returned handle is shut down or dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn with_sweeper(config: CacheConfig, clock: Arc<dyn Clock>) -> (Arc<Self>, SweepHandle) {
        let cache = Arc::new(Self::with_clock(config, clock));
        let handle = cache.start_sweeper();
        (cache, handle)
    }

    /// Starts the background sweep on `config.sweep_interval`. The task holds
    /// only a weak reference and exits once the cache is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start_sweeper(self: &Arc<Self>) -> SweepHandle {
        SweepHandle::spawn(Arc::downgrade(self), self.config.sweep_interval)
    }

    /// Configured limits.
    #[must_use]
    pub fn config(&self) -> CacheConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Physically removes every expired entry and returns how many were
    /// removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    fn get_value(&self, key: &str, namespace: Option<&str>) -> Option<V> {
        let full_key = full_key(key, namespace);
        let now = self.clock.now();
        let mut state = self.lock();

        let live = match state.entries.get(&full_key) {
            None => None,
            Some(entry) if entry.is_expired(now) => {
                state.entries.remove(&full_key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
        };

        if live.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        live
    }

    fn set_value(&self, key: &str, value: V, namespace: Option<&str>, ttl_seconds: Option<u64>) {
        let full_key = full_key(key, namespace);
        let now = self.clock.now();
        let expires_at = ttl_seconds
            .filter(|ttl| *ttl > 0)
            .and_then(|ttl| TimeDelta::try_seconds(i64::try_from(ttl).ok()?))
            .and_then(|ttl| now.checked_add_signed(ttl));

        let mut state = self.lock();
        if state.entries.len() >= self.config.max_entries && !state.entries.contains_key(&full_key) {
            evict_oldest(&mut state);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            full_key,
            CacheEntry {
                value,
                expires_at,
                created_at: now,
                seq,
            },
        );
    }

    fn delete_value(&self, key: &str, namespace: Option<&str>) {
        self.lock().entries.remove(&full_key(key, namespace));
    }

    fn clear_namespace_entries(&self, namespace: &str) -> usize {
        let prefix = namespace_prefix(namespace);
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !key.starts_with(&prefix));
        let removed = before - state.entries.len();
        debug!(namespace, removed, "cleared cache namespace");
        removed
    }

    fn clear_all(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }

    fn current_stats(&self) -> CacheStats {
        let state = self.lock();
        let stats = CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            entries: state.entries.len(),
        };
        debug!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = ?stats.hit_rate(),
            entries = stats.entries,
            "cache stats"
        );
        stats
    }
}

fn evict_oldest<V>(state: &mut CacheState<V>) {
    let victim = state
        .entries
        .iter()
        .min_by_key(|(_, entry)| (entry.created_at, entry.seq))
        .map(|(key, _)| key.clone());
    if let Some(key) = victim {
        state.entries.remove(&key);
        debug!(key = %key, "evicted cache entry");
    }
}

#[async_trait]
impl<V> CacheStore<V> for InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str, namespace: Option<&str>) -> Result<Option<V>, CacheError> {
        Ok(self.get_value(key, namespace))
    }

    async fn set(
        &self,
        key: &str,
        value: V,
        namespace: Option<&str>,
        ttl_seconds: Option<u64>,
    ) -> Result<(), CacheError> {
        self.set_value(key, value, namespace, ttl_seconds);
        Ok(())
    }

    async fn delete(&self, key: &str, namespace: Option<&str>) -> Result<(), CacheError> {
        self.delete_value(key, namespace);
        Ok(())
    }

    async fn clear_namespace(&self, namespace: &str) -> Result<usize, CacheError> {
        Ok(self.clear_namespace_entries(namespace))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.clear_all();
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(self.current_stats())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use chronicle_core::cache::CacheStore;
    use chronicle_test_support::ManualClock;

    use super::{CacheConfig, InMemoryCache};

    fn cache_with_capacity(max_entries: usize) -> (InMemoryCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        let config = CacheConfig {
            max_entries,
            ..CacheConfig::default()
        };
        (InMemoryCache::with_clock(config, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_get_returns_value_and_counts_hit() {
        // Arrange
        let (cache, _clock) = cache_with_capacity(10);
        cache.set("k", "v".to_owned(), None, None).await.unwrap();

        // Act
        let value = cache.get("k", None).await.unwrap();

        // Assert
        assert_eq!(value.as_deref(), Some("v"));
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_missing_key_counts_miss() {
        let (cache, _clock) = cache_with_capacity(10);

        assert!(cache.get("absent", None).await.unwrap().is_none());

        assert_eq!(cache.stats().await.unwrap().misses, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_is_removed() {
        let (cache, clock) = cache_with_capacity(10);
        cache.set("k", "v".to_owned(), None, Some(1)).await.unwrap();

        clock.advance_millis(1001);
        let value = cache.get("k", None).await.unwrap();

        assert!(value.is_none());
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_entry_is_live_exactly_at_expiry_instant() {
        let (cache, clock) = cache_with_capacity(10);
        cache.set("k", "v".to_owned(), None, Some(1)).await.unwrap();

        clock.advance_millis(1000);

        assert!(cache.get("k", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let (cache, clock) = cache_with_capacity(10);
        cache.set("k", "v".to_owned(), None, Some(0)).await.unwrap();

        clock.advance_secs(365 * 24 * 3600);

        assert!(cache.get("k", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_full_cache_evicts_oldest_created_entry() {
        let (cache, clock) = cache_with_capacity(2);
        cache.set("a", "1".to_owned(), None, None).await.unwrap();
        clock.advance_millis(10);
        cache.set("b", "2".to_owned(), None, None).await.unwrap();
        clock.advance_millis(10);
        // Reading "a" does not protect it: eviction goes by insertion time.
        cache.get("a", None).await.unwrap();

        cache.set("c", "3".to_owned(), None, None).await.unwrap();

        assert!(cache.get("a", None).await.unwrap().is_none());
        assert!(cache.get("b", None).await.unwrap().is_some());
        assert!(cache.get("c", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_eviction_ties_break_by_insertion_order() {
        let (cache, _clock) = cache_with_capacity(2);
        cache.set("first", "1".to_owned(), None, None).await.unwrap();
        cache.set("second", "2".to_owned(), None, None).await.unwrap();

        cache.set("third", "3".to_owned(), None, None).await.unwrap();

        assert!(cache.get("first", None).await.unwrap().is_none());
        assert!(cache.get("second", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overwriting_existing_key_at_capacity_does_not_evict() {
        let (cache, _clock) = cache_with_capacity(2);
        cache.set("a", "1".to_owned(), None, None).await.unwrap();
        cache.set("b", "2".to_owned(), None, None).await.unwrap();

        cache.set("a", "updated".to_owned(), None, None).await.unwrap();

        assert_eq!(cache.get("a", None).await.unwrap().as_deref(), Some("updated"));
        assert!(cache.get("b", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_namespaces_hold_independent_values() {
        let (cache, _clock) = cache_with_capacity(10);
        cache.set("k", "one".to_owned(), Some("ns1"), None).await.unwrap();
        cache.set("k", "two".to_owned(), Some("ns2"), None).await.unwrap();

        assert_eq!(cache.get("k", Some("ns1")).await.unwrap().as_deref(), Some("one"));
        assert_eq!(cache.get("k", Some("ns2")).await.unwrap().as_deref(), Some("two"));
        assert!(cache.get("k", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_namespace_removes_only_that_namespace() {
        // Arrange
        let (cache, _clock) = cache_with_capacity(10);
        cache.set("a", "1".to_owned(), Some("ns1"), None).await.unwrap();
        cache.set("b", "2".to_owned(), Some("ns1"), None).await.unwrap();
        cache.set("a", "3".to_owned(), Some("ns10"), None).await.unwrap();
        cache.set("a", "4".to_owned(), None, None).await.unwrap();

        // Act
        let removed = cache.clear_namespace("ns1").await.unwrap();

        // Assert
        assert_eq!(removed, 2);
        assert!(cache.get("a", Some("ns1")).await.unwrap().is_none());
        assert_eq!(cache.get("a", Some("ns10")).await.unwrap().as_deref(), Some("3"));
        assert_eq!(cache.get("a", None).await.unwrap().as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn test_namespace_is_plain_key_prefix() {
        let (cache, _clock) = cache_with_capacity(10);
        cache.set("ns:k", "v".to_owned(), None, None).await.unwrap();

        assert!(cache.get("k", Some("ns")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let (cache, _clock) = cache_with_capacity(10);
        cache.set("k", "v".to_owned(), Some("ns"), None).await.unwrap();

        cache.delete("k", Some("ns")).await.unwrap();

        assert!(cache.get("k", Some("ns")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_removes_entries_and_resets_counters() {
        let (cache, _clock) = cache_with_capacity(10);
        cache.set("k", "v".to_owned(), None, None).await.unwrap();
        cache.get("k", None).await.unwrap();
        cache.get("absent", None).await.unwrap();

        cache.clear().await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_entries() {
        let (cache, clock) = cache_with_capacity(10);
        cache.set("short", "v".to_owned(), None, Some(1)).await.unwrap();
        cache.set("long", "v".to_owned(), None, Some(60)).await.unwrap();
        cache.set("forever", "v".to_owned(), None, None).await.unwrap();

        clock.advance_secs(2);
        let removed = cache.sweep_expired();

        assert_eq!(removed, 1);
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        // Sweeping does not touch the hit/miss counters.
        assert_eq!(stats.hits + stats.misses, 0);
    }
}
