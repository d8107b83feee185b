//! Cache store abstraction.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CacheError;

/// Builds the full cache key: `namespace:key`, or `key` alone when no
/// namespace is given. Namespaces are an addressing convention only.
#[must_use]
pub fn full_key(key: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("{ns}:{key}"),
        None => key.to_owned(),
    }
}

/// Prefix shared by every full key in `namespace`.
#[must_use]
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{namespace}:")
}

/// Raw cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups that returned a live value.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Current number of stored entries.
    pub size: usize,
    /// Current number of stored entries (same as `size`).
    pub entries: usize,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or `None` before the first lookup.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> Option<f64> {
        let lookups = self.hits + self.misses;
        (lookups > 0).then(|| self.hits as f64 / lookups as f64)
    }
}

/// Key-value store with optional per-entry TTL.
///
/// `ttl_seconds` of `None` or `Some(0)` means the entry never expires.
#[async_trait]
pub trait CacheStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    /// Returns the live value stored under `key`, or `None` on a miss.
    async fn get(&self, key: &str, namespace: Option<&str>) -> Result<Option<V>, CacheError>;

    /// Stores `value` under `key`.
    async fn set(
        &self,
        key: &str,
        value: V,
        namespace: Option<&str>,
        ttl_seconds: Option<u64>,
    ) -> Result<(), CacheError>;

    /// Removes the entry stored under `key`, if any.
    async fn delete(&self, key: &str, namespace: Option<&str>) -> Result<(), CacheError>;

    /// Removes every entry stored under `namespace` and returns how many
    /// were removed. Counters are left alone.
    async fn clear_namespace(&self, namespace: &str) -> Result<usize, CacheError>;

    /// Removes every entry and resets the hit/miss counters.
    async fn clear(&self) -> Result<(), CacheError>;

    /// Current counters.
    async fn stats(&self) -> Result<CacheStats, CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_key_joins_namespace_with_colon() {
        assert_eq!(full_key("list", Some("audit-logs")), "audit-logs:list");
        assert_eq!(full_key("list", None), "list");
    }

    #[test]
    fn test_namespaced_keys_start_with_namespace_prefix() {
        let prefix = namespace_prefix("audit-logs");

        assert!(full_key("list", Some("audit-logs")).starts_with(&prefix));
        assert!(!full_key("list", Some("audit-logs-archive")).starts_with(&prefix));
    }

    #[test]
    fn test_hit_rate_is_derived_from_counters() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            size: 0,
            entries: 0,
        };
        assert_eq!(stats.hit_rate(), Some(0.75));
        assert_eq!(CacheStats::default().hit_rate(), None);
    }
}
