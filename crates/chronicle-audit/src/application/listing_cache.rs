//! Cache of assembled audit listings, shared by the read and write paths.
//!
//! The read path stores whole result pages here; the write path drops the
//! whole listing namespace after recording a new entry.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};
use chronicle_core::audit::{AuditLogQueryResult, ListAuditQuery};
use chronicle_core::cache::{CacheStats, CacheStore};
use chronicle_core::error::CacheError;
use tracing::{debug, warn};

/// Namespace holding every audit listing.
pub const AUDIT_CACHE_NAMESPACE: &str = "audit-logs";

/// Deterministic key for a listing query: the page coordinates first, then
/// each filter that is present in a fixed order.
///
/// Filter values are escaped so that a value containing `:` or `=` cannot
/// produce the key of a different query. Callers pass the normalized query
/// so that an omitted page and an explicit `page=1` share a key.
#[must_use]
pub fn cache_key(query: &ListAuditQuery) -> String {
    let mut key = format!("list:page={}:pageSize={}", query.page(), query.page_size());
    let text_filters = [
        ("churchId", &query.church_id),
        ("actorUserId", &query.actor_user_id),
        ("entity", &query.entity),
        ("entityId", &query.entity_id),
    ];
    for (name, value) in text_filters {
        if let Some(value) = value {
            let _ = write!(key, ":{name}={}", escape_component(value));
        }
    }
    let time_filters = [("from", query.from), ("to", query.to)];
    for (name, value) in time_filters {
        if let Some(value) = value {
            let _ = write!(key, ":{name}={}", format_instant(value));
        }
    }
    key
}

/// Percent-encodes the key separators and the escape character itself.
fn escape_component(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            '=' => escaped.push_str("%3D"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Audit listings stored in a [`CacheStore`] under [`AUDIT_CACHE_NAMESPACE`].
///
/// Every invalidation bumps a generation counter. A reader captures the
/// generation before reading the store and hands it back to [`Self::put`],
/// which refuses to keep a page read before a later invalidation.
///
/// Backend failures never reach the caller: a failed read is a miss and a
/// failed write or delete is logged.
pub struct AuditListingCache {
    store: Arc<dyn CacheStore<AuditLogQueryResult>>,
    generation: AtomicU64,
}

impl std::fmt::Debug for AuditListingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditListingCache")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl AuditListingCache {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore<AuditLogQueryResult>>) -> Self {
        Self {
            store,
            generation: AtomicU64::new(0),
        }
    }

    /// Number of invalidations so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Cached listing for `key`, or `None` on a miss or a backend failure.
    pub async fn get(&self, key: &str) -> Option<AuditLogQueryResult> {
        match self.store.get(key, Some(AUDIT_CACHE_NAMESPACE)).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, key, "audit cache read failed, treating as miss");
                None
            }
        }
    }

    /// Stores `value` under `key` for `ttl_seconds` unless the listings were
    /// invalidated after `read_generation` was captured. Returns whether the
    /// value was kept.
    pub async fn put(
        &self,
        key: &str,
        value: AuditLogQueryResult,
        ttl_seconds: u64,
        read_generation: u64,
    ) -> bool {
        if self.generation() != read_generation {
            debug!(key, "listing read before an invalidation, not caching");
            return false;
        }
        if let Err(e) = self
            .store
            .set(key, value, Some(AUDIT_CACHE_NAMESPACE), Some(ttl_seconds))
            .await
        {
            warn!(error = %e, key, "audit cache write failed");
            return false;
        }
        // An invalidation that landed during the set may have cleared the
        // namespace before the value arrived.
        if self.generation() != read_generation {
            self.delete(key).await;
            return false;
        }
        true
    }

    /// Deletes every cached listing and returns how many were dropped.
    pub async fn invalidate_all(&self) -> usize {
        self.generation.fetch_add(1, Ordering::SeqCst);
        match self.store.clear_namespace(AUDIT_CACHE_NAMESPACE).await {
            Ok(removed) => {
                debug!(invalidated = removed, "audit listings invalidated");
                removed
            }
            Err(e) => {
                warn!(error = %e, "audit cache invalidation failed");
                0
            }
        }
    }

    /// Statistics of the underlying store.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the store cannot report.
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        self.store.stats().await
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key, Some(AUDIT_CACHE_NAMESPACE)).await {
            warn!(error = %e, key, "audit cache delete failed");
        }
    }
}
