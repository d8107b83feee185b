//! Query handlers for the audit context.
//!
//! Listings are served cache-aside. On a miss the persistence store is read
//! through the circuit breaker, whose fallback is an empty page: an open
//! circuit degrades to "no results" instead of an error.

use std::collections::HashMap;
use std::sync::Arc;

use chronicle_core::audit::{
    AuditLogQueryResult, AuditLogReadModel, AuditLogRecord, AuditPersistence, ListAuditQuery,
    UserSummary,
};
use chronicle_core::error::AuditError;
use chronicle_core::observability::{Observability, SpanHandle, SpanStatus};
use chronicle_resilience::CircuitBreaker;
use tracing::{Instrument, debug, warn};

use crate::application::listing_cache::{AuditListingCache, cache_key};

/// Metric recording the duration of each query.
pub const QUERY_DURATION_METRIC: &str = "audit.query.duration_ms";

/// Metric recording how many items each query returned.
pub const QUERY_ITEMS_METRIC: &str = "audit.query.items";

/// TTL of a cached listing when none is configured.
pub const DEFAULT_AUDIT_CACHE_TTL_SECS: u64 = 300;

const LIST_QUERY: &str = "list_audit_logs";

/// Read-path settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditQueryConfig {
    /// Lifetime of a cached listing.
    pub cache_ttl_seconds: u64,
}

impl Default for AuditQueryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: DEFAULT_AUDIT_CACHE_TTL_SECS,
        }
    }
}

/// How a listing was produced, for metric tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheOutcome {
    Hit,
    Miss,
    Degraded,
}

impl CacheOutcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Degraded => "degraded",
        }
    }
}

/// Read side of the audit context.
pub struct AuditQueryHandler {
    persistence: Arc<dyn AuditPersistence>,
    cache: Arc<AuditListingCache>,
    breaker: Arc<CircuitBreaker>,
    observability: Arc<dyn Observability>,
    config: AuditQueryConfig,
}

impl AuditQueryHandler {
    #[must_use]
    pub fn new(
        persistence: Arc<dyn AuditPersistence>,
        cache: Arc<AuditListingCache>,
        breaker: Arc<CircuitBreaker>,
        observability: Arc<dyn Observability>,
        config: AuditQueryConfig,
    ) -> Self {
        Self {
            persistence,
            cache,
            breaker,
            observability,
            config,
        }
    }

    /// Lists audit entries matching `query`, newest first, with actors
    /// resolved.
    ///
    /// Fresh results are cached for the configured TTL unless the listings
    /// were invalidated while the store was being read. The empty page served
    /// while the circuit is open is not cached, so reads recover as soon as
    /// the circuit closes.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Persistence` when the store fails while the
    /// circuit is closed or probing recovery.
    pub async fn list_audit_logs(
        &self,
        query: &ListAuditQuery,
    ) -> Result<AuditLogQueryResult, AuditError> {
        let query = query.normalized();
        let key = cache_key(&query);
        let span = self
            .observability
            .start_span("audit.query.list_audit_logs", &[("cache_key", key.clone())]);

        if let Some(hit) = self.cache.get(&key).await {
            debug!(key = %key, "audit listing served from cache");
            self.complete(span, CacheOutcome::Hit, Ok(&hit));
            return Ok(hit);
        }

        // Captured before the store read so a write landing mid-read keeps
        // this page out of the cache.
        let generation = self.cache.generation();
        let fetched = self.fetch(&query).instrument(span.span().clone()).await;
        match fetched {
            Ok(Some(result)) => {
                self.cache
                    .put(&key, result.clone(), self.config.cache_ttl_seconds, generation)
                    .await;
                self.complete(span, CacheOutcome::Miss, Ok(&result));
                Ok(result)
            }
            Ok(None) => {
                warn!(
                    breaker = %self.breaker.name(),
                    key = %key,
                    "circuit open, serving empty audit listing"
                );
                let empty = AuditLogQueryResult::empty(query.page(), query.page_size());
                self.complete(span, CacheOutcome::Degraded, Ok(&empty));
                Ok(empty)
            }
            Err(e) => {
                self.complete(span, CacheOutcome::Miss, Err(&e));
                Err(e)
            }
        }
    }

    /// Drops every cached listing. Returns how many were dropped.
    pub async fn invalidate_cache(&self) -> usize {
        self.cache.invalidate_all().await
    }

    /// Reads one page through the breaker. `None` means the breaker refused
    /// the call and the fallback was served.
    async fn fetch(&self, query: &ListAuditQuery) -> Result<Option<AuditLogQueryResult>, AuditError> {
        let page = self
            .breaker
            .execute_with_fallback(
                || async { self.persistence.list_audit_logs(query).await.map(Some) },
                || async { None },
            )
            .await?;

        let Some(page) = page else {
            return Ok(None);
        };
        let items = self.resolve_actors(page.items).await;
        Ok(Some(AuditLogQueryResult {
            items,
            meta: page.meta,
        }))
    }

    /// Attaches actors to records. Each distinct actor is looked up once per
    /// page; lookup failures leave the actor out.
    async fn resolve_actors(&self, records: Vec<AuditLogRecord>) -> Vec<AuditLogReadModel> {
        let mut actors: HashMap<String, Option<UserSummary>> = HashMap::new();
        let mut items = Vec::with_capacity(records.len());
        for record in records {
            let actor = if record.actor_user_id.is_empty() {
                None
            } else if let Some(known) = actors.get(&record.actor_user_id) {
                known.clone()
            } else {
                let resolved = match self.persistence.get_user_by_id(&record.actor_user_id).await {
                    Ok(actor) => actor,
                    Err(e) => {
                        warn!(
                            error = %e,
                            actor_user_id = %record.actor_user_id,
                            "actor lookup failed"
                        );
                        None
                    }
                };
                actors.insert(record.actor_user_id.clone(), resolved.clone());
                resolved
            };
            items.push(AuditLogReadModel::from_record(record, actor));
        }
        items
    }

    fn complete(
        &self,
        span: SpanHandle,
        cache: CacheOutcome,
        result: Result<&AuditLogQueryResult, &AuditError>,
    ) {
        let (status, error, items) = match result {
            Ok(listing) => (SpanStatus::Success, None, listing.items.len()),
            Err(e) => (SpanStatus::Error, Some(e.to_string()), 0),
        };
        let outcome = self.observability.end_span(span, status, error.as_deref());
        self.observability.record_metric(
            QUERY_DURATION_METRIC,
            outcome.duration_ms,
            &[
                ("query", LIST_QUERY),
                ("status", status.as_str()),
                ("cache", cache.as_str()),
            ],
        );
        #[allow(clippy::cast_precision_loss)]
        let item_count = items as f64;
        self.observability
            .record_metric(QUERY_ITEMS_METRIC, item_count, &[("query", LIST_QUERY)]);
    }
}
