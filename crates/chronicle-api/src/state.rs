//! Shared application state.

use std::sync::Arc;

use chronicle_audit::application::{
    AuditCommandHandler, AuditListingCache, AuditProjections, AuditQueryHandler,
};
use chronicle_cache::{InMemoryCache, SweepHandle};
use chronicle_core::audit::{AuditLogQueryResult, AuditPersistence};
use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::observability::Observability;
use chronicle_core::repository::EventStore;
use chronicle_event_store::FileEventStore;
use chronicle_resilience::CircuitBreaker;

use crate::config::AppConfig;

/// Name of the breaker guarding reads from the audit store.
pub const AUDIT_STORE_BREAKER: &str = "audit-store";

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Write side of the audit context.
    pub commands: Arc<AuditCommandHandler>,
    /// Read side of the audit context.
    pub queries: Arc<AuditQueryHandler>,
    /// Event-sourced rebuilds.
    pub projections: Arc<AuditProjections>,
    /// Breaker guarding audit store reads; exposed for diagnostics.
    pub breaker: Arc<CircuitBreaker>,
    /// Listing cache shared by the read and write sides.
    pub listing_cache: Arc<AuditListingCache>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("breaker", &self.breaker)
            .field("listing_cache", &self.listing_cache)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        commands: Arc<AuditCommandHandler>,
        queries: Arc<AuditQueryHandler>,
        projections: Arc<AuditProjections>,
        breaker: Arc<CircuitBreaker>,
        listing_cache: Arc<AuditListingCache>,
    ) -> Self {
        Self {
            commands,
            queries,
            projections,
            breaker,
            listing_cache,
        }
    }

    /// Wires the pipeline from `config` with a file-backed event store and
    /// the system clock.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn from_config(
        config: &AppConfig,
        persistence: Arc<dyn AuditPersistence>,
        observability: Arc<dyn Observability>,
    ) -> (Self, SweepHandle) {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let event_store: Arc<dyn EventStore> = Arc::new(FileEventStore::with_clock(
            config.event_store_path.clone(),
            Arc::clone(&clock),
        ));
        Self::assemble(config, persistence, event_store, observability, clock)
    }

    /// Wires the pipeline around the given collaborators. The returned
    /// handle owns the cache sweep; shut it down when the server stops.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn assemble(
        config: &AppConfig,
        persistence: Arc<dyn AuditPersistence>,
        event_store: Arc<dyn EventStore>,
        observability: Arc<dyn Observability>,
        clock: Arc<dyn Clock>,
    ) -> (Self, SweepHandle) {
        let (cache, sweeper) =
            InMemoryCache::<AuditLogQueryResult>::with_sweeper(config.cache, Arc::clone(&clock));
        let listing_cache = Arc::new(AuditListingCache::new(cache));
        let breaker = Arc::new(CircuitBreaker::new(
            AUDIT_STORE_BREAKER,
            config.circuit_breaker,
            clock,
        ));

        let commands = Arc::new(AuditCommandHandler::new(
            Arc::clone(&persistence),
            Arc::clone(&event_store),
            Arc::clone(&listing_cache),
            Arc::clone(&observability),
        ));
        let queries = Arc::new(AuditQueryHandler::new(
            persistence,
            Arc::clone(&listing_cache),
            Arc::clone(&breaker),
            Arc::clone(&observability),
            config.audit_query,
        ));
        let projections = Arc::new(AuditProjections::new(event_store, observability));

        (
            Self::new(commands, queries, projections, breaker, listing_cache),
            sweeper,
        )
    }
}
