//! Command handlers for the audit context.
//!
//! Recording an entry persists the canonical record, appends the matching
//! event to the church's stream, and drops cached listings so the next read
//! sees the new entry.

use std::sync::Arc;

use chronicle_core::audit::{AuditLogReadModel, AuditLogRecord, AuditPersistence, UserSummary};
use chronicle_core::command::Command;
use chronicle_core::error::{AuditError, EventStoreError};
use chronicle_core::observability::{Observability, SpanStatus};
use chronicle_core::repository::EventStore;
use tracing::{Instrument, debug, warn};

use crate::application::listing_cache::AuditListingCache;
use crate::domain::commands::CreateAuditLog;
use crate::domain::events::AuditLogCreated;

/// Metric recording the duration of each command.
pub const COMMAND_DURATION_METRIC: &str = "audit.command.duration_ms";

/// Write side of the audit context.
pub struct AuditCommandHandler {
    persistence: Arc<dyn AuditPersistence>,
    event_store: Arc<dyn EventStore>,
    cache: Arc<AuditListingCache>,
    observability: Arc<dyn Observability>,
}

impl AuditCommandHandler {
    #[must_use]
    pub fn new(
        persistence: Arc<dyn AuditPersistence>,
        event_store: Arc<dyn EventStore>,
        cache: Arc<AuditListingCache>,
        observability: Arc<dyn Observability>,
    ) -> Self {
        Self {
            persistence,
            event_store,
            cache,
            observability,
        }
    }

    /// Handles the `CreateAuditLog` command and returns the new entry with
    /// its actor resolved.
    ///
    /// Listings are invalidated even when the event append fails, since the
    /// canonical record was already written.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::Persistence` if the record cannot be stored and
    /// `AuditError::EventStore` if the event cannot be appended.
    pub async fn create_audit_log(
        &self,
        command: &CreateAuditLog,
    ) -> Result<AuditLogReadModel, AuditError> {
        let span = self.observability.start_span(
            "audit.command.create_audit_log",
            &[
                ("correlation_id", command.correlation_id().to_string()),
                ("action", command.input.action.clone()),
            ],
        );

        let result = self
            .record(command)
            .instrument(span.span().clone())
            .await;

        let (status, error) = match &result {
            Ok(_) => (SpanStatus::Success, None),
            Err(e) => (SpanStatus::Error, Some(e.to_string())),
        };
        let outcome = self.observability.end_span(span, status, error.as_deref());
        self.observability.record_metric(
            COMMAND_DURATION_METRIC,
            outcome.duration_ms,
            &[("command", command.command_type()), ("status", status.as_str())],
        );
        result
    }

    async fn record(&self, command: &CreateAuditLog) -> Result<AuditLogReadModel, AuditError> {
        let record = self.persistence.create_audit_log(command.input.clone()).await?;
        let actor = self.resolve_actor(&record.actor_user_id).await;

        let appended = match command.aggregate_id() {
            Some(church_id) => self.append_event(church_id, &record, actor.clone()).await,
            None => {
                warn!(
                    record_id = %record.id,
                    action = %record.action,
                    "audit entry has no church id, skipping event emission"
                );
                Ok(())
            }
        };

        let invalidated = self.cache.invalidate_all().await;
        debug!(record_id = %record.id, invalidated, "audit entry recorded");

        appended?;
        Ok(AuditLogReadModel::from_record(record, actor))
    }

    async fn append_event(
        &self,
        church_id: &str,
        record: &AuditLogRecord,
        actor: Option<UserSummary>,
    ) -> Result<(), AuditError> {
        let event = AuditLogCreated::from_record(record, actor)
            .into_new_event(church_id)
            .map_err(EventStoreError::from)?;
        let stored = self.event_store.append(event).await?;
        debug!(event_id = %stored.id, church_id, "audit event appended");
        Ok(())
    }

    async fn resolve_actor(&self, actor_user_id: &str) -> Option<UserSummary> {
        if actor_user_id.is_empty() {
            return None;
        }
        match self.persistence.get_user_by_id(actor_user_id).await {
            Ok(actor) => actor,
            Err(e) => {
                warn!(error = %e, actor_user_id, "actor lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chronicle_core::audit::{AuditLogQueryResult, NewAuditLog};
    use chronicle_core::cache::CacheStore;
    use chronicle_core::error::{AuditError, EventStoreError, PersistenceError};
    use chronicle_core::observability::{NoopObservability, SpanStatus};
    use chronicle_core::repository::EventStore;
    use chronicle_test_support::{
        FailingAuditPersistence, FailingEventStore, InMemoryEventStore, RecordingAuditPersistence,
        RecordingObservability, sample_user,
    };
    use chronicle_cache::{CacheConfig, InMemoryCache};

    use super::{AuditCommandHandler, COMMAND_DURATION_METRIC};
    use crate::application::listing_cache::{AUDIT_CACHE_NAMESPACE, AuditListingCache};
    use crate::domain::commands::CreateAuditLog;

    fn input(church_id: Option<&str>) -> NewAuditLog {
        NewAuditLog {
            church_id: church_id.map(str::to_owned),
            actor_user_id: "user-1".to_owned(),
            action: "member.created".to_owned(),
            entity: "member".to_owned(),
            entity_id: Some("member-7".to_owned()),
            summary: "Added a member".to_owned(),
            diff: None,
            metadata: None,
            created_at: None,
        }
    }

    struct Fixture {
        persistence: Arc<RecordingAuditPersistence>,
        events: Arc<InMemoryEventStore>,
        store: Arc<InMemoryCache<AuditLogQueryResult>>,
        cache: Arc<AuditListingCache>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryCache::new(CacheConfig::default()));
            Self {
                persistence: Arc::new(
                    RecordingAuditPersistence::default().with_user(sample_user("user-1")),
                ),
                events: Arc::new(InMemoryEventStore::new()),
                cache: Arc::new(AuditListingCache::new(store.clone())),
                store,
            }
        }

        fn handler(&self) -> AuditCommandHandler {
            AuditCommandHandler::new(
                self.persistence.clone(),
                self.events.clone(),
                self.cache.clone(),
                Arc::new(NoopObservability),
            )
        }
    }

    #[tokio::test]
    async fn test_create_audit_log_persists_record_and_appends_event() {
        // Arrange
        let fixture = Fixture::new();
        let handler = fixture.handler();
        let command = CreateAuditLog::new(input(Some("church-1")));

        // Act
        let model = handler.create_audit_log(&command).await.unwrap();

        // Assert
        assert_eq!(fixture.persistence.created().len(), 1);
        assert_eq!(model.church_id, "church-1");
        assert_eq!(model.actor, Some(sample_user("user-1")));

        let events = fixture.events.events();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.aggregate_id, "church-1");
        assert_eq!(event.aggregate_type, "AuditLog");
        assert_eq!(event.event_type, "AuditLogCreated");
        assert_eq!(event.version, 1);
        assert_eq!(event.data["action"], "member.created");
        assert_eq!(event.data["actor"]["primaryEmail"], "user-1@example.com");
    }

    #[tokio::test]
    async fn test_create_audit_log_without_church_skips_event() {
        let fixture = Fixture::new();
        let handler = fixture.handler();

        let model = handler
            .create_audit_log(&CreateAuditLog::new(input(None)))
            .await
            .unwrap();

        assert_eq!(model.church_id, "church-default");
        assert!(fixture.events.events().is_empty());
    }

    #[tokio::test]
    async fn test_create_audit_log_invalidates_cached_listings() {
        // Arrange
        let fixture = Fixture::new();
        let handler = fixture.handler();
        fixture
            .cache
            .put("list:page=1:pageSize=50", AuditLogQueryResult::empty(1, 50), 300, 0)
            .await;

        // Act
        handler
            .create_audit_log(&CreateAuditLog::new(input(None)))
            .await
            .unwrap();

        // Assert
        let cached = fixture
            .store
            .get("list:page=1:pageSize=50", Some(AUDIT_CACHE_NAMESPACE))
            .await
            .unwrap();
        assert!(cached.is_none());
        assert_eq!(fixture.cache.generation(), 1);
    }

    #[tokio::test]
    async fn test_create_audit_log_propagates_persistence_error_without_event() {
        let events = Arc::new(InMemoryEventStore::new());
        let cache = Arc::new(AuditListingCache::new(Arc::new(InMemoryCache::new(
            CacheConfig::default(),
        ))));
        let handler = AuditCommandHandler::new(
            Arc::new(FailingAuditPersistence),
            events.clone(),
            cache,
            Arc::new(NoopObservability),
        );

        let result = handler
            .create_audit_log(&CreateAuditLog::new(input(Some("church-1"))))
            .await;

        assert!(matches!(
            result,
            Err(AuditError::Persistence(PersistenceError::Backend(_)))
        ));
        assert!(events.query(&Default::default()).await.unwrap().events.is_empty());
    }

    #[tokio::test]
    async fn test_create_audit_log_surfaces_append_failure_after_invalidating() {
        // Arrange
        let fixture = Fixture::new();
        fixture
            .cache
            .put("list:page=1:pageSize=50", AuditLogQueryResult::empty(1, 50), 300, 0)
            .await;
        let observability = Arc::new(RecordingObservability::default());
        let handler = AuditCommandHandler::new(
            fixture.persistence.clone(),
            Arc::new(FailingEventStore),
            fixture.cache.clone(),
            observability.clone(),
        );

        // Act
        let result = handler
            .create_audit_log(&CreateAuditLog::new(input(Some("church-1"))))
            .await;

        // Assert
        assert!(matches!(
            result,
            Err(AuditError::EventStore(EventStoreError::Io(_)))
        ));
        assert_eq!(fixture.persistence.created().len(), 1);
        assert!(fixture.cache.get("list:page=1:pageSize=50").await.is_none());

        let ended = observability.ended_spans();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].1, SpanStatus::Error);
        assert!(ended[0].2.as_deref().unwrap().contains("disk unavailable"));
        let metrics = observability.metrics_named(COMMAND_DURATION_METRIC);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].tag("status"), Some("error"));
    }

    #[tokio::test]
    async fn test_create_audit_log_records_success_metric() {
        let fixture = Fixture::new();
        let observability = Arc::new(RecordingObservability::default());
        let handler = AuditCommandHandler::new(
            fixture.persistence.clone(),
            fixture.events.clone(),
            fixture.cache.clone(),
            observability.clone(),
        );

        handler
            .create_audit_log(&CreateAuditLog::new(input(Some("church-1"))))
            .await
            .unwrap();

        assert_eq!(observability.started_spans(), vec!["audit.command.create_audit_log"]);
        let metrics = observability.metrics_named(COMMAND_DURATION_METRIC);
        assert_eq!(metrics[0].tag("command"), Some("audit.create_audit_log"));
        assert_eq!(metrics[0].tag("status"), Some("success"));
        assert!(metrics[0].value >= 0.0);
    }

    #[tokio::test]
    async fn test_unknown_actor_is_omitted_not_an_error() {
        let fixture = Fixture::new();
        let handler = fixture.handler();
        let mut unknown = input(Some("church-1"));
        unknown.actor_user_id = "ghost".to_owned();

        let model = handler
            .create_audit_log(&CreateAuditLog::new(unknown))
            .await
            .unwrap();

        assert!(model.actor.is_none());
        assert!(!fixture.events.events()[0].data.contains_key("actor"));
    }
}
