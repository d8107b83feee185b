//! Projections rebuilding audit read models from the event log.
//!
//! Used for recovery and consistency checks, never on the live request path.

use std::collections::BTreeMap;
use std::sync::Arc;

use chronicle_core::audit::AuditLogReadModel;
use chronicle_core::error::AuditError;
use chronicle_core::event::{DomainEvent, EventQuery};
use chronicle_core::observability::{Observability, SpanHandle, SpanStatus};
use chronicle_core::repository::EventStore;
use tracing::info;

use crate::domain::events::{AUDIT_LOG_AGGREGATE_TYPE, AuditLogCreated};

/// Metric recording the duration of each rebuild.
pub const REBUILD_DURATION_METRIC: &str = "audit.projection.rebuild.duration_ms";

/// Metric recording how many entries each rebuild produced.
pub const REBUILD_ITEMS_METRIC: &str = "audit.projection.rebuild.items";

/// Replays `AuditLog` events into read models.
pub struct AuditProjections {
    event_store: Arc<dyn EventStore>,
    observability: Arc<dyn Observability>,
}

impl AuditProjections {
    #[must_use]
    pub fn new(event_store: Arc<dyn EventStore>, observability: Arc<dyn Observability>) -> Self {
        Self {
            event_store,
            observability,
        }
    }

    /// Rebuilds the entries of one church in the order the store returns
    /// them.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::EventStore` if the log cannot be read and
    /// `AuditError::Projection` if an event payload cannot be decoded.
    pub async fn rebuild_audit_read_model(
        &self,
        church_id: &str,
    ) -> Result<Vec<AuditLogReadModel>, AuditError> {
        let span = self.observability.start_span(
            "audit.projection.rebuild_audit_read_model",
            &[("church_id", church_id.to_owned())],
        );
        let result = self.replay_church(church_id).await;
        self.complete(span, "aggregate", result.as_ref().map(Vec::len));

        let entries = result?;
        info!(church_id, entries = entries.len(), "rebuilt audit read model");
        Ok(entries)
    }

    /// Rebuilds every church's entries, grouped by church id. Within a group
    /// entries keep the order the store returned them in.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::EventStore` if the log cannot be read and
    /// `AuditError::Projection` if an event payload cannot be decoded.
    pub async fn rebuild_all_audit_read_models(
        &self,
    ) -> Result<BTreeMap<String, Vec<AuditLogReadModel>>, AuditError> {
        let span = self
            .observability
            .start_span("audit.projection.rebuild_all_audit_read_models", &[]);
        let result = self.replay_all().await;
        self.complete(
            span,
            "all",
            result
                .as_ref()
                .map(|groups| groups.values().map(Vec::len).sum()),
        );

        let groups = result?;
        info!(churches = groups.len(), "rebuilt all audit read models");
        Ok(groups)
    }

    /// Number of audit events, for one church or for all.
    ///
    /// # Errors
    ///
    /// Returns `AuditError::EventStore` if the log cannot be read.
    pub async fn get_audit_event_count(&self, church_id: Option<&str>) -> Result<usize, AuditError> {
        let query = EventQuery {
            aggregate_id: church_id.map(str::to_owned),
            ..EventQuery::for_aggregate_type(AUDIT_LOG_AGGREGATE_TYPE)
        };
        Ok(self.event_store.query(&query).await?.total_count)
    }

    async fn replay_church(&self, church_id: &str) -> Result<Vec<AuditLogReadModel>, AuditError> {
        let result = self
            .event_store
            .query(&EventQuery::for_aggregate(church_id, AUDIT_LOG_AGGREGATE_TYPE))
            .await?;
        result.events.iter().map(to_read_model).collect()
    }

    async fn replay_all(&self) -> Result<BTreeMap<String, Vec<AuditLogReadModel>>, AuditError> {
        let result = self
            .event_store
            .query(&EventQuery::for_aggregate_type(AUDIT_LOG_AGGREGATE_TYPE))
            .await?;

        let mut groups: BTreeMap<String, Vec<AuditLogReadModel>> = BTreeMap::new();
        for event in &result.events {
            groups
                .entry(event.aggregate_id.clone())
                .or_default()
                .push(to_read_model(event)?);
        }
        Ok(groups)
    }

    fn complete(
        &self,
        span: SpanHandle,
        scope: &str,
        items: Result<usize, &AuditError>,
    ) {
        let (status, error, count) = match items {
            Ok(count) => (SpanStatus::Success, None, count),
            Err(e) => (SpanStatus::Error, Some(e.to_string()), 0),
        };
        let outcome = self.observability.end_span(span, status, error.as_deref());
        let tags = [("scope", scope), ("status", status.as_str())];
        self.observability
            .record_metric(REBUILD_DURATION_METRIC, outcome.duration_ms, &tags);
        #[allow(clippy::cast_precision_loss)]
        let count = count as f64;
        self.observability
            .record_metric(REBUILD_ITEMS_METRIC, count, &tags);
    }
}

fn to_read_model(event: &DomainEvent) -> Result<AuditLogReadModel, AuditError> {
    let payload = AuditLogCreated::from_data(&event.data).map_err(|e| {
        AuditError::Projection(format!("event deserialization failed for {}: {e}", event.id))
    })?;
    Ok(payload.into_read_model(event))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};
    use chronicle_core::error::{AuditError, EventStoreError};
    use chronicle_core::event::{DomainEvent, NewDomainEvent};
    use chronicle_core::observability::{NoopObservability, SpanStatus};
    use chronicle_test_support::{FailingEventStore, InMemoryEventStore, RecordingObservability};
    use serde_json::{Map, json};
    use uuid::Uuid;

    use super::{AuditProjections, REBUILD_ITEMS_METRIC};
    use crate::domain::events::AuditLogCreated;

    fn audit_event(church_id: &str, action: &str, minute: i64) -> DomainEvent {
        AuditLogCreated {
            actor_user_id: "user-1".to_owned(),
            actor: None,
            action: action.to_owned(),
            entity: "member".to_owned(),
            entity_id: None,
            summary: format!("{action} in {church_id}"),
            diff: None,
            metadata: None,
        }
        .into_new_event(church_id)
        .unwrap()
        .into_event(
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap() + Duration::minutes(minute),
        )
    }

    fn projections(events: Vec<DomainEvent>) -> (AuditProjections, Arc<RecordingObservability>) {
        let observability = Arc::new(RecordingObservability::default());
        (
            AuditProjections::new(Arc::new(InMemoryEventStore::seeded(events)), observability.clone()),
            observability,
        )
    }

    #[tokio::test]
    async fn test_rebuild_audit_read_model_maps_events_for_one_church() {
        // Arrange
        let first = audit_event("church-1", "member.created", 0);
        let other = audit_event("church-2", "group.created", 1);
        let second = audit_event("church-1", "member.updated", 2);
        let (projections, observability) =
            projections(vec![first.clone(), other, second.clone()]);

        // Act
        let entries = projections.rebuild_audit_read_model("church-1").await.unwrap();

        // Assert
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, first.id.to_string());
        assert_eq!(entries[0].action, "member.created");
        assert_eq!(entries[0].created_at, first.timestamp);
        assert_eq!(entries[0].metadata, Some(Map::new()));
        assert_eq!(entries[1].id, second.id.to_string());
        let items = observability.metrics_named(REBUILD_ITEMS_METRIC);
        assert_eq!(items[0].tag("scope"), Some("aggregate"));
        assert!((items[0].value - 2.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_rebuild_all_groups_by_church() {
        let (projections, _obs) = projections(vec![
            audit_event("church-2", "a", 0),
            audit_event("church-1", "b", 1),
            audit_event("church-2", "c", 2),
        ]);

        let groups = projections.rebuild_all_audit_read_models().await.unwrap();

        assert_eq!(groups.len(), 2);
        let church_2: Vec<_> = groups["church-2"].iter().map(|e| e.action.as_str()).collect();
        assert_eq!(church_2, vec!["a", "c"]);
        assert_eq!(groups["church-1"].len(), 1);
    }

    #[tokio::test]
    async fn test_other_aggregate_types_are_ignored() {
        let foreign = NewDomainEvent {
            aggregate_id: "church-1".to_owned(),
            aggregate_type: "Member".to_owned(),
            event_type: "MemberCreated".to_owned(),
            version: 1,
            data: Map::new(),
            metadata: None,
        }
        .into_event(Uuid::new_v4(), Utc::now());
        let (projections, _obs) = projections(vec![foreign, audit_event("church-1", "a", 0)]);

        assert_eq!(projections.rebuild_audit_read_model("church-1").await.unwrap().len(), 1);
        assert_eq!(projections.get_audit_event_count(Some("church-1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_audit_event_count_with_and_without_church() {
        let (projections, _obs) = projections(vec![
            audit_event("church-1", "a", 0),
            audit_event("church-1", "b", 1),
            audit_event("church-2", "c", 2),
        ]);

        assert_eq!(projections.get_audit_event_count(None).await.unwrap(), 3);
        assert_eq!(projections.get_audit_event_count(Some("church-1")).await.unwrap(), 2);
        assert_eq!(projections.get_audit_event_count(Some("church-9")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_projection_error() {
        let mut broken = audit_event("church-1", "a", 0);
        broken.data = json!({ "summary": 42 }).as_object().unwrap().clone();
        let (projections, observability) = projections(vec![broken]);

        let result = projections.rebuild_audit_read_model("church-1").await;

        assert!(matches!(result, Err(AuditError::Projection(_))));
        assert_eq!(observability.ended_spans()[0].1, SpanStatus::Error);
    }

    #[tokio::test]
    async fn test_event_store_failure_propagates() {
        let projections = AuditProjections::new(Arc::new(FailingEventStore), Arc::new(NoopObservability));

        let result = projections.rebuild_all_audit_read_models().await;

        assert!(matches!(
            result,
            Err(AuditError::EventStore(EventStoreError::Io(_)))
        ));
    }
}
