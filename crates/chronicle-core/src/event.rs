//! Domain event records and the filter/pagination rules applied to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// An immutable event as stored in the durable log.
///
/// `(aggregate_id, aggregate_type)` identify the stream the event belongs to.
/// `version` is supplied by the caller and never assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Unique event identifier, generated on append.
    pub id: Uuid,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: String,
    /// Kind of aggregate, e.g. `AuditLog`.
    pub aggregate_type: String,
    /// Type name for routing, e.g. `AuditLogCreated`.
    pub event_type: String,
    /// Caller-supplied sequence number within the stream.
    pub version: i64,
    /// Time the event was appended.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Optional free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// An event as handed to `EventStore::append`, before the store assigns an
/// id and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDomainEvent {
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: String,
    /// Kind of aggregate.
    pub aggregate_type: String,
    /// Type name for routing.
    pub event_type: String,
    /// Caller-supplied sequence number within the stream.
    pub version: i64,
    /// Event payload.
    pub data: Map<String, Value>,
    /// Optional free-form metadata.
    pub metadata: Option<Map<String, Value>>,
}

impl NewDomainEvent {
    /// Stamps the event with its identity and append time.
    #[must_use]
    pub fn into_event(self, id: Uuid, timestamp: DateTime<Utc>) -> DomainEvent {
        DomainEvent {
            id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            event_type: self.event_type,
            version: self.version,
            timestamp,
            data: self.data,
            metadata: self.metadata,
        }
    }
}

/// Filters and pagination for reading the log. Every supplied filter must
/// match; version bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    /// Only events of this aggregate id.
    pub aggregate_id: Option<String>,
    /// Only events of this aggregate type.
    pub aggregate_type: Option<String>,
    /// Only events of this event type.
    pub event_type: Option<String>,
    /// Lowest version to include.
    pub from_version: Option<i64>,
    /// Highest version to include.
    pub to_version: Option<i64>,
    /// Page size. Defaults to the filtered total.
    pub limit: Option<usize>,
    /// Number of matching events to skip. Defaults to 0.
    pub offset: Option<usize>,
}

impl EventQuery {
    /// Query scoped to one stream.
    #[must_use]
    pub fn for_aggregate(aggregate_id: impl Into<String>, aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_id: Some(aggregate_id.into()),
            aggregate_type: Some(aggregate_type.into()),
            ..Self::default()
        }
    }

    /// Query scoped to one aggregate type across all streams.
    #[must_use]
    pub fn for_aggregate_type(aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: Some(aggregate_type.into()),
            ..Self::default()
        }
    }

    /// Restricts the query to one event type.
    #[must_use]
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Restricts the query to an inclusive version range.
    #[must_use]
    pub fn with_versions(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.from_version = from;
        self.to_version = to;
        self
    }

    /// Sets the `[offset, offset + limit)` window.
    #[must_use]
    pub fn paginate(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }

    /// Returns `true` if `event` passes every supplied filter.
    #[must_use]
    pub fn matches(&self, event: &DomainEvent) -> bool {
        self.aggregate_id
            .as_deref()
            .is_none_or(|id| event.aggregate_id == id)
            && self
                .aggregate_type
                .as_deref()
                .is_none_or(|ty| event.aggregate_type == ty)
            && self
                .event_type
                .as_deref()
                .is_none_or(|ty| event.event_type == ty)
            && self.from_version.is_none_or(|from| event.version >= from)
            && self.to_version.is_none_or(|to| event.version <= to)
    }

    /// Filters `events` (kept in their given order), counts the matches and
    /// cuts out the requested page.
    pub fn apply(&self, events: impl IntoIterator<Item = DomainEvent>) -> EventQueryResult {
        let matching: Vec<DomainEvent> = events.into_iter().filter(|e| self.matches(e)).collect();
        let total_count = matching.len();
        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(total_count);
        let events = matching.into_iter().skip(offset).take(limit).collect();
        EventQueryResult {
            events,
            total_count,
            offset,
            limit,
        }
    }
}

/// One page of a log query.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQueryResult {
    /// Events in the requested window, in log order.
    pub events: Vec<DomainEvent>,
    /// Number of events that matched the filters, before pagination.
    pub total_count: usize,
    /// Offset that was applied.
    pub offset: usize,
    /// Limit that was applied.
    pub limit: usize,
}
