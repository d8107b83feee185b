//! Event store abstraction.

use async_trait::async_trait;

use crate::error::EventStoreError;
use crate::event::{DomainEvent, EventQuery, EventQueryResult, NewDomainEvent};

/// Append-only log of immutable domain events.
///
/// Implementations never rewrite a record once appended and perform no
/// internal retry: I/O failures reach the caller unchanged.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Stamps `event` with a fresh id and the current time and appends it to
    /// the tail of the log.
    async fn append(&self, event: NewDomainEvent) -> Result<DomainEvent, EventStoreError>;

    /// Reads the log and returns the page of events matching `query`.
    /// An empty or missing log yields an empty result.
    async fn query(&self, query: &EventQuery) -> Result<EventQueryResult, EventStoreError>;

    /// All events of one stream, sorted ascending by `version` regardless of
    /// the order in which they were appended.
    async fn get_by_aggregate_id(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
    ) -> Result<Vec<DomainEvent>, EventStoreError> {
        let mut events = self
            .query(&EventQuery::for_aggregate(aggregate_id, aggregate_type))
            .await?
            .events;
        events.sort_by_key(|e| e.version);
        Ok(events)
    }

    /// Truncates the log. Administrative and test use only.
    async fn clear(&self) -> Result<(), EventStoreError>;
}
