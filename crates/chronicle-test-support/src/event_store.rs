//! Test event stores: in-memory and failing `EventStore` implementations.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chronicle_core::clock::{Clock, SystemClock};
use chronicle_core::error::EventStoreError;
use chronicle_core::event::{DomainEvent, EventQuery, EventQueryResult, NewDomainEvent};
use chronicle_core::repository::EventStore;
use uuid::Uuid;

/// An event store that keeps events in a vector and applies the same filter
/// and pagination rules as the file store.
pub struct InMemoryEventStore {
    events: Mutex<Vec<DomainEvent>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemoryEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventStore")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventStore {
    /// Create an empty store stamping events with system time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store stamping events with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Create a store pre-seeded with `events`, kept in the given order.
    #[must_use]
    pub fn seeded(events: Vec<DomainEvent>) -> Self {
        let store = Self::new();
        *store.events.lock().unwrap() = events;
        store
    }

    /// Returns a snapshot of all appended events in append order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: NewDomainEvent) -> Result<DomainEvent, EventStoreError> {
        let event = event.into_event(Uuid::new_v4(), self.clock.now());
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }

    async fn query(&self, query: &EventQuery) -> Result<EventQueryResult, EventStoreError> {
        Ok(query.apply(self.events()))
    }

    async fn clear(&self) -> Result<(), EventStoreError> {
        self.events.lock().unwrap().clear();
        Ok(())
    }
}

/// An event store that fails every call with an I/O error. Useful for
/// testing error-propagation paths.
#[derive(Debug)]
pub struct FailingEventStore;

fn disk_error() -> EventStoreError {
    EventStoreError::Io(std::io::Error::other("disk unavailable"))
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn append(&self, _event: NewDomainEvent) -> Result<DomainEvent, EventStoreError> {
        Err(disk_error())
    }

    async fn query(&self, _query: &EventQuery) -> Result<EventQueryResult, EventStoreError> {
        Err(disk_error())
    }

    async fn clear(&self) -> Result<(), EventStoreError> {
        Err(disk_error())
    }
}
