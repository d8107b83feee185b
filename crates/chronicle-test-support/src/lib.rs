//! Shared test mocks and utilities for the Chronicle audit-trail pipeline.

mod clock;
mod event_store;
mod observability;
mod persistence;

pub use clock::{FixedClock, ManualClock};
pub use event_store::{FailingEventStore, InMemoryEventStore};
pub use observability::{RecordedMetric, RecordingObservability};
pub use persistence::{FailingAuditPersistence, RecordingAuditPersistence, sample_user};
