//! Chronicle event store: durable append-only log of domain events.

pub mod file_event_store;

pub use file_event_store::{DEFAULT_EVENT_STORE_PATH, FileEventStore};
