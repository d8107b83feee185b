//! Infrastructure adapters for the audit context.

pub mod in_memory_store;

pub use in_memory_store::{DEFAULT_CHURCH_ID, InMemoryAuditStore};
