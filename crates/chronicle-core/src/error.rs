//! Error taxonomy shared by every Chronicle component.

use thiserror::Error;

/// Failures of the durable event log.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Reading or appending the log failed at the filesystem level.
    #[error("event log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or a stored line could not be decoded.
    #[error("event log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by the external persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The input was rejected by the store.
    #[error("validation error: {0}")]
    Validation(String),

    /// The backend itself failed.
    #[error("persistence backend error: {0}")]
    Backend(String),
}

/// Failures of a cache backend. Callers treat these as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend could not serve the request.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Top-level error of the audit context.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The canonical record store failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The event log failed.
    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    /// A stored event could not be mapped back into a read model.
    #[error("projection error: {0}")]
    Projection(String),
}
