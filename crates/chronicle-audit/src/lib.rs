//! Chronicle: audit-log bounded context.
//!
//! Records audit entries (write path), serves paginated listings through a
//! cache and a circuit breaker (read path), and rebuilds read models by
//! replaying the event log (projections).

pub mod application;
pub mod domain;
pub mod infrastructure;
