//! Application services of the audit context.

pub mod command_handlers;
pub mod listing_cache;
pub mod projections;
pub mod query_handlers;

pub use command_handlers::AuditCommandHandler;
pub use listing_cache::{AUDIT_CACHE_NAMESPACE, AuditListingCache, cache_key};
pub use projections::AuditProjections;
pub use query_handlers::{AuditQueryConfig, AuditQueryHandler};
