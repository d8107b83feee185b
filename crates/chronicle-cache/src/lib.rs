//! Chronicle cache: namespaced key-value store with per-entry expiry,
//! bounded capacity and a background expiry sweep.

pub mod in_memory;
pub mod sweeper;

pub use in_memory::{CacheConfig, CacheEntry, InMemoryCache};
pub use sweeper::SweepHandle;
