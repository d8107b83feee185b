//! Clock abstraction for determinism.
//!
//! Expiry checks in the cache and the open-circuit timeout in the breaker
//! both read time through this trait, so tests can move time by hand.

use chrono::{DateTime, Utc};

/// Abstraction over wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds elapsed between `earlier` and now. Negative if `earlier`
    /// lies in the future.
    fn millis_since(&self, earlier: DateTime<Utc>) -> i64 {
        (self.now() - earlier).num_milliseconds()
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
