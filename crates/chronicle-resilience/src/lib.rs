//! Chronicle resilience: a three-state circuit breaker with metrics.

pub mod circuit_breaker;
pub mod error;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitBreakerState,
    StateTransition,
};
pub use error::CircuitBreakerError;
