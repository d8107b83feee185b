//! Three-state circuit breaker.
//!
//! Transitions: Closed → Open (once `failure_threshold` failures have been
//! recorded) → `HalfOpen` (lazily, on the first call after `timeout` has
//! elapsed since the last failure) → Closed (after
//! `half_open_success_threshold` successes) or back to Open (on any
//! failure). There is no background timer.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use chronicle_core::clock::{Clock, SystemClock};

use crate::error::CircuitBreakerError;

const LATENCY_WINDOW: usize = 100;
const TRANSITION_HISTORY: usize = 100;

/// Runtime-tunable thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Failures tolerated in Closed before opening.
    pub failure_threshold: u32,
    /// Time since the last failure before a recovery probe is allowed.
    pub timeout: Duration,
    /// Successes in `HalfOpen` required to close again.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_millis(60_000),
            half_open_success_threshold: 1,
        }
    }
}

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitBreakerState {
    /// Normal operation; every call runs.
    Closed,
    /// Calls are rejected until the timeout elapses.
    Open,
    /// Calls run as recovery probes.
    HalfOpen,
}

impl CircuitBreakerState {
    /// Wire name of the state.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitBreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub from: CircuitBreakerState,
    pub to: CircuitBreakerState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Point-in-time copy of the breaker's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<DateTime<Utc>>,
    pub total_requests: u64,
    /// Percentage in `0..=100`; 100 before any request.
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub state_transitions: Vec<StateTransition>,
}

#[derive(Debug)]
struct BreakerInner {
    config: CircuitBreakerConfig,
    state: CircuitBreakerState,
    success_count: u64,
    failure_count: u64,
    total_requests: u64,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    latencies: VecDeque<f64>,
    transitions: VecDeque<StateTransition>,
    half_open_success_count: u32,
    half_open_attempt_count: u32,
}

impl BreakerInner {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitBreakerState::Closed,
            success_count: 0,
            failure_count: 0,
            total_requests: 0,
            last_failure_time: None,
            last_success_time: None,
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            transitions: VecDeque::with_capacity(TRANSITION_HISTORY),
            half_open_success_count: 0,
            half_open_attempt_count: 0,
        }
    }

    fn push_latency(&mut self, latency_ms: f64) {
        if self.latencies.len() == LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
    }

    fn reset_half_open(&mut self) {
        self.half_open_success_count = 0;
        self.half_open_attempt_count = 0;
    }
}

/// Failure-isolating call guard.
///
/// State is per instance. It sits behind a mutex that is released before the
/// wrapped operation is awaited, so one breaker can be shared across tasks.
pub struct CircuitBreaker {
    name: String,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker that reads time from `clock`.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            clock,
            inner: Mutex::new(BreakerInner::new(config)),
        }
    }

    /// Creates a closed breaker on the system clock.
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default(), Arc::new(SystemClock))
    }

    /// Name used in log lines.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `operation` under breaker protection.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without running the operation
    /// while the circuit is open, or [`CircuitBreakerError::Operation`] with
    /// the operation's own error when it fails.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.admit() {
            debug!(breaker = %self.name, "circuit open, rejecting call");
            return Err(CircuitBreakerError::Open);
        }
        self.run(operation).await.map_err(CircuitBreakerError::Operation)
    }

    /// Runs `operation` under breaker protection, serving `fallback` instead
    /// while the circuit is open.
    ///
    /// # Errors
    ///
    /// Returns the operation's error unchanged when it runs and fails. The
    /// fallback is never used to mask such a failure.
    pub async fn execute_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = T>,
    {
        if !self.admit() {
            debug!(breaker = %self.name, "circuit open, using fallback");
            return Ok(fallback().await);
        }
        self.run(operation).await
    }

    /// Counts the request and decides whether the operation may run,
    /// promoting Open to `HalfOpen` once the timeout has elapsed.
    fn admit(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.total_requests += 1;

        if inner.state != CircuitBreakerState::Open {
            return true;
        }
        let timeout_ms = i64::try_from(inner.config.timeout.as_millis()).unwrap_or(i64::MAX);
        let elapsed = inner
            .last_failure_time
            .map(|last| (now - last).num_milliseconds());
        if elapsed.is_some_and(|elapsed| elapsed >= timeout_ms) {
            self.transition(&mut inner, CircuitBreakerState::HalfOpen, Some("Timeout elapsed"), now);
            true
        } else {
            false
        }
    }

    async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = self.clock.now();
        let result = operation().await;
        #[allow(clippy::cast_precision_loss)]
        let latency_ms = self.clock.millis_since(started).max(0) as f64;

        match &result {
            Ok(_) => self.record_success(latency_ms),
            Err(_) => self.record_failure(latency_ms),
        }
        result
    }

    fn record_success(&self, latency_ms: f64) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.success_count += 1;
        inner.last_success_time = Some(now);
        inner.push_latency(latency_ms);

        if inner.state == CircuitBreakerState::HalfOpen {
            inner.half_open_success_count += 1;
            inner.half_open_attempt_count += 1;
            if inner.half_open_success_count >= inner.config.half_open_success_threshold {
                info!(
                    breaker = %self.name,
                    attempts = inner.half_open_attempt_count,
                    "circuit recovered"
                );
                self.transition(&mut inner, CircuitBreakerState::Closed, Some("Recovery successful"), now);
                inner.failure_count = 0;
                inner.reset_half_open();
            }
        }
    }

    fn record_failure(&self, latency_ms: f64) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure_time = Some(now);
        inner.push_latency(latency_ms);

        let state = inner.state;
        match state {
            CircuitBreakerState::Closed => {
                if inner.failure_count >= u64::from(inner.config.failure_threshold) {
                    warn!(
                        breaker = %self.name,
                        failures = inner.failure_count,
                        threshold = inner.config.failure_threshold,
                        "failure threshold reached, opening circuit"
                    );
                    let reason = format!("Failures exceeded threshold ({})", inner.failure_count);
                    self.transition(&mut inner, CircuitBreakerState::Open, Some(&reason), now);
                }
            }
            CircuitBreakerState::HalfOpen => {
                warn!(breaker = %self.name, "failure during recovery probe, reopening circuit");
                self.transition(
                    &mut inner,
                    CircuitBreakerState::Open,
                    Some("Failed during recovery test"),
                    now,
                );
                inner.reset_half_open();
            }
            CircuitBreakerState::Open => {}
        }
    }

    fn transition(
        &self,
        inner: &mut BreakerInner,
        to: CircuitBreakerState,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let from = inner.state;
        inner.state = to;
        info!(breaker = %self.name, %from, %to, reason, "circuit breaker transition");

        if inner.transitions.len() == TRANSITION_HISTORY {
            inner.transitions.pop_front();
        }
        inner.transitions.push_back(StateTransition {
            from,
            to,
            timestamp: now,
            reason: reason.map(str::to_owned),
        });
    }

    /// Current state. Does not promote Open to `HalfOpen`; that happens only
    /// on the next call.
    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        self.lock().state
    }

    /// Snapshot of counters and recent transitions.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.lock();
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if inner.total_requests == 0 {
            100.0
        } else {
            inner.success_count as f64 / inner.total_requests as f64 * 100.0
        };
        #[allow(clippy::cast_precision_loss)]
        let average_latency_ms = if inner.latencies.is_empty() {
            0.0
        } else {
            inner.latencies.iter().sum::<f64>() / inner.latencies.len() as f64
        };

        CircuitBreakerMetrics {
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            total_requests: inner.total_requests,
            success_rate,
            average_latency_ms,
            state_transitions: inner.transitions.iter().cloned().collect(),
        }
    }

    /// Forces Closed and clears failure/success counts, latencies and
    /// recovery progress. The transition is recorded.
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        info!(breaker = %self.name, "manual circuit breaker reset");
        self.transition(&mut inner, CircuitBreakerState::Closed, Some("Manual reset"), now);
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.latencies.clear();
        inner.reset_half_open();
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> CircuitBreakerConfig {
        self.lock().config
    }

    pub fn set_failure_threshold(&self, threshold: u32) {
        self.lock().config.failure_threshold = threshold;
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.lock().config.timeout = timeout;
    }

    pub fn set_half_open_success_threshold(&self, threshold: u32) {
        self.lock().config.half_open_success_threshold = threshold;
    }
}
