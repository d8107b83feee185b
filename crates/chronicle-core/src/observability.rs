//! Observability capability: timed spans and metric recording.
//!
//! Components take an `Arc<dyn Observability>` and never null-check it;
//! [`NoopObservability`] is the default when nothing is wired in.

use std::time::Instant;

/// Outcome reported when a span ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    /// The operation completed.
    Success,
    /// The operation failed.
    Error,
}

impl SpanStatus {
    /// Tag value used in metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// An open span. Created by [`Observability::start_span`] and consumed by
/// [`Observability::end_span`].
#[derive(Debug)]
pub struct SpanHandle {
    name: String,
    started_at: Instant,
    span: tracing::Span,
}

impl SpanHandle {
    /// Opens a handle that measures time from now, with no tracing span.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_span(name, tracing::Span::none())
    }

    /// Opens a handle bound to an existing tracing span.
    #[must_use]
    pub fn with_span(name: impl Into<String>, span: tracing::Span) -> Self {
        Self {
            name: name.into(),
            started_at: Instant::now(),
            span,
        }
    }

    /// Operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tracing span backing this handle (disabled for no-op handles).
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Milliseconds elapsed since the handle was opened.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn elapsed_ms(&self) -> f64 {
        self.started_at.elapsed().as_micros() as f64 / 1000.0
    }

    /// Closes the handle and returns its name and duration.
    #[must_use]
    pub fn finish(self) -> SpanOutcome {
        SpanOutcome {
            duration_ms: self.elapsed_ms(),
            name: self.name,
        }
    }
}

/// Result of ending a span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanOutcome {
    /// Operation name.
    pub name: String,
    /// Wall time between start and end.
    pub duration_ms: f64,
}

/// Minimal tracing/metrics sink.
pub trait Observability: Send + Sync {
    /// Opens a timed span for `name` carrying `attributes`.
    fn start_span(&self, name: &str, attributes: &[(&str, String)]) -> SpanHandle;

    /// Closes `span` and reports how long it was open.
    fn end_span(&self, span: SpanHandle, status: SpanStatus, error: Option<&str>) -> SpanOutcome;

    /// Records one observation of metric `name`.
    fn record_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]);
}

/// Sink that discards everything but still measures span durations.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObservability;

impl Observability for NoopObservability {
    fn start_span(&self, name: &str, _attributes: &[(&str, String)]) -> SpanHandle {
        SpanHandle::new(name)
    }

    fn end_span(&self, span: SpanHandle, _status: SpanStatus, _error: Option<&str>) -> SpanOutcome {
        span.finish()
    }

    fn record_metric(&self, _name: &str, _value: f64, _tags: &[(&str, &str)]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_end_span_reports_name_and_non_negative_duration() {
        let obs = NoopObservability;
        let span = obs.start_span("audit.list", &[("page", "1".to_owned())]);

        let outcome = obs.end_span(span, SpanStatus::Success, None);

        assert_eq!(outcome.name, "audit.list");
        assert!(outcome.duration_ms >= 0.0);
    }
}
