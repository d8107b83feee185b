//! `Observability` backed by `tracing` spans and OpenTelemetry histograms.
//!
//! Spans become OTLP spans through the `tracing-opentelemetry` layer when
//! export is configured; metrics go to the global meter provider, which is a
//! no-op until [`crate::tracing_setup::init`] installs one.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chronicle_core::observability::{Observability, SpanHandle, SpanOutcome, SpanStatus};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Histogram, Meter};
use tracing::field::Empty;
use tracing::{debug, info_span};

/// Instrumentation scope reported with every metric.
pub const METER_NAME: &str = "chronicle";

/// Production observability sink.
pub struct TelemetryObservability {
    meter: Meter,
    histograms: Mutex<HashMap<String, Histogram<f64>>>,
}

impl std::fmt::Debug for TelemetryObservability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryObservability")
            .field("meter", &METER_NAME)
            .finish_non_exhaustive()
    }
}

impl Default for TelemetryObservability {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryObservability {
    /// Creates a sink on the global meter provider.
    #[must_use]
    pub fn new() -> Self {
        Self {
            meter: global::meter(METER_NAME),
            histograms: Mutex::new(HashMap::new()),
        }
    }

    fn histogram(&self, name: &str) -> Histogram<f64> {
        let mut histograms = self
            .histograms
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        histograms
            .entry(name.to_owned())
            .or_insert_with(|| self.meter.f64_histogram(name.to_owned()).build())
            .clone()
    }
}

fn format_attributes(attributes: &[(&str, String)]) -> String {
    attributes
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Observability for TelemetryObservability {
    fn start_span(&self, name: &str, attributes: &[(&str, String)]) -> SpanHandle {
        let span = info_span!(
            "chronicle.operation",
            otel.name = %name,
            attributes = %format_attributes(attributes),
            otel.status_code = Empty,
            error = Empty,
            duration_ms = Empty,
        );
        SpanHandle::with_span(name, span)
    }

    fn end_span(&self, span: SpanHandle, status: SpanStatus, error: Option<&str>) -> SpanOutcome {
        let tracing_span = span.span().clone();
        let outcome = span.finish();

        tracing_span.record("duration_ms", outcome.duration_ms);
        match status {
            SpanStatus::Success => {
                tracing_span.record("otel.status_code", "OK");
            }
            SpanStatus::Error => {
                tracing_span.record("otel.status_code", "ERROR");
            }
        }
        if let Some(message) = error {
            tracing_span.record("error", message);
        }

        debug!(
            operation = %outcome.name,
            status = status.as_str(),
            duration_ms = outcome.duration_ms,
            "operation finished"
        );
        outcome
    }

    fn record_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        let attributes: Vec<KeyValue> = tags
            .iter()
            .map(|(key, value)| KeyValue::new((*key).to_owned(), (*value).to_owned()))
            .collect();
        self.histogram(name).record(value, &attributes);
    }
}
