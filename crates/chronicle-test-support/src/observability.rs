//! Test observability: an `Observability` sink that records what it saw.

use std::sync::Mutex;

use chronicle_core::observability::{
    Observability, SpanHandle, SpanOutcome, SpanStatus,
};

/// One `record_metric` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    /// Metric name.
    pub name: String,
    /// Observed value.
    pub value: f64,
    /// Tags as owned pairs.
    pub tags: Vec<(String, String)>,
}

impl RecordedMetric {
    /// Value of tag `key`, if present.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Records every span and metric so tests can assert on them.
#[derive(Debug, Default)]
pub struct RecordingObservability {
    started: Mutex<Vec<String>>,
    ended: Mutex<Vec<(String, SpanStatus, Option<String>)>>,
    metrics: Mutex<Vec<RecordedMetric>>,
}

impl RecordingObservability {
    /// Names of spans started, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn started_spans(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    /// `(name, status, error)` of spans ended, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn ended_spans(&self) -> Vec<(String, SpanStatus, Option<String>)> {
        self.ended.lock().unwrap().clone()
    }

    /// All metrics recorded under `name`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn metrics_named(&self, name: &str) -> Vec<RecordedMetric> {
        self.metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }
}

impl Observability for RecordingObservability {
    fn start_span(&self, name: &str, _attributes: &[(&str, String)]) -> SpanHandle {
        self.started.lock().unwrap().push(name.to_owned());
        SpanHandle::new(name)
    }

    fn end_span(&self, span: SpanHandle, status: SpanStatus, error: Option<&str>) -> SpanOutcome {
        let outcome = span.finish();
        self.ended
            .lock()
            .unwrap()
            .push((outcome.name.clone(), status, error.map(str::to_owned)));
        outcome
    }

    fn record_metric(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.metrics.lock().unwrap().push(RecordedMetric {
            name: name.to_owned(),
            value,
            tags: tags
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        });
    }
}
