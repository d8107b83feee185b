//! Tracing subscriber setup with optional OpenTelemetry export.
//!
//! Configures the global tracing subscriber with:
//! - JSON console output (fmt layer)
//! - Optional OTLP trace export (via tracing-opentelemetry)
//! - Optional OTLP metric export for the global meter provider

use std::time::Duration;

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::OtelConfig;
use crate::error::AppError;

/// Filter applied when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,chronicle=debug";

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(60);

/// Handle for the tracing subsystem.
///
/// Holds the OTLP providers; call [`TracingHandle::shutdown`] before exit to
/// flush pending spans and metrics.
pub struct TracingHandle {
    tracer_provider: Option<SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl TracingHandle {
    /// Flushes and shuts down the OTLP providers.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Telemetry` if either provider fails to shut down.
    /// Callers should log the error and continue shutting down.
    pub fn shutdown(mut self) -> Result<(), AppError> {
        if let Some(provider) = self.tracer_provider.take() {
            provider
                .shutdown()
                .map_err(|e| AppError::Telemetry(format!("tracer provider shutdown: {e}")))?;
            info!("OTLP tracer provider shut down");
        }
        if let Some(provider) = self.meter_provider.take() {
            provider
                .shutdown()
                .map_err(|e| AppError::Telemetry(format!("meter provider shutdown: {e}")))?;
            info!("OTLP meter provider shut down");
        }
        Ok(())
    }
}

impl Drop for TracingHandle {
    fn drop(&mut self) {
        if self.tracer_provider.is_some() || self.meter_provider.is_some() {
            tracing::warn!("TracingHandle dropped without shutdown(); telemetry may not be flushed");
        }
    }
}

fn build_resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_service_name(service_name.to_owned())
        .build()
}

fn init_tracer(config: &OtelConfig) -> Result<SdkTracerProvider, AppError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .build()
        .map_err(|e| AppError::Telemetry(format!("failed to build OTLP span exporter: {e}")))?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(build_resource(&config.service_name))
        .build())
}

fn init_metrics(config: &OtelConfig) -> Result<SdkMeterProvider, AppError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .build()
        .map_err(|e| AppError::Telemetry(format!("failed to build OTLP metric exporter: {e}")))?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(build_resource(&config.service_name))
        .build())
}

/// Installs the global subscriber. Call once at startup, inside the Tokio
/// runtime, before any other tracing macro fires.
///
/// # Errors
///
/// Returns `AppError::Telemetry` if an OTLP exporter cannot be built.
pub fn init(otel_config: Option<&OtelConfig>) -> Result<TracingHandle, AppError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    let Some(config) = otel_config else {
        registry.init();
        info!("tracing initialized (no OTLP endpoint)");
        return Ok(TracingHandle {
            tracer_provider: None,
            meter_provider: None,
        });
    };

    let tracer_provider = init_tracer(config)?;
    let meter_provider = init_metrics(config)?;
    global::set_meter_provider(meter_provider.clone());

    let tracer = tracer_provider.tracer("chronicle");
    registry
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .init();
    info!(
        endpoint = %config.endpoint,
        service_name = %config.service_name,
        "tracing initialized with OTLP export"
    );

    Ok(TracingHandle {
        tracer_provider: Some(tracer_provider),
        meter_provider: Some(meter_provider),
    })
}
