//! Server configuration read from environment variables.

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use chronicle_audit::application::AuditQueryConfig;
use chronicle_cache::CacheConfig;
use chronicle_event_store::DEFAULT_EVENT_STORE_PATH;
use chronicle_resilience::CircuitBreakerConfig;

use crate::error::AppError;

/// Service name reported to OpenTelemetry when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "chronicle";

/// OTLP export settings. Present only when an endpoint is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtelConfig {
    /// Collector endpoint, e.g. `http://localhost:4317`.
    pub endpoint: String,
    /// `service.name` resource attribute.
    pub service_name: String,
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Location of the NDJSON event log.
    pub event_store_path: PathBuf,
    pub cache: CacheConfig,
    pub audit_query: AuditQueryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub otel: Option<OtelConfig>,
    /// Origins allowed by CORS. Empty allows any origin.
    pub cors_allowed_origins: Vec<HeaderValue>,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first variable that does not
    /// parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, applying defaults for
    /// unset variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first variable that does not
    /// parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let breaker_defaults = CircuitBreakerConfig::default();
        let cache_defaults = CacheConfig::default();

        let sweep_secs: u64 = parse_or(
            &lookup,
            "CACHE_SWEEP_INTERVAL_SECS",
            cache_defaults.sweep_interval.as_secs(),
        )?;
        if sweep_secs == 0 {
            return Err(AppError::Config(
                "CACHE_SWEEP_INTERVAL_SECS must be greater than zero".into(),
            ));
        }
        let max_entries: usize =
            parse_or(&lookup, "CACHE_MAX_ENTRIES", cache_defaults.max_entries)?;
        if max_entries == 0 {
            return Err(AppError::Config(
                "CACHE_MAX_ENTRIES must be greater than zero".into(),
            ));
        }
        let timeout_ms: u64 = parse_or(
            &lookup,
            "CIRCUIT_BREAKER_TIMEOUT_MS",
            u64::try_from(breaker_defaults.timeout.as_millis()).unwrap_or(u64::MAX),
        )?;

        let otel = lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
            .filter(|endpoint| !endpoint.trim().is_empty())
            .map(|endpoint| OtelConfig {
                endpoint,
                service_name: lookup("OTEL_SERVICE_NAME")
                    .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_owned()),
            });

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&lookup, "PORT", 3000)?,
            event_store_path: lookup("EVENT_STORE_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_EVENT_STORE_PATH), PathBuf::from),
            cache: CacheConfig {
                max_entries,
                sweep_interval: Duration::from_secs(sweep_secs),
            },
            audit_query: AuditQueryConfig {
                cache_ttl_seconds: parse_or(
                    &lookup,
                    "AUDIT_CACHE_TTL_SECS",
                    AuditQueryConfig::default().cache_ttl_seconds,
                )?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parse_or(
                    &lookup,
                    "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                    breaker_defaults.failure_threshold,
                )?,
                timeout: Duration::from_millis(timeout_ms),
                half_open_success_threshold: parse_or(
                    &lookup,
                    "CIRCUIT_BREAKER_HALF_OPEN_SUCCESS_THRESHOLD",
                    breaker_defaults.half_open_success_threshold,
                )?,
            },
            otel,
            cors_allowed_origins: parse_origins(lookup("CORS_ALLOWED_ORIGINS").as_deref())?,
        })
    }

    /// The `HOST:PORT` socket address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the combination is not a valid address.
    pub fn bind_address(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

/// Comma-separated origin list. `*` is refused because a wildcard cannot
/// be mixed into an explicit list; leave the variable unset instead.
fn parse_origins(raw: Option<&str>) -> Result<Vec<HeaderValue>, AppError> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            if origin == "*" {
                return Err(AppError::Config(
                    "CORS_ALLOWED_ORIGINS must list origins; unset it to allow any".into(),
                ));
            }
            HeaderValue::from_str(origin).map_err(|e| {
                AppError::Config(format!("CORS_ALLOWED_ORIGINS has an invalid origin {origin:?}: {e}"))
            })
        })
        .collect()
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}"))),
    }
}
