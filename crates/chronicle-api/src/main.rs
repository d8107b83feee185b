//! Chronicle API server entry point.

use std::error::Error;
use std::sync::Arc;

use chronicle_api::config::AppConfig;
use chronicle_api::shutdown::shutdown_signal;
use chronicle_api::state::AppState;
use chronicle_api::telemetry::TelemetryObservability;
use chronicle_api::tracing_setup;
use chronicle_audit::infrastructure::InMemoryAuditStore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    let telemetry = tracing_setup::init(config.otel.as_ref())?;

    info!(
        event_store = %config.event_store_path.display(),
        "starting Chronicle API server"
    );

    let persistence = Arc::new(InMemoryAuditStore::default());
    let observability = Arc::new(TelemetryObservability::new());
    let (app_state, sweeper) = AppState::from_config(&config, persistence, observability);

    if config.cors_allowed_origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS unset, allowing any origin");
    }
    let app = chronicle_api::app(
        app_state,
        chronicle_api::cors_layer(&config.cors_allowed_origins),
    );

    let addr = config.bind_address()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.shutdown().await;
    if let Err(e) = telemetry.shutdown() {
        error!(error = %e, "telemetry shutdown failed");
    }

    served?;
    info!("server stopped");
    Ok(())
}
