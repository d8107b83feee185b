//! Chronicle API: composition root and HTTP surface of the audit-trail
//! pipeline.

pub mod config;
pub mod error;
pub mod routes;
pub mod shutdown;
pub mod state;
pub mod telemetry;
pub mod tracing_setup;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full router. Shared by the binary and the integration tests.
pub fn app(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/audit", routes::audit::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS policy for `origins`. An empty list allows any origin, which suits
/// local development only.
#[must_use]
pub fn cors_layer(origins: &[HeaderValue]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins.iter().cloned()))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE])
}
