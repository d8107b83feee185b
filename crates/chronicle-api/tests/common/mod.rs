//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chronicle_api::config::AppConfig;
use chronicle_api::state::AppState;
use chronicle_audit::infrastructure::InMemoryAuditStore;
use chronicle_cache::SweepHandle;
use chronicle_core::audit::AuditPersistence;
use chronicle_core::observability::NoopObservability;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

/// A running app plus the resources that must outlive it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub sweeper: SweepHandle,
    pub dir: TempDir,
}

impl TestApp {
    /// A fresh router clone for one request.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

/// Configuration pointing the event log into `dir`.
pub fn test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::from_lookup(|_| None).unwrap();
    config.event_store_path = dir.path().join("events.ndjson");
    config
}

/// Build the full app router over a file-backed event store in a temporary
/// directory and an in-memory audit store. Uses the same wiring as `main.rs`.
pub fn build_test_app() -> TestApp {
    build_test_app_with(Arc::new(InMemoryAuditStore::default()), |_| {})
}

/// Like [`build_test_app`] with a custom persistence store and a hook to
/// adjust the configuration.
pub fn build_test_app_with(
    persistence: Arc<dyn AuditPersistence>,
    configure: impl FnOnce(&mut AppConfig),
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&dir);
    configure(&mut config);
    let (state, sweeper) =
        AppState::from_config(&config, persistence, Arc::new(NoopObservability));
    TestApp {
        router: chronicle_api::app(
            state.clone(),
            chronicle_api::cors_layer(&config.cors_allowed_origins),
        ),
        state,
        sweeper,
        dir,
    }
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
