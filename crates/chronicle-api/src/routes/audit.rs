//! Routes for the audit context.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use chronicle_audit::domain::commands::CreateAuditLog;
use chronicle_core::audit::{AuditLogQueryResult, AuditLogReadModel, ListAuditQuery, NewAuditLog};
use chronicle_core::cache::CacheStats;
use chronicle_resilience::{CircuitBreakerMetrics, CircuitBreakerState};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Query string of GET /events/count.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCountParams {
    /// Restrict the count to one church.
    #[serde(default)]
    pub church_id: Option<String>,
}

/// Response body of GET /events/count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCountResponse {
    pub church_id: Option<String>,
    pub count: usize,
}

/// Response body of GET /projections/{church_id}.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResponse {
    pub church_id: String,
    pub items: Vec<AuditLogReadModel>,
}

/// Breaker section of the diagnostics response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerDiagnostics {
    pub name: String,
    pub state: CircuitBreakerState,
    pub metrics: CircuitBreakerMetrics,
}

/// Cache section of the diagnostics response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDiagnostics {
    /// `None` when the cache could not report.
    pub stats: Option<CacheStats>,
    pub hit_rate: Option<f64>,
    /// Listing invalidations since startup.
    pub invalidations: u64,
}

/// Response body of GET /diagnostics.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    pub circuit_breaker: BreakerDiagnostics,
    pub cache: CacheDiagnostics,
}

/// GET /
#[instrument(skip(state, query), fields(page = query.page(), page_size = query.page_size()))]
async fn list_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<ListAuditQuery>,
) -> Result<Json<AuditLogQueryResult>, ApiError> {
    let result = state.queries.list_audit_logs(&query).await?;
    Ok(Json(result))
}

/// POST /
#[instrument(skip(state, input), fields(action = %input.action, entity = %input.entity))]
async fn create_audit_log(
    State(state): State<AppState>,
    Json(input): Json<NewAuditLog>,
) -> Result<(StatusCode, Json<AuditLogReadModel>), ApiError> {
    let command = CreateAuditLog::new(input);

    info!(correlation_id = %command.correlation_id, "handling create_audit_log command");

    let created = state.commands.create_audit_log(&command).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /projections
#[instrument(skip(state))]
async fn rebuild_all_projections(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, Vec<AuditLogReadModel>>>, ApiError> {
    let projections = state.projections.rebuild_all_audit_read_models().await?;
    Ok(Json(projections))
}

/// GET /projections/{church_id}
#[instrument(skip(state))]
async fn rebuild_projection(
    State(state): State<AppState>,
    Path(church_id): Path<String>,
) -> Result<Json<ProjectionResponse>, ApiError> {
    let items = state
        .projections
        .rebuild_audit_read_model(&church_id)
        .await?;
    Ok(Json(ProjectionResponse { church_id, items }))
}

/// GET /events/count
#[instrument(skip(state, params), fields(church_id = ?params.church_id))]
async fn count_events(
    State(state): State<AppState>,
    Query(params): Query<EventCountParams>,
) -> Result<Json<EventCountResponse>, ApiError> {
    let count = state
        .projections
        .get_audit_event_count(params.church_id.as_deref())
        .await?;
    Ok(Json(EventCountResponse {
        church_id: params.church_id,
        count,
    }))
}

/// GET /diagnostics
#[instrument(skip(state))]
async fn diagnostics(State(state): State<AppState>) -> Json<DiagnosticsResponse> {
    let stats = match state.listing_cache.stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(error = %e, "cache stats unavailable");
            None
        }
    };

    Json(DiagnosticsResponse {
        circuit_breaker: BreakerDiagnostics {
            name: state.breaker.name().to_owned(),
            state: state.breaker.state(),
            metrics: state.breaker.metrics(),
        },
        cache: CacheDiagnostics {
            hit_rate: stats.as_ref().and_then(CacheStats::hit_rate),
            stats,
            invalidations: state.listing_cache.generation(),
        },
    })
}

/// Returns the router for the audit context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_audit_logs).post(create_audit_log))
        .route("/projections", get(rebuild_all_projections))
        .route("/projections/{church_id}", get(rebuild_projection))
        .route("/events/count", get(count_events))
        .route("/diagnostics", get(diagnostics))
}
