//! Probe endpoints under `/health`. `ready` aggregates the story store,
//! pre-generated cache, model configuration and scheduler; the other two
//! only prove the process answers. Not rate limited.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use solartales_core::{HealthCheck, HealthReport, HealthStatus};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Body of `/health/live` and `/health/ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthDetails {
    pub checks: Vec<HealthCheck>,
    pub version: String,
    pub uptime_seconds: u64,
}

// ============================================================================
// HANDLERS
// ============================================================================

#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ping",
    tag = "Health",
    responses(
        (status = 200, description = "pong", body = String),
    ),
))]
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process answers", body = HealthResponse),
    ),
))]
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// A missing model key or disabled generation is degraded, not down: stories
/// are still served from cache and placeholders.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready, possibly degraded", body = HealthResponse),
        (status = 503, description = "A required component is down", body = HealthResponse),
    ),
))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let report = HealthReport::from_checks(vec![
        state.store.health_check().await,
        cache_check(&state),
        llm_check(&state),
        scheduler_check(&state),
    ]);

    let status_code = if report.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let details = HealthDetails {
        checks: report.checks,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };

    (
        status_code,
        Json(HealthResponse {
            status: report.status,
            message: None,
            details: Some(details),
        }),
    )
}

fn cache_check(state: &AppState) -> HealthCheck {
    let stats = state.cache.stats();
    let check = if stats.entries == 0 {
        HealthCheck::degraded("story_cache", "no pre-generated stories yet")
    } else {
        HealthCheck::healthy("story_cache")
    };
    check
        .with_metadata("entries", serde_json::json!(stats.entries))
        .with_metadata("stories", serde_json::json!(stats.stories))
}

fn llm_check(state: &AppState) -> HealthCheck {
    if state.llm_configured {
        HealthCheck::healthy("llm")
    } else {
        HealthCheck::degraded("llm", "no API key configured")
    }
}

fn scheduler_check(state: &AppState) -> HealthCheck {
    let snapshot = state.scheduler.snapshot();
    let check = if snapshot.config.enabled {
        HealthCheck::healthy("scheduler")
    } else {
        HealthCheck::degraded("scheduler", "background generation disabled")
    };
    check
        .with_metadata("today_count", serde_json::json!(snapshot.today_count))
        .with_metadata("is_generating", serde_json::json!(snapshot.is_generating))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}
