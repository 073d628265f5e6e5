//! Generation Scheduler REST API Routes
//!
//! Status and runtime configuration of background generation. Changing the
//! configuration needs the admin token when one is configured.

use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use solartales_core::{SchedulerConfig, SchedulerConfigPatch};

use crate::constants::ADMIN_TOKEN_HEADER;
use crate::error::{ApiError, ApiResult};
use crate::services::{SchedulerSnapshot, StoryStats};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Scheduler state plus story counters.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GenerationStatusResponse {
    pub scheduler: SchedulerSnapshot,
    pub stats: StoryStats,
}

// ============================================================================
// ADMIN TOKEN
// ============================================================================

/// Compare digests so the comparison time does not depend on a shared prefix.
fn token_matches(expected: &SecretString, provided: &str) -> bool {
    let expected = Sha256::digest(expected.expose_secret().as_bytes());
    let provided = Sha256::digest(provided.as_bytes());
    expected
        .iter()
        .zip(provided.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn require_admin(expected: Option<&SecretString>, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized(format!("Missing {} header", ADMIN_TOKEN_HEADER)))?;

    if token_matches(expected, provided) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("Invalid admin token"))
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Scheduler snapshot and story counters.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/generation/status",
    tag = "Generation",
    responses(
        (status = 200, description = "Current generation status", body = GenerationStatusResponse),
    ),
))]
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(GenerationStatusResponse {
        scheduler: state.scheduler.snapshot(),
        stats: state.query.get_stats(),
    })
}

/// Current scheduler configuration.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/generation/config",
    tag = "Generation",
    responses(
        (status = 200, description = "Scheduler configuration", body = SchedulerConfig),
    ),
))]
pub async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(SchedulerConfig::clone(&state.scheduler.config()))
}

/// Partially update the scheduler configuration.
///
/// Absent fields keep their value; an empty body changes nothing.
#[cfg_attr(feature = "openapi", utoipa::path(
    patch,
    path = "/api/generation/config",
    tag = "Generation",
    request_body = SchedulerConfigPatch,
    responses(
        (status = 200, description = "Updated configuration", body = SchedulerConfig),
        (status = 400, description = "Invalid value", body = ApiError),
        (status = 401, description = "Missing or wrong admin token", body = ApiError),
    ),
    security(("admin_token" = [])),
))]
pub async fn patch_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<SchedulerConfigPatch>,
) -> ApiResult<impl IntoResponse> {
    require_admin(state.admin_token.as_deref(), &headers)?;

    let updated: Arc<SchedulerConfig> = state.scheduler.update_config(&patch)?;
    Ok(Json(SchedulerConfig::clone(&updated)))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/config", get(get_config).patch(patch_config))
}
