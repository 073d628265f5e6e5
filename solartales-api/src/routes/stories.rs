//! Story REST API Routes
//!
//! - `GET /api/stories/pregenerated`: instant story lookup, never waits on generation
//! - `POST /api/stories/pregenerated`: queue a manual regeneration
//! - `GET /api/stories/recent`: recent stories for a subject from the durable store

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use solartales_core::{AgeGroup, CacheKey, GeneratedStory, Subject, Timestamp};
use solartales_storage::ReadThroughStoryCache;

use crate::constants::{DEFAULT_RECENT_LIMIT, MAX_RECENT_LIMIT};
use crate::error::{ApiError, ApiResult};
use crate::services::{
    GenerationScheduler, RefreshQueue, RefreshRequest, ServedStory, StoryQueryService, StoryStats,
};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

/// Query parameters for the pre-generated story lookup.
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct PregeneratedQuery {
    /// Subject key; omit for one story per configured subject.
    pub subject: Option<String>,
    /// Reader age group; unknown values are ignored.
    pub age_group: Option<String>,
    /// Include cache and scheduler counters.
    #[serde(default)]
    pub include_stats: bool,
}

/// Pre-generated story lookup result.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PregeneratedResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub story: Option<ServedStory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub stories: Option<BTreeMap<Subject, ServedStory>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StoryStats>,
}

/// Manual regeneration actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum RegenerateAction {
    ForceRegenerate,
    GenerateForSubject,
}

/// Request body for `POST /api/stories/pregenerated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RegenerateRequest {
    pub action: RegenerateAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// Acknowledgement for a queued regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RegenerateResponse {
    pub success: bool,
    /// False when an identical request was already pending.
    pub accepted: bool,
    pub message: String,
}

/// Query parameters for the recent-stories listing.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
pub struct RecentQuery {
    pub subject: String,
    pub age_group: Option<String>,
    pub limit: Option<usize>,
}

/// Recent stories for one subject, newest first.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RecentStoriesResponse {
    pub success: bool,
    pub subject: Subject,
    pub stories: Vec<GeneratedStory>,
    pub from_cache: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub cached_at: Timestamp,
}

fn parse_age_group(raw: Option<&str>) -> Option<AgeGroup> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    match AgeGroup::from_str(raw) {
        Ok(age_group) => Some(age_group),
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring unknown age group");
            None
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Serve pre-generated stories.
///
/// Always answers for a valid subject; an empty or stale cache falls back to
/// older stories or a placeholder and queues a refresh in the background.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/stories/pregenerated",
    tag = "Stories",
    params(PregeneratedQuery),
    responses(
        (status = 200, description = "Story or stories served", body = PregeneratedResponse),
        (status = 400, description = "Invalid subject", body = ApiError),
        (status = 429, description = "Rate limit exceeded", body = ApiError),
    ),
))]
pub async fn get_pregenerated(
    State(query): State<Arc<StoryQueryService>>,
    Query(params): Query<PregeneratedQuery>,
) -> ApiResult<impl IntoResponse> {
    let age_group = parse_age_group(params.age_group.as_deref());

    let mut response = PregeneratedResponse {
        success: true,
        story: None,
        stories: None,
        stats: None,
    };

    match params.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(subject) => {
            response.story = Some(query.get_story_for_subject(subject, age_group)?);
        }
        None => {
            response.stories = Some(query.get_current_situation_stories());
        }
    }

    if params.include_stats {
        response.stats = Some(query.get_stats());
    }

    Ok(Json(response))
}

/// Queue a manual regeneration.
///
/// Goes through the same scheduler as the timer, so quota and gap still
/// apply; the response only confirms the request was queued.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/stories/pregenerated",
    tag = "Stories",
    request_body = RegenerateRequest,
    responses(
        (status = 202, description = "Regeneration queued", body = RegenerateResponse),
        (status = 400, description = "Invalid, unconfigured or missing subject", body = ApiError),
    ),
))]
pub async fn post_pregenerated(
    State(refresh): State<Arc<RefreshQueue>>,
    State(scheduler): State<Arc<GenerationScheduler>>,
    State(query): State<Arc<StoryQueryService>>,
    Json(req): Json<RegenerateRequest>,
) -> ApiResult<impl IntoResponse> {
    let request = match req.action {
        RegenerateAction::ForceRegenerate => RefreshRequest::AllSubjects,
        RegenerateAction::GenerateForSubject => {
            let subject = req
                .subject
                .as_deref()
                .ok_or_else(|| ApiError::missing_field("subject"))?;
            let subject = Subject::parse(subject)?;
            if !query.is_configured(&subject) {
                return Err(ApiError::invalid_subject(format!(
                    "Subject `{}` is not generated on demand",
                    subject
                )));
            }
            RefreshRequest::Subject(subject)
        }
    };

    let accepted = refresh.enqueue(request.clone());

    let message = match (accepted, scheduler.check()) {
        (false, _) => "An identical regeneration is already queued".to_string(),
        (true, Ok(())) => "Regeneration queued".to_string(),
        (true, Err(reason)) => format!(
            "Regeneration queued; generation is currently throttled: {}",
            reason
        ),
    };
    tracing::info!(kind = request.kind(), accepted, "Manual regeneration requested");

    Ok((
        StatusCode::ACCEPTED,
        Json(RegenerateResponse {
            success: true,
            accepted,
            message,
        }),
    ))
}

/// Recent stories for a subject.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/stories/recent",
    tag = "Stories",
    params(RecentQuery),
    responses(
        (status = 200, description = "Recent stories", body = RecentStoriesResponse),
        (status = 400, description = "Invalid subject", body = ApiError),
        (status = 503, description = "Story store unavailable", body = ApiError),
    ),
))]
pub async fn get_recent(
    State(listing): State<Arc<ReadThroughStoryCache>>,
    Query(params): Query<RecentQuery>,
) -> ApiResult<impl IntoResponse> {
    let subject = Subject::parse(&params.subject)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);
    let age_group = parse_age_group(params.age_group.as_deref());
    let key = CacheKey::with_age_group(subject.clone(), age_group);

    let read = listing.get(&key, limit).await?;
    let from_cache = read.was_cache_hit();
    let cached_at = read.cached_at();

    Ok(Json(RecentStoriesResponse {
        success: true,
        subject,
        stories: read.into_value(),
        from_cache,
        cached_at,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/pregenerated", get(get_pregenerated).post(post_pregenerated))
        .route("/recent", get(get_recent))
}
