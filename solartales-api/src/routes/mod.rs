//! HTTP surface
//!
//! - Story lookup and manual regeneration under /api/stories
//! - Scheduler status and configuration under /api/generation
//! - Chat assistant at /api/chat
//! - Health checks (Kubernetes-compatible) at /health
//! - Prometheus metrics at /metrics, OpenAPI at /openapi.json
//! - CORS support for the browser front end

pub mod chat;
pub mod generation;
pub mod health;
pub mod stories;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use chat::create_router as chat_router;
pub use generation::create_router as generation_router;
pub use health::create_router as health_router;
pub use stories::create_router as stories_router;

// ============================================================================
// OPENAPI ENDPOINT
// ============================================================================

#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Browser access for the story front end. An empty origin list opens the
/// API to every origin.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(crate::constants::ADMIN_TOKEN_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS open to any origin");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS restricted to configured origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Full application router.
///
/// Layers from the outside in: CORS, request tracing and metrics, then the
/// per-client limiter, which only wraps `/api`.
pub fn create_api_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/stories", stories::create_router())
        .nest("/generation", generation::create_router())
        .nest("/chat", chat::create_router())
        .layer(from_fn_with_state(state.api_limiter.clone(), rate_limit_middleware));

    #[allow(unused_mut)]
    let mut router = Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::create_router())
        .route("/metrics", get(metrics_handler));

    #[cfg(feature = "openapi")]
    {
        router = router.route("/openapi.json", get(openapi_json));
    }

    let cors = build_cors_layer(&state.api_config);

    router
        .with_state(state)
        .layer(from_fn(observability_middleware))
        .layer(cors)
}
