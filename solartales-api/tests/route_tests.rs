//! HTTP-level tests for the SolarTales API routes
//!
//! Requests go through the full router (rate limiting, observability,
//! CORS) with `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, http::Request, http::StatusCode};
use serde_json::json;
use solartales_api::services::RefreshRequest;
use solartales_api::ApiConfig;
use solartales_core::{SchedulerConfig, StoryOrigin};
use solartales_test_utils::{fixtures, FlakyStoryStore, MockChatProvider, MockStoryProvider};

#[path = "support/app.rs"]
mod test_app_support;
use test_app_support::{body_json, get, json_request, send, TestAppBuilder};

fn builder() -> TestAppBuilder {
    TestAppBuilder::new(
        Arc::new(MockStoryProvider::new()),
        Arc::new(MockChatProvider::replying("The Sun is a giant ball of glowing gas!")),
    )
}

fn chat_request(message: &str, user_agent: &str) -> Request<Body> {
    chat_request_from(message, user_agent, "203.0.113.7")
}

fn chat_request_from(message: &str, user_agent: &str, forwarded_for: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .header("user-agent", user_agent)
        .header("x-forwarded-for", forwarded_for)
        .body(Body::from(json!({ "message": message }).to_string()))
        .expect("request")
}

// ============================================================================
// STORIES
// ============================================================================

#[tokio::test]
async fn test_pregenerated_cold_cache_serves_placeholder_and_queues_refresh() {
    let mut app = builder().build();

    let response = send(app.router(), get("/api/stories/pregenerated?subject=pilot")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["story"]["strategy"], "placeholder");
    assert_eq!(body["story"]["refresh_requested"], true);
    assert_eq!(body["story"]["story"]["subject"], "pilot");
    assert_eq!(body["story"]["story"]["origin"], "placeholder");

    assert_eq!(app.drain_refresh(), vec![RefreshRequest::AllSubjects]);
}

#[tokio::test]
async fn test_pregenerated_serves_cached_story() {
    let app = builder().build();
    app.state.generator.run_cycle(&app.state.subjects()).await;

    let response = send(
        app.router(),
        get("/api/stories/pregenerated?subject=Farmer&age_group=7-9&include_stats=true"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["story"]["strategy"], "fresh_cache");
    assert_eq!(body["story"]["refresh_requested"], false);
    assert_eq!(body["story"]["story"]["subject"], "farmer");
    assert_eq!(body["stats"]["today_count"], 1);
}

#[tokio::test]
async fn test_pregenerated_without_subject_lists_every_subject() {
    let app = builder().build();

    let response = send(app.router(), get("/api/stories/pregenerated")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let stories = body["stories"].as_object().expect("stories map");
    assert_eq!(stories.len(), 3);
    assert!(stories.contains_key("astronaut"));
    assert!(body.get("story").is_none());
}

#[tokio::test]
async fn test_pregenerated_unknown_age_group_is_ignored() {
    let app = builder().build();

    let response = send(
        app.router(),
        get("/api/stories/pregenerated?subject=pilot&age_group=teenagers"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_pregenerated_invalid_subject_is_rejected() {
    let app = builder().build();

    let response = send(
        app.router(),
        get("/api/stories/pregenerated?subject=rocket%20ship!"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_SUBJECT");
}

#[tokio::test]
async fn test_regenerate_is_accepted_then_deduplicated() {
    let mut app = builder().build();

    let body = json!({ "action": "generate-for-subject", "subject": "pilot" });
    let first = send(
        app.router(),
        json_request("POST", "/api/stories/pregenerated", body.clone()),
    )
    .await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let first = body_json(first).await;
    assert_eq!(first["accepted"], true);

    let second = send(
        app.router(),
        json_request("POST", "/api/stories/pregenerated", body),
    )
    .await;
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    let second = body_json(second).await;
    assert_eq!(second["accepted"], false);

    assert_eq!(
        app.drain_refresh(),
        vec![RefreshRequest::Subject(fixtures::subject("pilot"))]
    );
}

#[tokio::test]
async fn test_regenerate_reports_throttled_scheduler() {
    let app = builder()
        .scheduler(SchedulerConfig {
            enabled: false,
            ..SchedulerConfig::default()
        })
        .build();

    let response = send(
        app.router(),
        json_request(
            "POST",
            "/api/stories/pregenerated",
            json!({ "action": "force-regenerate" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = body_json(response).await;
    assert_eq!(body["accepted"], true);
    assert!(body["message"]
        .as_str()
        .unwrap_or_default()
        .contains("generation disabled"));
}

#[tokio::test]
async fn test_regenerate_rejects_unconfigured_subject() {
    let mut app = builder().build();

    let response = send(
        app.router(),
        json_request(
            "POST",
            "/api/stories/pregenerated",
            json!({ "action": "generate-for-subject", "subject": "zzz1" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "INVALID_SUBJECT");
    assert!(app.drain_refresh().is_empty());
}

#[tokio::test]
async fn test_pregenerated_unconfigured_subject_queues_nothing_once_warm() {
    let mut app = builder().build();
    app.state.generator.run_cycle(&app.state.subjects()).await;

    let response = send(app.router(), get("/api/stories/pregenerated?subject=zzz1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["story"]["strategy"], "placeholder");
    assert_eq!(body["story"]["refresh_requested"], false);
    assert!(app.drain_refresh().is_empty());
}

#[tokio::test]
async fn test_regenerate_for_subject_requires_subject() {
    let app = builder().build();

    let response = send(
        app.router(),
        json_request(
            "POST",
            "/api/stories/pregenerated",
            json!({ "action": "generate-for-subject" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "MISSING_FIELD");
}

#[tokio::test]
async fn test_recent_reads_through_listing_cache() {
    let store = Arc::new(FlakyStoryStore::new());
    let app = builder().store(store.clone()).build();
    app.state.generator.run_cycle(&app.state.subjects()).await;

    let first = body_json(send(app.router(), get("/api/stories/recent?subject=pilot")).await).await;
    assert_eq!(first["from_cache"], false);
    assert_eq!(first["stories"].as_array().map(Vec::len), Some(1));

    let second = send(app.router(), get("/api/stories/recent?subject=pilot")).await;
    let second = body_json(second).await;
    assert_eq!(second["from_cache"], true);
    assert_eq!(store.query_count(), 1);
}

#[tokio::test]
async fn test_recent_store_outage_is_service_unavailable() {
    let store = Arc::new(FlakyStoryStore::new());
    store.set_down(true);
    let app = builder().store(store).build();

    let response = send(app.router(), get("/api/stories/recent?subject=pilot")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// GENERATION
// ============================================================================

#[tokio::test]
async fn test_generation_status_reports_scheduler_state() {
    let app = builder().build();
    app.state.generator.run_cycle(&app.state.subjects()).await;

    let response = send(app.router(), get("/api/generation/status")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["scheduler"]["today_count"], 1);
    assert_eq!(body["scheduler"]["is_generating"], false);
    assert_eq!(body["stats"]["cached_subjects"], 3);
}

#[tokio::test]
async fn test_patch_config_requires_admin_token() {
    let app = builder().admin_token("let-me-in").build();
    let patch = json!({ "max_per_day": 3 });

    let missing = send(
        app.router(),
        json_request("PATCH", "/api/generation/config", patch.clone()),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .method("PATCH")
        .uri("/api/generation/config")
        .header("content-type", "application/json")
        .header("x-admin-token", "guess")
        .body(Body::from(patch.to_string()))
        .expect("request");
    assert_eq!(send(app.router(), wrong).await.status(), StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .method("PATCH")
        .uri("/api/generation/config")
        .header("content-type", "application/json")
        .header("x-admin-token", "let-me-in")
        .body(Body::from(patch.to_string()))
        .expect("request");
    let response = send(app.router(), authorized).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["max_per_day"], 3);
    assert_eq!(app.state.scheduler.config().max_per_day, 3);
}

#[tokio::test]
async fn test_patch_config_rejects_invalid_value() {
    let app = builder().build();
    let before = app.state.scheduler.config();

    let response = send(
        app.router(),
        json_request("PATCH", "/api/generation/config", json!({ "interval_ms": 5 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.state.scheduler.config(), before);

    let current = body_json(send(app.router(), get("/api/generation/config")).await).await;
    assert_eq!(current["interval_ms"], before.interval_ms);
}

// ============================================================================
// CHAT
// ============================================================================

#[tokio::test]
async fn test_chat_replies_with_rate_limit_headers() {
    let app = builder().build();

    let response = send(app.router(), chat_request("What is a solar flare?", "kid-browser")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-remaining"));

    let body = body_json(response).await;
    assert_eq!(body["reply"], "The Sun is a giant ball of glowing gas!");
    assert_eq!(body["degraded"], false);
}

#[tokio::test]
async fn test_chat_limit_returns_retry_after() {
    let config = ApiConfig {
        chat_rate_limit_max: 2,
        chat_rate_limit_window: Duration::from_secs(60),
        ..ApiConfig::default()
    };
    let app = builder().api_config(config).build();

    for _ in 0..2 {
        let ok = send(app.router(), chat_request("hello", "same-browser")).await;
        assert_eq!(ok.status(), StatusCode::OK);
    }

    let limited = send(app.router(), chat_request("hello", "same-browser")).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = limited
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .expect("retry-after header");
    assert!((1..=60).contains(&retry_after));

    // A different user agent is a different client.
    let other = send(app.router(), chat_request("hello", "other-browser")).await;
    assert_eq!(other.status(), StatusCode::OK);

    // The window reopens after it ends.
    app.clock.advance_ms(61_000);
    let reopened = send(app.router(), chat_request("hello", "same-browser")).await;
    assert_eq!(reopened.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_chat_limit_ignores_rotating_forwarded_for() {
    let config = ApiConfig {
        chat_rate_limit_max: 2,
        chat_rate_limit_window: Duration::from_secs(60),
        ..ApiConfig::default()
    };
    let app = builder().api_config(config).build();

    let mut statuses = Vec::new();
    for n in 1..=4 {
        let forwarded = format!("198.51.100.{}", n);
        let response =
            send(app.router(), chat_request_from("hello", "same-browser", &forwarded)).await;
        statuses.push(response.status());
    }

    assert_eq!(
        statuses,
        vec![
            StatusCode::OK,
            StatusCode::OK,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::TOO_MANY_REQUESTS,
        ]
    );
}

#[tokio::test]
async fn test_chat_provider_failure_degrades_gracefully() {
    let app = TestAppBuilder::new(
        Arc::new(MockStoryProvider::new()),
        Arc::new(MockChatProvider::failing()),
    )
    .build();

    let response = send(app.router(), chat_request("Why are auroras green?", "kid-browser")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["degraded"], true);
    assert!(!body["reply"].as_str().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let app = builder().build();
    let response = send(app.router(), chat_request("   ", "kid-browser")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// HEALTH AND MIDDLEWARE
// ============================================================================

#[tokio::test]
async fn test_readiness_tracks_store_health() {
    let store = Arc::new(FlakyStoryStore::new());
    let app = builder().store(store.clone()).build();

    let ready = send(app.router(), get("/health/ready")).await;
    assert_eq!(ready.status(), StatusCode::OK);

    store.set_down(true);
    let not_ready = send(app.router(), get("/health/ready")).await;
    assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_liveness_is_always_ok() {
    let app = builder().llm_configured(false).build();
    let response = send(app.router(), get("/health/live")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_rate_limit_applies_per_client() {
    let config = ApiConfig {
        rate_limit_per_minute: 1,
        rate_limit_burst: 1,
        trust_proxy_headers: true,
        ..ApiConfig::default()
    };
    let app = builder().api_config(config).build();
    let router = app.router();

    let request = |ip: &str| {
        Request::builder()
            .uri("/api/generation/config")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .expect("request")
    };

    assert_eq!(send(router.clone(), request("198.51.100.1")).await.status(), StatusCode::OK);
    assert_eq!(
        send(router.clone(), request("198.51.100.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(send(router.clone(), request("198.51.100.2")).await.status(), StatusCode::OK);

    // Health checks are not rate limited.
    assert_eq!(send(router, get("/health/ping")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_served_story_origin_matches_strategy() {
    let app = builder().build();
    app.state.generator.run_cycle(&app.state.subjects()).await;

    let served = app
        .state
        .query
        .get_story_for_subject("pilot", None)
        .expect("valid subject");
    assert_eq!(served.story.origin, StoryOrigin::Cache);
}
