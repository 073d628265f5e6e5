#![allow(dead_code)]
//! Shared wiring for route and service tests.

use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response, Router};
use secrecy::SecretString;
use serde_json::Value;
use solartales_api::services::RefreshRequest;
use solartales_api::{create_api_router, ApiConfig, AppState, StoryBackends, StoryServiceConfig};
use solartales_core::{ManualClock, SchedulerConfig, SpaceWeatherContext, Subject};
use solartales_llm::{ChatProvider, StaticSpaceWeather, StoryProvider};
use solartales_storage::{InMemoryStoryStore, StoryStore};
use solartales_test_utils::fixtures;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub struct TestApp {
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub refresh_rx: mpsc::UnboundedReceiver<RefreshRequest>,
}

pub struct TestAppBuilder {
    subjects: Vec<Subject>,
    scheduler: SchedulerConfig,
    api_config: ApiConfig,
    admin_token: Option<String>,
    store: Arc<dyn StoryStore>,
    story_provider: Arc<dyn StoryProvider>,
    chat_provider: Arc<dyn ChatProvider>,
    llm_configured: bool,
}

impl TestAppBuilder {
    pub fn new(
        story_provider: Arc<dyn StoryProvider>,
        chat_provider: Arc<dyn ChatProvider>,
    ) -> Self {
        Self {
            subjects: fixtures::subjects(&["farmer", "pilot", "astronaut"]),
            scheduler: fixtures::permissive_scheduler_config(),
            api_config: ApiConfig::default(),
            admin_token: None,
            store: Arc::new(InMemoryStoryStore::new()),
            story_provider,
            chat_provider,
            llm_configured: true,
        }
    }

    pub fn subjects(mut self, subjects: &[&str]) -> Self {
        self.subjects = fixtures::subjects(subjects);
        self
    }

    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn api_config(mut self, api_config: ApiConfig) -> Self {
        self.api_config = api_config;
        self
    }

    pub fn admin_token(mut self, token: &str) -> Self {
        self.admin_token = Some(token.to_string());
        self
    }

    pub fn store(mut self, store: Arc<dyn StoryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn llm_configured(mut self, configured: bool) -> Self {
        self.llm_configured = configured;
        self
    }

    pub fn build(self) -> TestApp {
        let clock = fixtures::manual_clock();
        let story_config = StoryServiceConfig {
            subjects: self.subjects,
            scheduler: self.scheduler,
            admin_token: self.admin_token.map(SecretString::from),
            warm_on_start: false,
            ..StoryServiceConfig::default()
        };

        let (state, refresh_rx) = AppState::new(
            self.api_config,
            story_config,
            StoryBackends {
                store: self.store,
                story_provider: self.story_provider,
                chat_provider: self.chat_provider,
                weather: Arc::new(StaticSpaceWeather::new(SpaceWeatherContext::quiet())),
                clock: clock.clone(),
                llm_configured: self.llm_configured,
            },
        );

        TestApp {
            state,
            clock,
            refresh_rx,
        }
    }
}

impl TestApp {
    pub fn router(&self) -> Router {
        create_api_router(self.state.clone())
    }

    /// Every refresh request queued so far.
    pub fn drain_refresh(&mut self) -> Vec<RefreshRequest> {
        let mut drained = Vec::new();
        while let Ok(request) = self.refresh_rx.try_recv() {
            drained.push(request);
        }
        drained
    }
}

pub async fn send(router: Router, request: Request<Body>) -> Response {
    match router.oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}
