//! Shared application state for Axum routers.

use std::sync::Arc;

use secrecy::SecretString;
use solartales_core::Clock;
use solartales_llm::{ChatProvider, SpaceWeatherProvider, StoryProvider};
use solartales_storage::{CacheStoreConfig, ReadThroughStoryCache, StoryCacheStore, StoryStore};
use tokio::sync::mpsc;

use crate::config::{ApiConfig, StoryServiceConfig};
use crate::middleware::RateLimitState;
use crate::services::{
    GenerationScheduler, RateLimiter, RefreshQueue, RefreshRequest, StoryGenerator,
    StoryQueryService,
};

/// External collaborators the story service is wired to.
///
/// Tests swap in in-memory stores, scripted providers and a manual clock.
pub struct StoryBackends {
    pub store: Arc<dyn StoryStore>,
    pub story_provider: Arc<dyn StoryProvider>,
    pub chat_provider: Arc<dyn ChatProvider>,
    pub weather: Arc<dyn SpaceWeatherProvider>,
    pub clock: Arc<dyn Clock>,
    /// Whether a real model is behind the providers; reported by readiness.
    pub llm_configured: bool,
}

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub api_config: Arc<ApiConfig>,
    pub scheduler: Arc<GenerationScheduler>,
    pub generator: Arc<StoryGenerator>,
    pub query: Arc<StoryQueryService>,
    pub refresh: Arc<RefreshQueue>,
    /// Pre-generated stories, written by the generator.
    pub cache: Arc<StoryCacheStore>,
    /// Recent-stories listing in front of the durable store.
    pub listing: Arc<ReadThroughStoryCache>,
    pub store: Arc<dyn StoryStore>,
    pub chat: Arc<dyn ChatProvider>,
    /// Per-client chat limiter.
    pub chat_limiter: Arc<RateLimiter>,
    /// Per-IP limiter in front of `/api`.
    pub api_limiter: RateLimitState,
    pub admin_token: Option<Arc<SecretString>>,
    pub clock: Arc<dyn Clock>,
    pub llm_configured: bool,
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire the story service together.
    ///
    /// Returns the receiving end of the refresh queue; hand it to
    /// [`crate::jobs::refresh_worker_task`].
    pub fn new(
        api_config: ApiConfig,
        story_config: StoryServiceConfig,
        backends: StoryBackends,
    ) -> (Self, mpsc::UnboundedReceiver<RefreshRequest>) {
        let StoryBackends {
            store,
            story_provider,
            chat_provider,
            weather,
            clock,
            llm_configured,
        } = backends;

        let cache = Arc::new(StoryCacheStore::new(
            CacheStoreConfig::default().with_max_stories(story_config.max_stories_per_key),
            clock.clone(),
        ));
        let listing = Arc::new(ReadThroughStoryCache::new(
            Arc::new(StoryCacheStore::new(
                CacheStoreConfig::default()
                    .with_ttl(story_config.listing_cache_ttl)
                    .with_max_stories(story_config.max_stories_per_key),
                clock.clone(),
            )),
            store.clone(),
            clock.clone(),
        ));

        let scheduler = Arc::new(GenerationScheduler::new(
            story_config.scheduler.clone(),
            clock.clone(),
        ));
        let generator = Arc::new(
            StoryGenerator::new(
                scheduler.clone(),
                cache.clone(),
                store.clone(),
                story_provider,
                weather,
                clock.clone(),
                story_config.generation_timeout,
            )
            .with_listing_cache(listing.clone()),
        );

        let (refresh, refresh_rx) = RefreshQueue::new();
        let query = Arc::new(StoryQueryService::new(
            cache.clone(),
            scheduler.clone(),
            refresh.clone(),
            story_config.subjects.clone(),
        ));

        let api_config = Arc::new(api_config);
        let state = Self {
            api_limiter: RateLimitState::new(api_config.clone()),
            api_config,
            scheduler,
            generator,
            query,
            refresh,
            cache,
            listing,
            store,
            chat: chat_provider,
            chat_limiter: Arc::new(RateLimiter::new(clock.clone())),
            admin_token: story_config.admin_token.map(Arc::new),
            clock,
            llm_configured,
            start_time: std::time::Instant::now(),
        };

        (state, refresh_rx)
    }

    /// Subjects every generation cycle covers.
    pub fn subjects(&self) -> Vec<solartales_core::Subject> {
        self.query.subjects().to_vec()
    }
}

crate::impl_from_ref!(Arc<GenerationScheduler>, scheduler);
crate::impl_from_ref!(Arc<StoryQueryService>, query);
crate::impl_from_ref!(Arc<RefreshQueue>, refresh);
crate::impl_from_ref!(Arc<ReadThroughStoryCache>, listing);
crate::impl_from_ref!(Arc<RateLimiter>, chat_limiter);
