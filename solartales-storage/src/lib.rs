//! SolarTales Storage - Story Caches and Durable Store Traits
//!
//! In-memory caches for generated stories and the abstraction over the
//! durable store of record. The Postgres implementation lives in solartales-api.

pub mod cache;
pub mod story_store;

pub use cache::{
    CacheEntry, CacheRead, CacheStats, CacheStoreConfig, Freshness, ReadThroughStoryCache,
    StoryCacheStore, DEFAULT_MAX_STORIES_PER_KEY,
};
pub use story_store::{InMemoryStoryStore, StoryStore};
