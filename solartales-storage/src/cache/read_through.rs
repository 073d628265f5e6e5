//! Read-through listing cache in front of the durable story store.
//!
//! Fresh hits are answered from memory. Misses go to the store and refill the
//! cache. When the store fails, whatever the cache still holds is served
//! instead of an error.

use std::sync::Arc;

use solartales_core::{CacheKey, Clock, GeneratedStory, StorageError};
use tracing::warn;

use super::freshness::CacheRead;
use super::store::StoryCacheStore;
use crate::story_store::StoryStore;

/// Read-through cache over a [`StoryStore`].
pub struct ReadThroughStoryCache {
    cache: Arc<StoryCacheStore>,
    store: Arc<dyn StoryStore>,
    clock: Arc<dyn Clock>,
}

impl ReadThroughStoryCache {
    pub fn new(
        cache: Arc<StoryCacheStore>,
        store: Arc<dyn StoryStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { cache, store, clock }
    }

    /// Get a reference to the cache backend.
    pub fn backend(&self) -> &StoryCacheStore {
        &self.cache
    }

    /// Stories for `key`, newest first, at most `limit`.
    pub async fn get(
        &self,
        key: &CacheKey,
        limit: usize,
    ) -> Result<CacheRead<Vec<GeneratedStory>>, StorageError> {
        let fresh = self.cache.get(key);
        if !fresh.is_empty() {
            return Ok(self.hit(key, fresh, limit));
        }

        let fetch_limit = limit.max(self.cache.config().max_stories_per_key);
        match self
            .store
            .query_by_subject(&key.subject, key.age_group, fetch_limit)
            .await
        {
            Ok(stories) => {
                self.cache.put(key.clone(), stories.clone());
                let mut stories = stories;
                stories.truncate(limit);
                Ok(CacheRead::from_storage(stories, self.clock.now()))
            }
            Err(err) => match self.cache.get_stale(key) {
                Some(stale) => {
                    warn!(
                        key = %key,
                        error = %err,
                        "Story store unavailable, serving cached listing"
                    );
                    Ok(stale.map(|mut stories| {
                        stories.truncate(limit);
                        stories
                    }))
                }
                None => Err(err),
            },
        }
    }

    /// Drop the cached listing so the next read goes to the store.
    pub fn invalidate(&self, key: &CacheKey) {
        self.cache.invalidate(key);
    }

    fn hit(
        &self,
        key: &CacheKey,
        mut stories: Vec<GeneratedStory>,
        limit: usize,
    ) -> CacheRead<Vec<GeneratedStory>> {
        stories.truncate(limit);
        let cached_at = self
            .cache
            .get_stale(key)
            .map(|read| read.cached_at())
            .unwrap_or_else(|| self.clock.now());
        CacheRead::from_cache(stories, cached_at, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use solartales_core::{
        AgeGroup, HealthCheck, ManualClock, SpaceWeatherContext, StoryDraft, Subject,
    };

    use crate::cache::store::CacheStoreConfig;
    use crate::story_store::InMemoryStoryStore;

    // Mock store that counts queries and can be switched off
    struct CountingStore {
        inner: InMemoryStoryStore,
        queries: AtomicUsize,
        down: AtomicBool,
    }

    #[async_trait]
    impl StoryStore for CountingStore {
        async fn insert(&self, story: &GeneratedStory) -> Result<(), StorageError> {
            self.inner.insert(story).await
        }

        async fn query_by_subject(
            &self,
            subject: &Subject,
            age_group: Option<AgeGroup>,
            limit: usize,
        ) -> Result<Vec<GeneratedStory>, StorageError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable {
                    reason: "down".to_string(),
                });
            }
            self.inner.query_by_subject(subject, age_group, limit).await
        }

        async fn health_check(&self) -> HealthCheck {
            HealthCheck::healthy("counting")
        }
    }

    fn story(subject: &Subject) -> GeneratedStory {
        GeneratedStory::from_draft(
            subject.clone(),
            None,
            StoryDraft {
                title: "t".to_string(),
                body: "b".to_string(),
                educational_facts: vec![],
            },
            SpaceWeatherContext::quiet(),
            chrono::Utc::now(),
        )
    }

    async fn setup() -> (ReadThroughStoryCache, Arc<CountingStore>, Arc<ManualClock>, Subject) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(CountingStore {
            inner: InMemoryStoryStore::new(),
            queries: AtomicUsize::new(0),
            down: AtomicBool::new(false),
        });
        let subject = Subject::parse("pilot").unwrap();
        store.insert(&story(&subject)).await.unwrap();
        store.insert(&story(&subject)).await.unwrap();

        let cache = Arc::new(StoryCacheStore::new(
            CacheStoreConfig::default().with_ttl(Duration::from_secs(300)),
            clock.clone(),
        ));
        let read_through = ReadThroughStoryCache::new(cache, store.clone(), clock.clone());
        (read_through, store, clock, subject)
    }

    #[tokio::test]
    async fn test_miss_reads_through_then_hits() {
        let (cache, store, _clock, subject) = setup().await;
        let key = CacheKey::subject(subject);

        let first = cache.get(&key, 2).await.unwrap();
        assert!(first.was_cache_miss());
        assert_eq!(first.value().len(), 2);

        let second = cache.get(&key, 2).await.unwrap();
        assert!(second.was_cache_hit());
        assert_eq!(store.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_listing_refetches() {
        let (cache, store, clock, subject) = setup().await;
        let key = CacheKey::subject(subject);

        cache.get(&key, 2).await.unwrap();
        clock.advance_ms(300_001);
        let read = cache.get(&key, 2).await.unwrap();
        assert!(read.was_cache_miss());
        assert_eq!(store.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_failure_serves_stale_listing() {
        let (cache, store, clock, subject) = setup().await;
        let key = CacheKey::subject(subject);

        cache.get(&key, 2).await.unwrap();
        clock.advance_ms(600_000);
        store.down.store(true, Ordering::SeqCst);

        let read = cache.get(&key, 2).await.unwrap();
        assert!(read.was_cache_hit());
        assert!(read.is_expired());
        assert_eq!(read.value().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_without_cache_is_error() {
        let (cache, store, _clock, subject) = setup().await;
        store.down.store(true, Ordering::SeqCst);
        let key = CacheKey::subject(subject);
        assert!(cache.get(&key, 2).await.is_err());
    }
}
