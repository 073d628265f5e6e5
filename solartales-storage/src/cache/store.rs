//! In-memory story cache keyed by subject and age group.
//!
//! Entries hold the most recent stories first and are bounded in length.
//! An entry older than the TTL reads as a miss through [`StoryCacheStore::get`]
//! but stays in memory so fallback paths can still serve it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use solartales_core::{CacheKey, Clock, GeneratedStory, Timestamp};

use super::freshness::{CacheRead, Freshness};

/// Default number of stories kept per key.
pub const DEFAULT_MAX_STORIES_PER_KEY: usize = 20;

/// Configuration for a story cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStoreConfig {
    /// Age after which an entry reads as a miss. `None` never expires.
    pub ttl: Option<Duration>,
    /// Stories kept per key; older ones are dropped.
    pub max_stories_per_key: usize,
}

impl Default for CacheStoreConfig {
    fn default() -> Self {
        Self {
            ttl: None,
            max_stories_per_key: DEFAULT_MAX_STORIES_PER_KEY,
        }
    }
}

impl CacheStoreConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_max_stories(mut self, max: usize) -> Self {
        self.max_stories_per_key = max.max(1);
        self
    }
}

/// Stories cached under one key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Most recent first.
    pub stories: Vec<GeneratedStory>,
    pub last_refreshed_at: Timestamp,
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered with fresh data.
    pub hits: u64,
    /// Reads answered with data past its TTL.
    pub stale_hits: u64,
    /// Reads with nothing acceptable to return.
    pub misses: u64,
    /// Number of keys currently held.
    pub entries: u64,
    /// Number of stories across all keys.
    pub stories: u64,
}

/// Concurrent story cache. Writes to different keys never interfere;
/// writes to one key are serialized by the map shard lock.
#[derive(Debug)]
pub struct StoryCacheStore {
    entries: DashMap<CacheKey, CacheEntry>,
    config: CacheStoreConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
}

impl StoryCacheStore {
    pub fn new(config: CacheStoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            clock,
            hits: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheStoreConfig {
        &self.config
    }

    /// Fresh stories for `key`, or empty when missing or past the TTL.
    /// Expired data is not evicted.
    pub fn get(&self, key: &CacheKey) -> Vec<GeneratedStory> {
        self.read(key, Freshness::WithinTtl)
            .map(CacheRead::into_value)
            .unwrap_or_default()
    }

    /// Stories for `key` regardless of age, with freshness metadata.
    pub fn get_stale(&self, key: &CacheKey) -> Option<CacheRead<Vec<GeneratedStory>>> {
        self.read(key, Freshness::AnyAge)
    }

    /// Read under an explicit freshness requirement.
    pub fn read(
        &self,
        key: &CacheKey,
        freshness: Freshness,
    ) -> Option<CacheRead<Vec<GeneratedStory>>> {
        let now = self.clock.now();
        let Some(entry) = self.entries.get(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if entry.stories.is_empty() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let age = (now - entry.last_refreshed_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if !freshness.accepts(age, self.config.ttl) {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let expired = !Freshness::WithinTtl.accepts(age, self.config.ttl);
        if expired {
            self.stale_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        Some(CacheRead::from_cache(
            entry.stories.clone(),
            entry.last_refreshed_at,
            expired,
        ))
    }

    /// Replace the entry for `key` wholesale. `stories` must be most recent first.
    pub fn put(&self, key: CacheKey, mut stories: Vec<GeneratedStory>) {
        stories.truncate(self.config.max_stories_per_key);
        let entry = CacheEntry {
            stories,
            last_refreshed_at: self.clock.now(),
        };
        self.entries.insert(key, entry);
    }

    /// Prepend one story to the entry for `key`, creating it if needed.
    pub fn push(&self, key: CacheKey, story: GeneratedStory) {
        let now = self.clock.now();
        let cap = self.config.max_stories_per_key;
        let mut entry = self.entries.entry(key).or_insert_with(|| CacheEntry {
            stories: Vec::new(),
            last_refreshed_at: now,
        });
        entry.stories.insert(0, story);
        entry.stories.truncate(cap);
        entry.last_refreshed_at = now;
    }

    /// Remove the entry for `key`. Returns whether anything was removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.stories.is_empty())
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Point-in-time copy of every entry.
    pub fn entries(&self) -> Vec<(CacheKey, CacheEntry)> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        let mut entries = 0u64;
        let mut stories = 0u64;
        for entry in self.entries.iter() {
            entries += 1;
            stories += entry.stories.len() as u64;
        }
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
            stories,
        }
    }
}
