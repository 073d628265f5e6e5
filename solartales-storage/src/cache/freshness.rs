//! What age of cached stories a read will take, and the metadata every
//! read carries back: when the value was cached, whether it came from
//! memory, and whether it had outlived the TTL.

use std::time::Duration;

use solartales_core::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Only data within the store's TTL is acceptable.
    #[default]
    WithinTtl,

    /// Accept anything still held in memory. Used by fallback paths.
    AnyAge,
}

impl Freshness {
    /// Whether data of `age` satisfies this requirement, given the store TTL.
    ///
    /// The boundary is inclusive: data exactly `ttl` old is still fresh.
    pub fn accepts(&self, age: Duration, ttl: Option<Duration>) -> bool {
        match self {
            Self::WithinTtl => ttl.map_or(true, |ttl| age <= ttl),
            Self::AnyAge => true,
        }
    }
}

/// A value read through the cache layer.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// Insert time for hits, fetch time for misses.
    cached_at: Timestamp,
    was_cache_hit: bool,
    /// Older than the store TTL when read.
    expired: bool,
}

impl<T> CacheRead<T> {
    /// A value served from memory.
    pub fn from_cache(value: T, cached_at: Timestamp, expired: bool) -> Self {
        Self {
            value,
            cached_at,
            was_cache_hit: true,
            expired,
        }
    }

    /// A value loaded from the durable store (cache miss).
    pub fn from_storage(value: T, fetched_at: Timestamp) -> Self {
        Self {
            value,
            cached_at: fetched_at,
            was_cache_hit: false,
            expired: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Staleness relative to `now`. Clock skew yields zero.
    pub fn staleness_at(&self, now: Timestamp) -> Duration {
        (now - self.cached_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    pub fn was_cache_miss(&self) -> bool {
        !self.was_cache_hit
    }

    /// True when the value outlived the store TTL.
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Transform the value, keeping the read metadata.
    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            cached_at: self.cached_at,
            was_cache_hit: self.was_cache_hit,
            expired: self.expired,
        }
    }
}
