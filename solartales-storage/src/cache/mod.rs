//! Story caches with explicit freshness.
//!
//! Two stores share one implementation: the pre-generated store, which never
//! expires and is refilled by generation cycles, and the listing store, which
//! expires after a TTL and reads through to the durable store.
//!
//! # Example
//!
//! ```ignore
//! let store = StoryCacheStore::new(
//!     CacheStoreConfig::default().with_ttl(Duration::from_secs(300)),
//!     clock,
//! );
//!
//! // Empty once the entry is older than the TTL
//! let fresh = store.get(&key);
//!
//! // Fallback paths can still see the expired data
//! if let Some(read) = store.get_stale(&key) {
//!     assert!(read.is_expired());
//! }
//! ```

pub mod freshness;
pub mod read_through;
pub mod store;

pub use freshness::{CacheRead, Freshness};
pub use read_through::ReadThroughStoryCache;
pub use store::{
    CacheEntry, CacheStats, CacheStoreConfig, StoryCacheStore, DEFAULT_MAX_STORIES_PER_KEY,
};
