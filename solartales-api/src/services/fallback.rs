//! Ordered fallback ladder for story reads.
//!
//! Each strategy either produces candidate stories or passes. The ladder is
//! evaluated top to bottom and the first strategy with candidates answers.

use serde::Serialize;
use solartales_core::{CacheKey, GeneratedStory, StoryOrigin};
use solartales_storage::StoryCacheStore;

use crate::placeholders::placeholder_story;

/// One rung of the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Cached stories within TTL, exact key first, then the subject-wide key.
    FreshCache,
    /// Cached stories regardless of age.
    StaleCache,
    /// The deterministic placeholder for the subject.
    Placeholder,
}

/// Default evaluation order.
pub const DEFAULT_LADDER: [FallbackStrategy; 3] = [
    FallbackStrategy::FreshCache,
    FallbackStrategy::StaleCache,
    FallbackStrategy::Placeholder,
];

impl FallbackStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackStrategy::FreshCache => "fresh_cache",
            FallbackStrategy::StaleCache => "stale_cache",
            FallbackStrategy::Placeholder => "placeholder",
        }
    }

    /// Origin tag for stories served through this strategy.
    pub fn origin(&self) -> StoryOrigin {
        match self {
            FallbackStrategy::FreshCache => StoryOrigin::Cache,
            FallbackStrategy::StaleCache => StoryOrigin::Fallback,
            FallbackStrategy::Placeholder => StoryOrigin::Placeholder,
        }
    }

    /// Only a fresh hit leaves the subject without a refresh request.
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, FallbackStrategy::FreshCache)
    }

    /// Candidate stories for `key`, newest first, or `None` to pass.
    pub fn candidates(
        &self,
        cache: &StoryCacheStore,
        key: &CacheKey,
    ) -> Option<Vec<GeneratedStory>> {
        match self {
            FallbackStrategy::FreshCache => lookup_keys(key)
                .map(|k| cache.get(&k))
                .find(|stories| !stories.is_empty()),
            FallbackStrategy::StaleCache => lookup_keys(key)
                .filter_map(|k| cache.get_stale(&k))
                .map(|read| read.into_value())
                .find(|stories| !stories.is_empty()),
            FallbackStrategy::Placeholder => {
                Some(vec![placeholder_story(&key.subject, key.age_group)])
            }
        }
    }
}

/// The exact key, then the subject-wide key when an age group was asked for.
fn lookup_keys(key: &CacheKey) -> impl Iterator<Item = CacheKey> {
    std::iter::once(key.clone()).chain(key.widen())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use solartales_core::{AgeGroup, ManualClock, SpaceWeatherContext, StoryDraft, Subject};
    use solartales_storage::CacheStoreConfig;

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
            Utc::now(),
        )
    }

    #[test]
    fn test_fresh_cache_widens_to_subject_key() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = StoryCacheStore::new(CacheStoreConfig::default(), clock);
        let subject = Subject::parse("pilot").unwrap();
        cache.push(CacheKey::subject(subject.clone()), story(&subject));

        let key = CacheKey::with_age_group(subject, Some(AgeGroup::Ages4To6));
        let found = FallbackStrategy::FreshCache.candidates(&cache, &key).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_stale_cache_answers_after_ttl() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = StoryCacheStore::new(
            CacheStoreConfig::default().with_ttl(Duration::from_secs(60)),
            clock.clone(),
        );
        let subject = Subject::parse("farmer").unwrap();
        let key = CacheKey::subject(subject.clone());
        cache.push(key.clone(), story(&subject));
        clock.advance_ms(60_001);

        assert!(FallbackStrategy::FreshCache.candidates(&cache, &key).is_none());
        assert!(FallbackStrategy::StaleCache.candidates(&cache, &key).is_some());
    }

    #[test]
    fn test_placeholder_always_answers() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = StoryCacheStore::new(CacheStoreConfig::default(), clock);
        let key = CacheKey::subject(Subject::parse("astronaut").unwrap());
        let found = FallbackStrategy::Placeholder.candidates(&cache, &key).unwrap();
        assert!(found[0].is_placeholder());
        assert!(FallbackStrategy::Placeholder.needs_refresh());
        assert!(!FallbackStrategy::FreshCache.needs_refresh());
    }
}
