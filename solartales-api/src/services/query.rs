//! Pre-generated Story Query Surface
//!
//! Synchronous read path used by the HTTP handlers. Reads only the
//! pre-generated cache, never waits on generation, and always produces a
//! story for a valid subject by walking the fallback ladder. Anything short
//! of a fresh hit asks the refresh queue for new content.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use solartales_core::{
    AgeGroup, CacheKey, GeneratedStory, StoryId, StoryResult, Subject, Timestamp,
};
use solartales_storage::StoryCacheStore;

use crate::placeholders::placeholder_story;
use crate::services::fallback::{FallbackStrategy, DEFAULT_LADDER};
use crate::services::refresh_queue::{RefreshQueue, RefreshQueueStats, RefreshRequest};
use crate::services::scheduler::GenerationScheduler;
use crate::telemetry::metrics;

/// A story as handed to a caller, with how it was found.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ServedStory {
    pub story: GeneratedStory,
    pub strategy: FallbackStrategy,
    pub refresh_requested: bool,
}

/// Counters for the status endpoints.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StoryStats {
    pub total_stories: u64,
    pub available_stories: u64,
    pub used_stories: u64,
    pub cached_subjects: u64,
    pub is_generating: bool,
    pub today_count: u32,
    pub max_per_day: u32,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub last_generation_at: Option<Timestamp>,
    pub refresh_queue: RefreshQueueStats,
}

/// Read side of the story service.
#[derive(Debug)]
pub struct StoryQueryService {
    cache: Arc<StoryCacheStore>,
    scheduler: Arc<GenerationScheduler>,
    refresh: Arc<RefreshQueue>,
    subjects: Vec<Subject>,
    ladder: Vec<FallbackStrategy>,
    used: Mutex<HashSet<StoryId>>,
}

impl StoryQueryService {
    pub fn new(
        cache: Arc<StoryCacheStore>,
        scheduler: Arc<GenerationScheduler>,
        refresh: Arc<RefreshQueue>,
        subjects: Vec<Subject>,
    ) -> Self {
        Self {
            cache,
            scheduler,
            refresh,
            subjects,
            ladder: DEFAULT_LADDER.to_vec(),
            used: Mutex::new(HashSet::new()),
        }
    }

    /// Replace the evaluation order. A placeholder is still served if no
    /// strategy in `ladder` answers.
    pub fn with_ladder(mut self, ladder: Vec<FallbackStrategy>) -> Self {
        self.ladder = ladder;
        self
    }

    /// Subjects covered by the current-situation listing.
    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    /// Whether generation runs for `subject`. Other valid subjects are
    /// served, but never refreshed on their own.
    pub fn is_configured(&self, subject: &Subject) -> bool {
        self.subjects.contains(subject)
    }

    fn used(&self) -> MutexGuard<'_, HashSet<StoryId>> {
        self.used.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Best available story for `subject`.
    ///
    /// Fails only when `subject` is not a structurally valid key. A miss on a
    /// configured subject queues a refresh for it; a miss on any other
    /// subject queues nothing, so reads cannot spend the daily quota.
    pub fn get_story_for_subject(
        &self,
        subject: &str,
        age_group: Option<AgeGroup>,
    ) -> StoryResult<ServedStory> {
        let subject = Subject::parse(subject)?;
        let cold = self.cache.is_empty();
        let (story, strategy) = self.resolve(&CacheKey::with_age_group(subject.clone(), age_group));

        let refresh_requested = if cold {
            self.refresh.enqueue(RefreshRequest::AllSubjects);
            true
        } else if strategy.needs_refresh() && self.is_configured(&subject) {
            self.refresh.enqueue(RefreshRequest::Subject(subject));
            true
        } else {
            false
        };

        Ok(ServedStory {
            story,
            strategy,
            refresh_requested,
        })
    }

    /// One story per configured subject.
    ///
    /// A single full refresh is requested when any subject missed.
    pub fn get_current_situation_stories(&self) -> BTreeMap<Subject, ServedStory> {
        let cold = self.cache.is_empty();
        let mut served = BTreeMap::new();
        let mut any_missed = false;

        for subject in &self.subjects {
            let (story, strategy) = self.resolve(&CacheKey::subject(subject.clone()));
            any_missed |= strategy.needs_refresh();
            served.insert(
                subject.clone(),
                ServedStory {
                    story,
                    strategy,
                    refresh_requested: false,
                },
            );
        }

        if cold || any_missed {
            self.refresh.enqueue(RefreshRequest::AllSubjects);
            for entry in served.values_mut() {
                entry.refresh_requested = entry.strategy.needs_refresh() || cold;
            }
        }
        served
    }

    pub fn get_stats(&self) -> StoryStats {
        let present = self.cached_ids();
        let used_stories = {
            let mut used = self.used();
            used.retain(|id| present.contains(id));
            used.len() as u64
        };
        let total_stories = present.len() as u64;
        let snapshot = self.scheduler.snapshot();

        StoryStats {
            total_stories,
            available_stories: total_stories.saturating_sub(used_stories),
            used_stories,
            cached_subjects: self.cache.stats().entries,
            is_generating: snapshot.is_generating,
            today_count: snapshot.today_count,
            max_per_day: snapshot.config.max_per_day,
            last_generation_at: snapshot.last_generation_at,
            refresh_queue: self.refresh.stats(),
        }
    }

    /// Walk the ladder for `key` and pick a story from the first rung that answers.
    fn resolve(&self, key: &CacheKey) -> (GeneratedStory, FallbackStrategy) {
        let found = self.ladder.iter().find_map(|strategy| {
            strategy
                .candidates(&self.cache, key)
                .map(|stories| (stories, *strategy))
        });

        let picked = found.and_then(|(stories, strategy)| {
            self.pick_unused(stories).map(|story| (story, strategy))
        });
        let (story, strategy) = picked.unwrap_or_else(|| {
            (
                placeholder_story(&key.subject, key.age_group),
                FallbackStrategy::Placeholder,
            )
        });

        if let Some(metrics) = metrics() {
            metrics.record_fallback(strategy.as_str());
        }
        tracing::debug!(
            key = %key,
            strategy = strategy.as_str(),
            story_id = %story.id,
            "Story resolved"
        );

        (story.served_as(strategy.origin()), strategy)
    }

    fn cached_ids(&self) -> HashSet<StoryId> {
        self.cache
            .entries()
            .into_iter()
            .flat_map(|(_, entry)| entry.stories.into_iter().map(|s| s.id))
            .collect()
    }

    /// Newest story not served before, else the newest. Marks the pick as used.
    ///
    /// Ids of stories that have left the cache are dropped once the set
    /// outgrows the cache, so `used` stays bounded by what is cached.
    fn pick_unused(&self, stories: Vec<GeneratedStory>) -> Option<GeneratedStory> {
        let mut used = self.used();
        let index = stories
            .iter()
            .position(|s| !used.contains(&s.id))
            .unwrap_or(0);
        let story = stories.into_iter().nth(index)?;
        if !story.is_placeholder() {
            used.insert(story.id.clone());
        }
        if used.len() as u64 > self.cache.stats().stories {
            let present = self.cached_ids();
            used.retain(|id| present.contains(id));
        }
        Some(story)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use solartales_core::{
        ManualClock, SchedulerConfig, SpaceWeatherContext, StoryDraft, StoryError, StoryOrigin,
        ValidationError,
    };
    use solartales_storage::CacheStoreConfig;
    use tokio::sync::mpsc;

    struct Fixture {
        query: StoryQueryService,
        cache: Arc<StoryCacheStore>,
        refresh_rx: mpsc::UnboundedReceiver<RefreshRequest>,
    }

    fn subject(s: &str) -> Subject {
        Subject::parse(s).unwrap()
    }

    fn fixture(subjects: &[&str]) -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(StoryCacheStore::new(CacheStoreConfig::default(), clock.clone()));
        let scheduler = Arc::new(GenerationScheduler::new(SchedulerConfig::default(), clock));
        let (refresh, refresh_rx) = RefreshQueue::new();
        let query = StoryQueryService::new(
            cache.clone(),
            scheduler,
            refresh,
            subjects.iter().map(|s| subject(s)).collect(),
        );
        Fixture {
            query,
            cache,
            refresh_rx,
        }
    }

    fn story(subject: &Subject, title: &str) -> GeneratedStory {
        GeneratedStory::from_draft(
            subject.clone(),
            None,
            StoryDraft {
                title: title.to_string(),
                body: "body".to_string(),
                educational_facts: vec![],
            },
            SpaceWeatherContext::quiet(),
            Utc::now(),
        )
    }

    #[test]
    fn test_empty_cache_serves_placeholder_and_requests_full_refresh() {
        let mut f = fixture(&["pilot"]);
        let served = f.query.get_story_for_subject("pilot", None).unwrap();

        assert_eq!(served.strategy, FallbackStrategy::Placeholder);
        assert_eq!(served.story.id, "placeholder-pilot");
        assert_eq!(served.story.origin, StoryOrigin::Placeholder);
        assert!(served.refresh_requested);
        assert_eq!(f.refresh_rx.try_recv().unwrap(), RefreshRequest::AllSubjects);
    }

    #[test]
    fn test_fresh_hit_requests_nothing() {
        let mut f = fixture(&["pilot"]);
        let pilot = subject("pilot");
        f.cache.push(CacheKey::subject(pilot.clone()), story(&pilot, "one"));

        let served = f.query.get_story_for_subject("Pilot", None).unwrap();
        assert_eq!(served.strategy, FallbackStrategy::FreshCache);
        assert_eq!(served.story.origin, StoryOrigin::Cache);
        assert!(!served.refresh_requested);
        assert!(f.refresh_rx.try_recv().is_err());
    }

    #[test]
    fn test_missing_subject_in_warm_cache_requests_that_subject() {
        let mut f = fixture(&["pilot", "farmer"]);
        let pilot = subject("pilot");
        f.cache.push(CacheKey::subject(pilot.clone()), story(&pilot, "one"));

        let served = f.query.get_story_for_subject("farmer", None).unwrap();
        assert!(served.story.is_placeholder());
        assert_eq!(
            f.refresh_rx.try_recv().unwrap(),
            RefreshRequest::Subject(subject("farmer"))
        );
    }

    #[test]
    fn test_unconfigured_subject_in_warm_cache_requests_nothing() {
        let mut f = fixture(&["pilot"]);
        let pilot = subject("pilot");
        f.cache.push(CacheKey::subject(pilot.clone()), story(&pilot, "one"));

        let served = f.query.get_story_for_subject("zzz1", None).unwrap();
        assert!(served.story.is_placeholder());
        assert_eq!(served.story.subject, subject("zzz1"));
        assert!(!served.refresh_requested);
        assert!(f.refresh_rx.try_recv().is_err());
    }

    #[test]
    fn test_used_set_forgets_evicted_stories() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = Arc::new(StoryCacheStore::new(
            CacheStoreConfig::default().with_max_stories(1),
            clock.clone(),
        ));
        let scheduler = Arc::new(GenerationScheduler::new(SchedulerConfig::default(), clock));
        let (refresh, _refresh_rx) = RefreshQueue::new();
        let pilot = subject("pilot");
        let query = StoryQueryService::new(cache.clone(), scheduler, refresh, vec![pilot.clone()]);
        let key = CacheKey::subject(pilot.clone());

        let mut last_id = String::new();
        for n in 0..5 {
            cache.push(key.clone(), story(&pilot, &format!("story {}", n)));
            last_id = query.get_story_for_subject("pilot", None).unwrap().story.id;
        }

        let used = query.used();
        assert_eq!(used.len(), 1);
        assert!(used.contains(&last_id));
    }

    #[test]
    fn test_prefers_unused_stories() {
        let f = fixture(&["pilot"]);
        let pilot = subject("pilot");
        let key = CacheKey::subject(pilot.clone());
        f.cache.push(key.clone(), story(&pilot, "older"));
        f.cache.push(key, story(&pilot, "newer"));

        let first = f.query.get_story_for_subject("pilot", None).unwrap();
        let second = f.query.get_story_for_subject("pilot", None).unwrap();
        let third = f.query.get_story_for_subject("pilot", None).unwrap();
        assert_eq!(first.story.title, "newer");
        assert_eq!(second.story.title, "older");
        assert_eq!(third.story.title, "newer");

        let stats = f.query.get_stats();
        assert_eq!(stats.total_stories, 2);
        assert_eq!(stats.used_stories, 2);
        assert_eq!(stats.available_stories, 0);
    }

    #[test]
    fn test_invalid_subject_is_the_only_error() {
        let f = fixture(&[]);
        let too_long = "x".repeat(65);
        for bad in ["", "   ", "bad key!", too_long.as_str()] {
            let err = f.query.get_story_for_subject(bad, None).unwrap_err();
            assert!(matches!(
                err,
                StoryError::Validation(ValidationError::InvalidSubject { .. })
            ));
        }
        assert!(f.query.get_story_for_subject("unknown_persona", None).is_ok());
    }

    #[test]
    fn test_current_situation_covers_every_subject() {
        let mut f = fixture(&["pilot", "farmer", "astronaut"]);
        let pilot = subject("pilot");
        f.cache.push(CacheKey::subject(pilot.clone()), story(&pilot, "one"));

        let all = f.query.get_current_situation_stories();
        assert_eq!(all.len(), 3);
        assert_eq!(all[&pilot].strategy, FallbackStrategy::FreshCache);
        assert!(all[&subject("farmer")].story.is_placeholder());
        assert!(all[&subject("farmer")].refresh_requested);
        assert_eq!(f.refresh_rx.try_recv().unwrap(), RefreshRequest::AllSubjects);
        assert!(f.refresh_rx.try_recv().is_err());
    }

    #[test]
    fn test_ladder_without_placeholder_still_answers() {
        let f = fixture(&["pilot"]);
        let query = f.query.with_ladder(vec![FallbackStrategy::FreshCache]);
        let served = query.get_story_for_subject("pilot", None).unwrap();
        assert_eq!(served.strategy, FallbackStrategy::Placeholder);
    }
}
