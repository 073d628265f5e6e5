//! SolarTales Test Utilities
//!
//! Shared test infrastructure for the SolarTales workspace:
//! - Mock story, chat and space-weather providers with scripted failures
//! - A story store that can be switched into failure mode
//! - Proptest generators for subjects, stories and scheduler settings
//! - Fixtures for common scenarios

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

// Re-export core types for convenience
pub use solartales_core::{
    AgeGroup, CacheKey, Clock, GeneratedStory, HealthCheck, ManualClock, ProviderError,
    SchedulerConfig, SchedulerConfigPatch, SpaceWeatherContext, StorageError, StoryDraft,
    StoryOrigin, Subject, Timestamp,
};
pub use solartales_llm::{
    ChatMessage, ChatProvider, GenerationConstraints, SpaceWeatherProvider, StaticSpaceWeather,
    StoryPrompt, StoryProvider,
};
pub use solartales_storage::{InMemoryStoryStore, StoryStore};

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

/// Story provider with per-subject failure and stall scripting.
///
/// Successful drafts are titled `"<Display Name> story #<n>"` where `n`
/// counts calls across all subjects.
#[derive(Debug, Default)]
pub struct MockStoryProvider {
    failing: Mutex<HashSet<String>>,
    stalling: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    subjects_seen: Mutex<Vec<Subject>>,
}

impl MockStoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subjects whose generation returns an error.
    pub fn failing_for(subjects: &[&str]) -> Self {
        let provider = Self::new();
        for subject in subjects {
            provider.fail_subject(subject);
        }
        provider
    }

    pub fn fail_subject(&self, subject: &str) {
        lock(&self.failing).insert(subject.to_string());
    }

    pub fn recover_subject(&self, subject: &str) {
        lock(&self.failing).remove(subject);
    }

    /// Subjects whose generation never completes in time.
    pub fn stall_subject(&self, subject: &str) {
        lock(&self.stalling).insert(subject.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Subjects in call order.
    pub fn subjects_seen(&self) -> Vec<Subject> {
        lock(&self.subjects_seen).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl StoryProvider for MockStoryProvider {
    async fn generate_story(
        &self,
        prompt: &StoryPrompt,
        _constraints: &GenerationConstraints,
    ) -> Result<StoryDraft, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        lock(&self.subjects_seen).push(prompt.subject.clone());

        let key = prompt.subject.as_str().to_string();
        if lock(&self.stalling).contains(&key) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if lock(&self.failing).contains(&key) {
            return Err(ProviderError::RequestFailed {
                provider: "mock".to_string(),
                status: 500,
                message: format!("scripted failure for {}", key),
            });
        }

        Ok(StoryDraft {
            title: format!("{} story #{}", prompt.subject.display_name(), n),
            body: format!(
                "Once upon a time, a {} looked up at the sky during {}.",
                prompt.subject.display_name(),
                prompt.context.event_type.describe()
            ),
            educational_facts: vec!["The Sun is a star.".to_string()],
        })
    }

    fn model_id(&self) -> &str {
        "mock-story"
    }
}

/// Chat provider returning a fixed reply, or failing on demand.
#[derive(Debug)]
pub struct MockChatProvider {
    reply: String,
    fail: AtomicBool,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl MockChatProvider {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        let provider = Self::replying("");
        provider.set_failing(true);
        provider
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages sent on the most recent call.
    pub fn last_messages(&self) -> Vec<ChatMessage> {
        lock(&self.last_messages).clone()
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_messages) = messages.to_vec();

        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Timeout {
                provider: "mock".to_string(),
                timeout_ms: 10_000,
            });
        }
        Ok(self.reply.clone())
    }
}

/// Space-weather provider that is always down.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableSpaceWeather;

#[async_trait]
impl SpaceWeatherProvider for UnreachableSpaceWeather {
    async fn current_conditions(&self) -> Result<SpaceWeatherContext, ProviderError> {
        Err(ProviderError::RequestFailed {
            provider: "noaa".to_string(),
            status: 503,
            message: "feed unavailable".to_string(),
        })
    }
}

// ============================================================================
// MOCK STORAGE
// ============================================================================

/// In-memory store that can be told to fail every call.
#[derive(Debug, Default)]
pub struct FlakyStoryStore {
    inner: InMemoryStoryStore,
    down: AtomicBool,
    queries: AtomicUsize,
}

impl FlakyStoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable {
                reason: "store switched off".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StoryStore for FlakyStoryStore {
    async fn insert(&self, story: &GeneratedStory) -> Result<(), StorageError> {
        self.check()?;
        self.inner.insert(story).await
    }

    async fn query_by_subject(
        &self,
        subject: &Subject,
        age_group: Option<AgeGroup>,
        limit: usize,
    ) -> Result<Vec<GeneratedStory>, StorageError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.query_by_subject(subject, age_group, limit).await
    }

    async fn health_check(&self) -> HealthCheck {
        match self.check() {
            Ok(()) => HealthCheck::healthy("story_store"),
            Err(e) => HealthCheck::unhealthy("story_store", e.to_string()),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for SolarTales types.

    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    /// Structurally valid subject keys.
    pub fn arb_subject() -> impl Strategy<Value = Subject> {
        "[a-z][a-z0-9_-]{0,30}".prop_filter_map("valid subject", |s| Subject::parse(&s).ok())
    }

    /// Strings that must be rejected as subjects.
    pub fn arb_invalid_subject() -> impl Strategy<Value = String> {
        prop_oneof![
            Just(String::new()),
            Just("   ".to_string()),
            "[a-z]{65,80}",
            "[a-z]{1,10}[ !@#$%^&*./]{1,3}[a-z]{1,10}",
        ]
    }

    pub fn arb_age_group() -> impl Strategy<Value = Option<AgeGroup>> {
        prop_oneof![
            Just(None),
            Just(Some(AgeGroup::Ages4To6)),
            Just(Some(AgeGroup::Ages7To9)),
            Just(Some(AgeGroup::Ages10To12)),
        ]
    }

    /// Timestamps in 2024-2026.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_704_067_200i64..1_798_761_600i64).prop_map(|secs| {
            chrono::Utc
                .timestamp_opt(secs, 0)
                .single()
                .unwrap_or_else(chrono::Utc::now)
        })
    }

    pub fn arb_story() -> impl Strategy<Value = GeneratedStory> {
        (arb_subject(), arb_age_group(), arb_timestamp(), "[A-Za-z ]{1,40}").prop_map(
            |(subject, age_group, at, title)| {
                GeneratedStory::from_draft(
                    subject,
                    age_group,
                    StoryDraft {
                        title,
                        body: "body".to_string(),
                        educational_facts: vec![],
                    },
                    SpaceWeatherContext::quiet(),
                    at,
                )
            },
        )
    }

    /// Scheduler settings that pass validation.
    pub fn arb_scheduler_config() -> impl Strategy<Value = SchedulerConfig> {
        (
            any::<bool>(),
            1u32..100,
            0u64..3_600_000,
            solartales_core::config::MIN_INTERVAL_MS..7_200_000,
            1_000u64..600_000,
            -600i32..600,
        )
            .prop_map(
                |(enabled, max_per_day, min_gap_ms, interval_ms, lease_ttl_ms, day_offset_minutes)| {
                    SchedulerConfig {
                        enabled,
                        max_per_day,
                        min_gap_ms,
                        interval_ms,
                        lease_ttl_ms,
                        day_offset_minutes,
                    }
                },
            )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::TimeZone;

    /// Parse a subject known to be valid.
    pub fn subject(raw: &str) -> Subject {
        Subject::parse(raw).unwrap_or_else(|e| panic!("fixture subject {:?} invalid: {}", raw, e))
    }

    pub fn subjects(raw: &[&str]) -> Vec<Subject> {
        raw.iter().map(|s| subject(s)).collect()
    }

    /// Noon UTC on 2025-03-20, the spring equinox.
    pub fn equinox() -> Timestamp {
        chrono::Utc
            .with_ymd_and_hms(2025, 3, 20, 12, 0, 0)
            .single()
            .unwrap_or_else(chrono::Utc::now)
    }

    /// Manual clock starting at [`equinox`].
    pub fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(equinox()))
    }

    /// Scheduler with no gap and a generous quota.
    pub fn permissive_scheduler_config() -> SchedulerConfig {
        SchedulerConfig {
            min_gap_ms: 0,
            max_per_day: 1_000,
            ..SchedulerConfig::default()
        }
    }

    /// A stored story for `subject` generated at `at`.
    pub fn story(subject_key: &str, at: Timestamp) -> GeneratedStory {
        GeneratedStory::from_draft(
            subject(subject_key),
            None,
            StoryDraft {
                title: format!("A day for the {}", subject_key),
                body: "The Sun sent a gentle breeze our way.".to_string(),
                educational_facts: vec!["Auroras happen near the poles.".to_string()],
            },
            SpaceWeatherContext::quiet(),
            at,
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
