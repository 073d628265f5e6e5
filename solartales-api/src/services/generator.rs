//! Background Story Generator
//!
//! One call to [`StoryGenerator::run_cycle`] is one generation cycle:
//!
//! 1. Take the scheduler lease (or report why not).
//! 2. Fetch current space weather once; on failure use quiet conditions.
//! 3. Ask the story model for every subject concurrently, each call bounded
//!    by its own timeout. A failing subject does not affect the others.
//! 4. Push each new story into the pre-generated cache, then persist it.
//!    A persistence failure is logged and otherwise ignored.
//! 5. Release the lease, counting the cycle only if some subject succeeded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use solartales_core::{
    CacheKey, Clock, GeneratedStory, ProviderError, SpaceWeatherContext, StoryError, Subject,
    ThrottleReason, Timestamp,
};
use solartales_llm::{GenerationConstraints, SpaceWeatherProvider, StoryPrompt, StoryProvider};
use solartales_storage::{ReadThroughStoryCache, StoryCacheStore, StoryStore};
use uuid::Uuid;

use crate::services::scheduler::GenerationScheduler;
use crate::telemetry::metrics;

/// How a completed cycle went overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    FullSuccess,
    PartialSuccess,
    FullFailure,
}

impl CycleStatus {
    fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (0, _) => CycleStatus::FullFailure,
            (_, 0) => CycleStatus::FullSuccess,
            _ => CycleStatus::PartialSuccess,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::FullSuccess => "full_success",
            CycleStatus::PartialSuccess => "partial_success",
            CycleStatus::FullFailure => "full_failure",
        }
    }
}

/// A subject whose generation failed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SubjectFailure {
    pub subject: Subject,
    pub error: String,
}

/// Summary of a cycle that ran.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CycleReport {
    pub lease_id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub started_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub finished_at: Timestamp,
    pub succeeded: Vec<Subject>,
    pub failed: Vec<SubjectFailure>,
    pub status: CycleStatus,
    pub context: SpaceWeatherContext,
}

/// Result of asking for a cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// The scheduler refused; nothing changed.
    Throttled(ThrottleReason),
    /// The cycle ran.
    Completed(CycleReport),
}

impl CycleOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            CycleOutcome::Throttled(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Throttled(_) => "throttled",
            CycleOutcome::Completed(report) => report.status.as_str(),
        }
    }
}

/// Everything one cycle touches.
pub struct StoryGenerator {
    scheduler: Arc<GenerationScheduler>,
    cache: Arc<StoryCacheStore>,
    store: Arc<dyn StoryStore>,
    listing: Option<Arc<ReadThroughStoryCache>>,
    story_provider: Arc<dyn StoryProvider>,
    weather: Arc<dyn SpaceWeatherProvider>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    constraints: GenerationConstraints,
}

impl StoryGenerator {
    pub fn new(
        scheduler: Arc<GenerationScheduler>,
        cache: Arc<StoryCacheStore>,
        store: Arc<dyn StoryStore>,
        story_provider: Arc<dyn StoryProvider>,
        weather: Arc<dyn SpaceWeatherProvider>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            scheduler,
            cache,
            store,
            listing: None,
            story_provider,
            weather,
            clock,
            timeout,
            constraints: GenerationConstraints::default(),
        }
    }

    /// Also drop the recent-stories listing for a subject once it has new content.
    pub fn with_listing_cache(mut self, listing: Arc<ReadThroughStoryCache>) -> Self {
        self.listing = Some(listing);
        self
    }

    pub fn with_constraints(mut self, constraints: GenerationConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn scheduler(&self) -> &Arc<GenerationScheduler> {
        &self.scheduler
    }

    /// Run one generation cycle over `subjects`.
    #[tracing::instrument(skip_all, fields(subjects = subjects.len()))]
    pub async fn run_cycle(&self, subjects: &[Subject]) -> CycleOutcome {
        let handle = match self.scheduler.begin_cycle() {
            Ok(handle) => handle,
            Err(StoryError::Throttled(reason)) => {
                tracing::debug!(reason = %reason, "Generation cycle throttled");
                if let Some(metrics) = metrics() {
                    metrics.record_cycle("throttled");
                }
                return CycleOutcome::Throttled(reason);
            }
            // begin_cycle only ever refuses with a throttle reason.
            Err(other) => {
                tracing::error!(error = %other, "Unexpected scheduler error");
                return CycleOutcome::Throttled(ThrottleReason::InFlight);
            }
        };

        let lease_id = handle.lease().id;
        let started_at = self.clock.now();
        let context = self.current_context().await;

        tracing::info!(
            lease_id = %lease_id,
            event_type = context.event_type.as_str(),
            intensity = context.intensity.as_str(),
            "Generation cycle running"
        );

        let attempts = join_all(
            subjects
                .iter()
                .map(|subject| self.generate_for_subject(subject, &context)),
        )
        .await;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (subject, result) in subjects.iter().zip(attempts) {
            match result {
                Ok(story) => {
                    self.cache.push(CacheKey::subject(subject.clone()), story.clone());
                    if let Some(listing) = &self.listing {
                        listing.invalidate(&CacheKey::subject(subject.clone()));
                    }
                    self.persist(&story).await;
                    succeeded.push(subject.clone());
                }
                Err(e) => {
                    tracing::warn!(subject = %subject, error = %e, "Story generation failed");
                    failed.push(SubjectFailure {
                        subject: subject.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.scheduler.end_cycle(handle, !succeeded.is_empty());

        let status = CycleStatus::from_counts(succeeded.len(), failed.len());
        let stats = self.cache.stats();
        if let Some(metrics) = metrics() {
            metrics.record_cycle(status.as_str());
            metrics.set_cached_stories(stats.stories);
        }

        tracing::info!(
            lease_id = %lease_id,
            succeeded = succeeded.len(),
            failed = failed.len(),
            status = status.as_str(),
            "Generation cycle finished"
        );

        CycleOutcome::Completed(CycleReport {
            lease_id,
            started_at,
            finished_at: self.clock.now(),
            succeeded,
            failed,
            status,
            context,
        })
    }

    async fn current_context(&self) -> SpaceWeatherContext {
        match self.weather.current_conditions().await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "Space weather unavailable, using quiet conditions");
                SpaceWeatherContext::quiet()
            }
        }
    }

    async fn generate_for_subject(
        &self,
        subject: &Subject,
        context: &SpaceWeatherContext,
    ) -> Result<GeneratedStory, ProviderError> {
        let prompt = StoryPrompt::new(subject.clone(), self.constraints.age_group, context.clone());
        let start = Instant::now();

        let result = match tokio::time::timeout(
            self.timeout,
            self.story_provider.generate_story(&prompt, &self.constraints),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: self.story_provider.model_id().to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        if let Some(metrics) = metrics() {
            metrics.record_generation(
                subject.as_str(),
                result.is_ok(),
                start.elapsed().as_secs_f64(),
            );
        }

        let draft = result?;
        Ok(GeneratedStory::from_draft(
            subject.clone(),
            self.constraints.age_group,
            draft,
            context.clone(),
            self.clock.now(),
        ))
    }

    async fn persist(&self, story: &GeneratedStory) {
        let result = self.store.insert(story).await;
        if let Some(metrics) = metrics() {
            metrics.record_store_write(result.is_ok());
        }
        if let Err(e) = result {
            tracing::warn!(story_id = %story.id, error = %e, "Failed to persist story");
        }
    }
}

impl std::fmt::Debug for StoryGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryGenerator")
            .field("model", &self.story_provider.model_id())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
