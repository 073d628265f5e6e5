//! Durable story store abstraction.
//!
//! The database is the store of record; the caches in front of it are
//! volatile accelerators. Implementations must be safe to share across tasks.

use async_trait::async_trait;
use solartales_core::{AgeGroup, GeneratedStory, HealthCheck, StorageError, Subject};
use tokio::sync::RwLock;

/// Append-only story persistence.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Persist a story record.
    async fn insert(&self, story: &GeneratedStory) -> Result<(), StorageError>;

    /// Most recent stories for a subject, newest first.
    ///
    /// With an age group, only stories tagged with that group are returned.
    async fn query_by_subject(
        &self,
        subject: &Subject,
        age_group: Option<AgeGroup>,
        limit: usize,
    ) -> Result<Vec<GeneratedStory>, StorageError>;

    /// Probe the backing store.
    async fn health_check(&self) -> HealthCheck;
}

/// Process-local store used in tests and when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryStoryStore {
    stories: RwLock<Vec<GeneratedStory>>,
}

impl InMemoryStoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.stories.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.stories.read().await.is_empty()
    }
}

#[async_trait]
impl StoryStore for InMemoryStoryStore {
    async fn insert(&self, story: &GeneratedStory) -> Result<(), StorageError> {
        let mut stories = self.stories.write().await;
        if stories.iter().any(|s| s.id == story.id) {
            return Err(StorageError::InsertFailed {
                story_id: story.id.clone(),
                reason: "duplicate id".to_string(),
            });
        }
        stories.push(story.clone());
        Ok(())
    }

    async fn query_by_subject(
        &self,
        subject: &Subject,
        age_group: Option<AgeGroup>,
        limit: usize,
    ) -> Result<Vec<GeneratedStory>, StorageError> {
        let stories = self.stories.read().await;
        let mut matching: Vec<GeneratedStory> = stories
            .iter()
            .filter(|s| &s.subject == subject)
            .filter(|s| age_group.is_none() || s.age_group == age_group)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn health_check(&self) -> HealthCheck {
        HealthCheck::healthy("story_store")
            .with_metadata("backend", serde_json::Value::from("memory"))
    }
}
