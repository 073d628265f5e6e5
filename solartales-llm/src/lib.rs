//! SolarTales LLM - Provider Traits
//!
//! Narrow contracts for the external collaborators the story service talks to:
//! a story-writing model, a chat model and a space-weather feed. Concrete
//! HTTP clients live in [`providers`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solartales_core::{AgeGroup, ProviderError, SpaceWeatherContext, StoryDraft};

pub mod prompt;
pub mod providers;

pub use prompt::{parse_story_draft, StoryPrompt};
pub use providers::{NoaaSpaceWeatherProvider, OpenAIClient, OpenAIStoryProvider};

// ============================================================================
// STORY PROVIDER TRAIT
// ============================================================================

/// Limits passed along with a story prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConstraints {
    /// Upper bound on story length.
    pub max_words: u32,
    /// Reading level to target, if any.
    pub age_group: Option<AgeGroup>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_tokens: u32,
}

impl Default for GenerationConstraints {
    fn default() -> Self {
        Self {
            max_words: 350,
            age_group: None,
            temperature: 0.8,
            max_tokens: 900,
        }
    }
}

/// Story-writing model.
///
/// # Example
/// ```ignore
/// let draft = provider
///     .generate_story(&prompt, &GenerationConstraints::default())
///     .await?;
/// println!("{}", draft.title);
/// ```
#[async_trait]
pub trait StoryProvider: Send + Sync {
    /// Write one story for the prompt.
    ///
    /// # Returns
    /// * `Ok(StoryDraft)` - title, body and facts
    /// * `Err(ProviderError)` - non-2xx response, timeout or unparseable output
    async fn generate_story(
        &self,
        prompt: &StoryPrompt,
        constraints: &GenerationConstraints,
    ) -> Result<StoryDraft, ProviderError>;

    /// Model identifier, for logs and metrics.
    fn model_id(&self) -> &str;
}

// ============================================================================
// CHAT PROVIDER TRAIT
// ============================================================================

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One turn of a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Conversational model backing the chat assistant.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Reply to the conversation so far.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

// ============================================================================
// SPACE WEATHER PROVIDER TRAIT
// ============================================================================

/// Read-only source of current space-weather conditions.
#[async_trait]
pub trait SpaceWeatherProvider: Send + Sync {
    async fn current_conditions(&self) -> Result<SpaceWeatherContext, ProviderError>;
}

/// Provider that always reports the same conditions.
#[derive(Debug, Clone)]
pub struct StaticSpaceWeather {
    context: SpaceWeatherContext,
}

impl StaticSpaceWeather {
    pub fn new(context: SpaceWeatherContext) -> Self {
        Self { context }
    }

    pub fn quiet() -> Self {
        Self::new(SpaceWeatherContext::quiet())
    }
}

#[async_trait]
impl SpaceWeatherProvider for StaticSpaceWeather {
    async fn current_conditions(&self) -> Result<SpaceWeatherContext, ProviderError> {
        Ok(self.context.clone())
    }
}

// ============================================================================
// UNCONFIGURED PROVIDER
// ============================================================================

/// Stand-in used when no model API key is set. Every call fails with
/// [`ProviderError::NotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredProvider;

#[async_trait]
impl StoryProvider for UnconfiguredProvider {
    async fn generate_story(
        &self,
        _prompt: &StoryPrompt,
        _constraints: &GenerationConstraints,
    ) -> Result<StoryDraft, ProviderError> {
        Err(ProviderError::NotConfigured {
            provider: "story".to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "unconfigured"
    }
}

#[async_trait]
impl ChatProvider for UnconfiguredProvider {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
        Err(ProviderError::NotConfigured {
            provider: "chat".to_string(),
        })
    }
}
