//! Story and chat providers over the chat-completions client

use std::sync::Arc;

use super::client::OpenAIClient;
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::providers::invalid_response;
use crate::{
    parse_story_draft, ChatMessage, ChatProvider, GenerationConstraints, StoryPrompt,
    StoryProvider,
};
use async_trait::async_trait;
use solartales_core::{ProviderError, StoryDraft};
use tracing::debug;

/// Story and chat provider backed by one chat-completions model.
pub struct OpenAIStoryProvider {
    client: Arc<OpenAIClient>,
    model: String,
    chat_max_tokens: u32,
}

impl OpenAIStoryProvider {
    /// # Arguments
    /// * `client` - shared HTTP client
    /// * `model` - model name (e.g. "openai/gpt-4o-mini")
    pub fn new(client: Arc<OpenAIClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            chat_max_tokens: 400,
        }
    }

    pub fn with_chat_max_tokens(mut self, max_tokens: u32) -> Self {
        self.chat_max_tokens = max_tokens;
        self
    }

    async fn complete(
        &self,
        messages: Vec<Message>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, ProviderError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: Some(max_tokens),
            temperature: Some(temperature),
        };

        let response: CompletionResponse = self.client.request("chat/completions", request).await?;

        if let Some(usage) = &response.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                total_tokens = usage.total_tokens,
                "Completion finished"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| invalid_response(&self.model, "No content in response"))
    }
}

fn to_wire(messages: &[ChatMessage]) -> Vec<Message> {
    messages
        .iter()
        .map(|m| Message {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect()
}

#[async_trait]
impl StoryProvider for OpenAIStoryProvider {
    async fn generate_story(
        &self,
        prompt: &StoryPrompt,
        constraints: &GenerationConstraints,
    ) -> Result<StoryDraft, ProviderError> {
        let messages = to_wire(&prompt.to_messages(constraints));
        let text = self
            .complete(messages, constraints.max_tokens, constraints.temperature)
            .await?;
        parse_story_draft(&self.model, &text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatProvider for OpenAIStoryProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.complete(to_wire(messages), self.chat_max_tokens, 0.7).await
    }
}

impl std::fmt::Debug for OpenAIStoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIStoryProvider")
            .field("model", &self.model)
            .field("client", &self.client)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatRole;

    #[test]
    fn test_to_wire_maps_roles() {
        let wire = to_wire(&[
            ChatMessage::new(ChatRole::System, "be kind"),
            ChatMessage::new(ChatRole::User, "what is a flare?"),
        ]);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[1].role, "user");
        assert_eq!(wire[1].content, "what is a flare?");
    }
}
