//! Plain story prompt template and output parsing.

use serde::Deserialize;
use solartales_core::{AgeGroup, ProviderError, SpaceWeatherContext, StoryDraft, Subject};

use crate::{ChatMessage, ChatRole, GenerationConstraints};

const SYSTEM_PROMPT: &str = "You write short, accurate, gentle stories that teach children about space weather. \
Always answer with a single JSON object of the form \
{\"title\": string, \"story\": string, \"facts\": [string]} and nothing else.";

/// Everything needed to ask for one story.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryPrompt {
    pub subject: Subject,
    pub age_group: Option<AgeGroup>,
    pub context: SpaceWeatherContext,
}

impl StoryPrompt {
    pub fn new(
        subject: Subject,
        age_group: Option<AgeGroup>,
        context: SpaceWeatherContext,
    ) -> Self {
        Self {
            subject,
            age_group,
            context,
        }
    }

    /// Render the prompt as chat messages.
    pub fn to_messages(&self, constraints: &GenerationConstraints) -> Vec<ChatMessage> {
        let audience = self
            .age_group
            .or(constraints.age_group)
            .map(|age| age.reading_level())
            .unwrap_or("children aged 6 to 10");

        let impacts = if self.context.impacts.is_empty() {
            "none reported".to_string()
        } else {
            self.context.impacts.join("; ")
        };

        let user = format!(
            "Write a story narrated by a {narrator} about {event} of {intensity} intensity.\n\
             Current conditions: {description}\n\
             Effects on Earth: {impacts}\n\
             Write for {audience}. Keep it under {max_words} words and include 2 to 4 short facts.",
            narrator = self.subject.display_name(),
            event = self.context.event_type.describe(),
            intensity = self.context.intensity.as_str(),
            description = self.context.description,
            impacts = impacts,
            audience = audience,
            max_words = constraints.max_words,
        );

        vec![
            ChatMessage::new(ChatRole::System, SYSTEM_PROMPT),
            ChatMessage::new(ChatRole::User, user),
        ]
    }
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    title: String,
    #[serde(alias = "body", alias = "content")]
    story: String,
    #[serde(default, alias = "educational_facts", alias = "educationalFacts")]
    facts: Vec<String>,
}

/// Parse model output into a draft.
///
/// JSON (optionally inside a code fence) is preferred; plain text falls back
/// to "first line is the title, the rest is the body".
pub fn parse_story_draft(provider: &str, text: &str) -> Result<StoryDraft, ProviderError> {
    let trimmed = strip_code_fence(text.trim());

    if let Ok(raw) = serde_json::from_str::<RawDraft>(trimmed) {
        return finish(provider, raw.title, raw.story, raw.facts);
    }

    let mut lines = trimmed.lines();
    let title = lines
        .next()
        .map(|line| line.trim().trim_start_matches('#').trim().to_string())
        .unwrap_or_default();
    let body = lines.collect::<Vec<_>>().join("\n");
    finish(provider, title, body, Vec::new())
}

fn finish(
    provider: &str,
    title: String,
    body: String,
    facts: Vec<String>,
) -> Result<StoryDraft, ProviderError> {
    let title = title.trim().to_string();
    let body = body.trim().to_string();
    if title.is_empty() || body.is_empty() {
        return Err(ProviderError::InvalidResponse {
            provider: provider.to_string(),
            reason: "story output missing title or body".to_string(),
        });
    }
    Ok(StoryDraft {
        title,
        body,
        educational_facts: facts
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect(),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt() -> StoryPrompt {
        StoryPrompt::new(
            Subject::parse("aurora_hunter").unwrap(),
            Some(AgeGroup::Ages4To6),
            SpaceWeatherContext::quiet(),
        )
    }

    #[test]
    fn test_messages_mention_narrator_and_audience() {
        let messages = prompt().to_messages(&GenerationConstraints::default());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[1].content.contains("aurora hunter"));
        assert!(messages[1].content.contains("aged 4 to 6"));
        assert!(messages[1].content.contains("350 words"));
    }

    #[test]
    fn test_parse_json_output() {
        let text = r#"{"title": "Night Lights", "story": "The sky glowed.", "facts": ["Auroras are light", " "]}"#;
        let draft = parse_story_draft("test", text).unwrap();
        assert_eq!(draft.title, "Night Lights");
        assert_eq!(draft.body, "The sky glowed.");
        assert_eq!(draft.educational_facts, vec!["Auroras are light".to_string()]);
    }

    #[test]
    fn test_parse_fenced_json_output() {
        let text = "```json\n{\"title\": \"A\", \"body\": \"B\"}\n```";
        let draft = parse_story_draft("test", text).unwrap();
        assert_eq!(draft.title, "A");
        assert_eq!(draft.body, "B");
        assert!(draft.educational_facts.is_empty());
    }

    #[test]
    fn test_parse_plain_text_output() {
        let draft = parse_story_draft("test", "# The Flare\nIt was bright.\nVery bright.").unwrap();
        assert_eq!(draft.title, "The Flare");
        assert_eq!(draft.body, "It was bright.\nVery bright.");
    }

    #[test]
    fn test_parse_rejects_empty_body() {
        assert!(matches!(
            parse_story_draft("test", "Only a title"),
            Err(ProviderError::InvalidResponse { .. })
        ));
        assert!(parse_story_draft("test", "").is_err());
    }
}
