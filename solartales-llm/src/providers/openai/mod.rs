//! OpenAI-compatible provider (OpenRouter by default)

pub mod client;
pub mod story;
pub mod types;

pub use client::{OpenAIClient, DEFAULT_BASE_URL};
pub use story::OpenAIStoryProvider;
