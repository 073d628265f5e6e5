//! Provider implementations
//!
//! HTTP clients for the story model (any OpenAI-compatible chat-completions
//! endpoint, OpenRouter by default) and the NOAA SWPC space-weather feed.

pub mod noaa;
pub mod openai;

pub use noaa::NoaaSpaceWeatherProvider;
pub use openai::{OpenAIClient, OpenAIStoryProvider};

use solartales_core::ProviderError;

pub(crate) fn request_failed(
    provider: &str,
    status: u16,
    message: impl Into<String>,
) -> ProviderError {
    ProviderError::RequestFailed {
        provider: provider.to_string(),
        status,
        message: message.into(),
    }
}

pub(crate) fn rate_limited(provider: &str, retry_after_ms: u64) -> ProviderError {
    ProviderError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    }
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> ProviderError {
    ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

/// Map a transport error, distinguishing timeouts.
pub(crate) fn transport_error(
    provider: &str,
    timeout_ms: u64,
    err: reqwest::Error,
) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            timeout_ms,
        }
    } else {
        request_failed(provider, 0, format!("HTTP request failed: {}", err))
    }
}
