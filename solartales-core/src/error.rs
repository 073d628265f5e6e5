//! Error types for SolarTales operations

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the scheduler refused to start a generation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ThrottleReason {
    /// Background generation is switched off.
    Disabled,
    /// Another cycle holds an unexpired lease.
    InFlight,
    /// The daily quota has been used up.
    QuotaExhausted,
    /// The minimum gap since the last cycle has not elapsed.
    MinGap,
}

impl fmt::Display for ThrottleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ThrottleReason::Disabled => "generation disabled",
            ThrottleReason::InFlight => "a generation cycle is already running",
            ThrottleReason::QuotaExhausted => "daily generation quota exhausted",
            ThrottleReason::MinGap => "minimum gap since last generation not elapsed",
        };
        f.write_str(text)
    }
}

/// External collaborator errors (LLM, space-weather feed).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("No {provider} provider configured")]
    NotConfigured { provider: String },

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },
}

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Insert failed for story {story_id}: {reason}")]
    InsertFailed { story_id: String, reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid subject {subject:?}: {reason}")]
    InvalidSubject { subject: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all SolarTales errors.
#[derive(Debug, Clone, Error)]
pub enum StoryError {
    #[error("Generation throttled: {0}")]
    Throttled(ThrottleReason),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },
}

impl StoryError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, StoryError::Throttled(_))
    }
}

impl From<ThrottleReason> for StoryError {
    fn from(reason: ThrottleReason) -> Self {
        StoryError::Throttled(reason)
    }
}

/// Result type alias for SolarTales operations.
pub type StoryResult<T> = Result<T, StoryError>;

// =============================================================================
// TESTS
// =============================================================================
