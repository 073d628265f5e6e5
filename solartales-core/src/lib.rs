//! SolarTales Core - Story Types
//!
//! Data structures shared by every SolarTales crate: stories, subjects,
//! space-weather snapshots, scheduler configuration and the error taxonomy.
//! No I/O lives here.

use chrono::{DateTime, Utc};

pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod story;
pub mod subject;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SchedulerConfig, SchedulerConfigPatch};
pub use error::{
    ProviderError, StorageError, StoryError, StoryResult, ThrottleReason, ValidationError,
};
pub use health::{HealthCheck, HealthReport, HealthStatus};
pub use story::{
    GeneratedStory, Intensity, SpaceWeatherContext, SpaceWeatherEventType, StoryDraft, StoryId,
    StoryOrigin,
};
pub use subject::{AgeGroup, CacheKey, Subject, MAX_SUBJECT_LEN};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds, as exposed on the wire.
pub type DurationMs = u64;

/// Convert a millisecond count into a chrono duration, saturating on overflow.
pub fn chrono_ms(ms: DurationMs) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}
