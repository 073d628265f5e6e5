//! Service Layer
//!
//! The story pre-generation core: rate limiting, generation scheduling,
//! the background generator, the refresh queue and the read path. None of
//! these know about HTTP; handlers in `routes` call into them.

pub mod fallback;
pub mod generator;
pub mod query;
pub mod rate_limiter;
pub mod refresh_queue;
pub mod scheduler;

pub use fallback::{FallbackStrategy, DEFAULT_LADDER};
pub use generator::{CycleOutcome, CycleReport, CycleStatus, StoryGenerator, SubjectFailure};
pub use query::{ServedStory, StoryQueryService, StoryStats};
pub use rate_limiter::{client_fingerprint, RateLimitDecision, RateLimitEntry, RateLimiter};
pub use refresh_queue::{RefreshQueue, RefreshQueueStats, RefreshRequest};
pub use scheduler::{CycleHandle, GenerationScheduler, Lease, SchedulerSnapshot};
