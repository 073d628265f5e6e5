//! API Configuration Module
//!
//! Configuration for CORS, rate limiting, story generation and the external
//! providers. Everything is loaded from `SOLARTALES_*` environment variables
//! with defaults suitable for development.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use solartales_core::{SchedulerConfig, Subject};

use crate::constants::{
    DEFAULT_CHAT_RATE_LIMIT_MAX, DEFAULT_CHAT_RATE_LIMIT_WINDOW_SECS,
    DEFAULT_GENERATION_TIMEOUT_SECS, DEFAULT_LISTING_CACHE_TTL_SECS, DEFAULT_SUBJECTS,
};

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

fn env_secret(key: &str) -> Option<SecretString> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(SecretString::from)
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for CORS and rate limiting.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // API-wide Rate Limiting
    // ========================================================================
    /// Whether the per-IP limiter on `/api` routes is enabled.
    pub rate_limit_enabled: bool,

    /// Requests per minute per IP.
    pub rate_limit_per_minute: u32,

    /// Burst capacity above the steady rate.
    pub rate_limit_burst: u32,

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    /// Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,

    // ========================================================================
    // Chat Rate Limiting (fixed window)
    // ========================================================================
    /// Window length for the chat limiter.
    pub chat_rate_limit_window: Duration,

    /// Requests allowed per client per window.
    pub chat_rate_limit_max: u32,

    /// How often expired limiter entries are swept.
    pub rate_limit_sweep_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,
            rate_limit_enabled: true,
            rate_limit_per_minute: 120,
            rate_limit_burst: 20,
            trust_proxy_headers: false,
            chat_rate_limit_window: Duration::from_secs(DEFAULT_CHAT_RATE_LIMIT_WINDOW_SECS),
            chat_rate_limit_max: DEFAULT_CHAT_RATE_LIMIT_MAX,
            rate_limit_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SOLARTALES_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `SOLARTALES_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `SOLARTALES_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `SOLARTALES_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `SOLARTALES_RATE_LIMIT_PER_MINUTE`: Requests per minute per IP (default: 120)
    /// - `SOLARTALES_RATE_LIMIT_BURST`: Burst capacity (default: 20)
    /// - `SOLARTALES_TRUST_PROXY_HEADERS`: "true" behind a trusted reverse proxy (default: false)
    /// - `SOLARTALES_CHAT_RATE_LIMIT_WINDOW_SECS`: Chat window (default: 60)
    /// - `SOLARTALES_CHAT_RATE_LIMIT_MAX`: Chat requests per window (default: 10)
    /// - `SOLARTALES_RATE_LIMIT_SWEEP_SECS`: Sweep period (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("SOLARTALES_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            cors_origins,
            cors_allow_credentials: env_bool(
                "SOLARTALES_CORS_ALLOW_CREDENTIALS",
                defaults.cors_allow_credentials,
            ),
            cors_max_age_secs: env_parse(
                "SOLARTALES_CORS_MAX_AGE_SECS",
                defaults.cors_max_age_secs,
            ),
            rate_limit_enabled: env_bool(
                "SOLARTALES_RATE_LIMIT_ENABLED",
                defaults.rate_limit_enabled,
            ),
            rate_limit_per_minute: env_parse(
                "SOLARTALES_RATE_LIMIT_PER_MINUTE",
                defaults.rate_limit_per_minute,
            ),
            rate_limit_burst: env_parse("SOLARTALES_RATE_LIMIT_BURST", defaults.rate_limit_burst),
            trust_proxy_headers: env_bool(
                "SOLARTALES_TRUST_PROXY_HEADERS",
                defaults.trust_proxy_headers,
            ),
            chat_rate_limit_window: Duration::from_secs(env_parse(
                "SOLARTALES_CHAT_RATE_LIMIT_WINDOW_SECS",
                DEFAULT_CHAT_RATE_LIMIT_WINDOW_SECS,
            )),
            chat_rate_limit_max: env_parse(
                "SOLARTALES_CHAT_RATE_LIMIT_MAX",
                defaults.chat_rate_limit_max,
            ),
            rate_limit_sweep_interval: Duration::from_secs(
                env_parse("SOLARTALES_RATE_LIMIT_SWEEP_SECS", 60u64).max(1),
            ),
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // Wildcard subdomains: *.solartales.app
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{}", pattern))
                        || origin_domain == pattern;
                }
            }
            false
        })
    }
}

// ============================================================================
// STORY SERVICE CONFIGURATION
// ============================================================================

/// Story generation and caching configuration.
#[derive(Debug)]
pub struct StoryServiceConfig {
    /// Subjects refreshed by every generation cycle.
    pub subjects: Vec<Subject>,
    /// Initial scheduler settings; adjustable at runtime.
    pub scheduler: SchedulerConfig,
    /// Bound on one LLM call inside a cycle.
    pub generation_timeout: Duration,
    /// TTL of the recent-stories listing cache.
    pub listing_cache_ttl: Duration,
    /// Stories kept per cache key.
    pub max_stories_per_key: usize,
    /// Token required for scheduler config changes. `None` leaves them open.
    pub admin_token: Option<SecretString>,
    /// Generate once at startup when the cache is empty.
    pub warm_on_start: bool,
}

impl Default for StoryServiceConfig {
    fn default() -> Self {
        Self {
            subjects: default_subjects(),
            scheduler: SchedulerConfig::default(),
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            listing_cache_ttl: Duration::from_secs(DEFAULT_LISTING_CACHE_TTL_SECS),
            max_stories_per_key: solartales_storage::DEFAULT_MAX_STORIES_PER_KEY,
            admin_token: None,
            warm_on_start: true,
        }
    }
}

impl StoryServiceConfig {
    /// Create StoryServiceConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SOLARTALES_SUBJECTS`: Comma-separated subject keys (invalid keys are skipped)
    /// - `SOLARTALES_GENERATION_ENABLED`: "true" or "false" (default: true)
    /// - `SOLARTALES_GENERATION_MAX_PER_DAY`: Daily cycle quota (default: 24)
    /// - `SOLARTALES_GENERATION_MIN_GAP_MS`: Minimum gap between cycles
    /// - `SOLARTALES_GENERATION_INTERVAL_MS`: Timer period
    /// - `SOLARTALES_GENERATION_LEASE_TTL_MS`: Lease expiry for a running cycle
    /// - `SOLARTALES_QUOTA_DAY_OFFSET_MINUTES`: Quota day boundary offset from UTC (default: 0)
    /// - `SOLARTALES_GENERATION_TIMEOUT_SECS`: Per-subject LLM timeout (default: 10)
    /// - `SOLARTALES_LISTING_CACHE_TTL_SECS`: Listing cache TTL (default: 300)
    /// - `SOLARTALES_MAX_STORIES_PER_KEY`: Cache length cap (default: 20)
    /// - `SOLARTALES_ADMIN_TOKEN`: Token for config changes
    /// - `SOLARTALES_WARM_ON_START`: Generate at startup when empty (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let subjects = std::env::var("SOLARTALES_SUBJECTS")
            .ok()
            .map(|raw| parse_subjects(&raw))
            .filter(|subjects| !subjects.is_empty())
            .unwrap_or(defaults.subjects);

        let base = defaults.scheduler;
        let scheduler = SchedulerConfig {
            enabled: env_bool("SOLARTALES_GENERATION_ENABLED", base.enabled),
            max_per_day: env_parse("SOLARTALES_GENERATION_MAX_PER_DAY", base.max_per_day),
            min_gap_ms: env_parse("SOLARTALES_GENERATION_MIN_GAP_MS", base.min_gap_ms),
            interval_ms: env_parse("SOLARTALES_GENERATION_INTERVAL_MS", base.interval_ms),
            lease_ttl_ms: env_parse("SOLARTALES_GENERATION_LEASE_TTL_MS", base.lease_ttl_ms),
            day_offset_minutes: env_parse(
                "SOLARTALES_QUOTA_DAY_OFFSET_MINUTES",
                base.day_offset_minutes,
            ),
        };
        let scheduler = match scheduler.validate() {
            Ok(()) => scheduler,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Invalid scheduler settings in environment, using defaults"
                );
                SchedulerConfig::default()
            }
        };

        Self {
            subjects,
            scheduler,
            generation_timeout: Duration::from_secs(
                env_parse("SOLARTALES_GENERATION_TIMEOUT_SECS", DEFAULT_GENERATION_TIMEOUT_SECS)
                    .max(1),
            ),
            listing_cache_ttl: Duration::from_secs(env_parse(
                "SOLARTALES_LISTING_CACHE_TTL_SECS",
                DEFAULT_LISTING_CACHE_TTL_SECS,
            )),
            max_stories_per_key: env_parse(
                "SOLARTALES_MAX_STORIES_PER_KEY",
                defaults.max_stories_per_key,
            )
            .max(1),
            admin_token: env_secret("SOLARTALES_ADMIN_TOKEN"),
            warm_on_start: env_bool("SOLARTALES_WARM_ON_START", defaults.warm_on_start),
        }
    }
}

/// Built-in subject list.
pub fn default_subjects() -> Vec<Subject> {
    DEFAULT_SUBJECTS
        .iter()
        .filter_map(|s| Subject::parse(s).ok())
        .collect()
}

/// Parse a comma-separated subject list, skipping invalid and duplicate keys.
pub fn parse_subjects(raw: &str) -> Vec<Subject> {
    let mut subjects: Vec<Subject> = Vec::new();
    for part in raw.split(',') {
        match Subject::parse(part) {
            Ok(subject) if !subjects.contains(&subject) => subjects.push(subject),
            Ok(_) => {}
            Err(e) => {
                if !part.trim().is_empty() {
                    tracing::warn!(error = %e, "Skipping invalid subject in configuration");
                }
            }
        }
    }
    subjects
}

// ============================================================================
// PROVIDER CONFIGURATION
// ============================================================================

/// External provider configuration.
#[derive(Debug)]
pub struct ProviderConfig {
    /// API key for the story model. Without one, generation is unavailable.
    pub llm_api_key: Option<SecretString>,
    /// OpenAI-compatible API root.
    pub llm_base_url: String,
    /// Model name.
    pub llm_model: String,
    /// Client-side request budget.
    pub llm_requests_per_minute: u32,
    /// HTTP timeout for model calls.
    pub llm_timeout: Duration,
    /// NOAA SWPC scales document.
    pub space_weather_url: String,
    /// HTTP timeout for the space-weather feed.
    pub space_weather_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            llm_api_key: None,
            llm_base_url: solartales_llm::providers::openai::DEFAULT_BASE_URL.to_string(),
            llm_model: "openai/gpt-4o-mini".to_string(),
            llm_requests_per_minute: 30,
            llm_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            space_weather_url: solartales_llm::providers::noaa::DEFAULT_SCALES_URL.to_string(),
            space_weather_timeout: Duration::from_secs(5),
        }
    }
}

impl ProviderConfig {
    /// Create ProviderConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SOLARTALES_LLM_API_KEY`: API key (falls back to `OPENROUTER_API_KEY`)
    /// - `SOLARTALES_LLM_BASE_URL`: API root (default: OpenRouter)
    /// - `SOLARTALES_LLM_MODEL`: Model name
    /// - `SOLARTALES_LLM_REQUESTS_PER_MINUTE`: Client-side budget (default: 30)
    /// - `SOLARTALES_LLM_TIMEOUT_SECS`: HTTP timeout (default: 10)
    /// - `SOLARTALES_SPACE_WEATHER_URL`: NOAA scales URL
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            llm_api_key: env_secret("SOLARTALES_LLM_API_KEY")
                .or_else(|| env_secret("OPENROUTER_API_KEY")),
            llm_base_url: std::env::var("SOLARTALES_LLM_BASE_URL")
                .unwrap_or(defaults.llm_base_url),
            llm_model: std::env::var("SOLARTALES_LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_requests_per_minute: env_parse(
                "SOLARTALES_LLM_REQUESTS_PER_MINUTE",
                defaults.llm_requests_per_minute,
            ),
            llm_timeout: Duration::from_secs(
                env_parse("SOLARTALES_LLM_TIMEOUT_SECS", DEFAULT_GENERATION_TIMEOUT_SECS).max(1),
            ),
            space_weather_url: std::env::var("SOLARTALES_SPACE_WEATHER_URL")
                .unwrap_or(defaults.space_weather_url),
            space_weather_timeout: defaults.space_weather_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_api_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_allow_credentials);
        assert!(!config.trust_proxy_headers);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.chat_rate_limit_max, DEFAULT_CHAT_RATE_LIMIT_MAX);
        assert_eq!(config.chat_rate_limit_window, Duration::from_secs(60));
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(!config.is_production());
        assert!(config.is_origin_allowed("http://localhost:5173"));
    }

    #[test]
    fn test_origin_allowed_production() {
        let config = ApiConfig {
            cors_origins: vec![
                "https://solartales.app".to_string(),
                "*.solartales.app".to_string(),
            ],
            ..ApiConfig::default()
        };

        assert!(config.is_production());
        assert!(config.is_origin_allowed("https://solartales.app"));
        assert!(config.is_origin_allowed("https://www.solartales.app"));
        assert!(!config.is_origin_allowed("https://evilsolartales.app"));
        assert!(!config.is_origin_allowed("https://example.com"));
    }

    #[test]
    fn test_parse_subjects_skips_invalid_and_duplicates() {
        let subjects = parse_subjects("Pilot, farmer,,pilot, bad key ,astronaut");
        let names: Vec<&str> = subjects.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["pilot", "farmer", "astronaut"]);
    }

    #[test]
    fn test_default_subjects_all_valid() {
        assert_eq!(default_subjects().len(), DEFAULT_SUBJECTS.len());
    }

    #[test]
    fn test_default_story_service_config() {
        let config = StoryServiceConfig::default();
        assert_eq!(config.generation_timeout, Duration::from_secs(10));
        assert_eq!(config.listing_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.max_stories_per_key, 20);
        assert!(config.admin_token.is_none());
    }
}
