//! OpenAPI Specification for the SolarTales API
//!
//! Generated with utoipa from the route annotations and schema derives.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use solartales_core::{
    AgeGroup, GeneratedStory, HealthCheck, HealthStatus, Intensity, SchedulerConfig,
    SchedulerConfigPatch, SpaceWeatherContext, SpaceWeatherEventType, StoryOrigin, Subject,
    ThrottleReason,
};

use crate::constants::ADMIN_TOKEN_HEADER;
use crate::error::{ApiError, ErrorCode};
use crate::routes::{chat, generation, health, stories};
use crate::services::{
    CycleStatus, FallbackStrategy, Lease, RefreshQueueStats, SchedulerSnapshot, ServedStory,
    StoryStats,
};

/// OpenAPI document for the SolarTales API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "SolarTales API",
        description = "Pre-generated space-weather stories for children, with a chat assistant",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    servers(
        (url = "https://solartales.app", description = "Production"),
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Stories", description = "Pre-generated story lookup and manual regeneration"),
        (name = "Generation", description = "Background generation scheduler"),
        (name = "Chat", description = "Space-weather chat assistant"),
        (name = "Health", description = "Liveness and readiness"),
        (name = "Observability", description = "Prometheus metrics"),
    ),
    paths(
        stories::get_pregenerated,
        stories::post_pregenerated,
        stories::get_recent,
        generation::get_status,
        generation::get_config,
        generation::patch_config,
        chat::chat,
        health::ping,
        health::liveness,
        health::readiness,
        crate::telemetry::metrics::metrics_handler,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        AgeGroup,
        Subject,
        GeneratedStory,
        StoryOrigin,
        SpaceWeatherContext,
        SpaceWeatherEventType,
        Intensity,
        SchedulerConfig,
        SchedulerConfigPatch,
        ThrottleReason,
        HealthCheck,
        HealthStatus,
        ServedStory,
        FallbackStrategy,
        StoryStats,
        RefreshQueueStats,
        SchedulerSnapshot,
        Lease,
        CycleStatus,
        stories::PregeneratedResponse,
        stories::RegenerateAction,
        stories::RegenerateRequest,
        stories::RegenerateResponse,
        stories::RecentStoriesResponse,
        generation::GenerationStatusResponse,
        chat::ChatRequest,
        chat::ChatResponse,
        chat::ChatTurn,
        chat::ChatTurnRole,
        health::HealthResponse,
        health::HealthDetails,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the admin token header scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ADMIN_TOKEN_HEADER))),
            );
        }
    }
}

impl ApiDoc {
    /// Serialize the document as pretty JSON.
    pub fn to_json() -> Result<String, String> {
        Self::openapi().to_pretty_json().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_paths_exist() {
        let openapi = ApiDoc::openapi();
        let paths = &openapi.paths.paths;

        assert!(paths.contains_key("/api/stories/pregenerated"));
        assert!(paths.contains_key("/api/stories/recent"));
        assert!(paths.contains_key("/api/generation/status"));
        assert!(paths.contains_key("/api/generation/config"));
        assert!(paths.contains_key("/api/chat"));
        assert!(paths.contains_key("/health/ready"));
        assert!(paths.contains_key("/metrics"));
    }

    #[test]
    fn test_openapi_json_serialization() -> Result<(), String> {
        let json = ApiDoc::to_json()?;
        serde_json::from_str::<serde_json::Value>(&json)
            .map_err(|e| format!("Generated JSON invalid: {}", e))?;
        assert!(json.contains("SolarTales API"));
        assert!(json.contains("\"admin_token\""));
        Ok(())
    }

    #[test]
    fn test_timestamps_are_documented_as_date_time() -> Result<(), String> {
        let doc: serde_json::Value = serde_json::from_str(&ApiDoc::to_json()?)
            .map_err(|e| format!("Generated JSON invalid: {}", e))?;
        let schemas = &doc["components"]["schemas"];

        for (schema, field) in [
            ("GeneratedStory", "generated_at"),
            ("Lease", "acquired_at"),
            ("Lease", "expires_at"),
            ("SchedulerSnapshot", "last_generation_at"),
            ("StoryStats", "last_generation_at"),
            ("RecentStoriesResponse", "cached_at"),
        ] {
            assert_eq!(
                schemas[schema]["properties"][field]["format"], "date-time",
                "{}.{}",
                schema, field
            );
        }
        Ok(())
    }
}
