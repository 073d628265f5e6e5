//! SolarTales API - Story Service HTTP Layer
//!
//! Serves pre-generated space-weather stories instantly and keeps them fresh
//! in the background. Reads never wait on the language model: a rate limiter
//! guards the public endpoints, a scheduler spends a daily generation budget,
//! a background generator fills the cache, and the query surface falls back
//! from fresh cache to stale cache to a fixed placeholder.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod placeholders;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

pub use config::{ApiConfig, ProviderConfig, StoryServiceConfig};
pub use db::{DbConfig, PostgresStoryStore};
pub use error::{ApiError, ApiResult, ErrorCode};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::{AppState, StoryBackends};
