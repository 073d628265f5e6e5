//! SolarTales API Server Entry Point
//!
//! Bootstraps configuration, wires the story service, spawns the background
//! jobs and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use solartales_api::jobs::{generation_timer_task, rate_limit_sweep_task, refresh_worker_task};
use solartales_api::services::RefreshRequest;
use solartales_api::telemetry::{init_tracer, shutdown_tracer, TelemetryConfig};
use solartales_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, DbConfig, PostgresStoryStore,
    ProviderConfig, StoryBackends, StoryServiceConfig,
};
use solartales_core::SystemClock;
use solartales_llm::{
    ChatProvider, NoaaSpaceWeatherProvider, OpenAIClient, OpenAIStoryProvider, StoryProvider,
    UnconfiguredProvider,
};
use solartales_storage::{InMemoryStoryStore, StoryStore};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry = init_tracer(&TelemetryConfig::default())?;

    let api_config = ApiConfig::from_env();
    let mut story_config = StoryServiceConfig::from_env();
    let provider_config = ProviderConfig::from_env();

    let store: Arc<dyn StoryStore> = match DbConfig::from_env() {
        Some(db_config) => {
            let store = PostgresStoryStore::from_config(&db_config)?;
            store.migrate().await?;
            tracing::info!(
                host = %db_config.host,
                db = %db_config.dbname,
                "Using Postgres story store"
            );
            Arc::new(store)
        }
        None => {
            tracing::warn!("SOLARTALES_DB_HOST not set; stories are kept in memory only");
            Arc::new(InMemoryStoryStore::new())
        }
    };

    let (story_provider, chat_provider, llm_configured): (
        Arc<dyn StoryProvider>,
        Arc<dyn ChatProvider>,
        bool,
    ) = match provider_config.llm_api_key.clone() {
        Some(api_key) => {
            let client = Arc::new(OpenAIClient::new(
                api_key,
                provider_config.llm_base_url.clone(),
                provider_config.llm_requests_per_minute,
                provider_config.llm_timeout,
            )?);
            let provider = Arc::new(OpenAIStoryProvider::new(
                client,
                provider_config.llm_model.clone(),
            ));
            tracing::info!(model = %provider_config.llm_model, "Story model configured");
            (
                provider.clone() as Arc<dyn StoryProvider>,
                provider as Arc<dyn ChatProvider>,
                true,
            )
        }
        None => {
            tracing::warn!(
                "No LLM API key configured; background generation disabled, serving placeholders"
            );
            story_config.scheduler.enabled = false;
            (
                Arc::new(UnconfiguredProvider) as Arc<dyn StoryProvider>,
                Arc::new(UnconfiguredProvider) as Arc<dyn ChatProvider>,
                false,
            )
        }
    };

    let weather = Arc::new(NoaaSpaceWeatherProvider::new(
        provider_config.space_weather_url.clone(),
        provider_config.space_weather_timeout,
    )?);

    let warm_on_start = story_config.warm_on_start;
    let sweep_interval = api_config.rate_limit_sweep_interval;
    let (state, refresh_rx) = AppState::new(
        api_config,
        story_config,
        StoryBackends {
            store,
            story_provider,
            chat_provider,
            weather,
            clock: Arc::new(SystemClock),
            llm_configured,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let subjects = state.subjects();
    let timer = tokio::spawn(generation_timer_task(
        state.generator.clone(),
        subjects.clone(),
        shutdown_rx.clone(),
    ));
    let worker = tokio::spawn(refresh_worker_task(
        state.generator.clone(),
        state.refresh.clone(),
        refresh_rx,
        subjects,
        shutdown_rx.clone(),
    ));
    let sweeper = tokio::spawn(rate_limit_sweep_task(
        state.chat_limiter.clone(),
        state.api_limiter.clone(),
        sweep_interval,
        shutdown_rx,
    ));

    if warm_on_start && state.cache.is_empty() {
        state.refresh.enqueue(RefreshRequest::AllSubjects);
        tracing::info!("Queued warm-up generation");
    }

    let app = create_api_router(state);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting SolarTales API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = timer.await {
        tracing::warn!(error = %e, "Generation timer ended abnormally");
    }
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "Refresh worker ended abnormally");
    }
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Rate limit sweep ended abnormally");
    }

    shutdown_tracer(telemetry);
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("SOLARTALES_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("SOLARTALES_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
