//! Log subscriber and span export.
//!
//! Logs are JSON lines filtered by `RUST_LOG`. Spans go to an OTLP/HTTP
//! collector when `SOLARTALES_OTLP_ENDPOINT` is set.

use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

/// Read from `SOLARTALES_*` variables by `Default`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// e.g. `http://localhost:4318/v1/traces`
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    /// Fraction of traces kept, clamped to `[0, 1]` by the sampler.
    pub trace_sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: std::env::var("SOLARTALES_OTLP_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            service_name: std::env::var("SOLARTALES_SERVICE_NAME")
                .unwrap_or_else(|_| "solartales-api".to_string()),
            service_version: std::env::var("SOLARTALES_SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            environment: std::env::var("SOLARTALES_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            trace_sample_rate: std::env::var("SOLARTALES_TRACE_SAMPLE_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        }
    }
}

impl TelemetryConfig {
    fn sampler(&self) -> Sampler {
        if self.trace_sample_rate >= 1.0 {
            Sampler::AlwaysOn
        } else if self.trace_sample_rate <= 0.0 {
            Sampler::AlwaysOff
        } else {
            Sampler::TraceIdRatioBased(self.trace_sample_rate)
        }
    }
}

/// Handle to the installed tracer provider; flushes spans on shutdown.
#[derive(Debug)]
pub struct TelemetryGuard {
    provider: SdkTracerProvider,
}

/// Install the global subscriber, W3C trace propagation and the tracer
/// provider. Call once, first thing in `main`.
pub fn init_tracer(config: &TelemetryConfig) -> ApiResult<TelemetryGuard> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes([
            KeyValue::new("service.version", config.service_version.clone()),
            KeyValue::new("deployment.environment", config.environment.clone()),
        ])
        .build();

    let builder = SdkTracerProvider::builder()
        .with_sampler(config.sampler())
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource);

    let provider = match &config.otlp_endpoint {
        Some(endpoint) => {
            let exporter = SpanExporter::builder()
                .with_http()
                .with_endpoint(endpoint)
                .build()
                .map_err(|e| {
                    ApiError::internal_error(format!("OTLP exporter for {}: {}", endpoint, e))
                })?;
            builder.with_batch_exporter(exporter).build()
        }
        // Spans are still created so log lines carry trace ids.
        None => builder.build(),
    };

    let tracer = provider.tracer("solartales-api");
    global::set_tracer_provider(provider.clone());

    let otel_layer = OpenTelemetryLayer::new(tracer);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("solartales_api=debug,solartales_storage=info,tower_http=info,info")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(otel_layer)
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Subscriber already installed: {}", e)))?;

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { provider })
}

/// Flush buffered spans.
pub fn shutdown_tracer(guard: TelemetryGuard) {
    if let Err(e) = guard.provider.shutdown() {
        tracing::warn!(error = %e, "Tracer shutdown reported an error");
    }
    tracing::info!("Telemetry flushed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default_names_service() {
        let config = TelemetryConfig::default();
        assert!(!config.service_name.is_empty());
        assert!(!config.service_version.is_empty());
    }

    #[test]
    fn test_sampler_selection() {
        let on = TelemetryConfig {
            trace_sample_rate: 1.0,
            ..Default::default()
        };
        assert!(matches!(on.sampler(), Sampler::AlwaysOn));

        let off = TelemetryConfig {
            trace_sample_rate: 0.0,
            ..Default::default()
        };
        assert!(matches!(off.sampler(), Sampler::AlwaysOff));

        let ratio = TelemetryConfig {
            trace_sample_rate: 0.25,
            ..Default::default()
        };
        assert!(matches!(ratio.sampler(), Sampler::TraceIdRatioBased(r) if r == 0.25));
    }
}
