//! Prometheus Metrics Definitions
//!
//! Defines all SolarTales metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// LLM call latency buckets (seconds)
const GENERATION_LATENCY_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.0, 4.0, 6.0, 8.0, 10.0, 15.0, 30.0];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<SolarTalesMetrics>> = Lazy::new(SolarTalesMetrics::new);

/// Registered metrics, or `None` when registration failed.
pub fn metrics() -> Option<&'static SolarTalesMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all SolarTales metrics.
#[derive(Clone)]
pub struct SolarTalesMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Per-subject LLM attempts - labels: subject, status
    pub generation_attempts_total: CounterVec,

    /// Per-subject LLM latency - labels: subject
    pub generation_duration_seconds: HistogramVec,

    /// Generation cycles - labels: outcome
    pub generation_cycles_total: CounterVec,

    /// Durable store writes - labels: status
    pub story_store_writes_total: CounterVec,

    /// Rate limiter denials - labels: limiter
    pub rate_limit_rejections_total: CounterVec,

    /// Query surface resolutions - labels: strategy
    pub fallback_resolutions_total: CounterVec,

    /// Refresh queue submissions - labels: kind, status
    pub refresh_requests_total: CounterVec,

    /// Stories held in the pre-generated cache
    pub cached_stories: Gauge,
}

fn registration_failed(metric: &'static str) -> impl FnOnce(prometheus::Error) -> ApiError {
    move |e| ApiError::internal_error(format!("Failed to register {}: {}", metric, e))
}

impl SolarTalesMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "solartales_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(registration_failed("http_requests_total"))?,

            http_request_duration_seconds: register_histogram_vec!(
                "solartales_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(registration_failed("http_request_duration_seconds"))?,

            generation_attempts_total: register_counter_vec!(
                "solartales_generation_attempts_total",
                "Story generation attempts per subject",
                &["subject", "status"]
            )
            .map_err(registration_failed("generation_attempts_total"))?,

            generation_duration_seconds: register_histogram_vec!(
                "solartales_generation_duration_seconds",
                "Story generation latency in seconds",
                &["subject"],
                GENERATION_LATENCY_BUCKETS.to_vec()
            )
            .map_err(registration_failed("generation_duration_seconds"))?,

            generation_cycles_total: register_counter_vec!(
                "solartales_generation_cycles_total",
                "Generation cycles by outcome",
                &["outcome"]
            )
            .map_err(registration_failed("generation_cycles_total"))?,

            story_store_writes_total: register_counter_vec!(
                "solartales_story_store_writes_total",
                "Durable story store writes",
                &["status"]
            )
            .map_err(registration_failed("story_store_writes_total"))?,

            rate_limit_rejections_total: register_counter_vec!(
                "solartales_rate_limit_rejections_total",
                "Requests rejected by a rate limiter",
                &["limiter"]
            )
            .map_err(registration_failed("rate_limit_rejections_total"))?,

            fallback_resolutions_total: register_counter_vec!(
                "solartales_fallback_resolutions_total",
                "Story reads by the strategy that answered them",
                &["strategy"]
            )
            .map_err(registration_failed("fallback_resolutions_total"))?,

            refresh_requests_total: register_counter_vec!(
                "solartales_refresh_requests_total",
                "Background refresh requests",
                &["kind", "status"]
            )
            .map_err(registration_failed("refresh_requests_total"))?,

            cached_stories: register_gauge!(
                "solartales_cached_stories",
                "Stories currently held in the pre-generated cache"
            )
            .map_err(registration_failed("cached_stories"))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record one subject's generation attempt.
    pub fn record_generation(&self, subject: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.generation_attempts_total
            .with_label_values(&[subject, status])
            .inc();
        self.generation_duration_seconds
            .with_label_values(&[subject])
            .observe(duration_secs);
    }

    /// Record a finished or throttled cycle.
    pub fn record_cycle(&self, outcome: &str) {
        self.generation_cycles_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a durable store write.
    pub fn record_store_write(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.story_store_writes_total
            .with_label_values(&[status])
            .inc();
    }

    /// Record a rate limiter denial.
    pub fn record_rate_limit_rejection(&self, limiter: &str) {
        self.rate_limit_rejections_total
            .with_label_values(&[limiter])
            .inc();
    }

    /// Record which fallback strategy answered a read.
    pub fn record_fallback(&self, strategy: &str) {
        self.fallback_resolutions_total
            .with_label_values(&[strategy])
            .inc();
    }

    /// Record a refresh queue submission.
    pub fn record_refresh_request(&self, kind: &str, enqueued: bool) {
        let status = if enqueued { "enqueued" } else { "deduplicated" };
        self.refresh_requests_total
            .with_label_values(&[kind, status])
            .inc();
    }

    /// Set the cached story count.
    pub fn set_cached_stories(&self, count: u64) {
        self.cached_stories.set(count as f64);
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
))]
pub async fn metrics_handler() -> impl IntoResponse {
    // Touch the global so the families exist even before the first request.
    let _ = metrics();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
