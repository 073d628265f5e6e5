//! Axum Middleware for HTTP Request Tracing and Metrics
//!
//! Provides automatic instrumentation of all HTTP requests with:
//! - A tracing span parented on the incoming `traceparent` header
//! - Prometheus metrics collection
//! - Request completion logging

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use once_cell::sync::Lazy;
use opentelemetry::{global, Context};
use opentelemetry_http::HeaderExtractor;
use regex::Regex;
use tracing::{info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::metrics::metrics;

static NUMERIC_SEGMENT: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"/\d+(/|$)").ok());

/// Extract trace context from incoming request headers.
fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Label for unmatched paths. Numeric segments are collapsed so that
/// scanners cannot blow up label cardinality.
fn normalize_path(path: &str) -> String {
    match NUMERIC_SEGMENT.as_ref() {
        Some(pattern) => pattern.replace_all(path, "/{id}$1").into_owned(),
        None => path.to_string(),
    }
}

/// Observability middleware for Axum.
///
/// Wraps every request with a span, records Prometheus metrics and logs
/// the completed request.
pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| normalize_path(&path));

    let span = info_span!(
        "http_request",
        http.method = %method,
        http.target = %path,
        http.route = %route,
        http.status_code = tracing::field::Empty,
        otel.kind = "server",
    );
    // Result type differs across tracing-opentelemetry releases; a failed
    // parent link only loses the remote parent.
    let _ = span.set_parent(extract_trace_context(request.headers()));

    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    let duration = start.elapsed();
    span.record("http.status_code", status.as_u16());

    if let Some(metrics) = metrics() {
        metrics.record_http_request(
            method.as_str(),
            &route,
            status.as_u16(),
            duration.as_secs_f64(),
        );
    }

    if status.is_server_error() {
        tracing::warn!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "Request failed"
        );
    } else {
        tracing::info!(
            method = %method,
            path = %path,
            status = status.as_u16(),
            duration_ms = duration.as_millis() as u64,
            "Request completed"
        );
    }

    response
}
