//! OpenAI-compatible HTTP client with rate limiting

use super::types::ApiError;
use crate::providers::{invalid_response, rate_limited, request_failed, transport_error};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use solartales_core::ProviderError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// OpenRouter speaks the OpenAI chat-completions protocol.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

const PROVIDER: &str = "openai-compatible";

/// Chat-completions client with rate limiting.
pub struct OpenAIClient {
    client: Client,
    api_key: SecretString,
    base_url: String,
    rate_limiter: Arc<Semaphore>,
    last_request: Arc<AtomicU64>,
    min_request_interval_ms: u64,
    start_time: Instant,
    timeout_ms: u64,
}

impl OpenAIClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_key` - bearer token for the endpoint
    /// * `base_url` - API root, e.g. `https://openrouter.ai/api/v1`
    /// * `requests_per_minute` - Maximum requests per minute
    /// * `timeout` - Per-request timeout
    pub fn new(
        api_key: SecretString,
        base_url: impl Into<String>,
        requests_per_minute: u32,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let rpm = requests_per_minute.max(1);
        let permits = rpm as usize;
        let min_interval_ms = (60_000 / rpm as u64).max(10);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                request_failed(PROVIDER, 0, format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(Semaphore::new(permits)),
            last_request: Arc::new(AtomicU64::new(0)),
            min_request_interval_ms: min_interval_ms,
            start_time: Instant::now(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make an API request with automatic rate limiting.
    pub async fn request<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Req,
    ) -> Result<Res, ProviderError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| request_failed(PROVIDER, 0, format!("Rate limiter error: {}", e)))?;

        // Enforce minimum interval between requests
        let now_ms = self.start_time.elapsed().as_millis() as u64;
        let last_ms = self.last_request.load(Ordering::Relaxed);
        let elapsed = now_ms.saturating_sub(last_ms);

        if last_ms > 0 && elapsed < self.min_request_interval_ms {
            let wait_ms = self.min_request_interval_ms - elapsed;
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }

        self.last_request
            .store(self.start_time.elapsed().as_millis() as u64, Ordering::Relaxed);

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout_ms, e))?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);

        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            let error_msg = match serde_json::from_str::<ApiError>(&error_text) {
                Ok(api_error) => api_error.error.message,
                Err(_) => error_text,
            };

            Err(match status {
                StatusCode::TOO_MANY_REQUESTS => rate_limited(PROVIDER, retry_after_ms),
                _ => request_failed(PROVIDER, status.as_u16(), error_msg),
            })
        }
    }
}

fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| *seconds >= 0.0)
        .map(|seconds| (seconds * 1000.0) as u64)
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue};

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("2.5"));
        assert_eq!(parse_retry_after_ms(&headers), Some(2500));
    }

    #[test]
    fn test_parse_retry_after_missing_or_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after_ms(&headers), None);
        headers.insert("retry-after", HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after_ms(&headers), None);
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = OpenAIClient::new(
            SecretString::from("sk-secret".to_string()),
            "https://example.test/v1/",
            60,
            Duration::from_secs(5),
        )
        .unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("sk-secret"));
        assert_eq!(client.base_url(), "https://example.test/v1");
    }
}
