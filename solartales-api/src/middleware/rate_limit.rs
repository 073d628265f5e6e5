//! Per-IP request rate limiting for `/api` routes.
//!
//! A GCRA limiter (governor) per client address, held in a DashMap. This is
//! the coarse flood guard; the chat endpoint also applies its own
//! fixed-window budget per client fingerprint.
//!
//! Entries idle long enough for their burst to refill are indistinguishable
//! from fresh ones and are dropped by [`RateLimitState::prune_idle`].

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::telemetry::metrics;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

struct ClientLimiter {
    limiter: Arc<DirectRateLimiter>,
    last_seen: Instant,
}

/// State for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<ApiConfig>,
    limiters: Arc<DashMap<IpAddr, ClientLimiter>>,
}

impl RateLimitState {
    pub fn new(config: Arc<ApiConfig>) -> Self {
        Self {
            config,
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn quota(&self) -> Quota {
        Quota::per_minute(
            NonZeroU32::new(self.config.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN),
        )
        .allow_burst(NonZeroU32::new(self.config.rate_limit_burst).unwrap_or(NonZeroU32::MIN))
    }

    fn limiter_for(&self, ip: IpAddr) -> Arc<DirectRateLimiter> {
        let mut client = self.limiters.entry(ip).or_insert_with(|| ClientLimiter {
            limiter: Arc::new(RateLimiter::direct(self.quota())),
            last_seen: Instant::now(),
        });
        client.last_seen = Instant::now();
        client.limiter.clone()
    }

    /// Time an idle client needs to get its whole burst back.
    fn refill_period(&self) -> Duration {
        let per_minute = u64::from(self.config.rate_limit_per_minute.max(1));
        let burst = u64::from(self.config.rate_limit_burst.max(1));
        Duration::from_millis(60_000 * burst / per_minute)
    }

    /// Drop clients whose limiter has fully refilled. Returns how many went.
    pub fn prune_idle(&self) -> usize {
        self.prune_idle_at(Instant::now())
    }

    fn prune_idle_at(&self, now: Instant) -> usize {
        let idle_after = self.refill_period();
        let before = self.limiters.len();
        self.limiters
            .retain(|_, client| now.saturating_duration_since(client.last_seen) < idle_after);
        before.saturating_sub(self.limiters.len())
    }

    /// Number of tracked client addresses.
    pub fn tracked_clients(&self) -> usize {
        self.limiters.len()
    }
}

/// Client address. Proxy headers are consulted only when `trust_proxy_headers`
/// is set; otherwise the socket address is the only source.
pub fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy_headers: bool,
) -> Option<IpAddr> {
    let socket_ip = connect_info.map(|ConnectInfo(addr)| addr.ip());
    if !trust_proxy_headers {
        return socket_ip;
    }

    if let Some(first) = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
    {
        if let Ok(ip) = first.trim().parse() {
            return Some(ip);
        }
    }

    if let Some(ip) = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
    {
        return Some(ip);
    }

    socket_ip
}

/// Rate limiting middleware.
///
/// Requests over budget get 429 with `Retry-After`.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.rate_limit_enabled {
        return next.run(request).await;
    }

    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        state.config.trust_proxy_headers,
    )
    .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match state.limiter_for(ip).check() {
        Ok(_) => {
            let mut response = next.run(request).await;
            let limit = state.config.rate_limit_per_minute.to_string();
            if let Ok(value) = HeaderValue::from_str(&limit) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static("x-ratelimit-limit"), value);
            }
            response
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);

            if let Some(metrics) = metrics() {
                metrics.record_rate_limit_rejection("api");
            }
            tracing::debug!(client = %ip, retry_after, "Request rate limited");

            ApiError::too_many_requests(Some(retry_after)).into_response()
        }
    }
}
