//! Fixed-window rate limiter for the chat endpoint.
//!
//! Entries live in a sharded map; the check and the increment for one
//! identifier happen under that identifier's shard lock, so concurrent
//! callers can never both slip under the limit.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use solartales_core::{Clock, SystemClock, Timestamp};

/// One client's counter for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: Timestamp,
}

/// Result of [`RateLimiter::check_and_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time: Timestamp,
    pub limit: u32,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, never less than one.
    pub fn retry_after_secs(&self, now: Timestamp) -> u64 {
        let millis = (self.reset_time - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// Process-wide fixed-window limiter keyed by client fingerprint.
#[derive(Debug)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    clock: Arc<dyn Clock>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl RateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Count one request against `identifier` and report whether it fits.
    ///
    /// A missing entry, or one whose `reset_time` has passed, starts a
    /// fresh window with `count = 1`.
    pub fn check_and_consume(
        &self,
        identifier: &str,
        window: Duration,
        max_requests: u32,
    ) -> RateLimitDecision {
        let now = self.clock.now();
        let reset_time = chrono::Duration::from_std(window)
            .ok()
            .and_then(|window| now.checked_add_signed(window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let fresh = || RateLimitEntry {
            count: 1,
            reset_time,
        };

        let entry = match self.entries.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                if now > current.reset_time {
                    *current = fresh();
                } else {
                    current.count = current.count.saturating_add(1);
                }
                *current
            }
            Entry::Vacant(vacant) => *vacant.insert(fresh()),
        };

        RateLimitDecision {
            allowed: entry.count <= max_requests,
            remaining: max_requests.saturating_sub(entry.count),
            reset_time: entry.reset_time,
            limit: max_requests,
        }
    }

    /// Drop every entry whose window has ended. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_time >= now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

/// Hashed client identity: SHA-256 over the IP and user agent, hex encoded.
pub fn client_fingerprint(ip: Option<IpAddr>, user_agent: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    match ip {
        Some(ip) => hasher.update(ip.to_string().as_bytes()),
        None => hasher.update(b"unknown"),
    }
    hasher.update(b"|");
    hasher.update(user_agent.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use solartales_core::ManualClock;

    fn limiter() -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = RateLimiter::new(clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_first_request_opens_window() {
        let (clock, limiter) = limiter();
        let decision = limiter.check_and_consume("client", Duration::from_secs(60), 3);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.reset_time, clock.now() + chrono::Duration::seconds(60));
    }

    #[test]
    fn test_huge_window_saturates() {
        let (_, limiter) = limiter();
        let decision = limiter.check_and_consume("client", Duration::MAX, 1);
        assert!(decision.allowed);
        assert_eq!(decision.reset_time, DateTime::<Utc>::MAX_UTC);
        assert!(!limiter.check_and_consume("client", Duration::MAX, 1).allowed);
    }

    #[test]
    fn test_requests_over_limit_are_denied() {
        let (_, limiter) = limiter();
        let window = Duration::from_secs(60);
        for _ in 0..3 {
            assert!(limiter.check_and_consume("client", window, 3).allowed);
        }
        let denied = limiter.check_and_consume("client", window, 3);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn test_window_resets_one_ms_after_reset_time() {
        let (clock, limiter) = limiter();
        let window = Duration::from_secs(60);
        for _ in 0..5 {
            limiter.check_and_consume("client", window, 2);
        }

        // Exactly at reset_time the old window still applies.
        clock.advance_ms(60_000);
        assert!(!limiter.check_and_consume("client", window, 2).allowed);

        clock.advance_ms(1);
        let decision = limiter.check_and_consume("client", window, 2);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_identifiers_are_independent() {
        let (_, limiter) = limiter();
        let window = Duration::from_secs(60);
        assert!(limiter.check_and_consume("a", window, 1).allowed);
        assert!(!limiter.check_and_consume("a", window, 1).allowed);
        assert!(limiter.check_and_consume("b", window, 1).allowed);
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let (clock, limiter) = limiter();
        limiter.check_and_consume("old", Duration::from_secs(10), 5);
        clock.advance_ms(5_000);
        limiter.check_and_consume("new", Duration::from_secs(10), 5);

        clock.advance_ms(5_001);
        assert_eq!(limiter.sweep_expired(), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let now = Utc::now();
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_time: now + chrono::Duration::milliseconds(1_200),
            limit: 1,
        };
        assert_eq!(decision.retry_after_secs(now), 2);
        assert_eq!(decision.retry_after_secs(now + chrono::Duration::seconds(5)), 1);
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let a = client_fingerprint(Some(ip), Some("Mozilla/5.0"));
        let b = client_fingerprint(Some(ip), Some("Mozilla/5.0"));
        let c = client_fingerprint(Some(ip), Some("curl/8.0"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_concurrent_consumers_never_exceed_limit() {
        let (_, limiter) = limiter();
        let limiter = Arc::new(limiter);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| {
                            limiter
                                .check_and_consume("shared", Duration::from_secs(60), 25)
                                .allowed
                        })
                        .count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 25);
    }

    proptest! {
        #[test]
        fn prop_allowed_never_exceeds_max(max in 0u32..50, calls in 0usize..120) {
            let (_, limiter) = limiter();
            let allowed = (0..calls)
                .filter(|_| limiter.check_and_consume("id", Duration::from_secs(60), max).allowed)
                .count();
            prop_assert!(allowed <= max as usize);
            prop_assert_eq!(allowed, calls.min(max as usize));
        }
    }
}
