//! Rate Limit Sweep Background Task
//!
//! Removes chat limiter entries whose window has ended and per-IP limiters
//! that have fully refilled, so neither map grows with every client ever seen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::middleware::RateLimitState;
use crate::services::RateLimiter;

/// Counters for the sweep task.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Sweeps run since startup
    pub sweeps: AtomicU64,

    /// Chat limiter entries removed since startup
    pub entries_removed: AtomicU64,

    /// Idle per-IP limiters removed since startup
    pub clients_pruned: AtomicU64,
}

/// Periodically sweep expired entries until shutdown.
pub async fn rate_limit_sweep_task(
    limiter: Arc<RateLimiter>,
    api_limiter: RateLimitState,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::default());

    let mut sweep_interval = interval(every);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = every.as_secs(), "Rate limit sweep started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Rate limit sweep shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                let removed = limiter.sweep_expired();
                let pruned = api_limiter.prune_idle();
                metrics.sweeps.fetch_add(1, Ordering::Relaxed);
                metrics.entries_removed.fetch_add(removed as u64, Ordering::Relaxed);
                metrics.clients_pruned.fetch_add(pruned as u64, Ordering::Relaxed);
                if removed > 0 || pruned > 0 {
                    tracing::debug!(
                        removed,
                        pruned,
                        remaining = limiter.len(),
                        tracked_clients = api_limiter.tracked_clients(),
                        "Swept rate limit entries"
                    );
                } else {
                    tracing::trace!("Rate limit sweep found nothing to remove");
                }
            }
        }
    }

    metrics
}
