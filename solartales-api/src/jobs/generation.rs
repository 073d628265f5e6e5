//! Story Generation Background Tasks
//!
//! Two tasks drive [`StoryGenerator::run_cycle`]:
//!
//! - `generation_timer_task`: fires every `interval_ms`. The interval is
//!   re-read from the scheduler after each cycle, so a config change takes
//!   effect on the next tick without a restart.
//! - `refresh_worker_task`: drains the refresh queue fed by the read path
//!   and the manual trigger endpoint.
//!
//! Both stop when the shutdown watch flips to `true`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use solartales_core::Subject;
use tokio::sync::{mpsc, watch};

use crate::services::{CycleOutcome, RefreshQueue, RefreshRequest, StoryGenerator};

// ============================================================================
// METRICS
// ============================================================================

/// Counters for a generation task.
#[derive(Debug, Default)]
pub struct GenerationJobMetrics {
    /// Cycles that ran to completion (any status)
    pub cycles_completed: AtomicU64,

    /// Cycles refused by the scheduler
    pub cycles_throttled: AtomicU64,

    /// Refresh requests taken off the queue
    pub requests_processed: AtomicU64,
}

impl GenerationJobMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Completed(_) => self.cycles_completed.fetch_add(1, Ordering::Relaxed),
            CycleOutcome::Throttled(_) => self.cycles_throttled.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> GenerationJobSnapshot {
        GenerationJobSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_throttled: self.cycles_throttled.load(Ordering::Relaxed),
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of job metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationJobSnapshot {
    pub cycles_completed: u64,
    pub cycles_throttled: u64,
    pub requests_processed: u64,
}

// ============================================================================
// TIMER TASK
// ============================================================================

/// Recurring generation at the scheduler's configured interval.
///
/// The first cycle is attempted one interval after start; cold-start
/// generation goes through the refresh queue instead.
pub async fn generation_timer_task(
    generator: Arc<StoryGenerator>,
    subjects: Vec<Subject>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<GenerationJobMetrics> {
    let metrics = Arc::new(GenerationJobMetrics::new());

    tracing::info!(
        interval_ms = generator.scheduler().config().interval_ms,
        subjects = subjects.len(),
        "Generation timer started"
    );

    loop {
        let interval = generator.scheduler().config().interval();

        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Generation timer shutting down");
                    break;
                }
            }

            _ = tokio::time::sleep(interval) => {
                let outcome = generator.run_cycle(&subjects).await;
                metrics.record(&outcome);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles_completed = snapshot.cycles_completed,
        cycles_throttled = snapshot.cycles_throttled,
        "Generation timer completed"
    );

    metrics
}

// ============================================================================
// REFRESH WORKER
// ============================================================================

/// Drain refresh requests and run a cycle for each.
pub async fn refresh_worker_task(
    generator: Arc<StoryGenerator>,
    queue: Arc<RefreshQueue>,
    mut requests: mpsc::UnboundedReceiver<RefreshRequest>,
    subjects: Vec<Subject>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<GenerationJobMetrics> {
    let metrics = Arc::new(GenerationJobMetrics::new());
    tracing::info!("Refresh worker started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Refresh worker shutting down");
                    break;
                }
            }

            request = requests.recv() => {
                let Some(request) = request else {
                    tracing::info!("Refresh queue closed");
                    break;
                };
                handle_request(&generator, &queue, &subjects, request, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        requests_processed = snapshot.requests_processed,
        cycles_completed = snapshot.cycles_completed,
        cycles_throttled = snapshot.cycles_throttled,
        "Refresh worker completed"
    );

    metrics
}

/// Run the cycle a single refresh request asks for.
pub async fn handle_request(
    generator: &StoryGenerator,
    queue: &RefreshQueue,
    subjects: &[Subject],
    request: RefreshRequest,
    metrics: &GenerationJobMetrics,
) -> CycleOutcome {
    metrics.requests_processed.fetch_add(1, Ordering::Relaxed);

    let outcome = match &request {
        RefreshRequest::AllSubjects => generator.run_cycle(subjects).await,
        RefreshRequest::Subject(subject) => {
            generator.run_cycle(std::slice::from_ref(subject)).await
        }
    };

    if let CycleOutcome::Throttled(reason) = &outcome {
        tracing::debug!(kind = request.kind(), reason = %reason, "Refresh request throttled");
    }

    metrics.record(&outcome);
    queue.complete(&request);
    outcome
}
