//! Generation Scheduler
//!
//! Decides whether a background generation cycle may start and hands out a
//! leased lock to the cycle that does. A lease that outlives its TTL is
//! treated as free, so a crashed cycle cannot block generation forever.
//!
//! ```text
//! may_generate_now = enabled
//!     AND lease absent or expired
//!     AND today_count < max_per_day
//!     AND (last_generation_at absent OR now - last >= min_gap)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use solartales_core::{
    chrono_ms, Clock, SchedulerConfig, SchedulerConfigPatch, StoryResult, ThrottleReason,
    Timestamp, ValidationError,
};
use uuid::Uuid;

/// Exclusive right to run one generation cycle until `expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Lease {
    pub id: Uuid,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub acquired_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub expires_at: Timestamp,
}

impl Lease {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}

/// Proof that the holder began a cycle. Consumed by [`GenerationScheduler::end_cycle`].
#[derive(Debug)]
#[must_use = "a cycle handle must be passed to end_cycle"]
pub struct CycleHandle {
    lease: Lease,
}

impl CycleHandle {
    pub fn lease(&self) -> &Lease {
        &self.lease
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    lease: Option<Lease>,
    last_generation_at: Option<Timestamp>,
    today_count: u32,
    count_day: Option<NaiveDate>,
}

impl SchedulerState {
    /// Successful cycles counted on `day`; zero once the quota day has changed.
    fn count_on(&self, day: NaiveDate) -> u32 {
        if self.count_day == Some(day) {
            self.today_count
        } else {
            0
        }
    }

    fn active_lease(&self, now: Timestamp) -> Option<&Lease> {
        self.lease.as_ref().filter(|lease| !lease.is_expired(now))
    }

    fn check(&self, config: &SchedulerConfig, now: Timestamp) -> Result<(), ThrottleReason> {
        if !config.enabled {
            return Err(ThrottleReason::Disabled);
        }
        if self.active_lease(now).is_some() {
            return Err(ThrottleReason::InFlight);
        }
        if self.count_on(config.quota_day(now)) >= config.max_per_day {
            return Err(ThrottleReason::QuotaExhausted);
        }
        if let Some(last) = self.last_generation_at {
            if now - last < chrono_ms(config.min_gap_ms) {
                return Err(ThrottleReason::MinGap);
            }
        }
        Ok(())
    }
}

/// Point-in-time view of the scheduler for status endpoints.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SchedulerSnapshot {
    pub config: SchedulerConfig,
    pub is_generating: bool,
    pub lease: Option<Lease>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub last_generation_at: Option<Timestamp>,
    pub today_count: u32,
    pub quota_day: NaiveDate,
    pub may_generate_now: bool,
    pub throttle_reason: Option<ThrottleReason>,
}

/// Process-wide scheduler state plus its atomically swapped config.
#[derive(Debug)]
pub struct GenerationScheduler {
    state: Mutex<SchedulerState>,
    config: RwLock<Arc<SchedulerConfig>>,
    clock: Arc<dyn Clock>,
}

impl GenerationScheduler {
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            config: RwLock::new(Arc::new(config)),
            clock,
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current config. Readers always see a whole config, never a mix.
    pub fn config(&self) -> Arc<SchedulerConfig> {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Why a cycle may not start right now, if it may not.
    pub fn check(&self) -> Result<(), ThrottleReason> {
        let config = self.config();
        self.state().check(&config, self.clock.now())
    }

    pub fn may_generate_now(&self) -> bool {
        self.check().is_ok()
    }

    /// Atomically check and take the generation lease.
    pub fn begin_cycle(&self) -> StoryResult<CycleHandle> {
        let config = self.config();
        let now = self.clock.now();
        let mut state = self.state();

        state.check(&config, now)?;

        if let Some(stale) = state.lease.take() {
            tracing::warn!(
                lease_id = %stale.id,
                acquired_at = %stale.acquired_at,
                "Reclaiming expired generation lease"
            );
        }

        let lease = Lease {
            id: Uuid::now_v7(),
            acquired_at: now,
            expires_at: now
                .checked_add_signed(chrono_ms(config.lease_ttl_ms))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        state.lease = Some(lease);

        tracing::debug!(lease_id = %lease.id, "Generation cycle started");
        Ok(CycleHandle { lease })
    }

    /// Release the lease and, on success, record the cycle against the quota.
    ///
    /// Bookkeeping is applied even when the lease expired and was reclaimed,
    /// since the cycle did run; only the lease itself is left alone then.
    pub fn end_cycle(&self, handle: CycleHandle, success: bool) {
        let config = self.config();
        let now = self.clock.now();
        let mut state = self.state();

        if state.lease.map(|lease| lease.id) == Some(handle.lease.id) {
            state.lease = None;
        } else {
            tracing::warn!(
                lease_id = %handle.lease.id,
                "Generation cycle ended after its lease was reclaimed"
            );
        }

        if success {
            let day = config.quota_day(now);
            let count = state.count_on(day).saturating_add(1);
            state.today_count = count;
            state.count_day = Some(day);
            state.last_generation_at = Some(now);

            if count > config.max_per_day {
                tracing::warn!(
                    today_count = count,
                    max_per_day = config.max_per_day,
                    "Daily generation quota exceeded; refusing until rollover"
                );
            }
        }

        tracing::debug!(lease_id = %handle.lease.id, success, "Generation cycle ended");
    }

    /// Merge `patch` into a new config and swap it in whole.
    pub fn update_config(
        &self,
        patch: &SchedulerConfigPatch,
    ) -> Result<Arc<SchedulerConfig>, ValidationError> {
        let mut slot = self.config.write().unwrap_or_else(|e| e.into_inner());
        let merged = Arc::new(patch.apply(&slot)?);
        *slot = merged.clone();
        drop(slot);

        tracing::info!(
            enabled = merged.enabled,
            max_per_day = merged.max_per_day,
            min_gap_ms = merged.min_gap_ms,
            interval_ms = merged.interval_ms,
            "Scheduler config updated"
        );
        Ok(merged)
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let config = self.config();
        let now = self.clock.now();
        let state = self.state();
        let quota_day = config.quota_day(now);
        let verdict = state.check(&config, now);

        SchedulerSnapshot {
            is_generating: state.active_lease(now).is_some(),
            lease: state.active_lease(now).copied(),
            last_generation_at: state.last_generation_at,
            today_count: state.count_on(quota_day),
            quota_day,
            may_generate_now: verdict.is_ok(),
            throttle_reason: verdict.err(),
            config: (*config).clone(),
        }
    }

    pub fn is_generating(&self) -> bool {
        self.state().active_lease(self.clock.now()).is_some()
    }

    pub fn today_count(&self) -> u32 {
        let config = self.config();
        self.state().count_on(config.quota_day(self.clock.now()))
    }

    pub fn last_generation_at(&self) -> Option<Timestamp> {
        self.state().last_generation_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use solartales_core::{ManualClock, StoryError};

    fn config(max_per_day: u32, min_gap_ms: u64) -> SchedulerConfig {
        SchedulerConfig {
            max_per_day,
            min_gap_ms,
            ..SchedulerConfig::default()
        }
    }

    fn scheduler(config: SchedulerConfig) -> (Arc<ManualClock>, GenerationScheduler) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap(),
        ));
        (clock.clone(), GenerationScheduler::new(config, clock))
    }

    fn throttle(result: StoryResult<CycleHandle>) -> ThrottleReason {
        match result {
            Err(StoryError::Throttled(reason)) => reason,
            other => panic!("expected throttle, got {:?}", other),
        }
    }

    #[test]
    fn test_second_begin_is_in_flight() {
        let (_, scheduler) = scheduler(config(10, 0));
        let handle = scheduler.begin_cycle().unwrap();
        assert!(scheduler.is_generating());
        assert_eq!(throttle(scheduler.begin_cycle()), ThrottleReason::InFlight);

        scheduler.end_cycle(handle, true);
        assert!(!scheduler.is_generating());
        assert!(scheduler.begin_cycle().is_ok());
    }

    #[test]
    fn test_disabled_refuses() {
        let (_, scheduler) = scheduler(SchedulerConfig {
            enabled: false,
            ..config(10, 0)
        });
        assert_eq!(scheduler.check(), Err(ThrottleReason::Disabled));
    }

    #[test]
    fn test_min_gap_is_enforced() {
        let (clock, scheduler) = scheduler(config(10, 60_000));
        let handle = scheduler.begin_cycle().unwrap();
        scheduler.end_cycle(handle, true);

        clock.advance_ms(59_999);
        assert_eq!(scheduler.check(), Err(ThrottleReason::MinGap));
        clock.advance_ms(1);
        assert!(scheduler.may_generate_now());
    }

    #[test]
    fn test_failed_cycle_does_not_count() {
        let (_, scheduler) = scheduler(config(1, 60_000));
        let handle = scheduler.begin_cycle().unwrap();
        scheduler.end_cycle(handle, false);

        assert_eq!(scheduler.today_count(), 0);
        assert!(scheduler.last_generation_at().is_none());
        assert!(scheduler.may_generate_now());
    }

    #[test]
    fn test_quota_exhausts_and_rolls_over() {
        let (clock, scheduler) = scheduler(config(2, 0));
        for _ in 0..2 {
            let handle = scheduler.begin_cycle().unwrap();
            scheduler.end_cycle(handle, true);
        }
        assert_eq!(scheduler.today_count(), 2);
        assert_eq!(scheduler.check(), Err(ThrottleReason::QuotaExhausted));

        clock.set(Utc.with_ymd_and_hms(2024, 5, 11, 0, 0, 0).unwrap());
        assert_eq!(scheduler.today_count(), 0);
        let handle = scheduler.begin_cycle().unwrap();
        scheduler.end_cycle(handle, true);
        assert_eq!(scheduler.today_count(), 1);
    }

    #[test]
    fn test_quota_day_follows_offset() {
        // 12:00 UTC on the 10th is already the 11th at UTC+13.
        let (clock, scheduler) = scheduler(SchedulerConfig {
            day_offset_minutes: 13 * 60,
            ..config(1, 0)
        });
        let handle = scheduler.begin_cycle().unwrap();
        scheduler.end_cycle(handle, true);
        assert_eq!(scheduler.check(), Err(ThrottleReason::QuotaExhausted));

        clock.set(Utc.with_ymd_and_hms(2024, 5, 11, 11, 0, 0).unwrap());
        assert!(scheduler.may_generate_now());
    }

    #[test]
    fn test_expired_lease_is_free() {
        let (clock, scheduler) = scheduler(SchedulerConfig {
            lease_ttl_ms: 1_000,
            ..config(10, 0)
        });
        let stale = scheduler.begin_cycle().unwrap();
        clock.advance_ms(1_000);

        assert!(!scheduler.is_generating());
        let fresh = scheduler.begin_cycle().unwrap();
        assert_ne!(stale.lease().id, fresh.lease().id);

        // The late cycle must not release the new holder's lease.
        scheduler.end_cycle(stale, true);
        assert!(scheduler.is_generating());
        scheduler.end_cycle(fresh, true);
        assert!(!scheduler.is_generating());
    }

    #[test]
    fn test_lowering_quota_mid_day_refuses() {
        let (_, scheduler) = scheduler(config(5, 0));
        for _ in 0..3 {
            let handle = scheduler.begin_cycle().unwrap();
            scheduler.end_cycle(handle, true);
        }
        scheduler
            .update_config(&SchedulerConfigPatch {
                max_per_day: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(scheduler.check(), Err(ThrottleReason::QuotaExhausted));
    }

    #[test]
    fn test_empty_update_keeps_values() {
        let (_, scheduler) = scheduler(config(7, 1234));
        let before = scheduler.config();
        let after = scheduler
            .update_config(&SchedulerConfigPatch::default())
            .unwrap();
        assert_eq!(*before, *after);
    }

    #[test]
    fn test_invalid_update_leaves_config_untouched() {
        let (_, scheduler) = scheduler(config(7, 0));
        let err = scheduler.update_config(&SchedulerConfigPatch {
            interval_ms: Some(1),
            ..Default::default()
        });
        assert!(err.is_err());
        assert_eq!(scheduler.config().max_per_day, 7);
    }

    #[test]
    fn test_extreme_lease_ttl_is_rejected_and_cannot_panic() {
        let (_, scheduler) = scheduler(config(7, 0));
        let err = scheduler.update_config(&SchedulerConfigPatch {
            lease_ttl_ms: Some(9_000_000_000_000_000),
            ..Default::default()
        });
        assert!(err.is_err());
        assert!(scheduler.begin_cycle().is_ok());

        // A config built without validation still saturates instead of overflowing.
        let (_, unchecked) = self::scheduler(SchedulerConfig {
            lease_ttl_ms: u64::MAX,
            ..config(7, 0)
        });
        let handle = unchecked.begin_cycle().unwrap();
        assert_eq!(handle.lease().expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(unchecked.is_generating());
        unchecked.end_cycle(handle, true);
        assert_eq!(unchecked.today_count(), 1);
    }

    #[test]
    fn test_snapshot_reports_reason() {
        let (_, scheduler) = scheduler(config(0, 0));
        let snapshot = scheduler.snapshot();
        assert!(!snapshot.may_generate_now);
        assert_eq!(snapshot.throttle_reason, Some(ThrottleReason::QuotaExhausted));
        assert_eq!(snapshot.today_count, 0);
    }

    proptest! {
        #[test]
        fn prop_successes_never_exceed_quota(max_per_day in 0u32..12, attempts in 0usize..30) {
            let (clock, scheduler) = scheduler(config(max_per_day, 0));
            let mut succeeded = 0u32;
            for _ in 0..attempts {
                if let Ok(handle) = scheduler.begin_cycle() {
                    scheduler.end_cycle(handle, true);
                    succeeded += 1;
                }
                clock.advance_ms(1);
            }
            prop_assert!(succeeded <= max_per_day);
            prop_assert!(scheduler.today_count() <= max_per_day);
        }
    }
}
