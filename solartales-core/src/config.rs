//! Scheduler configuration types

use std::time::Duration;

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::{DurationMs, Timestamp};

/// Smallest accepted generation interval.
pub const MIN_INTERVAL_MS: DurationMs = 1_000;

/// Upper bound for `interval_ms`, `min_gap_ms` and `lease_ttl_ms` (30 days).
pub const MAX_DURATION_MS: DurationMs = 30 * 24 * 60 * 60 * 1_000;

/// Largest accepted day-boundary offset (UTC+14 / UTC-14).
pub const MAX_DAY_OFFSET_MINUTES: i32 = 14 * 60;

/// Background generation settings. Replaced as a whole, never field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SchedulerConfig {
    /// Master switch for background generation.
    pub enabled: bool,
    /// Successful cycles allowed per quota day.
    pub max_per_day: u32,
    /// Minimum time between the end of one cycle and the start of the next.
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub min_gap_ms: DurationMs,
    /// Period of the recurring generation timer.
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub interval_ms: DurationMs,
    /// How long a cycle may hold the generation lease before it is considered abandoned.
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub lease_ttl_ms: DurationMs,
    /// Offset of the quota day boundary from UTC midnight, in minutes.
    pub day_offset_minutes: i32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_day: 24,
            min_gap_ms: 30 * 60 * 1000,
            interval_ms: 60 * 60 * 1000,
            lease_ttl_ms: 2 * 60 * 1000,
            day_offset_minutes: 0,
        }
    }
}

impl SchedulerConfig {
    pub fn min_gap(&self) -> Duration {
        Duration::from_millis(self.min_gap_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    /// Calendar day a timestamp falls on for quota accounting.
    pub fn quota_day(&self, at: Timestamp) -> NaiveDate {
        match FixedOffset::east_opt(self.day_offset_minutes * 60) {
            Some(offset) => at.with_timezone(&offset).date_naive(),
            None => at.date_naive(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_ms < MIN_INTERVAL_MS {
            return Err(ValidationError::InvalidValue {
                field: "interval_ms".to_string(),
                reason: format!("must be at least {}ms", MIN_INTERVAL_MS),
            });
        }
        if self.lease_ttl_ms == 0 {
            return Err(ValidationError::InvalidValue {
                field: "lease_ttl_ms".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        for (field, value) in [
            ("interval_ms", self.interval_ms),
            ("min_gap_ms", self.min_gap_ms),
            ("lease_ttl_ms", self.lease_ttl_ms),
        ] {
            if value > MAX_DURATION_MS {
                return Err(ValidationError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("must be at most {}ms", MAX_DURATION_MS),
                });
            }
        }
        if self.day_offset_minutes.abs() > MAX_DAY_OFFSET_MINUTES {
            return Err(ValidationError::InvalidValue {
                field: "day_offset_minutes".to_string(),
                reason: format!("must be within +/-{} minutes", MAX_DAY_OFFSET_MINUTES),
            });
        }
        Ok(())
    }
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SchedulerConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<u64>))]
    pub min_gap_ms: Option<DurationMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<u64>))]
    pub interval_ms: Option<DurationMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<u64>))]
    pub lease_ttl_ms: Option<DurationMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_offset_minutes: Option<i32>,
}

impl SchedulerConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge this patch over `base`, producing a new validated config.
    pub fn apply(&self, base: &SchedulerConfig) -> Result<SchedulerConfig, ValidationError> {
        let merged = SchedulerConfig {
            enabled: self.enabled.unwrap_or(base.enabled),
            max_per_day: self.max_per_day.unwrap_or(base.max_per_day),
            min_gap_ms: self.min_gap_ms.unwrap_or(base.min_gap_ms),
            interval_ms: self.interval_ms.unwrap_or(base.interval_ms),
            lease_ttl_ms: self.lease_ttl_ms.unwrap_or(base.lease_ttl_ms),
            day_offset_minutes: self.day_offset_minutes.unwrap_or(base.day_offset_minutes),
        };
        merged.validate()?;
        Ok(merged)
    }
}
