//! Health check types
//!
//! Shared by the storage, provider and API layers so every component reports
//! health the same way.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status for a service or component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component works but is running on a fallback
    Degraded,
    /// Component is not operational
    Unhealthy,
}

/// Health of a single component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    fn with_status(
        status: HealthStatus,
        component: impl Into<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            status,
            component: component.into(),
            message,
            response_time_ms: None,
            metadata: None,
        }
    }

    pub fn healthy(component: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Healthy, component, None)
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Degraded, component, Some(message.into()))
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, component, Some(message.into()))
    }

    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

/// Aggregate of component checks; the overall status is the worst one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn from_checks(checks: Vec<HealthCheck>) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        Self { status, checks }
    }

    /// Ready unless some component is outright down.
    pub fn is_ready(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }
}
