//! Health reporting for the store and its collaborators

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health status for a component definition or a store dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fully operational
    Healthy,
    /// Operational but degraded
    Degraded,
    /// Not operational
    Unhealthy,
    /// Not yet checked
    Unknown,
}

/// Result of probing one dependency of the store (backing store, cache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    pub message: Option<String>,
    pub response_time_ms: Option<i64>,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl HealthCheck {
    pub fn healthy(component: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Healthy, component, None)
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Degraded, component, Some(message.into()))
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, component, Some(message.into()))
    }

    fn with_status(status: HealthStatus, component: impl Into<String>, message: Option<String>) -> Self {
        Self {
            status,
            component: component.into(),
            message,
            response_time_ms: None,
            details: BTreeMap::new(),
        }
    }

    pub fn with_response_time(mut self, ms: i64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Aggregate health of the catalog store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheck>,
}

impl StoreHealth {
    /// Backing-store failures make the store unhealthy; cache failures only
    /// degrade it, since every read can fall through to the backing store.
    pub fn from_checks(backend: HealthCheck, cache: HealthCheck) -> Self {
        let status = match (backend.status, cache.status) {
            (HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
            (HealthStatus::Unknown, _) => HealthStatus::Unknown,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            checks: vec![backend, cache],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_failure_only_degrades() {
        let health = StoreHealth::from_checks(
            HealthCheck::healthy("backing_store"),
            HealthCheck::unhealthy("cache", "connection refused"),
        );
        assert_eq!(health.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_backend_failure_is_unhealthy() {
        let health = StoreHealth::from_checks(
            HealthCheck::unhealthy("backing_store", "timeout"),
            HealthCheck::healthy("cache"),
        );
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.checks.len(), 2);
    }

    #[test]
    fn test_builder_fields() {
        let check = HealthCheck::healthy("cache")
            .with_response_time(3)
            .with_detail("hit_rate", serde_json::json!(0.5));
        assert_eq!(check.response_time_ms, Some(3));
        assert_eq!(check.details["hit_rate"], serde_json::json!(0.5));
    }
}
