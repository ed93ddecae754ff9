//! Health tracking for the collector
//!
//! Components report healthy / degraded / unhealthy after each pass; the
//! HTTP API turns the aggregate into liveness and readiness responses.

use crate::collector::CollectionResults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Working, but some domains or pushes failed
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        !matches!(self, ComponentStatus::Unhealthy)
    }
}

/// Latest health report for a component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Aggregate health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|health| health.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const HYPERVISOR: &str = "hypervisor";
    pub const COLLECTOR: &str = "collector";
    pub const SINK: &str = "sink";
}

/// Shared registry of component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Update component health from the outcome of a pass
    pub async fn record_pass(&self, results: &CollectionResults) {
        self.set_healthy(components::HYPERVISOR).await;

        if results.skipped > 0 {
            self.set_degraded(
                components::COLLECTOR,
                format!("{} of {} domains skipped", results.skipped, results.domains_seen),
            )
            .await;
        } else {
            self.set_healthy(components::COLLECTOR).await;
        }

        if results.push_failures > 0 {
            self.set_degraded(
                components::SINK,
                format!("{} pushes failed", results.push_failures),
            )
            .await;
        } else {
            self.set_healthy(components::SINK).await;
        }
    }

    /// Mark the hypervisor unhealthy after a failed enumeration
    pub async fn record_enumeration_failure(&self, error: &str) {
        self.set_unhealthy(components::HYPERVISOR, error).await;
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        if !ready {
            return ReadinessResponse {
                ready: false,
                reason: Some("Collector not yet initialized".to_string()),
            };
        }

        if !self.health().await.status.is_operational() {
            return ReadinessResponse {
                ready: false,
                reason: Some("Hypervisor or sink unhealthy".to_string()),
            };
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(skipped: usize, push_failures: usize) -> CollectionResults {
        CollectionResults {
            domains_seen: 3,
            collected: 3 - skipped,
            skipped,
            push_failures,
        }
    }

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_clean_pass_is_healthy() {
        let registry = HealthRegistry::new();
        registry.record_pass(&results(0, 0)).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), 3);
    }

    #[tokio::test]
    async fn test_skipped_domains_degrade_collector() {
        let registry = HealthRegistry::new();
        registry.record_pass(&results(1, 0)).await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::COLLECTOR].message.as_deref(),
            Some("1 of 3 domains skipped")
        );
        assert_eq!(
            health.components[components::SINK].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_push_failures_degrade_sink() {
        let registry = HealthRegistry::new();
        registry.record_pass(&results(0, 2)).await;

        let health = registry.health().await;
        assert_eq!(
            health.components[components::SINK].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_enumeration_failure_then_recovery() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;

        registry.record_enumeration_failure("connection reset").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        assert!(!registry.readiness().await.ready);

        registry.record_pass(&results(0, 0)).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_degraded_is_still_ready() {
        let registry = HealthRegistry::new();
        registry.set_ready(true).await;
        registry.record_pass(&results(2, 1)).await;

        assert!(registry.readiness().await.ready);
    }
}
