//! Component health for liveness and readiness probes
//!
//! Components report their own status; request paths feed storage and
//! training failures back in through [`HealthRegistry::record`].

use crate::artifact::ArtifactStore;
use crate::error::{ErrorKind, PipelineError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operational, but recent operations failed
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across components; empty means healthy
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|c| c.status)
            .max_by_key(|s| match s {
                ComponentStatus::Healthy => 0,
                ComponentStatus::Degraded => 1,
                ComponentStatus::Unhealthy => 2,
            })
            .unwrap_or(ComponentStatus::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const ARTIFACT_STORE: &str = "artifact_store";
    pub const TRAINER: &str = "trainer";
    pub const INFERENCE: &str = "inference";
}

#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
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
            components: Arc::new(RwLock::new(BTreeMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register every pipeline component as healthy
    pub async fn register_all(&self) {
        for name in [
            components::ARTIFACT_STORE,
            components::TRAINER,
            components::INFERENCE,
        ] {
            self.register(name).await;
        }
    }

    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components.write().await.insert(name.to_string(), health);
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

    /// Feed an operation outcome back into component health
    ///
    /// Storage, serialization and integrity failures degrade the artifact
    /// store; caller errors (bad input, missing artifacts) leave health alone.
    /// A success means the operation reached the store, so a degraded
    /// caller component or artifact store is restored.
    pub async fn record<T>(&self, component: &str, outcome: &Result<T, PipelineError>) {
        match outcome {
            Ok(_) => {
                for name in [component, components::ARTIFACT_STORE] {
                    self.restore_if_degraded(name).await;
                }
            }
            Err(e) => match e.kind() {
                ErrorKind::Storage | ErrorKind::Serialization | ErrorKind::Integrity => {
                    self.set_degraded(components::ARTIFACT_STORE, e.to_string()).await;
                }
                _ => {}
            },
        }
    }

    async fn restore_if_degraded(&self, name: &str) {
        let degraded = self
            .components
            .read()
            .await
            .get(name)
            .is_some_and(|c| c.status == ComponentStatus::Degraded);
        if degraded {
            self.set_healthy(name).await;
        }
    }

    /// Probe the store with a cheap listing
    pub async fn probe_store(&self, store: &dyn ArtifactStore) {
        match store.list("healthcheck").await {
            Ok(_) => self.set_healthy(components::ARTIFACT_STORE).await,
            Err(e) => {
                self.set_unhealthy(components::ARTIFACT_STORE, e.to_string())
                    .await
            }
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        let reason = if !ready {
            Some("Service not yet initialized")
        } else if !health.status.is_operational() {
            Some("Critical component unhealthy")
        } else {
            None
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifactStore;
    use std::io;

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_register_all() {
        let registry = HealthRegistry::new();
        registry.register_all().await;

        let health = registry.health().await;
        let names: Vec<_> = health.components.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["artifact_store", "inference", "trainer"]);
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let registry = HealthRegistry::new();
        registry.register_all().await;

        registry.set_degraded(components::TRAINER, "slow").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry.set_unhealthy(components::INFERENCE, "down").await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_record_storage_failure_and_recovery() {
        let registry = HealthRegistry::new();
        registry.register_all().await;

        let failed: Result<(), PipelineError> =
            Err(PipelineError::Storage(io::Error::other("disk full")));
        registry.record(components::ARTIFACT_STORE, &failed).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        let not_found: Result<(), PipelineError> = Err(PipelineError::DatasetNotFound {
            dataset_id: "x".to_string(),
        });
        registry.record(components::TRAINER, &not_found).await;
        assert_eq!(
            registry.health().await.components[components::TRAINER].status,
            ComponentStatus::Healthy
        );

        registry.record(components::ARTIFACT_STORE, &Ok::<_, PipelineError>(())).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_store_recovers_after_caller_success() {
        let registry = HealthRegistry::new();
        registry.register_all().await;

        let failed: Result<(), PipelineError> = Err(PipelineError::Integrity {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        });
        registry.record(components::INFERENCE, &failed).await;
        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::ARTIFACT_STORE].status,
            ComponentStatus::Degraded
        );

        registry.record(components::INFERENCE, &Ok::<_, PipelineError>(())).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);

        registry.record(components::TRAINER, &failed).await;
        registry.record(components::TRAINER, &Ok::<_, PipelineError>(())).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_success_does_not_mask_unhealthy_store() {
        let registry = HealthRegistry::new();
        registry.register_all().await;
        registry.set_unhealthy(components::ARTIFACT_STORE, "unreachable").await;

        registry.record(components::INFERENCE, &Ok::<_, PipelineError>(())).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_probe_store() {
        let registry = HealthRegistry::new();
        registry.probe_store(&MemoryArtifactStore::new()).await;
        assert_eq!(
            registry.health().await.components[components::ARTIFACT_STORE].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_readiness() {
        let registry = HealthRegistry::new();
        assert!(!registry.readiness().await.ready);

        registry.register_all().await;
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry.set_unhealthy(components::ARTIFACT_STORE, "Failed").await;
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Critical component unhealthy"));
    }
}
