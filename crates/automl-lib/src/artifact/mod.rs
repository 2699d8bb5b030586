//! Artifact bundles and their stores
//!
//! A bundle is the unit of persistence: the fitted model, the plan it was
//! fit with, and its held-out metrics, written and read as one value. Each
//! write creates a new immutable version; readers always see either the
//! previous or the new version of a key, never a mix.

mod fs;
mod memory;

pub use fs::FsArtifactStore;
pub use memory::MemoryArtifactStore;

use crate::error::PipelineResult;
use crate::preprocess::PreprocessingPlan;
use crate::trainer::{Model, ModelMetrics};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Default number of versions retained per key
pub const DEFAULT_VERSIONS_TO_KEEP: usize = 5;

/// Identity of a bundle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub dataset_id: String,
    pub model_name: String,
}

impl ArtifactKey {
    pub fn new(dataset_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            model_name: model_name.into(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset_id, self.model_name)
    }
}

/// Everything needed to score new records with one trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub key: ArtifactKey,
    /// Assigned by the store on write
    #[serde(default)]
    pub version: u64,
    pub model: Model,
    pub plan: PreprocessingPlan,
    pub metrics: ModelMetrics,
    /// Whether this model is the dataset's default for serving
    #[serde(default)]
    pub is_best: bool,
    pub created_at: DateTime<Utc>,
}

impl ArtifactBundle {
    pub fn new(
        key: ArtifactKey,
        model: Model,
        plan: PreprocessingPlan,
        metrics: ModelMetrics,
        is_best: bool,
    ) -> Self {
        Self {
            key,
            version: 0,
            model,
            plan,
            metrics,
            is_best,
            created_at: Utc::now(),
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.plan.feature_names
    }

    pub fn target_column(&self) -> &str {
        self.plan.target_column()
    }
}

/// Durable keyed storage of artifact bundles
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a new version of `bundle.key`; returns the stored bundle
    ///
    /// When `bundle.is_best` is set the key becomes the dataset's best model.
    async fn write(&self, bundle: ArtifactBundle) -> PipelineResult<ArtifactBundle>;

    /// Current version of a key, or `ArtifactNotFound`
    async fn read(&self, key: &ArtifactKey) -> PipelineResult<ArtifactBundle>;

    /// Current version of the dataset's best model, or `ArtifactNotFound`
    async fn read_best(&self, dataset_id: &str) -> PipelineResult<ArtifactBundle>;

    /// Current version of every model of a dataset, ordered by model name
    async fn list(&self, dataset_id: &str) -> PipelineResult<Vec<ArtifactBundle>>;

    /// Remove every version of a key
    async fn delete(&self, key: &ArtifactKey) -> PipelineResult<()>;

    /// Remove every bundle of a dataset; returns the number of models removed
    async fn delete_dataset(&self, dataset_id: &str) -> PipelineResult<usize>;
}

/// SHA-256 of `data`, hex encoded
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::dataset::{Cell, Dataset};
    use crate::preprocess::PreprocessingExecutor;
    use crate::profiler::SchemaProfiler;
    use crate::target::TargetResolver;
    use crate::trainer::{Algorithm, Trainable};

    /// Small fitted bundle for store tests
    pub fn bundle(dataset_id: &str, model_name: &str, accuracy: f64, is_best: bool) -> ArtifactBundle {
        let config = PipelineConfig::default();
        let ds = Dataset::from_rows(
            vec!["x".to_string(), "label".to_string()],
            (0..12)
                .map(|i| vec![Cell::Number(i as f64), Cell::Number(f64::from(u8::from(i >= 6)))])
                .collect(),
        );
        let profile = SchemaProfiler::new(&config).profile(&ds, None).unwrap();
        let target = TargetResolver::new(&config).resolve(&ds, &profile, None).unwrap();
        let plan = PreprocessingExecutor::fit(&ds, &profile, &target).unwrap();
        let x = PreprocessingExecutor::transform(&plan, &ds);
        let y: Vec<usize> = PreprocessingExecutor::labels(&plan, &ds)
            .into_iter()
            .map(|l| l.unwrap())
            .collect();
        let mut model = Algorithm::Logistic.instantiate(&config);
        model.fit(x.view(), &y, 2).unwrap();

        ArtifactBundle::new(
            ArtifactKey::new(dataset_id, model_name),
            model,
            plan,
            ModelMetrics {
                accuracy,
                f1_score: accuracy,
                auc_score: accuracy,
                training_time: 0.01,
                auc_is_fallback: false,
            },
            is_best,
        )
    }
}
