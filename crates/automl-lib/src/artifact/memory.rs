//! In-memory artifact store
//!
//! Same versioning and best-model semantics as the filesystem store, kept
//! in an ordered map so a dataset's models are enumerated by key prefix.

use super::{ArtifactBundle, ArtifactKey, ArtifactStore, DEFAULT_VERSIONS_TO_KEEP};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    /// Retained versions per key, oldest first
    bundles: BTreeMap<ArtifactKey, Vec<ArtifactBundle>>,
    best: HashMap<String, String>,
}

impl Inner {
    fn dataset_keys(&self, dataset_id: &str) -> Vec<ArtifactKey> {
        let start = ArtifactKey::new(dataset_id, "");
        self.bundles
            .range((Bound::Included(start), Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.dataset_id == dataset_id)
            .cloned()
            .collect()
    }

    fn current(&self, key: &ArtifactKey) -> Option<ArtifactBundle> {
        let mut bundle = self.bundles.get(key)?.last()?.clone();
        bundle.is_best = self.best.get(&key.dataset_id) == Some(&key.model_name);
        Some(bundle)
    }
}

pub struct MemoryArtifactStore {
    inner: RwLock<Inner>,
    versions_to_keep: usize,
}

impl Default for MemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            versions_to_keep: DEFAULT_VERSIONS_TO_KEEP,
        }
    }

    /// Number of retained versions of a key
    pub async fn version_count(&self, key: &ArtifactKey) -> usize {
        self.inner.read().await.bundles.get(key).map_or(0, Vec::len)
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn write(&self, mut bundle: ArtifactBundle) -> PipelineResult<ArtifactBundle> {
        let mut inner = self.inner.write().await;
        let key = bundle.key.clone();

        let versions = inner.bundles.entry(key.clone()).or_default();
        bundle.version = versions.last().map_or(0, |b| b.version) + 1;
        versions.push(bundle.clone());
        if versions.len() > self.versions_to_keep {
            let excess = versions.len() - self.versions_to_keep;
            versions.drain(..excess);
        }

        if bundle.is_best {
            inner.best.insert(key.dataset_id.clone(), key.model_name.clone());
        } else if inner.best.get(&key.dataset_id) == Some(&key.model_name) {
            inner.best.remove(&key.dataset_id);
        }
        Ok(bundle)
    }

    async fn read(&self, key: &ArtifactKey) -> PipelineResult<ArtifactBundle> {
        self.inner
            .read()
            .await
            .current(key)
            .ok_or_else(|| PipelineError::ArtifactNotFound {
                dataset_id: key.dataset_id.clone(),
                model_name: key.model_name.clone(),
            })
    }

    async fn read_best(&self, dataset_id: &str) -> PipelineResult<ArtifactBundle> {
        let inner = self.inner.read().await;
        inner
            .best
            .get(dataset_id)
            .and_then(|model_name| inner.current(&ArtifactKey::new(dataset_id, model_name.clone())))
            .ok_or_else(|| PipelineError::ArtifactNotFound {
                dataset_id: dataset_id.to_string(),
                model_name: "best".to_string(),
            })
    }

    async fn list(&self, dataset_id: &str) -> PipelineResult<Vec<ArtifactBundle>> {
        let inner = self.inner.read().await;
        Ok(inner
            .dataset_keys(dataset_id)
            .iter()
            .filter_map(|key| inner.current(key))
            .collect())
    }

    async fn delete(&self, key: &ArtifactKey) -> PipelineResult<()> {
        let mut inner = self.inner.write().await;
        if inner.bundles.remove(key).is_none() {
            return Err(PipelineError::ArtifactNotFound {
                dataset_id: key.dataset_id.clone(),
                model_name: key.model_name.clone(),
            });
        }
        if inner.best.get(&key.dataset_id) == Some(&key.model_name) {
            inner.best.remove(&key.dataset_id);
        }
        Ok(())
    }

    async fn delete_dataset(&self, dataset_id: &str) -> PipelineResult<usize> {
        let mut inner = self.inner.write().await;
        let keys = inner.dataset_keys(dataset_id);
        for key in &keys {
            inner.bundles.remove(key);
        }
        inner.best.remove(dataset_id);
        Ok(keys.len())
    }
}
