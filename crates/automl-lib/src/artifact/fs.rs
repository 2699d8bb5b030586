//! Filesystem-backed artifact store
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<dataset_id>/manifest.json
//! <root>/<dataset_id>/<model_name>/v<version>.json
//! ```
//!
//! Version files are immutable. The manifest names the current version of
//! every model and the dataset's best model; it is replaced with a
//! temp-file rename so readers see either the old or the new manifest.

use super::{compute_checksum, ArtifactBundle, ArtifactKey, ArtifactStore, DEFAULT_VERSIONS_TO_KEEP};
use crate::dataset::is_safe_id;
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.json";

/// On-disk wrapper that lets reads detect torn or tampered payloads
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    checksum: String,
    payload: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ModelEntry {
    current: u64,
    /// Retained versions, oldest first
    versions: Vec<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Manifest {
    models: BTreeMap<String, ModelEntry>,
    best: Option<String>,
}

pub struct FsArtifactStore {
    root: PathBuf,
    versions_to_keep: usize,
    /// Serialises manifest updates per dataset
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            versions_to_keep: DEFAULT_VERSIONS_TO_KEEP,
            locks: DashMap::new(),
        }
    }

    pub fn with_versions_to_keep(mut self, versions_to_keep: usize) -> Self {
        self.versions_to_keep = versions_to_keep.max(1);
        self
    }

    fn dataset_dir(&self, dataset_id: &str) -> PathBuf {
        self.root.join(dataset_id)
    }

    fn manifest_path(&self, dataset_id: &str) -> PathBuf {
        self.dataset_dir(dataset_id).join(MANIFEST_FILE)
    }

    fn version_path(&self, key: &ArtifactKey, version: u64) -> PathBuf {
        self.dataset_dir(&key.dataset_id)
            .join(&key.model_name)
            .join(format!("v{version}.json"))
    }

    fn dataset_lock(&self, dataset_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(dataset_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load_manifest(&self, dataset_id: &str) -> PipelineResult<Option<Manifest>> {
        match tokio::fs::read(self.manifest_path(dataset_id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_manifest(&self, dataset_id: &str, manifest: &Manifest) -> PipelineResult<()> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.manifest_path(dataset_id), &bytes).await
    }

    async fn read_version(
        &self,
        key: &ArtifactKey,
        version: u64,
        manifest: &Manifest,
    ) -> PipelineResult<ArtifactBundle> {
        let path = self.version_path(key, version);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found(key)),
            Err(e) => return Err(e.into()),
        };
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        let actual = compute_checksum(envelope.payload.as_bytes());
        if actual != envelope.checksum {
            return Err(PipelineError::Integrity {
                expected: envelope.checksum,
                actual,
            });
        }

        let mut bundle: ArtifactBundle = serde_json::from_str(&envelope.payload)?;
        bundle.is_best = manifest.best.as_deref() == Some(key.model_name.as_str());
        Ok(bundle)
    }

    async fn read_with(&self, key: &ArtifactKey, manifest: &Manifest) -> PipelineResult<ArtifactBundle> {
        let entry = manifest.models.get(&key.model_name).ok_or_else(|| not_found(key))?;
        self.read_version(key, entry.current, manifest).await
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write(&self, mut bundle: ArtifactBundle) -> PipelineResult<ArtifactBundle> {
        let key = bundle.key.clone();
        if !is_safe_id(&key.dataset_id) || !is_safe_id(&key.model_name) {
            return Err(PipelineError::Storage(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid artifact key {key}"),
            )));
        }

        let lock = self.dataset_lock(&key.dataset_id);
        let _guard = lock.lock().await;

        let mut manifest = self.load_manifest(&key.dataset_id).await?.unwrap_or_default();
        let entry = manifest.models.entry(key.model_name.clone()).or_default();
        let version = entry.versions.iter().copied().max().unwrap_or(0).max(entry.current) + 1;
        bundle.version = version;

        let payload = serde_json::to_string(&bundle)?;
        // A payload that does not parse back must never become the current version
        serde_json::from_str::<ArtifactBundle>(&payload)?;
        let envelope = Envelope {
            checksum: compute_checksum(payload.as_bytes()),
            payload,
        };
        let path = self.version_path(&key, version);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(&path, &serde_json::to_vec(&envelope)?).await?;

        entry.current = version;
        entry.versions.push(version);
        let mut pruned = Vec::new();
        while entry.versions.len() > self.versions_to_keep {
            pruned.push(entry.versions.remove(0));
        }

        if bundle.is_best {
            manifest.best = Some(key.model_name.clone());
        } else if manifest.best.as_deref() == Some(key.model_name.as_str()) {
            manifest.best = None;
        }
        self.store_manifest(&key.dataset_id, &manifest).await?;

        for old in pruned {
            let old_path = self.version_path(&key, old);
            if let Err(e) = tokio::fs::remove_file(&old_path).await {
                warn!(
                    path = %old_path.display(),
                    error = %e,
                    "Failed to remove old artifact version"
                );
            }
        }

        info!(
            artifact = %key,
            version,
            checksum = %envelope.checksum,
            is_best = bundle.is_best,
            "Artifact written"
        );
        Ok(bundle)
    }

    async fn read(&self, key: &ArtifactKey) -> PipelineResult<ArtifactBundle> {
        if !is_safe_id(&key.dataset_id) || !is_safe_id(&key.model_name) {
            return Err(not_found(key));
        }
        let manifest = self
            .load_manifest(&key.dataset_id)
            .await?
            .ok_or_else(|| not_found(key))?;
        self.read_with(key, &manifest).await
    }

    async fn read_best(&self, dataset_id: &str) -> PipelineResult<ArtifactBundle> {
        let missing = || PipelineError::ArtifactNotFound {
            dataset_id: dataset_id.to_string(),
            model_name: "best".to_string(),
        };
        if !is_safe_id(dataset_id) {
            return Err(missing());
        }
        let manifest = self.load_manifest(dataset_id).await?.ok_or_else(missing)?;
        let best = manifest.best.clone().ok_or_else(missing)?;
        self.read_with(&ArtifactKey::new(dataset_id, best), &manifest).await
    }

    async fn list(&self, dataset_id: &str) -> PipelineResult<Vec<ArtifactBundle>> {
        if !is_safe_id(dataset_id) {
            return Ok(Vec::new());
        }
        let Some(manifest) = self.load_manifest(dataset_id).await? else {
            return Ok(Vec::new());
        };

        let mut bundles = Vec::with_capacity(manifest.models.len());
        for model_name in manifest.models.keys() {
            let key = ArtifactKey::new(dataset_id, model_name.clone());
            bundles.push(self.read_with(&key, &manifest).await?);
        }
        Ok(bundles)
    }

    async fn delete(&self, key: &ArtifactKey) -> PipelineResult<()> {
        if !is_safe_id(&key.dataset_id) || !is_safe_id(&key.model_name) {
            return Err(not_found(key));
        }

        let lock = self.dataset_lock(&key.dataset_id);
        let _guard = lock.lock().await;

        let mut manifest = self
            .load_manifest(&key.dataset_id)
            .await?
            .ok_or_else(|| not_found(key))?;
        if manifest.models.remove(&key.model_name).is_none() {
            return Err(not_found(key));
        }
        if manifest.best.as_deref() == Some(key.model_name.as_str()) {
            manifest.best = None;
        }

        if manifest.models.is_empty() {
            tokio::fs::remove_dir_all(self.dataset_dir(&key.dataset_id)).await?;
        } else {
            self.store_manifest(&key.dataset_id, &manifest).await?;
            let model_dir = self.dataset_dir(&key.dataset_id).join(&key.model_name);
            if let Err(e) = tokio::fs::remove_dir_all(&model_dir).await {
                warn!(path = %model_dir.display(), error = %e, "Failed to remove model directory");
            }
        }

        debug!(artifact = %key, "Artifact deleted");
        Ok(())
    }

    async fn delete_dataset(&self, dataset_id: &str) -> PipelineResult<usize> {
        if !is_safe_id(dataset_id) {
            return Ok(0);
        }

        let lock = self.dataset_lock(dataset_id);
        let _guard = lock.lock().await;

        let Some(manifest) = self.load_manifest(dataset_id).await? else {
            return Ok(0);
        };
        tokio::fs::remove_dir_all(self.dataset_dir(dataset_id)).await?;

        debug!(dataset_id, removed = manifest.models.len(), "Dataset artifacts deleted");
        Ok(manifest.models.len())
    }
}

fn not_found(key: &ArtifactKey) -> PipelineError {
    PipelineError::ArtifactNotFound {
        dataset_id: key.dataset_id.clone(),
        model_name: key.model_name.clone(),
    }
}

/// Write to a sibling temp file, sync, then rename over `path`
async fn write_atomic(path: &Path, bytes: &[u8]) -> PipelineResult<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}
