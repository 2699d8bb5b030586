//! Off-runtime, single-flight training runs
//!
//! Fitting is CPU-bound, so it runs on the blocking pool. Only one run per
//! dataset and algorithm set may be in flight; a second request for the
//! same key is rejected rather than queued. A caller timeout raises the
//! run's cancellation flag, which the trainer checks between algorithms.

use crate::dataset::{Dataset, DatasetSource};
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::observability::PipelineMetrics;
use crate::pipeline::{TrainingPipeline, TrainingReport, TrainingRequest};
use crate::trainer::Algorithm;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct TrainingCoordinator {
    pipeline: TrainingPipeline,
    source: Arc<dyn DatasetSource>,
    in_flight: Arc<DashMap<String, ()>>,
    metrics: PipelineMetrics,
}

/// Releases a single-flight key on drop
struct RunGuard {
    key: String,
    in_flight: Arc<DashMap<String, ()>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

impl TrainingCoordinator {
    pub fn new(pipeline: TrainingPipeline, source: Arc<dyn DatasetSource>) -> Self {
        Self {
            pipeline,
            source,
            in_flight: Arc::new(DashMap::new()),
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn pipeline(&self) -> &TrainingPipeline {
        &self.pipeline
    }

    /// Number of runs currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Single-flight key: dataset id plus the sorted set of registry names
    ///
    /// Aliases collapse to their registry name and unknown names are
    /// ignored, matching what the trainer will actually fit.
    pub fn run_key(&self, request: &TrainingRequest) -> String {
        let mut algorithms: Vec<&'static str> = self
            .pipeline
            .algorithms_for(request)
            .iter()
            .filter_map(|name| Algorithm::from_name(name))
            .map(|algorithm| algorithm.name())
            .collect();
        algorithms.sort_unstable();
        algorithms.dedup();
        format!("{}[{}]", request.dataset_id, algorithms.join(","))
    }

    fn claim(&self, key: String) -> PipelineResult<RunGuard> {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => Err(PipelineError::Conflict { key }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(RunGuard {
                    key,
                    in_flight: self.in_flight.clone(),
                })
            }
        }
    }

    /// Load the dataset by id and train on it
    pub async fn train(
        &self,
        request: TrainingRequest,
        timeout: Option<Duration>,
    ) -> PipelineResult<TrainingReport> {
        let _guard = self.claim(self.run_key(&request))?;
        let dataset = self.source.load(&request.dataset_id).await?;
        self.run_claimed(request, dataset, timeout).await
    }

    /// Train on an already loaded dataset
    pub async fn train_dataset(
        &self,
        request: TrainingRequest,
        dataset: Dataset,
        timeout: Option<Duration>,
    ) -> PipelineResult<TrainingReport> {
        let _guard = self.claim(self.run_key(&request))?;
        self.run_claimed(request, dataset, timeout).await
    }

    async fn run_claimed(
        &self,
        request: TrainingRequest,
        dataset: Dataset,
        timeout: Option<Duration>,
    ) -> PipelineResult<TrainingReport> {
        let _in_flight = self.metrics.training_started();
        let cancel = Arc::new(AtomicBool::new(false));

        let pipeline = self.pipeline.clone();
        let flag = cancel.clone();
        let mut handle =
            tokio::task::spawn_blocking(move || pipeline.fit(&request, &dataset, &flag));

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(timeout_ms = limit.as_millis() as u64, "Training timed out, cancelling");
                    cancel.store(true, Ordering::SeqCst);
                    // Wait for the worker so the key is not released while it still runs
                    let _ = handle.await;
                    return Err(PipelineError::Cancelled {
                        stage: Stage::Training,
                    });
                }
            },
            None => handle.await,
        };

        let fitted = match joined {
            Ok(result) => result?,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => {
                return Err(PipelineError::Cancelled {
                    stage: Stage::Training,
                })
            }
        };

        debug!(dataset_id = %fitted.dataset_id, "Fit finished, persisting");
        self.pipeline.persist(fitted).await
    }
}
