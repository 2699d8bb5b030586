//! End-to-end training run
//!
//! A run cleans and profiles the dataset, resolves the label, fits a
//! preprocessing plan on the training split only, trains the requested
//! algorithms, ranks them and persists every candidate as its own bundle.
//! The CPU-bound part ([`TrainingPipeline::fit`]) is synchronous so callers
//! can move it off the async runtime; persistence is async.

use crate::artifact::{ArtifactBundle, ArtifactKey, ArtifactStore};
use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::error::{PipelineError, PipelineResult};
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::preprocess::{PreprocessingExecutor, PreprocessingPlan};
use crate::profiler::SchemaProfiler;
use crate::selector::{ModelSelector, Selection, SelectionMetric};
use crate::target::TargetResolver;
use crate::trainer::{
    train_test_split, CandidateFailure, ModelMetrics, ModelTrainer, TrainingData,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

#[cfg(test)]
mod tests;

/// What to train
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub dataset_id: String,
    /// Registry names; empty means the configured defaults
    #[serde(default)]
    pub algorithms: Vec<String>,
    #[serde(default)]
    pub target_column: Option<String>,
}

impl TrainingRequest {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            ..Default::default()
        }
    }

    pub fn with_algorithms<I, S>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.algorithms = algorithms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_target(mut self, target_column: impl Into<String>) -> Self {
        self.target_column = Some(target_column.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
}

/// One stage of a run, for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStep {
    pub step: String,
    pub status: StepStatus,
    pub details: serde_json::Value,
}

impl TrainingStep {
    fn completed(step: &str, details: serde_json::Value) -> Self {
        Self {
            step: step.to_string(),
            status: StepStatus::Completed,
            details,
        }
    }
}

/// Held-out scores of one persisted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    pub accuracy: f64,
    pub f1_score: f64,
    pub auc_score: f64,
    pub training_time: f64,
}

impl ModelSummary {
    fn new(name: &str, metrics: &ModelMetrics) -> Self {
        Self {
            name: name.to_string(),
            accuracy: metrics.accuracy,
            f1_score: metrics.f1_score,
            auc_score: metrics.auc_score,
            training_time: metrics.training_time,
        }
    }
}

/// Caller-facing result of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub dataset_id: String,
    pub target_column: String,
    pub training_steps: Vec<TrainingStep>,
    /// Ranked best-first by `selection_metric`
    pub models: Vec<ModelSummary>,
    pub best_model: String,
    pub selection_metric: SelectionMetric,
}

/// Output of the CPU-bound half of a run, ready to persist
#[derive(Debug, Clone)]
pub struct FittedRun {
    pub dataset_id: String,
    pub plan: PreprocessingPlan,
    pub selection: Selection,
    pub failures: Vec<CandidateFailure>,
    pub steps: Vec<TrainingStep>,
    started: Instant,
}

#[derive(Clone)]
pub struct TrainingPipeline {
    config: PipelineConfig,
    store: Arc<dyn ArtifactStore>,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            store,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("training"),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Algorithms a request resolves to
    pub fn algorithms_for(&self, request: &TrainingRequest) -> Vec<String> {
        if request.algorithms.is_empty() {
            self.config.default_algorithms.clone()
        } else {
            request.algorithms.clone()
        }
    }

    /// Fit, then persist
    pub async fn run(
        &self,
        request: &TrainingRequest,
        dataset: &Dataset,
        cancel: &AtomicBool,
    ) -> PipelineResult<TrainingReport> {
        let fitted = self.fit(request, dataset, cancel)?;
        self.persist(fitted).await
    }

    /// Everything up to and including selection
    pub fn fit(
        &self,
        request: &TrainingRequest,
        dataset: &Dataset,
        cancel: &AtomicBool,
    ) -> PipelineResult<FittedRun> {
        let started = Instant::now();
        let algorithms = self.algorithms_for(request);
        self.logger
            .log_training_started(&request.dataset_id, &algorithms, dataset.row_count());

        if dataset.row_count() == 0 {
            return Err(PipelineError::EmptyDataset);
        }
        let mut steps = Vec::new();

        let (cleaned, cleaning) = dataset.clean();
        steps.push(TrainingStep::completed(
            "cleaning",
            json!({
                "rows_before": dataset.row_count(),
                "rows_after": cleaned.row_count(),
                "empty_rows_removed": cleaning.empty_rows_removed,
                "duplicate_rows_removed": cleaning.duplicate_rows_removed,
            }),
        ));

        let explicit = request.target_column.as_deref();
        let profile = SchemaProfiler::new(&self.config).profile(&cleaned, explicit)?;
        let dropped = profile.dropped_columns();
        steps.push(TrainingStep::completed(
            "profiling",
            json!({
                "rows": profile.row_count,
                "columns": profile.column_count,
                "completeness": profile.completeness,
                "duplicates": profile.duplicate_count,
                "dropped_columns": dropped,
            }),
        ));

        let candidates_view = cleaned.drop_columns(&dropped);
        let target = TargetResolver::new(&self.config).resolve(&candidates_view, &profile, explicit)?;

        let labels = target.labels(&cleaned);
        let keep: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter_map(|(i, label)| label.map(|_| i))
            .collect();
        let y: Vec<usize> = labels.into_iter().flatten().collect();
        steps.push(TrainingStep::completed(
            "target_resolution",
            json!({
                "target_column": target.column,
                "source": target.source,
                "classes": target.classes,
                "rows_without_label": cleaned.row_count() - keep.len(),
            }),
        ));

        if keep.len() < self.config.min_rows {
            return Err(PipelineError::InsufficientRows {
                rows: keep.len(),
                min: self.config.min_rows,
            });
        }
        let usable = cleaned.select_rows(&keep);

        let test_fraction = self.config.test_fraction_for(usable.row_count());
        let split = train_test_split(&y, test_fraction, self.config.seed);
        let train = usable.select_rows(&split.train);
        let test = usable.select_rows(&split.test);

        let plan = PreprocessingExecutor::fit(&train, &profile, &target)?;
        let x_train = PreprocessingExecutor::transform(&plan, &train);
        let x_test = PreprocessingExecutor::transform(&plan, &test);
        let y_train: Vec<usize> = split.train.iter().map(|&i| y[i]).collect();
        let y_test: Vec<usize> = split.test.iter().map(|&i| y[i]).collect();
        steps.push(TrainingStep::completed(
            "preprocessing",
            json!({
                "features": plan.feature_names,
                "steps": plan.summary(),
                "train_rows": split.train.len(),
                "test_rows": split.test.len(),
                "test_fraction": test_fraction,
                "stratified": split.stratified,
            }),
        ));

        let data = TrainingData {
            x_train: x_train.view(),
            y_train: &y_train,
            x_test: x_test.view(),
            y_test: &y_test,
            n_classes: target.n_classes(),
        };
        let outcome = ModelTrainer::new(self.config.clone()).train(data, &algorithms, cancel)?;

        for candidate in &outcome.candidates {
            self.logger.log_candidate_trained(
                &request.dataset_id,
                &candidate.name,
                candidate.metrics.accuracy,
                candidate.metrics.f1_score,
                candidate.metrics.auc_score,
                candidate.metrics.training_time,
            );
        }
        for failure in &outcome.failures {
            self.logger
                .log_candidate_failed(&request.dataset_id, &failure.name, &failure.reason);
        }
        self.metrics.inc_candidates_trained(outcome.candidates.len() as u64);
        self.metrics.inc_candidates_failed(outcome.failures.len() as u64);

        steps.push(TrainingStep::completed(
            "training",
            json!({
                "trained": outcome.candidates.iter().map(|c| &c.name).collect::<Vec<_>>(),
                "failed": outcome.failures,
                "unknown_algorithms": outcome.unknown,
            }),
        ));

        let selection =
            ModelSelector::new(self.config.selection_metric).select(outcome.candidates)?;
        let winner = selection.winner();
        let score = selection.metric.value(&winner.metrics);
        self.logger.log_model_selected(
            &request.dataset_id,
            &winner.name,
            selection.metric.as_str(),
            score,
        );
        steps.push(TrainingStep::completed(
            "evaluation",
            json!({
                "metric": selection.metric,
                "best_model": winner.name,
                "best_score": score,
                "ranking": selection.ranked.iter().map(|c| &c.name).collect::<Vec<_>>(),
            }),
        ));

        Ok(FittedRun {
            dataset_id: request.dataset_id.clone(),
            plan,
            selection,
            failures: outcome.failures,
            steps,
            started,
        })
    }

    /// Write every candidate, winner first, and build the report
    pub async fn persist(&self, fitted: FittedRun) -> PipelineResult<TrainingReport> {
        let FittedRun {
            dataset_id,
            plan,
            selection,
            mut steps,
            started,
            ..
        } = fitted;

        let best_model = selection.winner().name.clone();
        let mut models = Vec::with_capacity(selection.ranked.len());
        let mut versions = serde_json::Map::new();

        for (rank, candidate) in selection.ranked.into_iter().enumerate() {
            models.push(ModelSummary::new(&candidate.name, &candidate.metrics));
            let bundle = ArtifactBundle::new(
                ArtifactKey::new(dataset_id.clone(), candidate.name.clone()),
                candidate.model,
                plan.clone(),
                candidate.metrics,
                rank == 0,
            );
            let stored = self.store.write(bundle).await?;
            self.metrics.inc_artifacts_written();
            self.logger
                .log_artifact_written(&dataset_id, &candidate.name, stored.version, stored.is_best);
            versions.insert(candidate.name, json!(stored.version));
        }

        steps.push(TrainingStep::completed(
            "persistence",
            json!({ "artifacts": versions, "best_model": best_model }),
        ));

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.observe_training_duration(elapsed);
        debug!(dataset_id = %dataset_id, elapsed_secs = elapsed, "Training run finished");

        Ok(TrainingReport {
            dataset_id,
            target_column: plan.target_column().to_string(),
            training_steps: steps,
            models,
            best_model,
            selection_metric: selection.metric,
        })
    }
}
