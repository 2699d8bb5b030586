//! Model training
//!
//! Algorithms are looked up by name in a fixed registry, fit on the
//! training split and scored on the held-out split. Every algorithm yields
//! a `Result`; failures are logged and skipped, and the run only fails
//! when nothing succeeded.

mod bayes;
mod boosting;
mod centroid;
mod forest;
mod knn;
mod logistic;
pub mod metrics;
pub mod split;
mod tree;

pub use bayes::GaussianNaiveBayes;
pub use boosting::GradientBoosting;
pub use centroid::NearestCentroid;
pub use forest::RandomForest;
pub use knn::KNearestNeighbors;
pub use logistic::LogisticRegression;
pub use metrics::ModelMetrics;
pub use split::{train_test_split, TrainTestSplit};
pub use tree::DecisionTree;

use crate::config::PipelineConfig;
use crate::error::{ModelError, PipelineError, PipelineResult, Stage};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// A classifier that can be fit and queried
///
/// `predict_proba` is optional; models without it are scored with their
/// predicted label as a pseudo-probability.
pub trait Trainable {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), ModelError>;

    fn predict(&self, x: ArrayView2<f64>) -> Vec<usize>;

    fn predict_proba(&self, _x: ArrayView2<f64>) -> Option<Array2<f64>> {
        None
    }

    /// Non-negative per-feature weights, in feature order
    fn feature_importances(&self) -> Vec<f64>;
}

/// Algorithms known to the trainer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Logistic,
    RandomForest,
    GradientBoosting,
    DecisionTree,
    NearestCentroid,
    Knn,
    NaiveBayes,
}

impl Algorithm {
    pub const ALL: [Algorithm; 7] = [
        Algorithm::RandomForest,
        Algorithm::Logistic,
        Algorithm::GradientBoosting,
        Algorithm::DecisionTree,
        Algorithm::NearestCentroid,
        Algorithm::Knn,
        Algorithm::NaiveBayes,
    ];

    /// Look up a registry name; `xgboost` is accepted for gradient boosting
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "logistic" | "logistic_regression" => Some(Algorithm::Logistic),
            "random_forest" => Some(Algorithm::RandomForest),
            "gradient_boosting" | "xgboost" => Some(Algorithm::GradientBoosting),
            "decision_tree" => Some(Algorithm::DecisionTree),
            "nearest_centroid" => Some(Algorithm::NearestCentroid),
            "knn" | "k_nearest_neighbors" => Some(Algorithm::Knn),
            "naive_bayes" | "naivebayes" | "gaussian_nb" => Some(Algorithm::NaiveBayes),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Logistic => "logistic",
            Algorithm::RandomForest => "random_forest",
            Algorithm::GradientBoosting => "gradient_boosting",
            Algorithm::DecisionTree => "decision_tree",
            Algorithm::NearestCentroid => "nearest_centroid",
            Algorithm::Knn => "knn",
            Algorithm::NaiveBayes => "naive_bayes",
        }
    }

    /// Unfitted model configured from `config`
    pub fn instantiate(&self, config: &PipelineConfig) -> Model {
        match self {
            Algorithm::Logistic => Model::Logistic(LogisticRegression::new(&config.logistic)),
            Algorithm::RandomForest => {
                Model::RandomForest(RandomForest::new(&config.forest, config.seed))
            }
            Algorithm::GradientBoosting => {
                Model::GradientBoosting(GradientBoosting::new(&config.boosting))
            }
            Algorithm::DecisionTree => Model::DecisionTree(DecisionTree::new(&config.tree)),
            Algorithm::NearestCentroid => Model::NearestCentroid(NearestCentroid::new()),
            Algorithm::Knn => Model::Knn(KNearestNeighbors::new(&config.knn)),
            Algorithm::NaiveBayes => Model::NaiveBayes(GaussianNaiveBayes::new(&config.naive_bayes)),
        }
    }
}

/// Serializable model of any registered algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Model {
    Logistic(LogisticRegression),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
    DecisionTree(DecisionTree),
    NearestCentroid(NearestCentroid),
    Knn(KNearestNeighbors),
    NaiveBayes(GaussianNaiveBayes),
}

impl Model {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Model::Logistic(_) => Algorithm::Logistic,
            Model::RandomForest(_) => Algorithm::RandomForest,
            Model::GradientBoosting(_) => Algorithm::GradientBoosting,
            Model::DecisionTree(_) => Algorithm::DecisionTree,
            Model::NearestCentroid(_) => Algorithm::NearestCentroid,
            Model::Knn(_) => Algorithm::Knn,
            Model::NaiveBayes(_) => Algorithm::NaiveBayes,
        }
    }

    fn inner(&self) -> &dyn Trainable {
        match self {
            Model::Logistic(m) => m,
            Model::RandomForest(m) => m,
            Model::GradientBoosting(m) => m,
            Model::DecisionTree(m) => m,
            Model::NearestCentroid(m) => m,
            Model::Knn(m) => m,
            Model::NaiveBayes(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Trainable {
        match self {
            Model::Logistic(m) => m,
            Model::RandomForest(m) => m,
            Model::GradientBoosting(m) => m,
            Model::DecisionTree(m) => m,
            Model::NearestCentroid(m) => m,
            Model::Knn(m) => m,
            Model::NaiveBayes(m) => m,
        }
    }

    /// Class probabilities, or a one-hot of the predicted label when the
    /// model has no probability output
    pub fn probabilities(&self, x: ArrayView2<f64>, n_classes: usize) -> Array2<f64> {
        if let Some(proba) = self.predict_proba(x) {
            return proba;
        }
        let mut pseudo = Array2::zeros((x.nrows(), n_classes));
        for (i, label) in self.predict(x).into_iter().enumerate() {
            if label < n_classes {
                pseudo[[i, label]] = 1.0;
            }
        }
        pseudo
    }
}

impl Trainable for Model {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), ModelError> {
        self.inner_mut().fit(x, y, n_classes)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Vec<usize> {
        self.inner().predict(x)
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Option<Array2<f64>> {
        self.inner().predict_proba(x)
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.inner().feature_importances()
    }
}

/// A trained-but-not-yet-selected model
#[derive(Debug, Clone)]
pub struct TrainedCandidate {
    pub name: String,
    pub model: Model,
    pub metrics: ModelMetrics,
}

/// Why one algorithm produced no candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFailure {
    pub name: String,
    pub reason: String,
}

/// Matrices and labels for one run
#[derive(Debug, Clone, Copy)]
pub struct TrainingData<'a> {
    pub x_train: ArrayView2<'a, f64>,
    pub y_train: &'a [usize],
    pub x_test: ArrayView2<'a, f64>,
    pub y_test: &'a [usize],
    pub n_classes: usize,
}

/// Everything a training pass produced
#[derive(Debug, Clone, Default)]
pub struct TrainingOutcome {
    /// Successful candidates in training order
    pub candidates: Vec<TrainedCandidate>,
    pub failures: Vec<CandidateFailure>,
    /// Requested names not in the registry
    pub unknown: Vec<String>,
}

/// Fits the requested algorithms one after another
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    config: PipelineConfig,
}

impl ModelTrainer {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Train every known algorithm in `names`
    ///
    /// Unknown names and duplicate aliases are skipped. `cancel` is checked
    /// before each algorithm starts.
    pub fn train(
        &self,
        data: TrainingData<'_>,
        names: &[String],
        cancel: &AtomicBool,
    ) -> PipelineResult<TrainingOutcome> {
        let mut outcome = TrainingOutcome::default();
        let mut selected = Vec::new();
        let mut seen = HashSet::new();
        for name in names {
            match Algorithm::from_name(name) {
                Some(algorithm) => {
                    if seen.insert(algorithm) {
                        selected.push(algorithm);
                    }
                }
                None => {
                    warn!(algorithm = %name, "Unknown algorithm requested, skipping");
                    outcome.unknown.push(name.clone());
                }
            }
        }

        let mut results = Vec::with_capacity(selected.len());
        for algorithm in &selected {
            if cancel.load(Ordering::SeqCst) {
                return Err(PipelineError::Cancelled {
                    stage: Stage::Training,
                });
            }
            results.push(self.train_one(*algorithm, data));
        }

        for result in results {
            match result {
                Ok(candidate) => outcome.candidates.push(candidate),
                Err(failure) => outcome.failures.push(failure),
            }
        }

        if outcome.candidates.is_empty() {
            return Err(PipelineError::AllModelsFailed {
                attempted: selected.len(),
                failures: outcome
                    .failures
                    .iter()
                    .map(|f| format!("{}: {}", f.name, f.reason))
                    .collect(),
            });
        }

        info!(
            trained = outcome.candidates.len(),
            failed = outcome.failures.len(),
            unknown = outcome.unknown.len(),
            "Training pass finished"
        );
        Ok(outcome)
    }

    fn train_one(
        &self,
        algorithm: Algorithm,
        data: TrainingData<'_>,
    ) -> Result<TrainedCandidate, CandidateFailure> {
        let name = algorithm.name().to_string();
        let started = Instant::now();
        let mut model = algorithm.instantiate(&self.config);

        if let Err(e) = model.fit(data.x_train, data.y_train, data.n_classes) {
            warn!(algorithm = %name, error = %e, "Algorithm failed to train");
            return Err(CandidateFailure {
                name,
                reason: e.to_string(),
            });
        }
        let training_time = started.elapsed().as_secs_f64();

        let predictions = model.predict(data.x_test);
        let proba = model.predict_proba(data.x_test);
        let metrics = metrics::evaluate(
            data.y_test,
            &predictions,
            proba.as_ref(),
            data.n_classes,
            training_time,
        );

        debug!(
            algorithm = %name,
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            auc = metrics.auc_score,
            auc_fallback = metrics.auc_is_fallback,
            "Candidate scored"
        );

        Ok(TrainedCandidate {
            name,
            model,
            metrics,
        })
    }
}

/// Validate shapes and labels before fitting
pub(crate) fn check_input(
    x: ArrayView2<f64>,
    y: &[usize],
    n_classes: usize,
) -> Result<(), ModelError> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(ModelError::EmptyInput);
    }
    if x.nrows() != y.len() {
        return Err(ModelError::ShapeMismatch {
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    if let Some(&bad) = y.iter().find(|&&label| label >= n_classes) {
        return Err(ModelError::ShapeMismatch {
            expected: n_classes,
            actual: bad + 1,
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite);
    }
    let distinct: HashSet<usize> = y.iter().copied().collect();
    if distinct.len() < 2 {
        return Err(ModelError::SingleClass);
    }
    Ok(())
}

/// Between-class spread of each feature's class means relative to its
/// overall variance, normalised to sum 1
///
/// Classes without rows are left out.
pub(crate) fn class_mean_spread(x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut sums = Array2::<f64>::zeros((n_classes, x.ncols()));
    let mut counts = vec![0usize; n_classes];
    for (row, &label) in x.rows().into_iter().zip(y) {
        let mut target = sums.row_mut(label);
        target += &row;
        counts[label] += 1;
    }
    let total_var = x.var_axis(Axis(0), 0.0);

    let raw: Vec<f64> = (0..x.ncols())
        .map(|j| {
            let means: Vec<f64> = (0..n_classes)
                .filter(|&c| counts[c] > 0)
                .map(|c| sums[[c, j]] / counts[c] as f64)
                .collect();
            let n = means.len().max(1) as f64;
            let grand = means.iter().sum::<f64>() / n;
            let spread = means.iter().map(|m| (m - grand).powi(2)).sum::<f64>() / n;
            if total_var[j] > 0.0 {
                spread / total_var[j]
            } else {
                0.0
            }
        })
        .collect();
    let total: f64 = raw.iter().sum();
    if total > 0.0 {
        raw.iter().map(|v| v / total).collect()
    } else {
        raw
    }
}

/// Index of the largest value; ties go to the lowest index
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Row-wise numerically stable softmax, in place
pub(crate) fn softmax_rows(scores: &mut Array2<f64>) {
    for mut row in scores.rows_mut() {
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }
}
