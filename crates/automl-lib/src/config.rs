//! Pipeline configuration
//!
//! All tunables for profiling, target resolution, splitting, training,
//! selection and risk bucketing. Deserializable so the server can layer
//! file and environment sources over the defaults.

use crate::selector::SelectionMetric;
use serde::{Deserialize, Serialize};

/// Minimum rows required before a train/test split is attempted
pub const MIN_ROWS: usize = 10;

/// Below this many rows the larger test fraction is used
pub const SMALL_DATASET_ROWS: usize = 50;

/// Top-level configuration for a training run and for inference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seed for splitting and for stochastic learners
    pub seed: u64,
    pub min_rows: usize,
    pub small_dataset_rows: usize,
    pub small_test_fraction: f64,
    pub test_fraction: f64,
    /// Substrings that mark a column as an identifier
    pub identifier_patterns: Vec<String>,
    /// Distinct/rows ratio above which a text column is dropped
    pub high_cardinality_ratio: f64,
    /// Share of parseable cells for a text column to count as numeric-looking
    pub numeric_text_ratio: f64,
    /// Column names (case-insensitive) that are taken as the label
    pub target_candidates: Vec<String>,
    /// Numeric column to binarise at its median when no label column exists
    pub preferred_metric_column: Option<String>,
    pub selection_metric: SelectionMetric,
    pub default_algorithms: Vec<String>,
    pub risk: RiskThresholds,
    pub logistic: LogisticParams,
    pub forest: ForestParams,
    pub boosting: BoostingParams,
    pub tree: TreeParams,
    pub knn: KnnParams,
    pub naive_bayes: NaiveBayesParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            min_rows: MIN_ROWS,
            small_dataset_rows: SMALL_DATASET_ROWS,
            small_test_fraction: 0.3,
            test_fraction: 0.2,
            identifier_patterns: ["id", "name", "code", "serial"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            high_cardinality_ratio: 0.7,
            numeric_text_ratio: 0.8,
            target_candidates: ["churn", "target", "label", "class", "outcome"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            preferred_metric_column: None,
            selection_metric: SelectionMetric::Accuracy,
            default_algorithms: vec!["random_forest".to_string(), "logistic".to_string()],
            risk: RiskThresholds::default(),
            logistic: LogisticParams::default(),
            forest: ForestParams::default(),
            boosting: BoostingParams::default(),
            tree: TreeParams::default(),
            knn: KnnParams::default(),
            naive_bayes: NaiveBayesParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Test fraction for a dataset of the given size
    pub fn test_fraction_for(&self, rows: usize) -> f64 {
        if rows < self.small_dataset_rows {
            self.small_test_fraction
        } else {
            self.test_fraction
        }
    }
}

/// Probability cut points for risk tiers
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Probabilities below this are low risk
    pub medium: f64,
    /// Probabilities above this are high risk
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 0.4,
            high: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub l2: f64,
    pub tolerance: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            max_iter: 1000,
            l2: 1e-3,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 8,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 12,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// L2 regularisation on leaf weights
    pub lambda: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            lambda: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnParams {
    pub n_neighbors: usize,
}

impl Default for KnnParams {
    fn default() -> Self {
        Self { n_neighbors: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveBayesParams {
    /// Share of the largest feature variance added to every variance
    pub var_smoothing: f64,
}

impl Default for NaiveBayesParams {
    fn default() -> Self {
        Self {
            var_smoothing: 1e-9,
        }
    }
}
