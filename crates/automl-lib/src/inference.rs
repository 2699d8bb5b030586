//! Single-record scoring against a stored artifact bundle
//!
//! The record is replayed through the bundle's own preprocessing plan, so
//! missing fields, extra fields and unseen categories never fail a
//! prediction. Only a missing bundle is an error.

use crate::artifact::{ArtifactBundle, ArtifactKey, ArtifactStore};
use crate::config::RiskThresholds;
use crate::dataset::Record;
use crate::error::PipelineResult;
use crate::observability::{PipelineMetrics, StructuredLogger};
use crate::preprocess::PreprocessingExecutor;
use crate::trainer::Trainable;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Number of features reported as contributors
const TOP_FEATURES: usize = 3;

/// Three-level bucketing of a predicted probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// `p > high` is High, `p >= medium` is Medium, anything else Low
    pub fn from_probability(probability: f64, thresholds: &RiskThresholds) -> Self {
        if probability > thresholds.high {
            RiskTier::High
        } else if probability >= thresholds.medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskTier::Low => "Normal operation - low risk detected",
            RiskTier::Medium => "Monitor closely - moderate risk detected",
            RiskTier::High => "Immediate attention required - high risk detected",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    /// Importance times the magnitude of the standardised value
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub dataset_id: String,
    pub model_name: String,
    pub artifact_version: u64,
    /// Encoded class
    pub prediction: usize,
    /// Class as it appeared in the training data
    pub label: String,
    pub probability: f64,
    pub risk_level: RiskTier,
    pub recommendation: String,
    pub top_contributing_features: Vec<FeatureContribution>,
}

/// Scores records with bundles loaded from an [`ArtifactStore`]
#[derive(Clone)]
pub struct InferenceEngine {
    store: Arc<dyn ArtifactStore>,
    thresholds: RiskThresholds,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl InferenceEngine {
    pub fn new(store: Arc<dyn ArtifactStore>, thresholds: RiskThresholds) -> Self {
        Self {
            store,
            thresholds,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("inference"),
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Score `record` with the named model, or the dataset's best model
    pub async fn predict(
        &self,
        dataset_id: &str,
        model_name: Option<&str>,
        record: &Record,
    ) -> PipelineResult<PredictionResult> {
        let start = Instant::now();
        let loaded = match model_name {
            Some(name) => self.store.read(&ArtifactKey::new(dataset_id, name)).await,
            None => self.store.read_best(dataset_id).await,
        };
        let bundle = match loaded {
            Ok(bundle) => bundle,
            Err(e) => {
                self.metrics.inc_prediction_errors();
                return Err(e);
            }
        };

        let result = self.score(&bundle, record);

        self.metrics.observe_prediction_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_prediction(result.risk_level.as_str());
        self.logger.log_prediction(
            &result.dataset_id,
            &result.model_name,
            result.artifact_version,
            result.probability,
            result.risk_level.as_str(),
        );
        Ok(result)
    }

    /// Score `record` with an already loaded bundle
    pub fn score(&self, bundle: &ArtifactBundle, record: &Record) -> PredictionResult {
        score_bundle(bundle, record, &self.thresholds)
    }
}

/// Pure scoring path shared by the engine and offline callers
pub fn score_bundle(bundle: &ArtifactBundle, record: &Record, thresholds: &RiskThresholds) -> PredictionResult {
    let plan = &bundle.plan;
    let n_classes = plan.target.n_classes();
    let features = PreprocessingExecutor::transform_record(plan, record);
    let x = features.view().insert_axis(Axis(0));

    let prediction = bundle.model.predict(x).first().copied().unwrap_or(0);
    let proba = bundle.model.probabilities(x, n_classes);
    let column = if n_classes == 2 { 1 } else { prediction };
    let raw = proba.get([0, column]).copied().unwrap_or(0.0);
    let probability = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
    let risk_level = RiskTier::from_probability(probability, thresholds);

    let importances = bundle.model.feature_importances();
    let mut contributions: Vec<FeatureContribution> = plan
        .feature_names
        .iter()
        .zip(features.iter())
        .zip(importances.iter().chain(std::iter::repeat(&0.0)))
        .map(|((name, value), importance)| FeatureContribution {
            feature: name.clone(),
            score: importance * value.abs(),
        })
        .filter(|c| c.score > 0.0 && c.score.is_finite())
        .collect();
    contributions.sort_by(|a, b| b.score.total_cmp(&a.score));
    contributions.truncate(TOP_FEATURES);

    PredictionResult {
        dataset_id: bundle.key.dataset_id.clone(),
        model_name: bundle.key.model_name.clone(),
        artifact_version: bundle.version,
        prediction,
        label: plan.target.decode(prediction),
        probability,
        risk_level,
        recommendation: risk_level.recommendation().to_string(),
        top_contributing_features: contributions,
    }
}
