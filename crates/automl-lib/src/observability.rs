//! Observability for training runs and prediction serving
//!
//! Provides:
//! - Prometheus metrics (training duration, prediction latency, candidate outcomes, risk tiers)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for whole training runs (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0];

/// Histogram buckets for single-record predictions (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    training_duration_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    candidates_trained: IntCounter,
    candidates_failed: IntCounter,
    predictions_by_tier: IntCounterVec,
    prediction_errors: IntCounter,
    artifacts_written: IntCounter,
    trainings_in_flight: IntGauge,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            training_duration_seconds: register_histogram!(
                "automl_training_duration_seconds",
                "Wall time of complete training runs",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            prediction_latency_seconds: register_histogram!(
                "automl_prediction_latency_seconds",
                "Time spent scoring a single record",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            candidates_trained: register_int_counter!(
                "automl_candidates_trained_total",
                "Candidate models fitted and evaluated"
            )
            .expect("Failed to register candidates_trained"),

            candidates_failed: register_int_counter!(
                "automl_candidates_failed_total",
                "Candidate models that failed to fit"
            )
            .expect("Failed to register candidates_failed"),

            predictions_by_tier: register_int_counter_vec!(
                "automl_predictions_total",
                "Predictions served, by risk tier",
                &["risk_level"]
            )
            .expect("Failed to register predictions_by_tier"),

            prediction_errors: register_int_counter!(
                "automl_prediction_errors_total",
                "Prediction requests that failed"
            )
            .expect("Failed to register prediction_errors"),

            artifacts_written: register_int_counter!(
                "automl_artifacts_written_total",
                "Artifact bundles persisted"
            )
            .expect("Failed to register artifacts_written"),

            trainings_in_flight: register_int_gauge!(
                "automl_trainings_in_flight",
                "Training runs currently executing"
            )
            .expect("Failed to register trainings_in_flight"),
        }
    }
}

/// Handle to the process-wide pipeline metrics
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_candidates_trained(&self, count: u64) {
        self.inner().candidates_trained.inc_by(count);
    }

    pub fn inc_candidates_failed(&self, count: u64) {
        self.inner().candidates_failed.inc_by(count);
    }

    pub fn inc_prediction(&self, risk_level: &str) {
        self.inner()
            .predictions_by_tier
            .with_label_values(&[risk_level])
            .inc();
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    pub fn inc_artifacts_written(&self) {
        self.inner().artifacts_written.inc();
    }

    /// Mark a training run as started; the gauge drops when the guard does
    pub fn training_started(&self) -> InFlightGuard {
        self.inner().trainings_in_flight.inc();
        InFlightGuard {
            metrics: self.clone(),
        }
    }
}

/// Decrements the in-flight gauge on drop
pub struct InFlightGuard {
    metrics: PipelineMetrics,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.metrics.inner().trainings_in_flight.dec();
    }
}

/// Structured logger for pipeline events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_training_started(&self, dataset_id: &str, algorithms: &[String], rows: usize) {
        info!(
            event = "training_started",
            instance = %self.instance,
            dataset_id = %dataset_id,
            algorithms = ?algorithms,
            rows = rows,
            "Training run started"
        );
    }

    pub fn log_candidate_trained(
        &self,
        dataset_id: &str,
        model_name: &str,
        accuracy: f64,
        f1_score: f64,
        auc_score: f64,
        training_time: f64,
    ) {
        info!(
            event = "candidate_trained",
            instance = %self.instance,
            dataset_id = %dataset_id,
            model_name = %model_name,
            accuracy = accuracy,
            f1_score = f1_score,
            auc_score = auc_score,
            training_time = training_time,
            "Candidate model trained"
        );
    }

    pub fn log_candidate_failed(&self, dataset_id: &str, model_name: &str, reason: &str) {
        warn!(
            event = "candidate_failed",
            instance = %self.instance,
            dataset_id = %dataset_id,
            model_name = %model_name,
            reason = %reason,
            "Candidate model failed, skipping"
        );
    }

    pub fn log_model_selected(&self, dataset_id: &str, model_name: &str, metric: &str, score: f64) {
        info!(
            event = "model_selected",
            instance = %self.instance,
            dataset_id = %dataset_id,
            model_name = %model_name,
            metric = %metric,
            score = score,
            "Best model selected"
        );
    }

    pub fn log_artifact_written(&self, dataset_id: &str, model_name: &str, version: u64, is_best: bool) {
        info!(
            event = "artifact_written",
            instance = %self.instance,
            dataset_id = %dataset_id,
            model_name = %model_name,
            version = version,
            is_best = is_best,
            "Artifact bundle persisted"
        );
    }

    pub fn log_prediction(
        &self,
        dataset_id: &str,
        model_name: &str,
        version: u64,
        probability: f64,
        risk_level: &str,
    ) {
        info!(
            event = "prediction_served",
            instance = %self.instance,
            dataset_id = %dataset_id,
            model_name = %model_name,
            artifact_version = version,
            probability = probability,
            risk_level = %risk_level,
            "Prediction served"
        );
    }

    pub fn log_startup(&self, version: &str, artifact_dir: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            service_version = %version,
            artifact_dir = %artifact_dir,
            "AutoML service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "AutoML service shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_metrics_creation() {
        let metrics = PipelineMetrics::new();
        metrics.observe_training_duration(1.5);
        metrics.observe_prediction_latency(0.002);
        metrics.inc_candidates_trained(2);
        metrics.inc_candidates_failed(1);
        metrics.inc_prediction("Low");
        metrics.inc_artifacts_written();

        let other = PipelineMetrics::new();
        other.inc_prediction("High");
    }

    #[test]
    fn test_in_flight_guard() {
        let metrics = PipelineMetrics::new();
        let guard = metrics.training_started();
        assert!(metrics.inner().trainings_in_flight.get() >= 1);
        drop(guard);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance, "test-instance");
    }
}
