//! Tabular AutoML library
//!
//! This crate provides the core functionality for:
//! - Dataset loading, cleaning and column profiling
//! - Target resolution and reproducible preprocessing plans
//! - Training, evaluating and ranking classification models
//! - Versioned artifact storage and single-record inference
//! - Health checks and observability

pub mod artifact;
pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod error;
pub mod health;
pub mod inference;
pub mod observability;
pub mod pipeline;
pub mod preprocess;
pub mod profiler;
pub mod selector;
pub mod stats;
pub mod target;
pub mod trainer;

pub use artifact::{ArtifactBundle, ArtifactKey, ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use config::PipelineConfig;
pub use coordinator::TrainingCoordinator;
pub use dataset::{Cell, CsvDirectorySource, Dataset, DatasetSource, Record};
pub use error::{ErrorBody, ErrorKind, PipelineError, PipelineResult, Stage};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use inference::{InferenceEngine, PredictionResult, RiskTier};
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::{TrainingPipeline, TrainingReport, TrainingRequest};
pub use selector::SelectionMetric;
