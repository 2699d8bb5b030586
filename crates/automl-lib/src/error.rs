//! Error taxonomy for the training and inference pipeline
//!
//! Every caller-facing failure names the stage that failed and a
//! human-readable cause. Per-algorithm failures use [`ModelError`] and are
//! only surfaced when every candidate fails.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the library
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline stage at which an error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loading,
    Profiling,
    TargetResolution,
    Preprocessing,
    Training,
    Selection,
    Persistence,
    Inference,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Loading => "loading",
            Stage::Profiling => "profiling",
            Stage::TargetResolution => "target_resolution",
            Stage::Preprocessing => "preprocessing",
            Stage::Training => "training",
            Stage::Selection => "selection",
            Stage::Persistence => "persistence",
            Stage::Inference => "inference",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable machine-readable error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyDataset,
    NoTargetResolvable,
    UnsupportedFileFormat,
    InsufficientRows,
    AllModelsFailed,
    ArtifactNotFound,
    SchemaMismatch,
    DatasetNotFound,
    Parse,
    Cancelled,
    Conflict,
    Integrity,
    Storage,
    Serialization,
}

/// Errors surfaced by the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dataset has no rows")]
    EmptyDataset,

    #[error("no usable target column could be resolved: {reason}")]
    NoTargetResolvable { reason: String },

    #[error("unsupported file format: {extension}")]
    UnsupportedFileFormat { extension: String },

    #[error("dataset has {rows} usable rows, need at least {min}")]
    InsufficientRows { rows: usize, min: usize },

    #[error("all {attempted} requested models failed to train")]
    AllModelsFailed { attempted: usize, failures: Vec<String> },

    #[error("artifact not found: {dataset_id}/{model_name}")]
    ArtifactNotFound {
        dataset_id: String,
        model_name: String,
    },

    #[error("target column '{column}' is not present in the dataset")]
    SchemaMismatch { column: String },

    #[error("dataset not found: {dataset_id}")]
    DatasetNotFound { dataset_id: String },

    #[error("failed to parse dataset: {reason}")]
    Parse { reason: String },

    #[error("run cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("a training run for {key} is already in progress")]
    Conflict { key: String },

    #[error("artifact checksum mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::EmptyDataset => ErrorKind::EmptyDataset,
            PipelineError::NoTargetResolvable { .. } => ErrorKind::NoTargetResolvable,
            PipelineError::UnsupportedFileFormat { .. } => ErrorKind::UnsupportedFileFormat,
            PipelineError::InsufficientRows { .. } => ErrorKind::InsufficientRows,
            PipelineError::AllModelsFailed { .. } => ErrorKind::AllModelsFailed,
            PipelineError::ArtifactNotFound { .. } => ErrorKind::ArtifactNotFound,
            PipelineError::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            PipelineError::DatasetNotFound { .. } => ErrorKind::DatasetNotFound,
            PipelineError::Parse { .. } => ErrorKind::Parse,
            PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
            PipelineError::Conflict { .. } => ErrorKind::Conflict,
            PipelineError::Integrity { .. } => ErrorKind::Integrity,
            PipelineError::Storage(_) => ErrorKind::Storage,
            PipelineError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Stage that raised the error
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::EmptyDataset => Stage::Profiling,
            PipelineError::NoTargetResolvable { .. } => Stage::TargetResolution,
            PipelineError::UnsupportedFileFormat { .. }
            | PipelineError::DatasetNotFound { .. }
            | PipelineError::Parse { .. } => Stage::Loading,
            PipelineError::InsufficientRows { .. } | PipelineError::SchemaMismatch { .. } => {
                Stage::Preprocessing
            }
            PipelineError::AllModelsFailed { .. } | PipelineError::Conflict { .. } => {
                Stage::Training
            }
            PipelineError::Cancelled { stage } => *stage,
            PipelineError::ArtifactNotFound { .. } => Stage::Inference,
            PipelineError::Integrity { .. }
            | PipelineError::Storage(_)
            | PipelineError::Serialization(_) => Stage::Persistence,
        }
    }

    /// Caller-facing error object
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            stage: self.stage(),
            message: self.to_string(),
        }
    }
}

/// Serializable error object returned to callers instead of a stack trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
}

/// Failure of a single algorithm during fit or predict
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("training labels contain a single class")]
    SingleClass,

    #[error("no rows or no features to fit on")]
    EmptyInput,

    #[error("expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("optimisation produced non-finite parameters")]
    NonFinite,
}
