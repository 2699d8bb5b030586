use crate::target::{LabelEncoding, ResolvedTarget};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One replayable preprocessing operation
///
/// Steps are applied in the order they appear in the plan. Every fitted
/// parameter needed at inference lives inside the step itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlanStep {
    DropColumn {
        column: String,
        reason: DropReason,
    },
    /// Parse text as a number; invalid and missing values become 0
    CoerceNumeric { column: String },
    ImputeNumeric { column: String, median: f64 },
    ImputeCategorical { column: String, mode: String },
    /// Unseen categories encode to 0
    EncodeCategorical {
        column: String,
        mapping: BTreeMap<String, u32>,
    },
    /// Label derivation; only applied to training data
    DeriveTarget {
        target: String,
        encoding: LabelEncoding,
    },
    Scale { column: String, mean: f64, scale: f64 },
}

impl PlanStep {
    pub fn name(&self) -> &'static str {
        match self {
            PlanStep::DropColumn { .. } => "drop_column",
            PlanStep::CoerceNumeric { .. } => "coerce_numeric",
            PlanStep::ImputeNumeric { .. } => "impute_numeric",
            PlanStep::ImputeCategorical { .. } => "impute_categorical",
            PlanStep::EncodeCategorical { .. } => "encode_categorical",
            PlanStep::DeriveTarget { .. } => "derive_target",
            PlanStep::Scale { .. } => "scale",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Identifier,
    HighCardinality,
    Target,
}

/// Fitted, immutable description of every transformation of a training run
///
/// `feature_names` is the single source of truth for the column order of
/// the matrix handed to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingPlan {
    pub steps: Vec<PlanStep>,
    pub target: ResolvedTarget,
    /// Raw columns read from input, synthesized as 0 when absent
    pub input_columns: Vec<String>,
    pub feature_names: Vec<String>,
    /// Rows of the training split the plan was fit on
    pub fitted_rows: usize,
}

impl PreprocessingPlan {
    pub fn target_column(&self) -> &str {
        &self.target.column
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn classes(&self) -> &[String] {
        &self.target.classes
    }

    /// Step counts by operation, for reporting
    pub fn summary(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for step in &self.steps {
            *counts.entry(step.name()).or_insert(0) += 1;
        }
        counts
    }
}
