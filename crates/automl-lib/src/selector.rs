//! Winner selection among trained candidates

use crate::error::{PipelineError, PipelineResult};
use crate::trainer::{ModelMetrics, TrainedCandidate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Metric used to rank candidates; higher is better for all of them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMetric {
    #[default]
    Accuracy,
    F1,
    Auc,
}

impl SelectionMetric {
    pub fn value(&self, metrics: &ModelMetrics) -> f64 {
        match self {
            SelectionMetric::Accuracy => metrics.accuracy,
            SelectionMetric::F1 => metrics.f1_score,
            SelectionMetric::Auc => metrics.auc_score,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionMetric::Accuracy => "accuracy",
            SelectionMetric::F1 => "f1",
            SelectionMetric::Auc => "auc",
        }
    }
}

impl fmt::Display for SelectionMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accuracy" => Ok(SelectionMetric::Accuracy),
            "f1" | "f1_score" => Ok(SelectionMetric::F1),
            "auc" | "auc_score" => Ok(SelectionMetric::Auc),
            other => Err(format!("unknown selection metric: {other}")),
        }
    }
}

/// Candidates ordered best-first; `ranked[0]` is the winner
#[derive(Debug, Clone)]
pub struct Selection {
    pub metric: SelectionMetric,
    pub ranked: Vec<TrainedCandidate>,
}

impl Selection {
    pub fn winner(&self) -> &TrainedCandidate {
        &self.ranked[0]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSelector {
    metric: SelectionMetric,
}

impl ModelSelector {
    pub fn new(metric: SelectionMetric) -> Self {
        Self { metric }
    }

    /// Rank by the configured metric, descending
    ///
    /// The sort is stable, so equal scores keep training order and the
    /// first-trained candidate wins ties. NaN scores rank last.
    pub fn select(&self, candidates: Vec<TrainedCandidate>) -> PipelineResult<Selection> {
        if candidates.is_empty() {
            return Err(PipelineError::AllModelsFailed {
                attempted: 0,
                failures: Vec::new(),
            });
        }
        let metric = self.metric;
        let mut ranked = candidates;
        ranked.sort_by(|a, b| {
            let (va, vb) = (metric.value(&a.metrics), metric.value(&b.metrics));
            match (va.is_nan(), vb.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => vb.partial_cmp(&va).unwrap_or(Ordering::Equal),
            }
        });
        Ok(Selection { metric, ranked })
    }
}
