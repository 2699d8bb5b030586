//! Target resolution
//!
//! Picks the supervised label for a training run, in priority order:
//! explicit column, label-like column name, preferred metric column
//! binarised at its median, and finally the highest-variance numeric
//! column binarised at its median. The outcome is a [`ResolvedTarget`]
//! whose [`LabelEncoding`] is stored in the preprocessing plan.

use crate::config::PipelineConfig;
use crate::dataset::{parse_numeric_text, Cell, Dataset};
use crate::error::{PipelineError, PipelineResult};
use crate::profiler::{numeric_values, DatasetProfile};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

const POSITIVE_TOKENS: &[&str] = &["yes", "true", "y", "1"];
const NEGATIVE_TOKENS: &[&str] = &["no", "false", "n", "0"];

/// Which rule produced the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetSource {
    Explicit,
    CandidateName,
    PreferredMetric,
    HighestVariance,
}

/// How raw cells of the source column become class codes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum LabelEncoding {
    /// Yes/No, True/False, Y/N, 1/0 matched case-insensitively; positive is 1
    Boolean { column: String },
    /// Sorted distinct values mapped to 0..k
    Categories { column: String, classes: Vec<String> },
    /// 1 when the value is strictly above the threshold
    AboveMedian { column: String, threshold: f64 },
}

impl LabelEncoding {
    /// Raw column the label is read from
    pub fn source_column(&self) -> &str {
        match self {
            LabelEncoding::Boolean { column }
            | LabelEncoding::Categories { column, .. }
            | LabelEncoding::AboveMedian { column, .. } => column,
        }
    }

    /// Class code for a cell, `None` when the label is missing or unknown
    pub fn encode(&self, cell: &Cell) -> Option<usize> {
        if cell.is_missing() {
            return None;
        }
        match self {
            LabelEncoding::Boolean { .. } => {
                let key = cell.key().to_lowercase();
                if POSITIVE_TOKENS.contains(&key.as_str()) {
                    Some(1)
                } else if NEGATIVE_TOKENS.contains(&key.as_str()) {
                    Some(0)
                } else {
                    None
                }
            }
            LabelEncoding::Categories { classes, .. } => {
                let key = cell.key();
                classes.iter().position(|c| *c == key)
            }
            LabelEncoding::AboveMedian { threshold, .. } => {
                let value = match cell {
                    Cell::Number(v) => Some(*v),
                    Cell::Text(s) => parse_numeric_text(s),
                    Cell::Missing => None,
                }?;
                Some(usize::from(value > *threshold))
            }
        }
    }
}

/// The label chosen for a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    /// Label name; `{column}_high` for derived targets
    pub column: String,
    pub source: TargetSource,
    pub encoding: LabelEncoding,
    /// Decoded class names indexed by code
    pub classes: Vec<String>,
}

impl ResolvedTarget {
    pub fn source_column(&self) -> &str {
        self.encoding.source_column()
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.encoding, LabelEncoding::AboveMedian { .. })
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class codes for every row of `dataset`
    pub fn labels(&self, dataset: &Dataset) -> Vec<Option<usize>> {
        match dataset.column(self.source_column()) {
            Some(column) => column.values.iter().map(|c| self.encoding.encode(c)).collect(),
            None => vec![None; dataset.row_count()],
        }
    }

    pub fn decode(&self, code: usize) -> String {
        self.classes
            .get(code)
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }
}

/// Chooses the label column for a dataset
#[derive(Debug, Clone)]
pub struct TargetResolver {
    candidates: Vec<String>,
    preferred_metric: Option<String>,
}

impl TargetResolver {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            candidates: config
                .target_candidates
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
            preferred_metric: config.preferred_metric_column.clone(),
        }
    }

    /// Resolve the target of `dataset`
    ///
    /// `dataset` must already have identifier-like columns removed.
    pub fn resolve(
        &self,
        dataset: &Dataset,
        profile: &DatasetProfile,
        explicit: Option<&str>,
    ) -> PipelineResult<ResolvedTarget> {
        let target = self.resolve_inner(dataset, profile, explicit)?;
        info!(
            target = %target.column,
            source = ?target.source,
            classes = target.n_classes(),
            "Resolved target"
        );
        Ok(target)
    }

    fn resolve_inner(
        &self,
        dataset: &Dataset,
        profile: &DatasetProfile,
        explicit: Option<&str>,
    ) -> PipelineResult<ResolvedTarget> {
        if let Some(name) = explicit {
            if !dataset.has_column(name) {
                return Err(PipelineError::SchemaMismatch {
                    column: name.to_string(),
                });
            }
            return Ok(existing_label(dataset, name, TargetSource::Explicit));
        }

        if let Some(column) = dataset.columns().iter().find(|c| {
            self.candidates.contains(&c.name.to_lowercase()) && c.missing_count() < c.values.len()
        }) {
            return Ok(existing_label(dataset, &column.name, TargetSource::CandidateName));
        }

        let numeric: Vec<String> = profile
            .numeric_columns()
            .into_iter()
            .filter(|name| dataset.has_column(name))
            .collect();

        if let Some(preferred) = &self.preferred_metric {
            let matched = numeric
                .iter()
                .find(|name| name.eq_ignore_ascii_case(preferred));
            match matched.and_then(|name| derive_above_median(dataset, name, TargetSource::PreferredMetric)) {
                Some(target) => return Ok(target),
                None => debug!(column = %preferred, "Preferred metric column not usable"),
            }
        }

        if numeric.is_empty() {
            return Err(PipelineError::NoTargetResolvable {
                reason: "no label-like column and no numeric columns".to_string(),
            });
        }

        let mut best: Option<(&str, f64)> = None;
        for name in &numeric {
            let Some(column) = dataset.column(name) else {
                continue;
            };
            let Some(variance) = stats::sample_variance(&numeric_values(column)) else {
                continue;
            };
            if variance > 0.0 && best.map(|(_, v)| variance > v).unwrap_or(true) {
                best = Some((name.as_str(), variance));
            }
        }

        best.and_then(|(name, _)| derive_above_median(dataset, name, TargetSource::HighestVariance))
            .ok_or_else(|| PipelineError::NoTargetResolvable {
                reason: "all numeric columns are constant".to_string(),
            })
    }
}

/// Label read directly from an existing column
fn existing_label(dataset: &Dataset, name: &str, source: TargetSource) -> ResolvedTarget {
    let present: Vec<&Cell> = dataset
        .column(name)
        .map(|c| c.values.iter().filter(|v| !v.is_missing()).collect())
        .unwrap_or_default();

    let keys: BTreeSet<String> = present.iter().map(|c| c.key()).collect();
    let is_boolean = !keys.is_empty()
        && keys.iter().all(|k| {
            let lower = k.to_lowercase();
            POSITIVE_TOKENS.contains(&lower.as_str()) || NEGATIVE_TOKENS.contains(&lower.as_str())
        });

    if is_boolean {
        let spelling = |tokens: &[&str], fallback: &str| {
            present
                .iter()
                .map(|c| c.key())
                .find(|k| tokens.contains(&k.to_lowercase().as_str()))
                .unwrap_or_else(|| fallback.to_string())
        };
        let classes = vec![
            spelling(NEGATIVE_TOKENS, "No"),
            spelling(POSITIVE_TOKENS, "Yes"),
        ];
        return ResolvedTarget {
            column: name.to_string(),
            source,
            encoding: LabelEncoding::Boolean {
                column: name.to_string(),
            },
            classes,
        };
    }

    let mut classes: Vec<String> = keys.into_iter().collect();
    let numeric: Option<Vec<f64>> = classes.iter().map(|k| k.parse::<f64>().ok()).collect();
    if let Some(values) = numeric {
        let mut paired: Vec<(f64, String)> = values.into_iter().zip(classes).collect();
        paired.sort_by(|a, b| a.0.total_cmp(&b.0));
        classes = paired.into_iter().map(|(_, k)| k).collect();
    }

    ResolvedTarget {
        column: name.to_string(),
        source,
        encoding: LabelEncoding::Categories {
            column: name.to_string(),
            classes: classes.clone(),
        },
        classes,
    }
}

/// Binary label `value > median(value)` named `{column}_high`
fn derive_above_median(dataset: &Dataset, name: &str, source: TargetSource) -> Option<ResolvedTarget> {
    let threshold = stats::median(&numeric_values(dataset.column(name)?))?;
    Some(ResolvedTarget {
        column: format!("{name}_high"),
        source,
        encoding: LabelEncoding::AboveMedian {
            column: name.to_string(),
            threshold,
        },
        classes: vec!["0".to_string(), "1".to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::SchemaProfiler;

    fn build(headers: &[&str], rows: Vec<Vec<Cell>>) -> (Dataset, DatasetProfile) {
        let ds = Dataset::from_rows(headers.iter().map(|h| h.to_string()).collect(), rows);
        let profile = SchemaProfiler::new(&PipelineConfig::default())
            .profile(&ds, None)
            .unwrap();
        (ds, profile)
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_candidate_name_beats_numeric() {
        let (ds, profile) = build(
            &["tenure", "Churn"],
            (0..20)
                .map(|i| vec![Cell::Number(i as f64), text(if i % 3 == 0 { "Yes" } else { "No" })])
                .collect(),
        );
        let resolver = TargetResolver::new(&PipelineConfig::default());
        let target = resolver.resolve(&ds, &profile, None).unwrap();

        assert_eq!(target.column, "Churn");
        assert_eq!(target.source, TargetSource::CandidateName);
        assert_eq!(target.classes, vec!["No", "Yes"]);
        let labels = target.labels(&ds);
        assert_eq!(labels[0], Some(1));
        assert_eq!(labels[1], Some(0));
    }

    #[test]
    fn test_explicit_target_and_mismatch() {
        let (ds, profile) = build(
            &["a", "grade"],
            vec![
                vec![Cell::Number(1.0), text("b")],
                vec![Cell::Number(2.0), text("a")],
                vec![Cell::Number(3.0), text("c")],
            ],
        );
        let resolver = TargetResolver::new(&PipelineConfig::default());
        let target = resolver.resolve(&ds, &profile, Some("grade")).unwrap();
        assert_eq!(target.source, TargetSource::Explicit);
        assert_eq!(target.classes, vec!["a", "b", "c"]);
        assert_eq!(target.labels(&ds), vec![Some(1), Some(0), Some(2)]);

        let err = resolver.resolve(&ds, &profile, Some("missing")).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_numeric_classes_sort_numerically() {
        let (ds, profile) = build(
            &["x", "class"],
            vec![
                vec![Cell::Number(1.0), Cell::Number(10.0)],
                vec![Cell::Number(2.0), Cell::Number(2.0)],
                vec![Cell::Number(3.0), Cell::Number(3.0)],
            ],
        );
        let target = TargetResolver::new(&PipelineConfig::default())
            .resolve(&ds, &profile, None)
            .unwrap();
        assert_eq!(target.classes, vec!["2", "3", "10"]);
    }

    #[test]
    fn test_highest_variance_fallback() {
        let (ds, profile) = build(
            &["small", "spread"],
            (0..10)
                .map(|i| vec![Cell::Number((i % 2) as f64), Cell::Number((i * 10) as f64)])
                .collect(),
        );
        let resolver = TargetResolver::new(&PipelineConfig::default());
        let target = resolver.resolve(&ds, &profile, None).unwrap();

        assert_eq!(target.column, "spread_high");
        assert_eq!(target.source, TargetSource::HighestVariance);
        assert_eq!(target.source_column(), "spread");
        assert!(target.is_derived());
        let labels = target.labels(&ds);
        assert_eq!(labels.iter().filter(|l| **l == Some(1)).count(), 5);
    }

    #[test]
    fn test_preferred_metric_column() {
        let (ds, profile) = build(
            &["Temperature", "spread"],
            (0..10)
                .map(|i| vec![Cell::Number(20.0 + i as f64), Cell::Number((i * 100) as f64)])
                .collect(),
        );
        let config = PipelineConfig {
            preferred_metric_column: Some("temperature".to_string()),
            ..PipelineConfig::default()
        };
        let target = TargetResolver::new(&config).resolve(&ds, &profile, None).unwrap();
        assert_eq!(target.column, "Temperature_high");
        assert_eq!(target.source, TargetSource::PreferredMetric);
    }

    #[test]
    fn test_no_numeric_columns_fails() {
        let (ds, profile) = build(
            &["colour", "shape"],
            vec![vec![text("red"), text("round")], vec![text("blue"), text("square")]],
        );
        let err = TargetResolver::new(&PipelineConfig::default())
            .resolve(&ds, &profile, None)
            .unwrap_err();
        assert!(matches!(err, PipelineError::NoTargetResolvable { .. }));
    }
}
