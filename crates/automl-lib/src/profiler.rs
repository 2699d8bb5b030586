//! Column classification and dataset quality signals
//!
//! The profiler decides, per column, whether it is a usable numeric or
//! categorical feature, a numeric value stored as text, or something that
//! must be dropped before feature construction (identifier-like names and
//! high-cardinality free text).

use crate::config::PipelineConfig;
use crate::dataset::{parse_numeric_text, Cell, Column, Dataset};
use crate::error::{PipelineError, PipelineResult};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Inferred role of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Identifier,
    HighCardinalityText,
    /// Text column whose values are mostly numbers (currency, thousands separators)
    NumericText,
}

impl ColumnKind {
    /// Whether the column is removed before feature construction
    pub fn is_dropped(&self) -> bool {
        matches!(self, ColumnKind::Identifier | ColumnKind::HighCardinalityText)
    }

    /// Whether the column yields numbers after coercion
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnKind::Numeric | ColumnKind::NumericText)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub missing_count: usize,
    /// Distinct non-missing values
    pub cardinality: usize,
    /// IQR outliers, numeric columns only
    pub outlier_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub row_count: usize,
    pub column_count: usize,
    /// Share of non-missing cells, 0.0 to 1.0
    pub completeness: f64,
    pub duplicate_count: usize,
    pub columns: Vec<ColumnProfile>,
}

impl DatasetProfile {
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.column(name).map(|c| c.kind)
    }

    /// Names of identifier-like and high-cardinality text columns
    pub fn dropped_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind.is_dropped())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Names of numeric and numeric-text columns, in dataset order
    pub fn numeric_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.kind.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Classifies columns of a raw dataset
#[derive(Debug, Clone)]
pub struct SchemaProfiler {
    identifier_patterns: Vec<String>,
    high_cardinality_ratio: f64,
    numeric_text_ratio: f64,
}

impl SchemaProfiler {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            identifier_patterns: config
                .identifier_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            high_cardinality_ratio: config.high_cardinality_ratio,
            numeric_text_ratio: config.numeric_text_ratio,
        }
    }

    /// Profile every column
    ///
    /// `protected` names a column (the explicit target) that is never
    /// classified as identifier or high-cardinality text.
    pub fn profile(&self, dataset: &Dataset, protected: Option<&str>) -> PipelineResult<DatasetProfile> {
        let rows = dataset.row_count();
        if rows == 0 {
            return Err(PipelineError::EmptyDataset);
        }

        let columns: Vec<ColumnProfile> = dataset
            .columns()
            .iter()
            .map(|column| self.profile_column(column, rows, protected == Some(column.name.as_str())))
            .collect();

        let total_cells = rows * dataset.column_count();
        let missing_cells: usize = columns.iter().map(|c| c.missing_count).sum();
        let completeness = if total_cells == 0 {
            1.0
        } else {
            1.0 - missing_cells as f64 / total_cells as f64
        };

        let profile = DatasetProfile {
            row_count: rows,
            column_count: dataset.column_count(),
            completeness,
            duplicate_count: dataset.duplicate_count(),
            columns,
        };

        debug!(
            rows = profile.row_count,
            columns = profile.column_count,
            completeness = profile.completeness,
            dropped = ?profile.dropped_columns(),
            "Profiled dataset"
        );

        Ok(profile)
    }

    /// Substring match on the lowercased name with spaces and underscores removed
    pub fn is_identifier_name(&self, name: &str) -> bool {
        let normalized: String = name
            .to_lowercase()
            .chars()
            .filter(|c| *c != ' ' && *c != '_')
            .collect();
        self.identifier_patterns
            .iter()
            .any(|pattern| normalized.contains(pattern.as_str()))
    }

    fn profile_column(&self, column: &Column, rows: usize, protected: bool) -> ColumnProfile {
        let present: Vec<&Cell> = column.values.iter().filter(|c| !c.is_missing()).collect();
        let missing_count = rows - present.len();
        let cardinality = present
            .iter()
            .map(|c| c.key())
            .collect::<HashSet<_>>()
            .len();

        let text_count = present.iter().filter(|c| matches!(c, Cell::Text(_))).count();
        let kind = if !protected && self.is_identifier_name(&column.name) {
            ColumnKind::Identifier
        } else if text_count == 0 {
            ColumnKind::Numeric
        } else if self.looks_numeric(&present) {
            ColumnKind::NumericText
        } else if !protected && cardinality as f64 > self.high_cardinality_ratio * rows as f64 {
            ColumnKind::HighCardinalityText
        } else {
            ColumnKind::Categorical
        };

        let outlier_count = if kind.is_numeric() {
            stats::iqr_outliers(&numeric_values(column))
        } else {
            0
        };

        ColumnProfile {
            name: column.name.clone(),
            kind,
            missing_count,
            cardinality,
            outlier_count,
        }
    }

    fn looks_numeric(&self, present: &[&Cell]) -> bool {
        if present.is_empty() {
            return false;
        }
        let parseable = present
            .iter()
            .filter(|c| match c {
                Cell::Number(_) => true,
                Cell::Text(s) => parse_numeric_text(s).is_some(),
                Cell::Missing => false,
            })
            .count();
        parseable as f64 >= self.numeric_text_ratio * present.len() as f64
    }
}

/// Values of a column read as numbers, skipping missing and unparseable cells
pub fn numeric_values(column: &Column) -> Vec<f64> {
    column
        .values
        .iter()
        .filter_map(|c| match c {
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => parse_numeric_text(s),
            Cell::Missing => None,
        })
        .collect()
}
