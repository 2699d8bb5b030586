use super::plan::{DropReason, PlanStep, PreprocessingPlan};
use crate::dataset::{parse_numeric_text, Cell, Dataset, Record};
use crate::error::{PipelineError, PipelineResult};
use crate::profiler::{ColumnKind, DatasetProfile};
use crate::stats;
use crate::target::ResolvedTarget;
use ndarray::{Array1, Array2};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Working columns keyed by name
type Frame = BTreeMap<String, Vec<Cell>>;

/// Applies preprocessing plans
///
/// Fit mode derives a plan from a training split; transform mode replays
/// an existing plan without touching its parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreprocessingExecutor;

impl PreprocessingExecutor {
    /// Fit a plan on the training split
    ///
    /// Imputation, encoding and scaling statistics are computed from `train`
    /// only. Column kinds come from `profile`.
    pub fn fit(
        train: &Dataset,
        profile: &DatasetProfile,
        target: &ResolvedTarget,
    ) -> PipelineResult<PreprocessingPlan> {
        let target_source = target.source_column();
        if !train.has_column(target_source) {
            return Err(PipelineError::SchemaMismatch {
                column: target_source.to_string(),
            });
        }

        let mut drops = Vec::new();
        let mut coercions = Vec::new();
        let mut imputations = Vec::new();
        let mut encodings = Vec::new();
        let mut input_columns = Vec::new();

        for column in train.columns() {
            let name = column.name.clone();
            let kind = profile.kind_of(&name).unwrap_or(ColumnKind::Categorical);

            if name == target_source {
                drops.push(PlanStep::DropColumn {
                    column: name,
                    reason: DropReason::Target,
                });
                continue;
            }

            match kind {
                ColumnKind::Identifier => drops.push(PlanStep::DropColumn {
                    column: name,
                    reason: DropReason::Identifier,
                }),
                ColumnKind::HighCardinalityText => drops.push(PlanStep::DropColumn {
                    column: name,
                    reason: DropReason::HighCardinality,
                }),
                ColumnKind::NumericText => {
                    coercions.push(PlanStep::CoerceNumeric {
                        column: name.clone(),
                    });
                    input_columns.push(name);
                }
                ColumnKind::Numeric => {
                    let present: Vec<f64> = column
                        .values
                        .iter()
                        .filter_map(|cell| match cell {
                            Cell::Number(v) => Some(*v),
                            Cell::Text(s) => parse_numeric_text(s),
                            Cell::Missing => None,
                        })
                        .collect();
                    imputations.push(PlanStep::ImputeNumeric {
                        column: name.clone(),
                        median: stats::median(&present).unwrap_or(0.0),
                    });
                    input_columns.push(name);
                }
                ColumnKind::Categorical => {
                    let keys: Vec<String> = column
                        .values
                        .iter()
                        .filter(|c| !c.is_missing())
                        .map(Cell::key)
                        .collect();
                    let mode = stats::mode(keys.iter().map(String::as_str)).unwrap_or_default();

                    let mut categories: BTreeSet<String> = keys.into_iter().collect();
                    if column.missing_count() > 0 {
                        categories.insert(mode.clone());
                    }
                    let mapping = categories
                        .into_iter()
                        .enumerate()
                        .map(|(code, key)| (key, code as u32))
                        .collect();

                    imputations.push(PlanStep::ImputeCategorical {
                        column: name.clone(),
                        mode,
                    });
                    encodings.push(PlanStep::EncodeCategorical {
                        column: name.clone(),
                        mapping,
                    });
                    input_columns.push(name);
                }
            }
        }

        let mut steps = drops;
        steps.extend(coercions);
        steps.extend(imputations);
        steps.extend(encodings);
        steps.push(PlanStep::DeriveTarget {
            target: target.column.clone(),
            encoding: target.encoding.clone(),
        });

        // Scaling statistics are taken after every other step has run on the
        // training split.
        let mut frame = load_frame(train, &input_columns);
        for step in &steps {
            apply_step(step, &mut frame);
        }
        for name in &input_columns {
            let values: Vec<f64> = frame
                .get(name)
                .map(|cells| cells.iter().map(|c| c.as_number().unwrap_or(0.0)).collect())
                .unwrap_or_default();
            let mean = stats::mean(&values).unwrap_or(0.0);
            let std = stats::population_std(&values).unwrap_or(0.0);
            steps.push(PlanStep::Scale {
                column: name.clone(),
                mean,
                scale: if std > f64::EPSILON { std } else { 1.0 },
            });
        }

        let plan = PreprocessingPlan {
            steps,
            target: target.clone(),
            feature_names: input_columns.clone(),
            input_columns,
            fitted_rows: train.row_count(),
        };

        debug!(
            features = plan.n_features(),
            steps = ?plan.summary(),
            "Fitted preprocessing plan"
        );

        Ok(plan)
    }

    /// Transform every row of `dataset` into the plan's feature matrix
    pub fn transform(plan: &PreprocessingPlan, dataset: &Dataset) -> Array2<f64> {
        let rows = dataset.row_count();
        let mut frame = load_frame(dataset, &plan.input_columns);
        for step in &plan.steps {
            apply_step(step, &mut frame);
        }

        let mut matrix = Array2::zeros((rows, plan.feature_names.len()));
        for (j, name) in plan.feature_names.iter().enumerate() {
            if let Some(cells) = frame.get(name) {
                for (i, cell) in cells.iter().enumerate() {
                    matrix[[i, j]] = cell.as_number().unwrap_or(0.0);
                }
            }
        }
        matrix
    }

    /// Transform a single record
    ///
    /// Missing fields are synthesized, extra fields ignored; the result
    /// always has `plan.feature_names.len()` entries.
    pub fn transform_record(plan: &PreprocessingPlan, record: &Record) -> Array1<f64> {
        let headers: Vec<String> = record.keys().cloned().collect();
        let values: Vec<Cell> = record.values().cloned().collect();
        let dataset = Dataset::from_rows(headers, vec![values]);
        Self::transform(plan, &dataset).row(0).to_owned()
    }

    /// Class codes for the rows of `dataset` using the plan's label rule
    pub fn labels(plan: &PreprocessingPlan, dataset: &Dataset) -> Vec<Option<usize>> {
        plan.target.labels(dataset)
    }
}

/// Raw cells for every input column; absent columns become zeros
fn load_frame(dataset: &Dataset, input_columns: &[String]) -> Frame {
    let rows = dataset.row_count();
    input_columns
        .iter()
        .map(|name| {
            let cells = dataset
                .column(name)
                .map(|c| c.values.clone())
                .unwrap_or_else(|| vec![Cell::Number(0.0); rows]);
            (name.clone(), cells)
        })
        .collect()
}

fn apply_step(step: &PlanStep, frame: &mut Frame) {
    match step {
        PlanStep::DropColumn { column, .. } => {
            frame.remove(column);
        }
        PlanStep::CoerceNumeric { column } => map_column(frame, column, |cell| match cell {
            Cell::Number(v) => Cell::Number(*v),
            Cell::Text(s) => Cell::Number(parse_numeric_text(s).unwrap_or(0.0)),
            Cell::Missing => Cell::Number(0.0),
        }),
        PlanStep::ImputeNumeric { column, median } => map_column(frame, column, |cell| match cell {
            Cell::Number(v) => Cell::Number(*v),
            Cell::Text(s) => Cell::Number(parse_numeric_text(s).unwrap_or(*median)),
            Cell::Missing => Cell::Number(*median),
        }),
        PlanStep::ImputeCategorical { column, mode } => map_column(frame, column, |cell| match cell {
            Cell::Missing => Cell::Text(mode.clone()),
            other => other.clone(),
        }),
        PlanStep::EncodeCategorical { column, mapping } => map_column(frame, column, |cell| {
            Cell::Number(mapping.get(&cell.key()).copied().unwrap_or(0) as f64)
        }),
        PlanStep::DeriveTarget { .. } => {}
        PlanStep::Scale { column, mean, scale } => map_column(frame, column, |cell| {
            Cell::Number((cell.as_number().unwrap_or(0.0) - mean) / scale)
        }),
    }
}

fn map_column<F>(frame: &mut Frame, column: &str, f: F)
where
    F: Fn(&Cell) -> Cell,
{
    if let Some(cells) = frame.get_mut(column) {
        for cell in cells.iter_mut() {
            *cell = f(cell);
        }
    }
}
