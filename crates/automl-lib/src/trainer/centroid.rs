use super::{check_input, Trainable};
use crate::error::ModelError;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Assigns each row to the class with the closest mean (Euclidean)
///
/// Has no probability output; callers fall back to the predicted label.
/// Classes absent from the fit data keep a zero row and are never predicted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NearestCentroid {
    /// `n_classes x n_features`
    centroids: Array2<f64>,
    /// Whether each class had rows at fit time
    present: Vec<bool>,
}

impl NearestCentroid {
    pub fn new() -> Self {
        Self::default()
    }

    fn nearest(&self, row: ArrayView1<f64>) -> usize {
        let mut best = (0, f64::INFINITY);
        for (c, centroid) in self.centroids.rows().into_iter().enumerate() {
            if !self.present.get(c).copied().unwrap_or(false) {
                continue;
            }
            let dist: f64 = centroid
                .iter()
                .zip(row.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            if dist < best.1 {
                best = (c, dist);
            }
        }
        best.0
    }
}

impl Trainable for NearestCentroid {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), ModelError> {
        check_input(x, y, n_classes)?;
        let mut sums = Array2::<f64>::zeros((n_classes, x.ncols()));
        let mut counts = vec![0.0; n_classes];
        for (row, &label) in x.rows().into_iter().zip(y) {
            let mut target = sums.row_mut(label);
            target += &row;
            counts[label] += 1.0;
        }
        for (mut centroid, count) in sums.axis_iter_mut(Axis(0)).zip(&counts) {
            if *count > 0.0 {
                centroid /= *count;
            }
        }
        self.present = counts.iter().map(|c| *c > 0.0).collect();
        self.centroids = sums;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Vec<usize> {
        x.rows().into_iter().map(|row| self.nearest(row)).collect()
    }

    /// Spread of the class centroids per feature, normalised to sum 1
    fn feature_importances(&self) -> Vec<f64> {
        let fitted: Vec<ArrayView1<f64>> = self
            .centroids
            .rows()
            .into_iter()
            .zip(&self.present)
            .filter_map(|(row, present)| present.then_some(row))
            .collect();
        if fitted.is_empty() {
            return vec![0.0; self.centroids.ncols()];
        }
        let raw: Vec<f64> = (0..self.centroids.ncols())
            .map(|j| {
                let values: Vec<f64> = fitted.iter().map(|r| r[j]).collect();
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
            })
            .collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            raw.iter().map(|v| v / total).collect()
        } else {
            raw
        }
    }
}
