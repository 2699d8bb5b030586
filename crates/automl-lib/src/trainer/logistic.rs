//! Multinomial logistic regression fit by full-batch gradient descent

use super::{argmax, check_input, softmax_rows, Trainable};
use crate::config::LogisticParams;
use crate::error::ModelError;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    learning_rate: f64,
    max_iter: usize,
    l2: f64,
    tolerance: f64,
    /// `n_features x n_classes`
    weights: Array2<f64>,
    bias: Array1<f64>,
    iterations: usize,
}

impl LogisticRegression {
    pub fn new(params: &LogisticParams) -> Self {
        Self {
            learning_rate: params.learning_rate,
            max_iter: params.max_iter,
            l2: params.l2,
            tolerance: params.tolerance,
            weights: Array2::zeros((0, 0)),
            bias: Array1::zeros(0),
            iterations: 0,
        }
    }

    /// Gradient steps taken by the last fit
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn scores(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut logits = x.dot(&self.weights);
        logits += &self.bias;
        softmax_rows(&mut logits);
        logits
    }
}

impl Trainable for LogisticRegression {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), ModelError> {
        check_input(x, y, n_classes)?;
        let (rows, features) = x.dim();
        let n = rows as f64;

        let mut one_hot = Array2::<f64>::zeros((rows, n_classes));
        for (i, &label) in y.iter().enumerate() {
            one_hot[[i, label]] = 1.0;
        }

        self.weights = Array2::zeros((features, n_classes));
        self.bias = Array1::zeros(n_classes);
        self.iterations = 0;

        for _ in 0..self.max_iter {
            let residual = self.scores(x) - &one_hot;
            let grad_w = x.t().dot(&residual) / n + &self.weights * self.l2;
            let grad_b = residual.sum_axis(Axis(0)) / n;

            self.weights.scaled_add(-self.learning_rate, &grad_w);
            self.bias.scaled_add(-self.learning_rate, &grad_b);
            self.iterations += 1;

            let largest = grad_w
                .iter()
                .chain(grad_b.iter())
                .fold(0.0f64, |acc, g| acc.max(g.abs()));
            if !largest.is_finite() {
                return Err(ModelError::NonFinite);
            }
            if largest < self.tolerance {
                break;
            }
        }

        if self.weights.iter().chain(self.bias.iter()).any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite);
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Vec<usize> {
        self.scores(x)
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect()
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Option<Array2<f64>> {
        Some(self.scores(x))
    }

    /// Mean absolute weight per feature across classes, normalised to sum 1
    fn feature_importances(&self) -> Vec<f64> {
        let raw: Vec<f64> = self
            .weights
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|w| w.abs()).sum::<f64>() / row.len().max(1) as f64)
            .collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            raw.iter().map(|v| v / total).collect()
        } else {
            raw
        }
    }
}
