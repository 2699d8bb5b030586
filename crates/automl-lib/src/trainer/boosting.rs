//! Gradient-boosted regression trees with a softmax objective
//!
//! Each round fits one regression tree per class on the softmax gradients
//! and hessians. Split gain and leaf weights follow the second-order
//! formulation with L2 regularisation `lambda`:
//!
//! ```text
//! gain   = G_L^2 / (H_L + λ) + G_R^2 / (H_R + λ) - G^2 / (H + λ)
//! weight = -G / (H + λ)
//! ```

use super::{argmax, check_input, softmax_rows, Trainable};
use crate::config::BoostingParams;
use crate::error::ModelError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

const HESS_MIN: f64 = 1e-6;
const PRIOR_MIN: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum RegressionNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<RegressionNode>,
}

struct GrowParams {
    max_depth: usize,
    min_samples_leaf: usize,
    lambda: f64,
}

impl RegressionTree {
    fn fit(
        x: ArrayView2<f64>,
        grad: &[f64],
        hess: &[f64],
        params: &GrowParams,
        gains: &mut [f64],
    ) -> Self {
        let mut tree = Self::default();
        tree.grow(x, grad, hess, (0..x.nrows()).collect(), 0, params, gains);
        tree
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &mut self,
        x: ArrayView2<f64>,
        grad: &[f64],
        hess: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: &GrowParams,
        gains: &mut [f64],
    ) -> usize {
        let g: f64 = rows.iter().map(|&i| grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| hess[i]).sum();

        if depth < params.max_depth && rows.len() >= 2 * params.min_samples_leaf {
            if let Some((feature, threshold, gain)) = best_split(x, grad, hess, &rows, g, h, params) {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                    .iter()
                    .copied()
                    .partition(|&i| x[[i, feature]] <= threshold);
                gains[feature] += gain;

                let id = self.nodes.len();
                self.nodes.push(RegressionNode::Leaf { value: 0.0 });
                let left = self.grow(x, grad, hess, left_rows, depth + 1, params, gains);
                let right = self.grow(x, grad, hess, right_rows, depth + 1, params, gains);
                self.nodes[id] = RegressionNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                };
                return id;
            }
        }

        self.nodes.push(RegressionNode::Leaf {
            value: -g / (h + params.lambda),
        });
        self.nodes.len() - 1
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                RegressionNode::Leaf { value } => return *value,
                RegressionNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => id = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }
}

fn best_split(
    x: ArrayView2<f64>,
    grad: &[f64],
    hess: &[f64],
    rows: &[usize],
    g: f64,
    h: f64,
    params: &GrowParams,
) -> Option<(usize, f64, f64)> {
    let n = rows.len();
    let parent = g * g / (h + params.lambda);
    let mut best: Option<(usize, f64, f64)> = None;
    let mut sorted = rows.to_vec();

    for feature in 0..x.ncols() {
        sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let (mut gl, mut hl) = (0.0, 0.0);
        for pos in 0..n - 1 {
            let i = sorted[pos];
            gl += grad[i];
            hl += hess[i];

            let value = x[[i, feature]];
            let next = x[[sorted[pos + 1], feature]];
            let n_left = pos + 1;
            if next <= value || n_left < params.min_samples_leaf || n - n_left < params.min_samples_leaf {
                continue;
            }

            let (gr, hr) = (g - gl, h - hl);
            let gain = 0.5
                * (gl * gl / (hl + params.lambda) + gr * gr / (hr + params.lambda) - parent);
            if gain > 1e-12 && best.map(|(_, _, b)| gain > b + 1e-12).unwrap_or(true) {
                best = Some((feature, value + (next - value) / 2.0, gain));
            }
        }
    }
    best
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    n_estimators: usize,
    learning_rate: f64,
    max_depth: usize,
    min_samples_leaf: usize,
    lambda: f64,
    n_classes: usize,
    base_scores: Vec<f64>,
    /// `rounds[r][c]` is the tree of round `r` for class `c`
    rounds: Vec<Vec<RegressionTree>>,
    importances: Vec<f64>,
}

impl GradientBoosting {
    pub fn new(params: &BoostingParams) -> Self {
        Self {
            n_estimators: params.n_estimators,
            learning_rate: params.learning_rate,
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf.max(1),
            lambda: params.lambda,
            n_classes: 0,
            base_scores: Vec::new(),
            rounds: Vec::new(),
            importances: Vec::new(),
        }
    }

    fn raw_scores(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut scores = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for c in 0..self.n_classes {
                let boosted: f64 = self.rounds.iter().map(|trees| trees[c].predict_row(row)).sum();
                scores[[i, c]] = self.base_scores[c] + self.learning_rate * boosted;
            }
        }
        scores
    }
}

impl Trainable for GradientBoosting {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), ModelError> {
        check_input(x, y, n_classes)?;
        let rows = x.nrows();
        let k = n_classes;

        let mut priors = vec![0.0; k];
        for &label in y {
            priors[label] += 1.0;
        }
        self.base_scores = priors
            .iter()
            .map(|count| (count / rows as f64).max(PRIOR_MIN).ln())
            .collect();
        self.n_classes = k;
        self.rounds = Vec::with_capacity(self.n_estimators);
        self.importances = vec![0.0; x.ncols()];

        let params = GrowParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            lambda: self.lambda,
        };

        let mut scores = Array2::zeros((rows, k));
        for i in 0..rows {
            for c in 0..k {
                scores[[i, c]] = self.base_scores[c];
            }
        }

        let mut grad = vec![0.0; rows];
        let mut hess = vec![0.0; rows];
        for _ in 0..self.n_estimators {
            let mut proba = scores.clone();
            softmax_rows(&mut proba);

            let mut trees = Vec::with_capacity(k);
            for c in 0..k {
                for i in 0..rows {
                    let p = proba[[i, c]];
                    let target = if y[i] == c { 1.0 } else { 0.0 };
                    grad[i] = p - target;
                    hess[i] = (p * (1.0 - p)).max(HESS_MIN);
                }
                let tree = RegressionTree::fit(x, &grad, &hess, &params, &mut self.importances);
                for (i, row) in x.rows().into_iter().enumerate() {
                    scores[[i, c]] += self.learning_rate * tree.predict_row(row);
                }
                trees.push(tree);
            }
            self.rounds.push(trees);
        }

        if scores.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite);
        }

        let total: f64 = self.importances.iter().sum();
        if total > 0.0 {
            self.importances.iter_mut().for_each(|v| *v /= total);
        }
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Vec<usize> {
        self.raw_scores(x)
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect()
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Option<Array2<f64>> {
        let mut scores = self.raw_scores(x);
        softmax_rows(&mut scores);
        Some(scores)
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_boosting_separates_classes() {
        let x = array![[0.0, 1.0], [0.5, 0.0], [1.0, 1.0], [5.0, 0.0], [5.5, 1.0], [6.0, 0.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let params = BoostingParams {
            n_estimators: 20,
            learning_rate: 0.3,
            ..BoostingParams::default()
        };
        let mut model = GradientBoosting::new(&params);
        model.fit(x.view(), &y, 2).unwrap();

        assert_eq!(model.predict(x.view()), y.to_vec());
        let proba = model.predict_proba(x.view()).unwrap();
        assert!(proba[[0, 0]] > 0.5);
        assert!(proba[[5, 1]] > 0.5);
        assert!((proba.row(2).sum() - 1.0).abs() < 1e-9);
        assert_eq!(model.feature_importances()[1], 0.0);
    }

    #[test]
    fn test_multiclass() {
        let x = array![[0.0], [0.1], [1.0], [1.1], [2.0], [2.1]];
        let y = [0, 0, 1, 1, 2, 2];
        let params = BoostingParams {
            n_estimators: 30,
            learning_rate: 0.3,
            ..BoostingParams::default()
        };
        let mut model = GradientBoosting::new(&params);
        model.fit(x.view(), &y, 3).unwrap();
        assert_eq!(model.predict(x.view()), y.to_vec());
    }
}
