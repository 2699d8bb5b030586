//! Gaussian naive Bayes
//!
//! Each class models every feature as an independent normal distribution.
//! Variances are smoothed by `var_smoothing` times the largest feature
//! variance so constant features never divide by zero.

use super::{argmax, check_input, class_mean_spread, Trainable};
use crate::config::NaiveBayesParams;
use crate::error::ModelError;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const VAR_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ClassStats {
    log_prior: f64,
    mean: Vec<f64>,
    var: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    var_smoothing: f64,
    /// `None` for classes without fit rows; they are never predicted
    classes: Vec<Option<ClassStats>>,
    importances: Vec<f64>,
}

impl GaussianNaiveBayes {
    pub fn new(params: &NaiveBayesParams) -> Self {
        Self {
            var_smoothing: params.var_smoothing.max(0.0),
            classes: Vec::new(),
            importances: Vec::new(),
        }
    }

    /// Joint log-likelihood per class, `None` where the class is absent
    fn joint_log_likelihood(&self, row: ArrayView1<f64>) -> Vec<Option<f64>> {
        self.classes
            .iter()
            .map(|stats| {
                let stats = stats.as_ref()?;
                let mut jll = stats.log_prior;
                for ((value, mean), var) in row.iter().zip(&stats.mean).zip(&stats.var) {
                    jll -= 0.5 * (2.0 * PI * var).ln();
                    jll -= 0.5 * (value - mean).powi(2) / var;
                }
                Some(jll)
            })
            .collect()
    }
}

impl Trainable for GaussianNaiveBayes {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), ModelError> {
        check_input(x, y, n_classes)?;
        let rows = x.nrows() as f64;

        let epsilon = self.var_smoothing
            * x.var_axis(Axis(0), 0.0)
                .iter()
                .cloned()
                .fold(0.0f64, f64::max);

        self.classes = (0..n_classes)
            .map(|c| {
                let members: Vec<usize> = (0..y.len()).filter(|&i| y[i] == c).collect();
                if members.is_empty() {
                    return None;
                }
                let subset = x.select(Axis(0), &members);
                let mean = subset.mean_axis(Axis(0))?.to_vec();
                let var = subset
                    .var_axis(Axis(0), 0.0)
                    .iter()
                    .map(|v| (v + epsilon).max(VAR_FLOOR))
                    .collect();
                Some(ClassStats {
                    log_prior: (members.len() as f64 / rows).ln(),
                    mean,
                    var,
                })
            })
            .collect();

        let finite = self.classes.iter().flatten().all(|stats| {
            stats.log_prior.is_finite()
                && stats.mean.iter().chain(&stats.var).all(|v| v.is_finite())
        });
        if !finite {
            return Err(ModelError::NonFinite);
        }

        self.importances = class_mean_spread(x, y, n_classes);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Vec<usize> {
        match self.predict_proba(x) {
            Some(proba) => proba
                .rows()
                .into_iter()
                .map(|row| argmax(&row.to_vec()))
                .collect(),
            None => vec![0; x.nrows()],
        }
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Option<Array2<f64>> {
        let mut proba = Array2::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let jll = self.joint_log_likelihood(row);
            let max = jll.iter().flatten().cloned().fold(f64::NEG_INFINITY, f64::max);
            let mut total = 0.0;
            for (c, value) in jll.iter().enumerate() {
                if let Some(value) = value {
                    let p = (value - max).exp();
                    proba[[i, c]] = p;
                    total += p;
                }
            }
            if total > 0.0 {
                proba.row_mut(i).mapv_inplace(|p| p / total);
            }
        }
        Some(proba)
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }
}
