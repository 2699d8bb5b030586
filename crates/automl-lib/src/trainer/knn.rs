use super::{argmax, check_input, class_mean_spread, Trainable};
use crate::config::KnnParams;
use crate::error::ModelError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// k-nearest neighbours with uniform votes (Euclidean)
///
/// Keeps the training matrix; probabilities are neighbour vote shares.
/// Equidistant neighbours keep training-row order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNearestNeighbors {
    n_neighbors: usize,
    n_classes: usize,
    x_train: Array2<f64>,
    y_train: Vec<usize>,
    importances: Vec<f64>,
}

impl KNearestNeighbors {
    pub fn new(params: &KnnParams) -> Self {
        Self {
            n_neighbors: params.n_neighbors.max(1),
            n_classes: 0,
            x_train: Array2::zeros((0, 0)),
            y_train: Vec::new(),
            importances: Vec::new(),
        }
    }

    fn votes(&self, row: ArrayView1<f64>) -> Vec<f64> {
        let mut distances: Vec<(usize, f64)> = self
            .x_train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, train)| {
                let dist: f64 = train
                    .iter()
                    .zip(row.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (i, dist)
            })
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));

        let k = self.n_neighbors.min(distances.len());
        let mut votes = vec![0.0; self.n_classes];
        for &(i, _) in &distances[..k] {
            votes[self.y_train[i]] += 1.0 / k as f64;
        }
        votes
    }
}

impl Trainable for KNearestNeighbors {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), ModelError> {
        check_input(x, y, n_classes)?;
        self.n_classes = n_classes;
        self.x_train = x.to_owned();
        self.y_train = y.to_vec();
        self.importances = class_mean_spread(x, y, n_classes);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Vec<usize> {
        x.rows()
            .into_iter()
            .map(|row| argmax(&self.votes(row)))
            .collect()
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Option<Array2<f64>> {
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (c, share) in self.votes(row).into_iter().enumerate() {
                proba[[i, c]] = share;
            }
        }
        Some(proba)
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }
}
