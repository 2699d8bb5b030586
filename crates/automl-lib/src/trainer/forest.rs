//! Bagged CART ensemble

use super::tree::DecisionTree;
use super::{argmax, check_input, Trainable};
use crate::config::{ForestParams, TreeParams};
use crate::error::ModelError;
use ndarray::{Array2, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Random forest: bootstrap rows, `sqrt(p)` features per split
///
/// Tree `i` is grown from its own `ChaCha8Rng` seeded with `seed + i`, so
/// the ensemble is identical regardless of how rayon schedules the work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_estimators: usize,
    max_depth: usize,
    min_samples_leaf: usize,
    seed: u64,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(params: &ForestParams, seed: u64) -> Self {
        Self {
            n_estimators: params.n_estimators.max(1),
            max_depth: params.max_depth,
            min_samples_leaf: params.min_samples_leaf,
            seed,
            n_classes: 0,
            trees: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Trainable for RandomForest {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), ModelError> {
        check_input(x, y, n_classes)?;
        let rows = x.nrows();
        let max_features = ((x.ncols() as f64).sqrt() as usize).max(1);
        let tree_params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: 2,
            min_samples_leaf: self.min_samples_leaf,
        };
        let seed = self.seed;

        self.trees = (0..self.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
                let bootstrap: Vec<usize> = (0..rows).map(|_| rng.random_range(0..rows)).collect();
                let mut tree = DecisionTree::new(&tree_params).with_max_features(max_features);
                tree.fit_rows(x, y, bootstrap, n_classes, Some(&mut rng));
                tree
            })
            .collect();
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Vec<usize> {
        match self.predict_proba(x) {
            Some(proba) => proba
                .rows()
                .into_iter()
                .map(|row| argmax(row.as_slice().unwrap_or(&[])))
                .collect(),
            None => vec![0; x.nrows()],
        }
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Option<Array2<f64>> {
        if self.trees.is_empty() {
            return None;
        }
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (c, p) in tree.leaf_distribution(row).iter().enumerate() {
                    proba[[i, c]] += p;
                }
            }
        }
        proba /= self.trees.len() as f64;
        Some(proba)
    }

    fn feature_importances(&self) -> Vec<f64> {
        let Some(first) = self.trees.first() else {
            return Vec::new();
        };
        let mut total = vec![0.0; first.feature_importances().len()];
        for tree in &self.trees {
            for (acc, v) in total.iter_mut().zip(tree.feature_importances()) {
                *acc += v;
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|v| *v /= sum);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Array2<f64>, Vec<usize>) {
        let mut x = Array2::zeros((40, 3));
        let mut y = Vec::with_capacity(40);
        for i in 0..40 {
            let label = i % 2;
            x[[i, 0]] = label as f64 * 5.0 + (i % 7) as f64 * 0.1;
            x[[i, 1]] = (i % 5) as f64;
            x[[i, 2]] = (i % 3) as f64;
            y.push(label);
        }
        (x, y)
    }

    #[test]
    fn test_forest_learns_and_is_deterministic() {
        let (x, y) = blobs();
        let params = ForestParams {
            n_estimators: 15,
            ..ForestParams::default()
        };

        let mut a = RandomForest::new(&params, 42);
        a.fit(x.view(), &y, 2).unwrap();
        let mut b = RandomForest::new(&params, 42);
        b.fit(x.view(), &y, 2).unwrap();

        assert_eq!(a.n_trees(), 15);
        assert_eq!(a.predict(x.view()), y);
        assert_eq!(a.predict_proba(x.view()), b.predict_proba(x.view()));

        let importances = a.feature_importances();
        assert_eq!(importances.len(), 3);
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = blobs();
        let mut forest = RandomForest::new(&ForestParams::default(), 7);
        forest.fit(x.view(), &y, 2).unwrap();
        let proba = forest.predict_proba(x.view()).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }
}
