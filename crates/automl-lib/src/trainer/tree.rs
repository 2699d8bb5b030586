//! CART classification tree with Gini impurity

use super::{argmax, check_input, Trainable};
use crate::config::TreeParams;
use crate::error::ModelError;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Minimum impurity decrease for a split to be taken
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    /// Features considered per split; all when `None`
    max_features: Option<usize>,
    n_classes: usize,
    n_features: usize,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl DecisionTree {
    pub fn new(params: &TreeParams) -> Self {
        Self {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split.max(2),
            min_samples_leaf: params.min_samples_leaf.max(1),
            max_features: None,
            n_classes: 0,
            n_features: 0,
            nodes: Vec::new(),
            importances: Vec::new(),
        }
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Grow the tree on a subset of rows (repeats allowed)
    ///
    /// Feature subsampling draws from `rng` when both it and
    /// `max_features` are set.
    pub(crate) fn fit_rows(
        &mut self,
        x: ArrayView2<f64>,
        y: &[usize],
        rows: Vec<usize>,
        n_classes: usize,
        mut rng: Option<&mut ChaCha8Rng>,
    ) {
        self.n_classes = n_classes;
        self.n_features = x.ncols();
        self.nodes.clear();
        self.importances = vec![0.0; x.ncols()];

        self.grow(x, y, rows, 0, rng.as_deref_mut());

        let total: f64 = self.importances.iter().sum();
        if total > 0.0 {
            self.importances.iter_mut().for_each(|v| *v /= total);
        }
    }

    fn grow(
        &mut self,
        x: ArrayView2<f64>,
        y: &[usize],
        rows: Vec<usize>,
        depth: usize,
        mut rng: Option<&mut ChaCha8Rng>,
    ) -> usize {
        let counts = class_counts(y, &rows, self.n_classes);
        let n = rows.len();
        let impurity = gini(&counts, n);

        let splittable = depth < self.max_depth
            && n >= self.min_samples_split
            && n >= 2 * self.min_samples_leaf
            && impurity > 0.0;

        if splittable {
            let features = self.candidate_features(rng.as_deref_mut());
            let mut split = self.best_split(x, y, &rows, &counts, impurity, &features);
            // Sampled features may all be constant here; fall back to the rest
            if split.is_none() && features.len() < self.n_features {
                let all: Vec<usize> = (0..self.n_features).collect();
                split = self.best_split(x, y, &rows, &counts, impurity, &all);
            }
            if let Some(split) = split {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                    .iter()
                    .copied()
                    .partition(|&i| x[[i, split.feature]] <= split.threshold);
                self.importances[split.feature] += split.gain;

                let id = self.nodes.len();
                self.nodes.push(Node::Leaf {
                    distribution: Vec::new(),
                });
                let left = self.grow(x, y, left_rows, depth + 1, rng.as_deref_mut());
                let right = self.grow(x, y, right_rows, depth + 1, rng.as_deref_mut());
                self.nodes[id] = Node::Split {
                    feature: split.feature,
                    threshold: split.threshold,
                    left,
                    right,
                };
                return id;
            }
        }

        let distribution = if n == 0 {
            vec![1.0 / self.n_classes.max(1) as f64; self.n_classes]
        } else {
            counts.iter().map(|c| c / n as f64).collect()
        };
        self.nodes.push(Node::Leaf { distribution });
        self.nodes.len() - 1
    }

    fn candidate_features(&self, rng: Option<&mut ChaCha8Rng>) -> Vec<usize> {
        match (self.max_features, rng) {
            (Some(m), Some(rng)) if m < self.n_features => {
                let mut picked = sample(rng, self.n_features, m).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..self.n_features).collect(),
        }
    }

    fn best_split(
        &self,
        x: ArrayView2<f64>,
        y: &[usize],
        rows: &[usize],
        counts: &[f64],
        impurity: f64,
        features: &[usize],
    ) -> Option<SplitCandidate> {
        let n = rows.len();
        let mut best: Option<SplitCandidate> = None;
        let mut sorted = rows.to_vec();

        for &feature in features {
            sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

            let mut left = vec![0.0; self.n_classes];
            let mut right = counts.to_vec();
            for pos in 0..n - 1 {
                let label = y[sorted[pos]];
                left[label] += 1.0;
                right[label] -= 1.0;

                let value = x[[sorted[pos], feature]];
                let next = x[[sorted[pos + 1], feature]];
                if next <= value {
                    continue;
                }
                let n_left = pos + 1;
                let n_right = n - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }

                let gain = n as f64 * impurity
                    - n_left as f64 * gini(&left, n_left)
                    - n_right as f64 * gini(&right, n_right);
                if gain > MIN_GAIN && best.map(|b| gain > b.gain + MIN_GAIN).unwrap_or(true) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: value + (next - value) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }

    /// Class distribution of the leaf reached by `row`
    pub(crate) fn leaf_distribution(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Trainable for DecisionTree {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<(), ModelError> {
        check_input(x, y, n_classes)?;
        self.fit_rows(x, y, (0..x.nrows()).collect(), n_classes, None);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Vec<usize> {
        x.rows()
            .into_iter()
            .map(|row| argmax(self.leaf_distribution(row)))
            .collect()
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Option<Array2<f64>> {
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (c, p) in self.leaf_distribution(row).iter().enumerate() {
                proba[[i, c]] = *p;
            }
        }
        Some(proba)
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }
}

fn class_counts(y: &[usize], rows: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    for &i in rows {
        counts[y[i]] += 1.0;
    }
    counts
}

fn gini(counts: &[f64], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts.iter().map(|c| (c / n).powi(2)).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[5.0, 5.0], 10), 0.5);
        assert_eq!(gini(&[4.0, 0.0], 4), 0.0);
    }

    #[test]
    fn test_separable_data_is_learned() {
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [10.0, 1.0], [11.0, 0.0], [12.0, 1.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut tree = DecisionTree::new(&TreeParams::default());
        tree.fit(x.view(), &y, 2).unwrap();

        assert_eq!(tree.predict(x.view()), y.to_vec());
        assert_eq!(tree.node_count(), 3);
        let importances = tree.feature_importances();
        assert_eq!(importances, vec![1.0, 0.0]);

        let proba = tree.predict_proba(array![[6.0, 0.0]].view()).unwrap();
        assert_eq!(proba.row(0).sum(), 1.0);
    }

    #[test]
    fn test_depth_limit_produces_mixed_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = [0, 1, 0, 1];
        let params = TreeParams {
            max_depth: 0,
            ..TreeParams::default()
        };
        let mut tree = DecisionTree::new(&params);
        tree.fit(x.view(), &y, 2).unwrap();
        let proba = tree.predict_proba(x.view()).unwrap();
        assert_eq!(proba[[0, 1]], 0.5);
    }

    #[test]
    fn test_rejects_single_class() {
        let x = array![[1.0], [2.0]];
        let mut tree = DecisionTree::new(&TreeParams::default());
        assert_eq!(tree.fit(x.view(), &[1, 1], 2), Err(ModelError::SingleClass));
    }
}
