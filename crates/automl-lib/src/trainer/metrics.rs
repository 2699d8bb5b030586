//! Evaluation metrics on the held-out split

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Held-out scores of one candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub accuracy: f64,
    /// Support-weighted F1
    pub f1_score: f64,
    /// ROC AUC, or accuracy when no probabilities or a single-class fold
    pub auc_score: f64,
    /// Seconds spent fitting
    pub training_time: f64,
    #[serde(default)]
    pub auc_is_fallback: bool,
}

/// Score predictions against the truth
///
/// `proba` holds one column per class. AUC falls back to accuracy when it
/// is `None` or the metric is undefined for the fold.
pub fn evaluate(
    y_true: &[usize],
    y_pred: &[usize],
    proba: Option<&Array2<f64>>,
    n_classes: usize,
    training_time: f64,
) -> ModelMetrics {
    let accuracy = accuracy(y_true, y_pred);
    let auc = proba.and_then(|p| roc_auc(y_true, p, n_classes));
    ModelMetrics {
        accuracy,
        f1_score: weighted_f1(y_true, y_pred, n_classes),
        auc_score: auc.unwrap_or(accuracy),
        training_time,
        auc_is_fallback: auc.is_none(),
    }
}

pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Per-class F1 averaged with weights equal to true support
///
/// Zero-division cases score 0 for that class.
pub fn weighted_f1(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mut tp = vec![0usize; n_classes];
    let mut fp = vec![0usize; n_classes];
    let mut support = vec![0usize; n_classes];

    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t < n_classes {
            support[t] += 1;
        }
        if t == p {
            if t < n_classes {
                tp[t] += 1;
            }
        } else if p < n_classes {
            fp[p] += 1;
        }
    }

    let mut total = 0.0;
    for c in 0..n_classes {
        let false_neg = support[c] - tp[c];
        let denom = 2 * tp[c] + fp[c] + false_neg;
        if denom > 0 {
            total += support[c] as f64 * (2 * tp[c]) as f64 / denom as f64;
        }
    }
    total / y_true.len() as f64
}

/// Binary AUC on the positive-class column, macro one-vs-rest otherwise
///
/// `None` when no class has both positive and negative examples.
pub fn roc_auc(y_true: &[usize], proba: &Array2<f64>, n_classes: usize) -> Option<f64> {
    if proba.nrows() != y_true.len() || proba.ncols() < n_classes.max(2) {
        return None;
    }
    if n_classes <= 2 {
        let scores: Vec<f64> = proba.column(1).to_vec();
        let positives: Vec<bool> = y_true.iter().map(|&y| y == 1).collect();
        return binary_auc(&scores, &positives);
    }

    let aucs: Vec<f64> = (0..n_classes)
        .filter_map(|c| {
            let scores: Vec<f64> = proba.column(c).to_vec();
            let positives: Vec<bool> = y_true.iter().map(|&y| y == c).collect();
            binary_auc(&scores, &positives)
        })
        .collect();
    if aucs.is_empty() {
        None
    } else {
        Some(aucs.iter().sum::<f64>() / aucs.len() as f64)
    }
}

/// Mann-Whitney U statistic with average ranks for ties
pub fn binary_auc(scores: &[f64], positives: &[bool]) -> Option<f64> {
    let n_pos = positives.iter().filter(|&&p| p).count();
    let n_neg = positives.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.iter().any(|s| !s.is_finite()) {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based; tied block shares the average
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = ranks
        .iter()
        .zip(positives)
        .filter(|(_, p)| **p)
        .map(|(r, _)| *r)
        .sum();
    let u = pos_rank_sum - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos * n_neg) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_accuracy_half() {
        assert_eq!(accuracy(&[0, 1, 1, 0], &[0, 1, 0, 1]), 0.5);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_weighted_f1_perfect_and_known() {
        assert_eq!(weighted_f1(&[0, 1, 1], &[0, 1, 1], 2), 1.0);
        // class 0: tp=1 fp=1 fn=0 -> f1=2/3, support 1
        // class 1: tp=1 fp=0 fn=1 -> f1=2/3, support 2
        let f1 = weighted_f1(&[0, 1, 1], &[0, 0, 1], 2);
        assert!((f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_auc_perfect() {
        let auc = binary_auc(&[0.1, 0.2, 0.8, 0.9], &[false, false, true, true]).unwrap();
        assert_eq!(auc, 1.0);
    }

    #[test]
    fn test_auc_worst() {
        let auc = binary_auc(&[0.9, 0.8, 0.2, 0.1], &[false, false, true, true]).unwrap();
        assert_eq!(auc, 0.0);
    }

    #[test]
    fn test_auc_ties_count_half() {
        let auc = binary_auc(&[0.5, 0.5], &[false, true]).unwrap();
        assert_eq!(auc, 0.5);
    }

    #[test]
    fn test_auc_single_class_is_undefined() {
        assert_eq!(binary_auc(&[0.1, 0.9], &[true, true]), None);
    }

    #[test]
    fn test_evaluate_falls_back_to_accuracy() {
        let metrics = evaluate(&[1, 1, 0], &[1, 0, 0], None, 2, 0.5);
        assert!((metrics.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(metrics.auc_score, metrics.accuracy);
        assert!(metrics.auc_is_fallback);

        let proba = array![[0.9, 0.1], [0.8, 0.2], [0.7, 0.3]];
        let metrics = evaluate(&[1, 1, 1], &[1, 1, 1], Some(&proba), 2, 0.5);
        assert!(metrics.auc_is_fallback);
        assert_eq!(metrics.auc_score, 1.0);
    }

    #[test]
    fn test_multiclass_auc_is_macro_average() {
        let proba = array![
            [0.8, 0.1, 0.1],
            [0.1, 0.8, 0.1],
            [0.1, 0.1, 0.8],
            [0.7, 0.2, 0.1]
        ];
        let auc = roc_auc(&[0, 1, 2, 0], &proba, 3).unwrap();
        assert_eq!(auc, 1.0);
    }
}
