//! Seeded train/test splitting

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Row indices of each side of a split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub stratified: bool,
}

/// Split row indices `0..labels.len()` into train and test
///
/// Stratifies on the label when there are at least two classes and every
/// class has at least two members; otherwise shuffles all rows. The test
/// side holds `ceil(rows * test_fraction)` rows, clamped so both sides are
/// non-empty.
pub fn train_test_split(labels: &[usize], test_fraction: f64, seed: u64) -> TrainTestSplit {
    let rows = labels.len();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    if rows < 2 {
        return TrainTestSplit {
            train: (0..rows).collect(),
            test: Vec::new(),
            stratified: false,
        };
    }
    let n_test = ((rows as f64 * test_fraction - 1e-9).ceil() as usize).clamp(1, rows - 1);

    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }
    let stratify = by_class.len() >= 2 && by_class.values().all(|members| members.len() >= 2);

    let (mut train, mut test) = if stratify {
        let mut train = Vec::with_capacity(rows - n_test);
        let mut test = Vec::with_capacity(n_test);
        for members in by_class.values_mut() {
            members.shuffle(&mut rng);
            let share = (members.len() as f64 * n_test as f64 / rows as f64).round() as usize;
            let take = share.clamp(1, members.len() - 1);
            test.extend_from_slice(&members[..take]);
            train.extend_from_slice(&members[take..]);
        }
        (train, test)
    } else {
        let mut all: Vec<usize> = (0..rows).collect();
        all.shuffle(&mut rng);
        let test = all[..n_test].to_vec();
        let train = all[n_test..].to_vec();
        (train, test)
    };

    train.sort_unstable();
    test.sort_unstable();
    TrainTestSplit {
        train,
        test,
        stratified: stratify,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stratified_split_keeps_classes() {
        let labels: Vec<usize> = (0..40).map(|i| usize::from(i % 4 == 0)).collect();
        let split = train_test_split(&labels, 0.3, 42);

        assert!(split.stratified);
        assert_eq!(split.train.len() + split.test.len(), 40);
        let test_pos = split.test.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(test_pos, 3);
        assert!(split.train.iter().any(|&i| labels[i] == 1));
    }

    #[test]
    fn test_unstratified_when_class_is_singleton() {
        let mut labels = vec![0usize; 20];
        labels[3] = 1;
        let split = train_test_split(&labels, 0.2, 42);
        assert!(!split.stratified);
        assert_eq!(split.test.len(), 4);
        assert_eq!(split.train.len(), 16);
    }

    #[test]
    fn test_split_is_deterministic() {
        let labels: Vec<usize> = (0..30).map(|i| i % 3).collect();
        assert_eq!(
            train_test_split(&labels, 0.2, 7),
            train_test_split(&labels, 0.2, 7)
        );
        assert_ne!(
            train_test_split(&labels, 0.2, 7).test,
            train_test_split(&labels, 0.2, 8).test
        );
    }

    #[test]
    fn test_disjoint_sides() {
        let labels: Vec<usize> = (0..25).map(|i| i % 2).collect();
        let split = train_test_split(&labels, 0.3, 1);
        assert!(split.test.iter().all(|i| !split.train.contains(i)));
    }
}
