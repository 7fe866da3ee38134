//! Train/test splitting and K-fold cross-validation

use crate::error::{ScreeningError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// K-fold splitter
pub struct CrossValidator {
    n_splits: usize,
    shuffle: bool,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new K-fold cross-validator
    pub fn new(n_splits: usize, shuffle: bool) -> Self {
        Self {
            n_splits,
            shuffle,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Generate train/test splits
    pub fn split(&self, n_samples: usize) -> Result<Vec<CVSplit>> {
        if self.n_splits < 2 {
            return Err(ScreeningError::ValidationError(
                "n_splits must be at least 2".to_string()
            ));
        }
        if n_samples < self.n_splits {
            return Err(ScreeningError::ValidationError(
                format!("n_samples ({}) must be >= n_splits ({})", n_samples, self.n_splits)
            ));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            indices.shuffle(&mut rng(self.random_state));
        }

        // First `n_samples % n_splits` folds take one extra sample
        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut splits = Vec::with_capacity(self.n_splits);
        let mut current = 0;

        for fold_idx in 0..self.n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices: Vec<usize> = indices[current..current + fold_size].to_vec();
            let train_indices: Vec<usize> = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit {
                train_indices,
                test_indices,
                fold_idx,
            });

            current += fold_size;
        }

        Ok(splits)
    }
}

fn rng(random_state: Option<u64>) -> ChaCha8Rng {
    match random_state {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Shuffled hold-out split. The test part takes `ceil(test_size * n)` rows.
pub fn train_test_split(n_samples: usize, test_size: f64, random_state: Option<u64>) -> Result<CVSplit> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ScreeningError::InvalidParameter {
            name: "test_size".to_string(),
            value: test_size.to_string(),
            reason: "must be in (0, 1)".to_string(),
        });
    }

    let n_test = (test_size * n_samples as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(ScreeningError::ValidationError(format!(
            "test_size={} leaves an empty side with n_samples={}",
            test_size, n_samples
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(&mut rng(random_state));
    let train_indices = indices.split_off(n_test);

    Ok(CVSplit {
        train_indices,
        test_indices: indices,
        fold_idx: 0,
    })
}

/// Rows of `x` and `y` selected by `indices`
pub fn take_rows(x: &Array2<f64>, y: &Array1<f64>, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
    (x.select(Axis(0), indices), y.select(Axis(0), indices))
}

/// Cross-validation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CVResults {
    /// Scores for each fold
    pub scores: Vec<f64>,
    /// Mean score across folds
    pub mean_score: f64,
    /// Standard deviation of scores
    pub std_score: f64,
    /// Number of folds
    pub n_folds: usize,
}

impl CVResults {
    /// Create CV results from fold scores
    pub fn from_scores(scores: Vec<f64>) -> Self {
        let n_folds = scores.len();
        let mean_score = scores.iter().sum::<f64>() / n_folds as f64;
        let variance = scores.iter().map(|s| (s - mean_score).powi(2)).sum::<f64>() / n_folds as f64;

        Self {
            scores,
            mean_score,
            std_score: variance.sqrt(),
            n_folds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(5, true).with_random_state(42);
        let splits = cv.split(100).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_k_fold_uneven_sizes() {
        let splits = CrossValidator::new(3, false).split(10).unwrap();
        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(splits[0].test_indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_k_fold_is_reproducible() {
        let a = CrossValidator::new(5, true).with_random_state(7).split(50).unwrap();
        let b = CrossValidator::new(5, true).with_random_state(7).split(50).unwrap();
        assert_eq!(a[2].test_indices, b[2].test_indices);
    }

    #[test]
    fn test_k_fold_rejects_bad_sizes() {
        assert!(CrossValidator::new(1, false).split(10).is_err());
        assert!(CrossValidator::new(5, false).split(3).is_err());
    }

    #[test]
    fn test_train_test_split() {
        let split = train_test_split(101, 0.2, Some(42)).unwrap();
        assert_eq!(split.test_indices.len(), 21);
        assert_eq!(split.train_indices.len(), 80);

        let mut all: Vec<usize> = split.train_indices.iter().chain(&split.test_indices).copied().collect();
        all.sort();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn test_train_test_split_invalid_size() {
        assert!(matches!(
            train_test_split(10, 1.5, None),
            Err(ScreeningError::InvalidParameter { .. })
        ));
        assert!(train_test_split(1, 0.2, None).is_err());
    }

    #[test]
    fn test_take_rows() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let y = array![10.0, 20.0, 30.0];
        let (xs, ys) = take_rows(&x, &y, &[2, 0]);
        assert_eq!(xs, array![[5.0, 6.0], [1.0, 2.0]]);
        assert_eq!(ys, array![30.0, 10.0]);
    }

    #[test]
    fn test_cv_results() {
        let results = CVResults::from_scores(vec![1.0, 3.0]);
        assert_eq!(results.mean_score, 2.0);
        assert_eq!(results.std_score, 1.0);
        assert_eq!(results.n_folds, 2);
    }
}
