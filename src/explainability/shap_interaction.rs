//! Shapley interaction values for symmetric tree ensembles
//!
//! Values follow the path-dependent convention: features outside a coalition
//! are integrated out with the training cover of each branch. Off-diagonal
//! entries split the pairwise Shapley interaction index evenly between
//! `(i, j)` and `(j, i)`; the diagonal holds what remains of each feature's
//! Shapley value, so every row of a sample's matrix sums to that value.

use crate::error::{ScreeningError, Result};
use crate::training::catboost::ObliviousTree;
use crate::training::Regressor;
use ndarray::{s, Array2, Array3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Pairwise interaction contributions: shape (n_samples, n_features, n_features)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapInteractionValues {
    values: Array3<f64>,
    expected_value: f64,
}

impl ShapInteractionValues {
    pub fn new(values: Array3<f64>, expected_value: f64) -> Result<Self> {
        let (_, n_a, n_b) = values.dim();
        if n_a != n_b {
            return Err(ScreeningError::ShapeError {
                expected: "square feature axes".to_string(),
                actual: format!("{} x {}", n_a, n_b),
            });
        }
        Ok(Self { values, expected_value })
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Model output expected before any feature is known
    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    pub fn n_samples(&self) -> usize {
        self.values.dim().0
    }

    pub fn n_features(&self) -> usize {
        self.values.dim().1
    }

    /// Mean over samples of `|Φ[s, i, j]|`; NaN without samples
    pub fn mean_abs_pair(&self, i: usize, j: usize) -> f64 {
        let column = self.values.slice(s![.., i, j]);
        column.mapv(f64::abs).mean().unwrap_or(f64::NAN)
    }
}

/// Capability to compute Shapley interaction values
pub trait InteractionExplainer: Send + Sync {
    fn shap_interaction_values(&self, x: &Array2<f64>) -> Result<ShapInteractionValues>;
}

/// Whether a model can be explained with interaction values, resolved once per run
pub enum InteractionSupport<'a> {
    Supported(&'a dyn InteractionExplainer),
    Unsupported { reason: String },
}

/// Mean absolute interaction of every feature with `target` over the rows of `x`.
///
/// Degrades to NaN for every feature when the model has no interaction
/// capability or the computation fails; the condition is logged once.
pub fn shap_pair_interaction_scores(model: &dyn Regressor, x: &Array2<f64>, target: usize) -> Vec<f64> {
    let n_features = x.ncols();
    let unavailable = |reason: &str| {
        warn!(reason, "SHAP interaction not available");
        vec![f64::NAN; n_features]
    };

    let explainer = match model.interaction_support() {
        InteractionSupport::Supported(explainer) => explainer,
        InteractionSupport::Unsupported { reason } => return unavailable(&reason),
    };

    info!(n_samples = x.nrows(), n_features, "computing SHAP interaction values");
    let interactions = match explainer.shap_interaction_values(x) {
        Ok(values) => values,
        Err(e) => return unavailable(&e.to_string()),
    };
    if target >= interactions.n_features() {
        return unavailable("interaction feature outside the explained matrix");
    }

    (0..interactions.n_features())
        .map(|i| interactions.mean_abs_pair(i, target))
        .collect()
}

/// Interaction values of an additive ensemble of symmetric trees plus a base value
pub fn ensemble_interaction_values(
    trees: &[ObliviousTree],
    base_value: f64,
    x: &Array2<f64>,
) -> Result<ShapInteractionValues> {
    let n_features = x.ncols();
    let n_samples = x.nrows();
    let rows: Vec<Vec<f64>> = x.outer_iter().map(|row| row.to_vec()).collect();

    // A tree's contribution only depends on the leaf a sample reaches
    let tables: Vec<LeafInteractions> = trees
        .par_iter()
        .map(|tree| LeafInteractions::build(tree, &rows))
        .collect();

    let per_sample: Vec<Array2<f64>> = rows
        .par_iter()
        .map(|sample| {
            let mut matrix = Array2::zeros((n_features, n_features));
            for (tree, table) in trees.iter().zip(&tables) {
                table.add_to(tree.leaf_index(sample), &mut matrix);
            }
            matrix
        })
        .collect();

    let mut values = Array3::zeros((n_samples, n_features, n_features));
    for (s, matrix) in per_sample.iter().enumerate() {
        values.slice_mut(s![s, .., ..]).assign(matrix);
    }

    let zeros = vec![0.0; n_features];
    let expected_value = base_value
        + trees
            .iter()
            .map(|t| t.conditional_expectation(&zeros, &|_| false))
            .sum::<f64>();

    ShapInteractionValues::new(values, expected_value)
}

/// One tree's interaction matrix, over its own features, for each leaf reached
struct LeafInteractions {
    features: Vec<usize>,
    by_leaf: Vec<Option<Array2<f64>>>,
}

impl LeafInteractions {
    fn build(tree: &ObliviousTree, rows: &[Vec<f64>]) -> Self {
        let features = tree.features();
        let mut by_leaf: Vec<Option<Array2<f64>>> = vec![None; 1 << tree.depth()];
        if !features.is_empty() {
            for row in rows {
                let leaf = tree.leaf_index(row);
                if by_leaf[leaf].is_none() {
                    let v = tree.expectations_by_mask(leaf, &features);
                    by_leaf[leaf] = Some(interaction_matrix(&v, features.len()));
                }
            }
        }
        Self { features, by_leaf }
    }

    fn add_to(&self, leaf: usize, out: &mut Array2<f64>) {
        let Some(local) = self.by_leaf.get(leaf).and_then(Option::as_ref) else {
            return;
        };
        for (a, &fa) in self.features.iter().enumerate() {
            for (b, &fb) in self.features.iter().enumerate() {
                out[[fa, fb]] += local[[a, b]];
            }
        }
    }
}

/// Exact `k x k` interaction matrix from the expectation `v[mask]` of every
/// coalition of `k` features
fn interaction_matrix(v: &[f64], k: usize) -> Array2<f64> {
    let mut out = Array2::zeros((k, k));

    let fact: Vec<f64> = (0..=k)
        .scan(1.0, |acc, n| {
            if n > 0 {
                *acc *= n as f64;
            }
            Some(*acc)
        })
        .collect();

    let mut assigned = vec![0.0f64; k];
    for a in 0..k {
        for b in (a + 1)..k {
            let pair = (1usize << a) | (1usize << b);
            let mut index = 0.0;
            for mask in 0..1usize << k {
                if mask & pair != 0 {
                    continue;
                }
                let size = mask.count_ones() as usize;
                let weight = fact[size] * fact[k - size - 2] / fact[k - 1];
                index += weight
                    * (v[mask | pair] - v[mask | 1 << a] - v[mask | 1 << b] + v[mask]);
            }

            let half = index / 2.0;
            out[[a, b]] += half;
            out[[b, a]] += half;
            assigned[a] += half;
            assigned[b] += half;
        }
    }

    for a in 0..k {
        let mut phi = 0.0;
        for mask in 0..1usize << k {
            if mask >> a & 1 == 1 {
                continue;
            }
            let size = mask.count_ones() as usize;
            let weight = fact[size] * fact[k - size - 1] / fact[k];
            phi += weight * (v[mask | 1 << a] - v[mask]);
        }
        out[[a, a]] += phi - assigned[a];
    }
    out
}
