//! CatBoost-style gradient boosting with symmetric (oblivious) trees
//!
//! Key features:
//! - Symmetric trees: all nodes at the same depth use the same split
//! - Quantized feature borders with histogram split search
//! - Eval-set early stopping that keeps the best iteration
//! - Leaf covers are recorded so the ensemble can be explained exactly

use crate::error::{ScreeningError, Result};
use crate::explainability::shap_interaction::{ensemble_interaction_values, ShapInteractionValues};
use crate::explainability::{InteractionExplainer, InteractionSupport};
use crate::training::models::{rmse, Regressor};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub reg_lambda: f64,
    pub subsample: f64,
    /// Maximum number of borders per feature
    pub border_count: usize,
    pub random_state: Option<u64>,
    /// Log training progress every `verbose` iterations (0 disables)
    pub verbose: usize,
}

impl Default for CatBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            learning_rate: 0.02,
            max_depth: 6,
            reg_lambda: 3.0,
            subsample: 1.0,
            border_count: 254,
            random_state: Some(42),
            verbose: 500,
        }
    }
}

impl CatBoostConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(invalid("n_estimators", self.n_estimators, "must be positive"));
        }
        if !(self.learning_rate > 0.0) {
            return Err(invalid("learning_rate", self.learning_rate, "must be positive"));
        }
        if self.max_depth == 0 || self.max_depth > 16 {
            return Err(invalid("max_depth", self.max_depth, "must be in 1..=16"));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(invalid("subsample", self.subsample, "must be in (0, 1]"));
        }
        if self.border_count == 0 || self.border_count > u16::MAX as usize {
            return Err(invalid("border_count", self.border_count, "must be in 1..=65535"));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: impl ToString, reason: &str) -> ScreeningError {
    ScreeningError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Symmetric (oblivious) tree: each level uses the same split feature + threshold.
///
/// A sample goes right at a level when `sample[feature] > threshold`, so NaN
/// always goes left. Leaf values already include the learning rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObliviousTree {
    splits: Vec<(usize, f64)>,
    leaf_values: Vec<f64>,
    /// Training rows per node, one vector per level; the last level holds the leaves
    node_covers: Vec<Vec<f64>>,
}

impl ObliviousTree {
    /// Build a tree from its splits and `2^depth` leaf values and covers
    pub fn new(splits: Vec<(usize, f64)>, leaf_values: Vec<f64>, leaf_covers: Vec<f64>) -> Result<Self> {
        let n_leaves = 1usize << splits.len();
        if leaf_values.len() != n_leaves || leaf_covers.len() != n_leaves {
            return Err(ScreeningError::ShapeError {
                expected: format!("{} leaves", n_leaves),
                actual: format!("{} values, {} covers", leaf_values.len(), leaf_covers.len()),
            });
        }

        let mut node_covers = vec![leaf_covers];
        for _ in 0..splits.len() {
            let Some(below) = node_covers.last() else { break };
            let above: Vec<f64> = below.chunks(2).map(|pair| pair.iter().sum()).collect();
            node_covers.push(above);
        }
        node_covers.reverse();

        Ok(Self { splits, leaf_values, node_covers })
    }

    pub fn depth(&self) -> usize {
        self.splits.len()
    }

    pub fn splits(&self) -> &[(usize, f64)] {
        &self.splits
    }

    pub fn leaf_values(&self) -> &[f64] {
        &self.leaf_values
    }

    /// Distinct features used by the tree, sorted
    pub fn features(&self) -> Vec<usize> {
        let mut features: Vec<usize> = self.splits.iter().map(|&(f, _)| f).collect();
        features.sort_unstable();
        features.dedup();
        features
    }

    /// Leaf reached by `sample`; the first level is the most significant bit
    pub fn leaf_index(&self, sample: &[f64]) -> usize {
        self.splits
            .iter()
            .fold(0usize, |idx, &(feature, threshold)| idx * 2 + usize::from(sample[feature] > threshold))
    }

    pub fn predict(&self, sample: &[f64]) -> f64 {
        self.leaf_values[self.leaf_index(sample)]
    }

    /// Expected output when only the features accepted by `known` are fixed to
    /// the sample; the others follow the training cover of each branch.
    pub fn conditional_expectation(&self, sample: &[f64], known: &dyn Fn(usize) -> bool) -> f64 {
        self.expect_from(0, 0, sample, known)
    }

    fn expect_from(&self, level: usize, node: usize, sample: &[f64], known: &dyn Fn(usize) -> bool) -> f64 {
        if level == self.splits.len() {
            return self.leaf_values[node];
        }

        let (feature, threshold) = self.splits[level];
        let left = node * 2;
        let right = left + 1;

        if known(feature) {
            let child = if sample[feature] > threshold { right } else { left };
            return self.expect_from(level + 1, child, sample, known);
        }

        let covers = &self.node_covers[level + 1];
        let (w_left, w_right) = (covers[left], covers[right]);
        let e_left = self.expect_from(level + 1, left, sample, known);
        let e_right = self.expect_from(level + 1, right, sample, known);

        cover_weighted(w_left, e_left, w_right, e_right)
    }

    /// Conditional expectation for every subset of `features` in one bottom-up
    /// pass, for a sample that reaches `leaf`. Entry `mask` fixes the features
    /// whose position in `features` has its bit set. Every split feature of the
    /// tree must appear in `features`.
    pub fn expectations_by_mask(&self, leaf: usize, features: &[usize]) -> Vec<f64> {
        let depth = self.splits.len();
        let n_masks = 1usize << features.len();
        let mut level_values: Vec<Vec<f64>> = self
            .leaf_values
            .iter()
            .map(|&value| vec![value; n_masks])
            .collect();

        for level in (0..depth).rev() {
            let (feature, _) = self.splits[level];
            let pos = features.iter().position(|&f| f == feature);
            let goes_right = leaf >> (depth - 1 - level) & 1 == 1;
            let covers = &self.node_covers[level + 1];

            level_values = level_values
                .chunks(2)
                .enumerate()
                .map(|(node, children)| {
                    let (left, right) = (&children[0], &children[1]);
                    let (w_left, w_right) = (covers[node * 2], covers[node * 2 + 1]);
                    (0..n_masks)
                        .map(|mask| {
                            let known = pos.map_or(false, |p| mask >> p & 1 == 1);
                            match (known, goes_right) {
                                (true, true) => right[mask],
                                (true, false) => left[mask],
                                (false, _) => cover_weighted(w_left, left[mask], w_right, right[mask]),
                            }
                        })
                        .collect()
                })
                .collect();
        }

        level_values.into_iter().next().unwrap_or_else(|| vec![0.0; n_masks])
    }
}

fn cover_weighted(w_left: f64, e_left: f64, w_right: f64, e_right: f64) -> f64 {
    let total = w_left + w_right;
    if total > 0.0 {
        (w_left * e_left + w_right * e_right) / total
    } else {
        0.5 * (e_left + e_right)
    }
}

/// Per-feature quantization borders, ascending
#[derive(Debug, Clone)]
struct FeatureBorders {
    borders: Vec<Vec<f64>>,
}

impl FeatureBorders {
    fn fit(x: &Array2<f64>, border_count: usize) -> Self {
        let borders = (0..x.ncols())
            .into_par_iter()
            .map(|j| {
                let mut values: Vec<f64> = x.column(j).iter().copied().filter(|v| !v.is_nan()).collect();
                values.sort_by(|a, b| a.total_cmp(b));
                values.dedup();

                if values.len() < 2 {
                    return Vec::new();
                }

                let gaps: Vec<f64> = values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
                if gaps.len() <= border_count {
                    return gaps;
                }

                // Evenly spaced picks among the candidate midpoints
                let mut picked: Vec<f64> = (0..border_count)
                    .map(|k| {
                        let pos = ((k as f64 + 0.5) * gaps.len() as f64 / border_count as f64) as usize;
                        gaps[pos.min(gaps.len() - 1)]
                    })
                    .collect();
                picked.dedup();
                picked
            })
            .collect();

        Self { borders }
    }

    /// Column-major bin indices; bin `b` means the value exceeds exactly `b` borders
    fn bin(&self, x: &Array2<f64>) -> Vec<Vec<u16>> {
        self.borders
            .par_iter()
            .enumerate()
            .map(|(j, borders)| {
                x.column(j)
                    .iter()
                    .map(|&v| borders.partition_point(|&b| v > b) as u16)
                    .collect()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    g: f64,
    h: f64,
    n: f64,
}

fn leaf_score(g: f64, h: f64, reg_lambda: f64) -> f64 {
    g * g / (h + reg_lambda)
}

struct TreeBuilder<'a> {
    borders: &'a FeatureBorders,
    bins: &'a [Vec<u16>],
    max_depth: usize,
    reg_lambda: f64,
    learning_rate: f64,
}

impl TreeBuilder<'_> {
    /// Grow one symmetric tree on the rows in `indices`
    fn build(&self, gradients: &[f64], hessians: &[f64], indices: &[usize]) -> Result<ObliviousTree> {
        let mut leaf_of: Vec<usize> = vec![0; indices.len()];
        let mut splits: Vec<(usize, f64)> = Vec::with_capacity(self.max_depth);
        let mut n_leaves = 1usize;

        for _depth in 0..self.max_depth {
            let best = (0..self.bins.len())
                .into_par_iter()
                .filter_map(|feat| self.best_border(feat, gradients, hessians, indices, &leaf_of, n_leaves))
                .max_by(|a, b| a.2.total_cmp(&b.2));

            let Some((feat, border_idx, _gain)) = best else { break };
            splits.push((feat, self.borders.borders[feat][border_idx]));

            let column = &self.bins[feat];
            for (slot, &row) in leaf_of.iter_mut().zip(indices.iter()) {
                *slot = *slot * 2 + usize::from(column[row] as usize > border_idx);
            }
            n_leaves *= 2;
        }

        let mut stats = vec![GradStats::default(); n_leaves];
        for (&leaf, &row) in leaf_of.iter().zip(indices.iter()) {
            stats[leaf].g += gradients[row];
            stats[leaf].h += hessians[row];
            stats[leaf].n += 1.0;
        }

        let leaf_values = stats
            .iter()
            .map(|s| if s.n > 0.0 { -self.learning_rate * s.g / (s.h + self.reg_lambda) } else { 0.0 })
            .collect();
        let leaf_covers = stats.iter().map(|s| s.n).collect();

        ObliviousTree::new(splits, leaf_values, leaf_covers)
    }

    /// Best border of one feature for the current partition, with its total gain
    fn best_border(
        &self,
        feat: usize,
        gradients: &[f64],
        hessians: &[f64],
        indices: &[usize],
        leaf_of: &[usize],
        n_leaves: usize,
    ) -> Option<(usize, usize, f64)> {
        let n_borders = self.borders.borders[feat].len();
        if n_borders == 0 {
            return None;
        }
        let n_bins = n_borders + 1;
        let column = &self.bins[feat];

        // hist[leaf * n_bins + bin]
        let mut hist = vec![GradStats::default(); n_leaves * n_bins];
        for (&leaf, &row) in leaf_of.iter().zip(indices.iter()) {
            let cell = &mut hist[leaf * n_bins + column[row] as usize];
            cell.g += gradients[row];
            cell.h += hessians[row];
        }

        let mut gains = vec![0.0f64; n_borders];
        for leaf in 0..n_leaves {
            let cells = &hist[leaf * n_bins..(leaf + 1) * n_bins];
            let total_g: f64 = cells.iter().map(|c| c.g).sum();
            let total_h: f64 = cells.iter().map(|c| c.h).sum();
            let parent = leaf_score(total_g, total_h, self.reg_lambda);

            let (mut lg, mut lh) = (0.0, 0.0);
            for (t, gain) in gains.iter_mut().enumerate() {
                lg += cells[t].g;
                lh += cells[t].h;
                *gain += leaf_score(lg, lh, self.reg_lambda)
                    + leaf_score(total_g - lg, total_h - lh, self.reg_lambda)
                    - parent;
            }
        }

        gains
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .filter(|&(_, &gain)| gain > 1e-12)
            .map(|(t, &gain)| (feat, t, gain))
    }
}

// ============ CatBoost Regressor ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostRegressor {
    pub config: CatBoostConfig,
    trees: Vec<ObliviousTree>,
    base_prediction: f64,
    n_features: usize,
    best_iteration: Option<usize>,
    is_fitted: bool,
}

impl CatBoostRegressor {
    pub fn new(config: CatBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: 0,
            best_iteration: None,
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_inner(x, y, None)
    }

    /// Fit with an eval set: stop after `early_stopping_rounds` iterations without
    /// an improvement of eval RMSE and keep the trees up to the best iteration.
    pub fn fit_with_eval(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        x_val: &Array2<f64>,
        y_val: &Array1<f64>,
        early_stopping_rounds: usize,
    ) -> Result<()> {
        if x_val.ncols() != x.ncols() || x_val.nrows() != y_val.len() {
            return Err(ScreeningError::ShapeError {
                expected: format!("eval set with {} columns and matching target", x.ncols()),
                actual: format!("{}x{} with {} targets", x_val.nrows(), x_val.ncols(), y_val.len()),
            });
        }
        self.fit_inner(x, y, Some((x_val, y_val, early_stopping_rounds)))
    }

    fn fit_inner(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        eval: Option<(&Array2<f64>, &Array1<f64>, usize)>,
    ) -> Result<()> {
        self.config.validate()?;
        let n = x.nrows();
        if n == 0 {
            return Err(ScreeningError::TrainingError("Empty dataset".into()));
        }
        if y.len() != n {
            return Err(ScreeningError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));
        self.trees.clear();
        self.best_iteration = None;
        self.n_features = x.ncols();
        self.base_prediction = y.mean().unwrap_or(0.0);

        let borders = FeatureBorders::fit(x, self.config.border_count);
        let bins = borders.bin(x);
        let builder = TreeBuilder {
            borders: &borders,
            bins: &bins,
            max_depth: self.config.max_depth,
            reg_lambda: self.config.reg_lambda,
            learning_rate: self.config.learning_rate,
        };

        let mut predictions = Array1::from_elem(n, self.base_prediction);
        let hessians: Vec<f64> = vec![1.0; n];

        let eval_rows: Vec<Vec<f64>> = eval
            .map(|(xv, _, _)| xv.outer_iter().map(|row| row.to_vec()).collect())
            .unwrap_or_default();
        let mut eval_predictions = Array1::from_elem(eval_rows.len(), self.base_prediction);
        let mut best: Option<(usize, f64)> = None;

        for iteration in 0..self.config.n_estimators {
            let gradients: Vec<f64> = predictions.iter().zip(y.iter()).map(|(&p, &yi)| p - yi).collect();

            let indices: Vec<usize> = if self.config.subsample < 1.0 {
                let k = (n as f64 * self.config.subsample).ceil() as usize;
                let mut sub: Vec<usize> = (0..n).collect();
                sub.shuffle(&mut rng);
                sub.truncate(k);
                sub.sort_unstable();
                sub
            } else {
                (0..n).collect()
            };

            let tree = builder.build(&gradients, &hessians, &indices)?;

            let mut leaf_idx = vec![0usize; n];
            for &(feat, threshold) in tree.splits() {
                let border_idx = borders.borders[feat].partition_point(|&b| b < threshold);
                for (row, slot) in leaf_idx.iter_mut().enumerate() {
                    *slot = *slot * 2 + usize::from(bins[feat][row] as usize > border_idx);
                }
            }
            for (row, &leaf) in leaf_idx.iter().enumerate() {
                predictions[row] += tree.leaf_values()[leaf];
            }

            if let Some((_, yv, rounds)) = eval {
                for (p, row) in eval_predictions.iter_mut().zip(eval_rows.iter()) {
                    *p += tree.predict(row);
                }
                let score = rmse(yv, &eval_predictions);
                self.trees.push(tree);

                if best.map_or(true, |(_, b)| score < b) {
                    best = Some((iteration, score));
                }
                self.log_progress(iteration, Some(score));

                if let Some((best_iter, _)) = best {
                    if iteration - best_iter >= rounds {
                        debug!(iteration, best_iter, "early stopping");
                        break;
                    }
                }
            } else {
                self.trees.push(tree);
                self.log_progress(iteration, None);
            }
        }

        if let Some((best_iter, best_score)) = best {
            self.trees.truncate(best_iter + 1);
            self.best_iteration = Some(best_iter);
            info!(best_iteration = best_iter, best_rmse = best_score, "kept best iteration");
        }

        self.is_fitted = true;
        Ok(())
    }

    fn log_progress(&self, iteration: usize, eval_rmse: Option<f64>) {
        let verbose = self.config.verbose;
        if verbose == 0 {
            return;
        }
        let last = iteration + 1 == self.config.n_estimators;
        if iteration % verbose == 0 || last {
            match eval_rmse {
                Some(score) => info!(iteration, eval_rmse = score, "boosting"),
                None => info!(iteration, "boosting"),
            }
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_input(x)?;
        Ok(Array1::from_vec(
            x.outer_iter()
                .map(|row| {
                    let sample = row.to_vec();
                    self.base_prediction + self.trees.iter().map(|t| t.predict(&sample)).sum::<f64>()
                })
                .collect(),
        ))
    }

    fn check_input(&self, x: &Array2<f64>) -> Result<()> {
        if !self.is_fitted {
            return Err(ScreeningError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(ScreeningError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(())
    }

    pub fn trees(&self) -> &[ObliviousTree] {
        &self.trees
    }

    pub fn base_prediction(&self) -> f64 {
        self.base_prediction
    }

    pub fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl Regressor for CatBoostRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        CatBoostRegressor::predict(self, x)
    }

    /// Exact brute-force partial dependence without re-predicting every cell:
    /// a tree only depends on the grid through its levels that split on one of
    /// the two features, so each tree is averaged over the rows once per
    /// combination of those levels' branch bits.
    fn average_on_grid(
        &self,
        x: &Array2<f64>,
        feature_1: usize,
        feature_2: usize,
        grid_1: &[f64],
        grid_2: &[f64],
    ) -> Result<Array2<f64>> {
        self.check_input(x)?;
        let shape = (grid_1.len(), grid_2.len());
        if x.nrows() == 0 {
            return Ok(Array2::from_elem(shape, f64::NAN));
        }

        let rows: Vec<Vec<f64>> = x.outer_iter().map(|row| row.to_vec()).collect();
        let grid = GridAxes { feature_1, feature_2, grid_1, grid_2 };

        let total = self
            .trees
            .par_iter()
            .fold(
                || Array2::zeros(shape),
                |mut acc, tree| {
                    grid.accumulate(tree, &rows, &mut acc);
                    acc
                },
            )
            .reduce(|| Array2::zeros(shape), |a, b| a + b);

        Ok(total + self.base_prediction)
    }

    fn interaction_support(&self) -> InteractionSupport<'_> {
        if self.is_fitted {
            InteractionSupport::Supported(self)
        } else {
            InteractionSupport::Unsupported { reason: "model not fitted".to_string() }
        }
    }
}

struct GridAxes<'a> {
    feature_1: usize,
    feature_2: usize,
    grid_1: &'a [f64],
    grid_2: &'a [f64],
}

impl GridAxes<'_> {
    /// Add one tree's row-averaged output on every grid cell to `acc`
    fn accumulate(&self, tree: &ObliviousTree, rows: &[Vec<f64>], acc: &mut Array2<f64>) {
        let depth = tree.depth();
        let bit = |level: usize| 1usize << (depth - 1 - level);
        let on_grid = |feature: usize| feature == self.feature_1 || feature == self.feature_2;

        let varying: Vec<usize> = (0..depth).filter(|&l| on_grid(tree.splits()[l].0)).collect();
        let n_combos = 1usize << varying.len();

        let mut combo_means = vec![0.0f64; n_combos];
        for row in rows {
            let mut fixed = 0usize;
            for (level, &(feature, threshold)) in tree.splits().iter().enumerate() {
                if !on_grid(feature) && row[feature] > threshold {
                    fixed |= bit(level);
                }
            }
            for (combo, mean) in combo_means.iter_mut().enumerate() {
                let mut idx = fixed;
                for (b, &level) in varying.iter().enumerate() {
                    if combo >> b & 1 == 1 {
                        idx |= bit(level);
                    }
                }
                *mean += tree.leaf_values()[idx];
            }
        }
        let n_rows = rows.len() as f64;
        combo_means.iter_mut().for_each(|m| *m /= n_rows);

        for ((i, j), cell) in acc.indexed_iter_mut() {
            let mut combo = 0usize;
            for (b, &level) in varying.iter().enumerate() {
                let (feature, threshold) = tree.splits()[level];
                // feature_2 is written last and wins when both name the same column
                let value = if feature == self.feature_2 { self.grid_2[j] } else { self.grid_1[i] };
                if value > threshold {
                    combo |= 1 << b;
                }
            }
            *cell += combo_means[combo];
        }
    }
}

impl InteractionExplainer for CatBoostRegressor {
    fn shap_interaction_values(&self, x: &Array2<f64>) -> Result<ShapInteractionValues> {
        self.check_input(x)?;
        ensemble_interaction_values(&self.trees, self.base_prediction, x)
    }
}
