//! Two-way partial dependence and mixed-derivative interaction strength

use crate::error::{ScreeningError, Result};
use crate::training::Regressor;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Result of a two-way partial dependence computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialDependence2D {
    /// Feature indices (feature_1, feature_2)
    pub feature_indices: (usize, usize),
    /// Grid values for feature 1
    pub grid_values_1: Vec<f64>,
    /// Grid values for feature 2
    pub grid_values_2: Vec<f64>,
    /// Average predictions: shape (n_grid_1, n_grid_2)
    pub average: Array2<f64>,
}

impl PartialDependence2D {
    /// Mean absolute mixed second derivative of the surface.
    ///
    /// Differentiates along feature 2 first, then along feature 1, with unit
    /// grid spacing. NaN when the surface has fewer than two points on an axis
    /// or no defined cell.
    pub fn mixed_derivative_strength(&self) -> f64 {
        let Some(d_dy) = gradient(&self.average, Axis(1)) else {
            return f64::NAN;
        };
        let Some(d2) = gradient(&d_dy, Axis(0)) else {
            return f64::NAN;
        };
        nan_mean_abs(d2.iter().copied())
    }
}

/// Two-way partial dependence calculator
pub struct PartialDependence<'a> {
    model: &'a dyn Regressor,
    /// Number of grid points per feature
    grid_resolution: usize,
    /// Percentile range for grid
    percentile_range: (f64, f64),
}

impl<'a> PartialDependence<'a> {
    /// Create new PDP calculator
    pub fn new(model: &'a dyn Regressor) -> Self {
        Self {
            model,
            grid_resolution: 50,
            percentile_range: (5.0, 95.0),
        }
    }

    /// Set number of grid points
    pub fn with_grid_resolution(mut self, n: usize) -> Self {
        self.grid_resolution = n.max(1);
        self
    }

    /// Set percentile range for grid
    pub fn with_percentile_range(mut self, low: f64, high: f64) -> Self {
        self.percentile_range = (low.clamp(0.0, 100.0), high.clamp(0.0, 100.0));
        self
    }

    /// Compute the averaged response over the joint grid of two features
    pub fn compute_2d(&self, x: &Array2<f64>, feature_1: usize, feature_2: usize) -> Result<PartialDependence2D> {
        if feature_1 >= x.ncols() || feature_2 >= x.ncols() {
            return Err(ScreeningError::ValidationError(format!(
                "Feature index out of bounds: ({}, {}) with n_features={}",
                feature_1,
                feature_2,
                x.ncols()
            )));
        }

        let grid_1 = self.create_grid(x, feature_1);
        let grid_2 = self.create_grid(x, feature_2);

        let average = self
            .model
            .average_on_grid(x, feature_1, feature_2, &grid_1, &grid_2)?;

        Ok(PartialDependence2D {
            feature_indices: (feature_1, feature_2),
            grid_values_1: grid_1,
            grid_values_2: grid_2,
            average,
        })
    }

    /// Grid for one feature: the distinct values when there are fewer than
    /// `grid_resolution` of them, otherwise evenly spaced points between the
    /// configured percentiles. Undefined values are ignored.
    pub fn create_grid(&self, x: &Array2<f64>, feature_index: usize) -> Vec<f64> {
        let mut values: Vec<f64> = x
            .column(feature_index)
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let mut uniques = values.clone();
        uniques.dedup();
        if uniques.len() < self.grid_resolution {
            return uniques;
        }

        let (low_pct, high_pct) = self.percentile_range;
        let low_val = quantile(&values, low_pct / 100.0);
        let high_val = quantile(&values, high_pct / 100.0);

        if self.grid_resolution == 1 {
            return vec![low_val];
        }
        let step = (high_val - low_val) / (self.grid_resolution - 1) as f64;
        (0..self.grid_resolution)
            .map(|i| low_val + i as f64 * step)
            .collect()
    }
}

/// Mean absolute mixed second derivative of the two-way partial dependence
/// of `model` on (`feat_x`, `feat_y`) over the reference matrix `x`.
pub fn pdp_cross_interaction_strength(
    model: &dyn Regressor,
    x: &Array2<f64>,
    feat_x: usize,
    feat_y: usize,
    grid_resolution: usize,
) -> Result<f64> {
    let pd = PartialDependence::new(model)
        .with_grid_resolution(grid_resolution)
        .compute_2d(x, feat_x, feat_y)?;
    Ok(pd.mixed_derivative_strength())
}

/// Average prediction on every cell of the joint grid by overwriting the two
/// columns of every row: `feature_1` first, then `feature_2`.
pub(crate) fn brute_force_average<M: Regressor + ?Sized>(
    model: &M,
    x: &Array2<f64>,
    feature_1: usize,
    feature_2: usize,
    grid_1: &[f64],
    grid_2: &[f64],
) -> Result<Array2<f64>> {
    let mut average = Array2::zeros((grid_1.len(), grid_2.len()));
    let mut x_modified = x.clone();

    for (i, &val_1) in grid_1.iter().enumerate() {
        for (j, &val_2) in grid_2.iter().enumerate() {
            x_modified.column_mut(feature_1).fill(val_1);
            x_modified.column_mut(feature_2).fill(val_2);

            let preds = model.predict(&x_modified)?;
            average[[i, j]] = preds.mean().unwrap_or(f64::NAN);
        }
    }

    Ok(average)
}

/// Discrete gradient with unit spacing: central differences in the interior,
/// one-sided differences at the edges. `None` when the axis has fewer than 2 points.
pub fn gradient(z: &Array2<f64>, axis: Axis) -> Option<Array2<f64>> {
    let n = z.len_of(axis);
    if n < 2 {
        return None;
    }

    let mut out = Array2::zeros(z.raw_dim());
    for k in 0..n {
        let (lo, hi, scale) = match k {
            0 => (0, 1, 1.0),
            _ if k == n - 1 => (n - 2, n - 1, 1.0),
            _ => (k - 1, k + 1, 0.5),
        };
        let diff = (&z.index_axis(axis, hi) - &z.index_axis(axis, lo)) * scale;
        out.index_axis_mut(axis, k).assign(&diff);
    }
    Some(out)
}

fn nan_mean_abs(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v.abs(), c + 1));
    if count == 0 { f64::NAN } else { sum / count as f64 }
}

/// Empirical quantile of sorted, non-empty values with plotting positions
/// `alphap = betap = 0.4` (the approximately unbiased rule used for PDP grids)
fn quantile(sorted: &[f64], prob: f64) -> f64 {
    const ALPHAP: f64 = 0.4;
    const BETAP: f64 = 0.4;

    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let m = ALPHAP + prob * (1.0 - ALPHAP - BETAP);
    let aleph = n as f64 * prob + m;
    let k = aleph.clamp(1.0, (n - 1) as f64).floor();
    let gamma = (aleph - k).clamp(0.0, 1.0);
    let k = k as usize;
    (1.0 - gamma) * sorted[k - 1] + gamma * sorted[k]
}
