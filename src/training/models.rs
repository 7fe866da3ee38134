//! Model traits and evaluation metrics

use crate::error::Result;
use crate::explainability::pdp::brute_force_average;
use crate::explainability::InteractionSupport;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// A fitted regression model as seen by the screening core.
///
/// `interaction_support` is queried once per run; models that cannot produce
/// pairwise Shapley interaction values keep the default.
pub trait Regressor: Send + Sync {
    /// Predict one value per row of `x`
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Average prediction over the rows of `x` for every cell of the joint
    /// grid, with `feature_1` set before `feature_2`. Shape `(grid_1, grid_2)`.
    fn average_on_grid(
        &self,
        x: &Array2<f64>,
        feature_1: usize,
        feature_2: usize,
        grid_1: &[f64],
        grid_2: &[f64],
    ) -> Result<Array2<f64>> {
        brute_force_average(self, x, feature_1, feature_2, grid_1, grid_2)
    }

    /// Whether the model can compute Shapley interaction values
    fn interaction_support(&self) -> InteractionSupport<'_> {
        InteractionSupport::Unsupported {
            reason: "model does not expose a tree ensemble".to_string(),
        }
    }
}

/// Wraps a prediction closure as a [`Regressor`] without interaction support
pub struct FnRegressor<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Send + Sync,
{
    predict_fn: F,
}

impl<F> FnRegressor<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Send + Sync,
{
    pub fn new(predict_fn: F) -> Self {
        Self { predict_fn }
    }
}

impl<F> Regressor for FnRegressor<F>
where
    F: Fn(&Array2<f64>) -> Result<Array1<f64>> + Send + Sync,
{
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        (self.predict_fn)(x)
    }
}

/// Metrics for regression evaluation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// R-squared
    pub r2: f64,
    /// Pearson correlation between truth and prediction
    pub cc: f64,
    /// Relative standard deviation of the predictions
    pub rsd: f64,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl RegressionMetrics {
    /// Compute regression metrics
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let n = y_true.len() as f64;
        if y_true.is_empty() {
            return Self::default();
        }

        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae: f64 = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let y_mean = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        let p_mean = y_pred.iter().sum::<f64>() / n;
        let p_std = (y_pred.iter().map(|p| (p - p_mean).powi(2)).sum::<f64>() / n).sqrt();
        let rsd = p_std / (p_mean + 1e-12);

        Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
            cc: pearson(y_true, y_pred),
            rsd,
            n_samples: y_true.len(),
        }
    }
}

/// Root mean squared error
pub fn rmse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let sse: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    (sse / y_true.len() as f64).sqrt()
}

fn pearson(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        cov += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a).powi(2);
        var_b += (y - mean_b).powi(2);
    }

    // Undefined for a constant input
    let denom = (var_a * var_b).sqrt();
    if denom > 0.0 { cov / denom } else { f64::NAN }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = array![1.1, 2.0, 2.9, 4.1, 5.0];

        let metrics = RegressionMetrics::compute(&y_true, &y_pred);

        assert!((metrics.mse - 0.006).abs() < 1e-12);
        assert!((metrics.rmse - 0.006f64.sqrt()).abs() < 1e-12);
        assert!(metrics.r2 > 0.9);
        assert!(metrics.cc > 0.99);
        assert_eq!(metrics.n_samples, 5);
    }

    #[test]
    fn test_rsd_of_constant_predictions_is_zero() {
        let y_true = array![1.0, 2.0, 3.0];
        let y_pred = array![2.0, 2.0, 2.0];

        let metrics = RegressionMetrics::compute(&y_true, &y_pred);
        assert_eq!(metrics.rsd, 0.0);
        assert!(metrics.cc.is_nan());
    }

    #[test]
    fn test_rmse() {
        let y_true = array![0.0, 0.0];
        let y_pred = array![3.0, -3.0];
        assert_eq!(rmse(&y_true, &y_pred), 3.0);
    }

    #[test]
    fn test_fn_regressor_is_unsupported() {
        let model = FnRegressor::new(|x: &Array2<f64>| Ok(x.column(0).to_owned()));
        let x = array![[1.0, 2.0], [3.0, 4.0]];

        assert_eq!(model.predict(&x).unwrap(), array![1.0, 3.0]);
        assert!(matches!(
            model.interaction_support(),
            InteractionSupport::Unsupported { .. }
        ));
    }
}
