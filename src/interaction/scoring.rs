//! Scores every feature against one interaction feature with both estimators

use super::ranking::{CombinePolicy, FeatureRecord, RankedTable};
use crate::error::{ScreeningError, Result};
use crate::explainability::{shap_pair_interaction_scores, PartialDependence};
use crate::training::Regressor;
use ndarray::Array2;
use rayon::prelude::*;
use tracing::{debug, info};

/// Interaction screening of all features of a reference matrix against one feature
pub struct InteractionScreener<'a> {
    model: &'a dyn Regressor,
    feature_names: Vec<String>,
    grid_resolution: usize,
    percentile_range: (f64, f64),
    policy: CombinePolicy,
}

impl<'a> InteractionScreener<'a> {
    pub fn new(model: &'a dyn Regressor, feature_names: Vec<String>) -> Self {
        Self {
            model,
            feature_names,
            grid_resolution: 50,
            percentile_range: (5.0, 95.0),
            policy: CombinePolicy::default(),
        }
    }

    pub fn with_grid_resolution(mut self, n: usize) -> Self {
        self.grid_resolution = n;
        self
    }

    pub fn with_percentile_range(mut self, low: f64, high: f64) -> Self {
        self.percentile_range = (low, high);
        self
    }

    pub fn with_combine_policy(mut self, policy: CombinePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Raw scores of every feature against `interaction_feature`, in input order
    pub fn score(&self, x: &Array2<f64>, interaction_feature: &str) -> Result<Vec<FeatureRecord>> {
        if x.ncols() != self.feature_names.len() {
            return Err(ScreeningError::ShapeError {
                expected: format!("{} feature columns", self.feature_names.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let target = self
            .feature_names
            .iter()
            .position(|name| name == interaction_feature)
            .ok_or_else(|| ScreeningError::FeatureNotFound(interaction_feature.to_string()))?;

        // Explained once for the whole matrix, shared by every feature
        let shap_scores = shap_pair_interaction_scores(self.model, x, target);

        info!(
            n_features = self.feature_names.len(),
            grid_resolution = self.grid_resolution,
            interaction_feature,
            "computing PDP interaction strength"
        );
        let pdp = PartialDependence::new(self.model)
            .with_grid_resolution(self.grid_resolution)
            .with_percentile_range(self.percentile_range.0, self.percentile_range.1);

        self.feature_names
            .par_iter()
            .enumerate()
            .map(|(i, feature)| {
                let pdp_score = pdp.compute_2d(x, i, target)?.mixed_derivative_strength();
                let shap_score = shap_scores[i];
                debug!(feature = %feature, pdp = pdp_score, shap = shap_score, "scored feature");
                Ok(FeatureRecord::new(i + 1, feature, interaction_feature, pdp_score, shap_score))
            })
            .collect()
    }

    /// Score, normalise, combine and rank
    pub fn screen(&self, x: &Array2<f64>, interaction_feature: &str) -> Result<RankedTable> {
        let records = self.score(x, interaction_feature)?;
        Ok(RankedTable::rank(records, self.policy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::FnRegressor;
    use ndarray::Array1;

    fn names() -> Vec<String> {
        ["A", "B", "SEP"].iter().map(|s| s.to_string()).collect()
    }

    fn reference() -> Array2<f64> {
        Array2::from_shape_fn((30, 3), |(r, c)| ((r * (c + 2) + c) % 9) as f64)
    }

    #[test]
    fn test_product_feature_ranks_first() {
        let model = FnRegressor::new(|x: &Array2<f64>| -> Result<Array1<f64>> {
            Ok(x.rows().into_iter().map(|r| r[0] * r[2] + r[1]).collect())
        });
        let table = InteractionScreener::new(&model, names())
            .with_grid_resolution(10)
            .screen(&reference(), "SEP")
            .unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.records()[0].feature, "A");
        let b = table.records().iter().find(|r| r.feature == "B").unwrap();
        assert!(b.pdp_cross_mixed_deriv.abs() < 1e-9);
        // No interaction-value capability on a plain closure
        assert!(table.records().iter().all(|r| r.shap_pair_interaction_mean_abs.is_nan()));
        assert!(table.records().iter().all(|r| r.interaction_with == "SEP"));
    }

    #[test]
    fn test_records_keep_input_order() {
        let model = FnRegressor::new(|x: &Array2<f64>| Ok(x.column(0).to_owned()));
        let records = InteractionScreener::new(&model, names())
            .with_grid_resolution(5)
            .score(&reference(), "SEP")
            .unwrap();
        let order: Vec<usize> = records.iter().map(|r| r.rank_order).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(records[2].feature, "SEP");
    }

    #[test]
    fn test_missing_interaction_feature() {
        let model = FnRegressor::new(|x: &Array2<f64>| Ok(x.column(0).to_owned()));
        let result = InteractionScreener::new(&model, names()).score(&reference(), "AGE");
        assert!(matches!(result, Err(ScreeningError::FeatureNotFound(_))));
    }

    #[test]
    fn test_name_count_mismatch() {
        let model = FnRegressor::new(|x: &Array2<f64>| Ok(x.column(0).to_owned()));
        let result = InteractionScreener::new(&model, vec!["SEP".to_string()]).score(&reference(), "SEP");
        assert!(matches!(result, Err(ScreeningError::ShapeError { .. })));
    }
}
