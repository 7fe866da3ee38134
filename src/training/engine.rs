//! K-fold training engine: one model per fold, best validation RMSE wins

use super::catboost::{CatBoostConfig, CatBoostRegressor};
use super::cross_validation::{take_rows, CVResults, CrossValidator};
use super::models::rmse;
use crate::error::{ScreeningError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub n_folds: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
    /// Iterations without eval improvement before a fold stops
    pub early_stopping_rounds: usize,
    pub model: CatBoostConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            shuffle: true,
            random_state: Some(42),
            early_stopping_rounds: 100,
            model: CatBoostConfig::default(),
        }
    }
}

/// Per-fold outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldReport {
    pub fold: usize,
    pub rmse: f64,
    pub best_iteration: Option<usize>,
    pub training_time_secs: f64,
}

/// Main training engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainEngine {
    config: TrainingConfig,
    model: Option<CatBoostRegressor>,
    best_fold: Option<usize>,
    folds: Vec<FoldReport>,
}

impl TrainEngine {
    /// Create a new training engine
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            model: None,
            best_fold: None,
            folds: Vec::new(),
        }
    }

    /// Train one model per fold of `(x, y)`, validating on the held-out fold,
    /// and keep the model with the lowest validation RMSE.
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(ScreeningError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let mut cv = CrossValidator::new(self.config.n_folds, self.config.shuffle);
        if let Some(seed) = self.config.random_state {
            cv = cv.with_random_state(seed);
        }
        let splits = cv.split(x.nrows())?;

        self.folds.clear();
        self.model = None;
        self.best_fold = None;
        let mut best_score = f64::INFINITY;

        for split in &splits {
            let fold = split.fold_idx + 1;
            info!(fold, n_train = split.train_indices.len(), "training fold");
            let start = Instant::now();

            let (x_train, y_train) = take_rows(x, y, &split.train_indices);
            let (x_val, y_val) = take_rows(x, y, &split.test_indices);

            let mut model = CatBoostRegressor::new(self.config.model.clone());
            model.fit_with_eval(&x_train, &y_train, &x_val, &y_val, self.config.early_stopping_rounds)?;

            let score = rmse(&y_val, &model.predict(&x_val)?);
            info!(fold, rmse = score, "fold finished");

            self.folds.push(FoldReport {
                fold,
                rmse: score,
                best_iteration: model.best_iteration(),
                training_time_secs: start.elapsed().as_secs_f64(),
            });

            // Strict improvement keeps the earliest fold on ties
            if score < best_score {
                best_score = score;
                self.best_fold = Some(fold);
                self.model = Some(model);
            }
        }

        if self.model.is_none() {
            return Err(ScreeningError::TrainingError(
                "no fold produced a finite validation RMSE".to_string(),
            ));
        }
        info!(best_fold = ?self.best_fold, best_rmse = best_score, "cross-validation finished");
        Ok(self)
    }

    /// Best model found by [`TrainEngine::fit`]
    pub fn model(&self) -> Result<&CatBoostRegressor> {
        self.model.as_ref().ok_or(ScreeningError::ModelNotFitted)
    }

    pub fn best_fold(&self) -> Option<usize> {
        self.best_fold
    }

    pub fn fold_reports(&self) -> &[FoldReport] {
        &self.folds
    }

    /// Validation RMSE summary over folds
    pub fn cv_results(&self) -> CVResults {
        CVResults::from_scores(self.folds.iter().map(|f| f.rmse).collect())
    }

    /// Lowest validation RMSE over folds
    pub fn best_score(&self) -> Option<f64> {
        self.best_fold
            .and_then(|fold| self.folds.iter().find(|f| f.fold == fold))
            .map(|f| f.rmse)
    }
}
