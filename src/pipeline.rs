//! End-to-end screening run: load, split, cross-validate, evaluate, screen, save

use crate::config::ScreeningConfig;
use crate::error::{ScreeningError, Result};
use crate::interaction::{InteractionScreener, RankedTable};
use crate::training::{train_test_split, CVResults, RegressionMetrics, Regressor, TrainEngine};
use crate::utils::{DataLoader, FeatureMatrix};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub n_samples: usize,
    pub n_features: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub cv: CVResults,
    pub best_fold: Option<usize>,
    pub test_metrics: RegressionMetrics,
    pub table: RankedTable,
    pub output_path: PathBuf,
}

/// Stages of a screening run; each one can be driven separately
pub struct ScreeningPipeline {
    config: ScreeningConfig,
}

impl ScreeningPipeline {
    pub fn new(config: ScreeningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    /// Load the dataset and check the columns the run depends on
    pub fn load(&self) -> Result<FeatureMatrix> {
        let df = DataLoader::new().load_csv(&self.config.data_path())?;
        let data = FeatureMatrix::from_dataframe(&df, &self.config.target_column)?;
        data.feature_index(&self.config.interaction_feature)?;
        if data.n_samples() == 0 {
            return Err(ScreeningError::DataError("dataset has no rows".to_string()));
        }
        Ok(data)
    }

    /// Shuffled hold-out split; returns (train, test)
    pub fn split(&self, data: &FeatureMatrix) -> Result<(FeatureMatrix, FeatureMatrix)> {
        let split = train_test_split(data.n_samples(), self.config.test_size, Some(self.config.random_state))?;
        let train = data.select_rows(&split.train_indices);
        let test = data.select_rows(&split.test_indices);
        info!(n_train = train.n_samples(), n_test = test.n_samples(), "hold-out split");
        Ok((train, test))
    }

    /// K-fold training on the training part, keeping the best fold model
    pub fn train(&self, train: &FeatureMatrix) -> Result<TrainEngine> {
        let mut engine = TrainEngine::new(self.config.training());
        engine.fit(&train.x, &train.y)?;
        Ok(engine)
    }

    pub fn evaluate(&self, model: &dyn Regressor, test: &FeatureMatrix) -> Result<RegressionMetrics> {
        let predictions = model.predict(&test.x)?;
        let metrics = RegressionMetrics::compute(&test.y, &predictions);
        info!(rmse = metrics.rmse, r2 = metrics.r2, "test set evaluated");
        Ok(metrics)
    }

    /// Rank every feature against the interaction feature, with `reference` as background
    pub fn screen(&self, model: &dyn Regressor, reference: &FeatureMatrix) -> Result<RankedTable> {
        InteractionScreener::new(model, reference.feature_names.clone())
            .with_grid_resolution(self.config.grid_resolution)
            .with_percentile_range(self.config.percentile_range.0, self.config.percentile_range.1)
            .with_combine_policy(self.config.combine_policy)
            .screen(&reference.x, &self.config.interaction_feature)
    }

    /// Write the table under the results directory, creating it if needed
    pub fn save(&self, table: &RankedTable) -> Result<PathBuf> {
        std::fs::create_dir_all(self.config.results_path())?;
        let path = self.config.output_path();
        table.write_csv(&path)?;
        info!(path = %path.display(), "results saved");
        Ok(path)
    }

    pub fn run(&self) -> Result<ScreeningReport> {
        let data = self.load()?;
        let (train, test) = self.split(&data)?;
        let engine = self.train(&train)?;
        let model = engine.model()?;
        let test_metrics = self.evaluate(model, &test)?;
        let table = self.screen(model, &test)?;
        let output_path = self.save(&table)?;

        Ok(ScreeningReport {
            n_samples: data.n_samples(),
            n_features: data.n_features(),
            n_train: train.n_samples(),
            n_test: test.n_samples(),
            cv: engine.cv_results(),
            best_fold: engine.best_fold(),
            test_metrics,
            table,
            output_path,
        })
    }
}
