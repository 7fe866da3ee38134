//! Run configuration

use crate::error::{ScreeningError, Result};
use crate::interaction::CombinePolicy;
use crate::training::{CatBoostConfig, TrainingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one screening run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    /// Project root; relative paths below resolve against it
    pub root_dir: PathBuf,

    /// Dataset file
    pub data_file: PathBuf,

    /// Dependent column; every other column is a feature
    pub target_column: String,

    /// Feature every other feature is screened against
    pub interaction_feature: String,

    /// Fraction of rows held out as the reference matrix
    pub test_size: f64,

    pub random_state: u64,

    pub n_folds: usize,

    pub early_stopping_rounds: usize,

    /// Grid points per PDP axis
    pub grid_resolution: usize,

    /// Percentile range spanned by the PDP grid
    pub percentile_range: (f64, f64),

    pub combine_policy: CombinePolicy,

    pub results_dir: PathBuf,

    pub output_file: String,

    /// Rows of the ranking shown at the end of a run
    pub top_k: usize,

    pub model: CatBoostConfig,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            data_file: PathBuf::from("CGSS dataset (n=8148).csv"),
            target_column: "Y".to_string(),
            interaction_feature: "SEP".to_string(),
            test_size: 0.2,
            random_state: 42,
            n_folds: 5,
            early_stopping_rounds: 100,
            grid_resolution: 50,
            percentile_range: (5.0, 95.0),
            combine_policy: CombinePolicy::SkipUndefined,
            results_dir: PathBuf::from("results"),
            output_file: "CGSS_interaction_strength_results.csv".to_string(),
            top_k: 10,
            model: CatBoostConfig::default(),
        }
    }
}

impl ScreeningConfig {
    /// Load from a JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn with_root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = dir.into();
        self
    }

    pub fn with_data_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_file = path.into();
        self
    }

    pub fn with_target_column(mut self, name: impl Into<String>) -> Self {
        self.target_column = name.into();
        self
    }

    pub fn with_interaction_feature(mut self, name: impl Into<String>) -> Self {
        self.interaction_feature = name.into();
        self
    }

    pub fn with_grid_resolution(mut self, n: usize) -> Self {
        self.grid_resolution = n;
        self
    }

    pub fn with_combine_policy(mut self, policy: CombinePolicy) -> Self {
        self.combine_policy = policy;
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = dir.into();
        self
    }

    pub fn with_model(mut self, model: CatBoostConfig) -> Self {
        self.model = model;
        self
    }

    pub fn with_n_folds(mut self, n: usize) -> Self {
        self.n_folds = n;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn data_path(&self) -> PathBuf {
        self.root_dir.join(&self.data_file)
    }

    pub fn results_path(&self) -> PathBuf {
        self.root_dir.join(&self.results_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        self.results_path().join(&self.output_file)
    }

    /// Settings for the K-fold engine
    pub fn training(&self) -> TrainingConfig {
        TrainingConfig {
            n_folds: self.n_folds,
            shuffle: true,
            random_state: Some(self.random_state),
            early_stopping_rounds: self.early_stopping_rounds,
            model: self.model.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(invalid("test_size", self.test_size, "must be in (0, 1)"));
        }
        if self.n_folds < 2 {
            return Err(invalid("n_folds", self.n_folds, "must be at least 2"));
        }
        if self.grid_resolution < 1 {
            return Err(invalid("grid_resolution", self.grid_resolution, "must be positive"));
        }
        let (low, high) = self.percentile_range;
        if !(0.0..=100.0).contains(&low) || !(0.0..=100.0).contains(&high) || low >= high {
            return Err(invalid(
                "percentile_range",
                format!("({}, {})", low, high),
                "must satisfy 0 <= low < high <= 100",
            ));
        }
        if self.target_column == self.interaction_feature {
            return Err(ScreeningError::ConfigError(format!(
                "interaction feature {} is the dependent column",
                self.interaction_feature
            )));
        }
        if self.output_file.is_empty() {
            return Err(ScreeningError::ConfigError("output_file is empty".to_string()));
        }
        self.model.validate()
    }
}

fn invalid(name: &str, value: impl ToString, reason: &str) -> ScreeningError {
    ScreeningError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
