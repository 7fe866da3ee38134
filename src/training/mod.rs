//! Model training module
//!
//! Provides the regression stack the screening runs on:
//! - CatBoost-style gradient boosting with symmetric trees
//! - Hold-out and K-fold splitting
//! - K-fold engine keeping the best fold model
//! - The `Regressor` trait seen by the estimators

pub mod catboost;
pub mod cross_validation;
mod engine;
mod models;

pub use catboost::{CatBoostConfig, CatBoostRegressor, ObliviousTree};
pub use cross_validation::{train_test_split, CVResults, CVSplit, CrossValidator};
pub use engine::{FoldReport, TrainEngine, TrainingConfig};
pub use models::{rmse, FnRegressor, RegressionMetrics, Regressor};
