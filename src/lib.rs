//! Interaction screening - rank feature interactions with a designated feature
//!
//! A gradient-boosted regression model is trained on a tabular dataset, then
//! every feature is scored by how strongly it interacts with one designated
//! feature. Two estimators are combined:
//! - the mean absolute mixed second derivative of the two-way partial dependence
//! - the mean absolute Shapley interaction value of the pair
//!
//! # Modules
//!
//! - [`explainability`] - Partial dependence and Shapley interaction values
//! - [`interaction`] - Per-feature scoring, normalisation and ranking
//! - [`training`] - Symmetric-tree gradient boosting and cross-validation
//! - [`pipeline`] - The end-to-end run
//! - [`config`] - Run configuration
//! - [`utils`] - Data loading
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use interaction_screening::prelude::*;
//!
//! let config = ScreeningConfig::default().with_root_dir("..");
//! let report = ScreeningPipeline::new(config)?.run()?;
//! for record in report.table.top(10) {
//!     println!("{} {}", record.feature, record.interaction_score_combined);
//! }
//! # Ok::<(), interaction_screening::error::ScreeningError>(())
//! ```

pub mod error;

pub mod explainability;
pub mod interaction;
pub mod training;

pub mod config;
pub mod pipeline;
pub mod utils;

pub mod cli;

pub use error::{ScreeningError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::ScreeningConfig;
    pub use crate::error::{ScreeningError, Result};
    pub use crate::explainability::{
        pdp_cross_interaction_strength, shap_pair_interaction_scores, InteractionExplainer,
        InteractionSupport, PartialDependence, ShapInteractionValues,
    };
    pub use crate::interaction::{CombinePolicy, FeatureRecord, InteractionScreener, RankedTable};
    pub use crate::pipeline::{ScreeningPipeline, ScreeningReport};
    pub use crate::training::{CatBoostConfig, CatBoostRegressor, FnRegressor, Regressor, TrainEngine};
    pub use crate::utils::{DataLoader, FeatureMatrix};
}
