//! Model explainability module
//!
//! Provides the two pairwise interaction estimators used for screening:
//! - Two-way partial dependence and its mixed second derivative
//! - Exact path-dependent Shapley interaction values for symmetric tree ensembles

pub mod pdp;
pub mod shap_interaction;

pub use pdp::{pdp_cross_interaction_strength, PartialDependence, PartialDependence2D};
pub use shap_interaction::{
    shap_pair_interaction_scores, InteractionExplainer, InteractionSupport, ShapInteractionValues,
};
