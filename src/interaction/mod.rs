//! Feature-interaction screening
//!
//! Each feature is scored against one designated feature by partial
//! dependence curvature and by mean absolute Shapley interaction. Both
//! columns are min-max normalised and averaged into a combined score that
//! orders the output table.

mod ranking;
mod scoring;

pub use ranking::{min_max_normalize, CombinePolicy, FeatureRecord, RankedTable, COLUMNS, NORM_EPSILON};
pub use scoring::InteractionScreener;
