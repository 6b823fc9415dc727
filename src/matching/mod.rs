//! Title resolution: normalization, similarity scoring, overrides, and the
//! matching cascade.

pub mod normalize;
pub mod overrides;
pub mod resolver;
pub mod similarity;

pub use normalize::{normalize, NormalizationLevel};
pub use overrides::OverrideTable;
pub use resolver::{MatchStrategy, MatchThresholds, TitleResolver};
