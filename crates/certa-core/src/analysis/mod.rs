//! Batch failure analysis: classification, patterns, quality and
//! recommendations. Everything here runs after all units have resolved.

mod classifier;
mod patterns;
mod quality;
mod recommendations;

pub use classifier::FailureClassifier;
pub use patterns::PatternDetector;
pub use quality::QualityAggregator;
pub use recommendations::RecommendationGenerator;

pub(crate) use quality::percentage;
