//! Configuration and input validation.
//!
//! `AnalysisConfig` carries every tunable (normalization, role markers,
//! classifier keyword table, pattern thresholds, quality weights).
//! Batch input documents are validated against an embedded JSON Schema.

mod parser;
mod schema;

pub use parser::{
    AnalysisConfig, ConfigError, KeywordRule, KeywordTable, NormalizeOptions, PatternThresholds,
    QualityConfig, RoleMarkers, VerificationConfig,
};
pub use schema::{validate_batch_schema, validate_outcomes, BatchDocument, InputError};
