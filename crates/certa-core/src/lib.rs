//! # certa-core
//!
//! Deterministic certification of AI-generated qualitative analysis.
//!
//! This crate answers two questions about a batch of analyzed survey
//! questions (units):
//! - Is every quote actually in the respondent's own words?
//! - How badly did the batch degrade, and why?
//!
//! ## Key Guarantees
//!
//! 1. **Grounded quotes**: a quote verifies only if every segment is found
//!    in the attributed respondent's turns
//! 2. **No LLM calls**: all checks are rule-based
//! 3. **Order-independent**: reports depend on the set of outcomes, not
//!    their order
//! 4. **Parallel-safe**: verification holds no mutable state
//!
//! ## Example
//!
//! ```rust,ignore
//! use certa_core::{analyze_batch, verify_quote, CandidateQuote, SourceTranscript, UnitOutcome};
//!
//! let transcripts = vec![SourceTranscript::new(
//!     "r1",
//!     "Interviewer: Thoughts? Respondent: I love it a lot, but it's slow sometimes",
//! )];
//! let quote = CandidateQuote::new("I love it ... but it's slow", "r1");
//! assert!(verify_quote(&quote, &transcripts).verified);
//!
//! let report = analyze_batch(&[UnitOutcome::hard_failure("q1", "LLM quota exceeded")])?;
//! println!("quality: {}", report.quality_score());
//! ```

pub mod analysis;
pub mod config;
pub mod events;
pub mod report;
pub mod text;
pub mod types;
pub mod verification;

// Re-export main types at crate root
pub use analysis::{FailureClassifier, PatternDetector, QualityAggregator, RecommendationGenerator};
pub use config::{
    AnalysisConfig, BatchDocument, ConfigError, InputError, KeywordRule, KeywordTable,
    NormalizeOptions, PatternThresholds, QualityConfig, RoleMarkers, VerificationConfig,
};
pub use events::{AuditEvent, EventSink, RecordingSink, TracingSink};
pub use report::BatchAnalyzer;
pub use text::{normalize, ExtractionError, RoleExtractor};
pub use types::{
    BatchReport, CandidateQuote, Classification, ErrorCategory, ErrorSummary, FailedComponent,
    FailureRecord, MatchKind, Pattern, PatternKind, Priority, QualitySummary, Recommendation,
    RecommendationCause, Reliability, Severity, SourceTranscript, Theme, UnitAnalysis,
    UnitOutcome, UnitStatus, VerificationFailure, VerificationSummary, VerifiedQuote,
};
pub use verification::{QuoteVerificationEngine, ThemeDraft, UnitDraft};

use thiserror::Error;

/// Errors that stop a batch analysis
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    Input(#[from] InputError),
}

/// Verify one quote with the default configuration.
pub fn verify_quote(quote: &CandidateQuote, transcripts: &[SourceTranscript]) -> VerifiedQuote {
    QuoteVerificationEngine::default().verify(quote, transcripts)
}

/// Analyze a batch of resolved unit outcomes with the default configuration.
///
/// This is the main entry point for batch analysis.
///
/// # Returns
///
/// A `BatchReport` containing:
/// - `summary`: failure counts by category and severity
/// - `categorized_failures`: every failure record, grouped by category
/// - `patterns`: cross-unit failure patterns
/// - `quality`: completion, reliability and the overall score
/// - `recommendations`: remediation entries
pub fn analyze_batch(outcomes: &[UnitOutcome]) -> Result<BatchReport, AnalysisError> {
    BatchAnalyzer::default().analyze(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_quote_entry_point() {
        let transcripts = vec![SourceTranscript::new(
            "r1",
            "Interviewer: How is it? Respondent: I love it a lot, but it's slow sometimes",
        )];
        let result = verify_quote(&CandidateQuote::new("I love it ... but it's slow", "r1"), &transcripts);
        assert!(result.verified);
        assert_eq!(result.match_kind, MatchKind::Exact);
    }

    #[test]
    fn test_analyze_batch_entry_point() {
        let report = analyze_batch(&[
            UnitOutcome::success("q1", UnitAnalysis::default()),
            UnitOutcome::hard_failure("q2", "Connection reset by peer"),
        ])
        .unwrap();

        assert_eq!(report.quality.completion_rate, 50.0);
        assert_eq!(report.summary.most_common_category, Some(ErrorCategory::NetworkError));
    }

    #[test]
    fn test_input_errors_convert() {
        let err = analyze_batch(&[UnitOutcome::hard_failure("  ", "timeout")]).unwrap_err();
        assert!(matches!(err, AnalysisError::Input(InputError::BlankUnitId(0))));
    }
}
