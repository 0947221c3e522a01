//! Core data model.
//!
//! Inputs (transcripts, candidate quotes, unit outcomes) arrive from the
//! surrounding pipeline; everything else is derived here and never mutated
//! after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// VERIFICATION INPUTS AND OUTPUTS
// =============================================================================

/// A respondent's turn-tagged transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceTranscript {
    /// Respondent identifier
    pub respondent_id: String,

    /// Raw text with role markers (e.g. "Interviewer: ... Respondent: ...")
    pub text: String,
}

impl SourceTranscript {
    pub fn new(respondent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            respondent_id: respondent_id.into(),
            text: text.into(),
        }
    }
}

/// A quote attributed to a respondent by the upstream analysis step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateQuote {
    /// Quote text; multi-segment quotes join segments with a separator ("...")
    pub text: String,

    /// Respondent the quote is attributed to
    pub respondent_id: String,

    /// Verification claim made upstream, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previously_verified: Option<bool>,
}

impl CandidateQuote {
    pub fn new(text: impl Into<String>, respondent_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            respondent_id: respondent_id.into(),
            previously_verified: None,
        }
    }

    /// Attach an upstream verification claim.
    pub fn with_prior_verification(mut self, verified: bool) -> Self {
        self.previously_verified = Some(verified);
        self
    }
}

/// How a quote was matched against respondent text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    /// Every segment is a verbatim substring
    Exact,
    /// Every segment matched, at least one only after normalization
    Normalized,
    /// Not verified
    None,
}

/// Why a quote could not be verified.
///
/// These are data attached to a [`VerifiedQuote`], not errors returned to
/// the caller.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationFailure {
    #[error("No transcript found for respondent {respondent_id}")]
    RespondentNotFound { respondent_id: String },

    #[error("Transcript for respondent {respondent_id} has no recognizable role markers")]
    MalformedTranscript { respondent_id: String },

    #[error("Quote not found in respondent text: {}", .unmatched_segments.join(" | "))]
    QuoteNotFound { unmatched_segments: Vec<String> },

    #[error("Quote is empty")]
    EmptyQuote,
}

impl VerificationFailure {
    /// Stable short name used for summary counts.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RespondentNotFound { .. } => "respondent_not_found",
            Self::MalformedTranscript { .. } => "malformed_transcript",
            Self::QuoteNotFound { .. } => "quote_not_found",
            Self::EmptyQuote => "empty_quote",
        }
    }
}

/// A candidate quote after verification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifiedQuote {
    #[serde(flatten)]
    pub quote: CandidateQuote,

    pub verified: bool,

    pub match_kind: MatchKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<VerificationFailure>,
}

impl VerifiedQuote {
    pub(crate) fn accepted(quote: CandidateQuote, match_kind: MatchKind) -> Self {
        Self {
            quote,
            verified: true,
            match_kind,
            failure: None,
        }
    }

    pub(crate) fn rejected(quote: CandidateQuote, failure: VerificationFailure) -> Self {
        Self {
            quote,
            verified: false,
            match_kind: MatchKind::None,
            failure: Some(failure),
        }
    }

    /// Human-readable failure reason, if the quote was rejected.
    pub fn failure_reason(&self) -> Option<String> {
        self.failure.as_ref().map(|f| f.to_string())
    }
}

// =============================================================================
// UNIT OUTCOMES
// =============================================================================

/// Component name used by the classification step.
pub const COMPONENT_CLASSIFICATION: &str = "classification";

/// Component name used by the quote extraction step.
pub const COMPONENT_QUOTE_EXTRACTION: &str = "quote_extraction";

/// A theme identified for a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Theme {
    pub id: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Theme {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
        }
    }
}

/// A respondent classified under a label (usually a theme id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub respondent_id: String,

    pub label: String,
}

/// Whatever a unit produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitAnalysis {
    #[serde(default)]
    pub themes: Vec<Theme>,

    #[serde(default)]
    pub classifications: Vec<Classification>,

    /// Verified quotes keyed by theme id
    #[serde(default)]
    pub quotes_by_theme: BTreeMap<String, Vec<VerifiedQuote>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl UnitAnalysis {
    /// All quotes across themes, in theme-id order.
    pub fn quotes(&self) -> impl Iterator<Item = &VerifiedQuote> {
        self.quotes_by_theme.values().flatten()
    }
}

/// A step of a unit's analysis that did not complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedComponent {
    /// Step name, e.g. "classification" or "quote_extraction"
    pub component: String,

    /// Raw failure message
    pub message: String,
}

impl FailedComponent {
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Terminal state of one unit. Exactly one variant per unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Success {
        analysis: UnitAnalysis,
    },
    PartialFailure {
        analysis: UnitAnalysis,
        failures: Vec<FailedComponent>,
    },
    HardFailure {
        error: String,
    },
}

/// The outcome of one unit (question) of a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitOutcome {
    pub unit_id: String,

    #[serde(flatten)]
    pub status: UnitStatus,
}

impl UnitOutcome {
    pub fn success(unit_id: impl Into<String>, analysis: UnitAnalysis) -> Self {
        Self {
            unit_id: unit_id.into(),
            status: UnitStatus::Success { analysis },
        }
    }

    pub fn partial(
        unit_id: impl Into<String>,
        analysis: UnitAnalysis,
        failures: Vec<FailedComponent>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            status: UnitStatus::PartialFailure { analysis, failures },
        }
    }

    pub fn hard_failure(unit_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            status: UnitStatus::HardFailure {
                error: error.into(),
            },
        }
    }

    /// The analysis payload, if the unit produced one.
    pub fn analysis(&self) -> Option<&UnitAnalysis> {
        match &self.status {
            UnitStatus::Success { analysis } | UnitStatus::PartialFailure { analysis, .. } => {
                Some(analysis)
            }
            UnitStatus::HardFailure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, UnitStatus::Success { .. })
    }

    pub fn is_partial(&self) -> bool {
        matches!(self.status, UnitStatus::PartialFailure { .. })
    }

    pub fn is_hard_failure(&self) -> bool {
        matches!(self.status, UnitStatus::HardFailure { .. })
    }
}

// =============================================================================
// FAILURE TAXONOMY
// =============================================================================

/// Closed failure taxonomy. Declaration order is the report order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    LlmFailure,
    ValidationFailure,
    DataQuality,
    Timeout,
    QuotaExceeded,
    NetworkError,
    ParsingError,
    WorkflowError,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlmFailure => "LLM_FAILURE",
            Self::ValidationFailure => "VALIDATION_FAILURE",
            Self::DataQuality => "DATA_QUALITY",
            Self::Timeout => "TIMEOUT",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ParsingError => "PARSING_ERROR",
            Self::WorkflowError => "WORKFLOW_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Severity of a failure in this category before hard-failure escalation.
    pub fn base_severity(&self) -> Severity {
        match self {
            Self::QuotaExceeded | Self::LlmFailure | Self::WorkflowError => Severity::High,
            Self::Timeout
            | Self::NetworkError
            | Self::ValidationFailure
            | Self::ParsingError
            | Self::Unknown => Severity::Medium,
            Self::DataQuality => Severity::Low,
        }
    }

    /// Short operator-facing hint for recovering from this category.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::LlmFailure => "Check model availability and API credentials, then re-run the failed units",
            Self::ValidationFailure => "Review rejected quotes and tighten extraction prompts before re-running",
            Self::DataQuality => "Inspect the source responses for empty or unusable participant data",
            Self::Timeout => "Raise per-unit timeouts or reduce concurrency for long responses",
            Self::QuotaExceeded => "Wait for the quota window to reset or lower the request rate",
            Self::NetworkError => "Verify connectivity to the model endpoint and retry",
            Self::ParsingError => "Inspect raw model output for malformed JSON and enforce structured output",
            Self::WorkflowError => "Check pipeline state transitions and resume from the last completed step",
            Self::Unknown => "Inspect the raw error messages; extend the keyword table if a pattern recurs",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure severity, most severe first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// One step more severe (saturating at CRITICAL).
    pub fn escalate(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

/// One classified failure. Derived from a unit outcome, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub unit_id: String,

    /// Failed component for partial failures; `None` for hard failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,

    pub raw_message: String,

    pub category: ErrorCategory,

    pub severity: Severity,
}

impl FailureRecord {
    pub fn is_hard_failure(&self) -> bool {
        self.component.is_none()
    }
}

// =============================================================================
// PATTERNS, QUALITY, RECOMMENDATIONS
// =============================================================================

/// Cross-unit failure signatures, in rule-declaration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    WidespreadLlmIssues,
    ClassificationBatchIssues,
    QuoteValidationIssues,
    DataQualityIssues,
}

impl PatternKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WidespreadLlmIssues => "widespread_llm_issues",
            Self::ClassificationBatchIssues => "classification_batch_issues",
            Self::QuoteValidationIssues => "quote_validation_issues",
            Self::DataQualityIssues => "data_quality_issues",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A detected cross-unit failure pattern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pattern {
    pub name: PatternKind,

    pub severity: Severity,

    /// Number of failure records matching the rule
    pub affected_count: usize,

    /// Distinct units contributing to the pattern, sorted
    pub affected_units: Vec<String>,

    pub description: String,

    pub recommendation: String,
}

/// Batch reliability label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    High,
    Medium,
    Low,
}

impl fmt::Display for Reliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        })
    }
}

/// Quote verification counts across a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationSummary {
    pub total_quotes: usize,
    pub verified: usize,
    pub exact: usize,
    pub normalized: usize,
    pub unverified: usize,

    /// Unverified quotes by [`VerificationFailure::kind`]
    pub failures_by_kind: BTreeMap<String, usize>,
}

/// Batch-level quality figures. Percentages are rounded to one decimal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualitySummary {
    pub total_units: usize,
    pub requested_units: usize,
    pub successful_units: usize,
    pub partial_units: usize,
    pub failed_units: usize,

    pub completion_rate: f64,

    /// Same weighting as `completion_rate`, over the requested unit count
    pub data_completeness: f64,

    pub reliability: Reliability,

    /// `None` when the batch has no quotes
    pub quote_verification_rate: Option<f64>,

    pub verification: VerificationSummary,

    /// Weighted overall quality score (0-100)
    pub overall_score: f64,
}

/// Recommendation priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
}

/// What a recommendation responds to. At most one recommendation per cause.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecommendationCause {
    CompletionRate,
    Pattern { pattern: PatternKind },
}

/// An actionable remediation entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Recommendation {
    pub cause: RecommendationCause,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub actions: Vec<String>,
}

/// Failure counts for a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorSummary {
    pub total_failures: usize,

    /// Units with at least one failure record
    pub units_with_failures: usize,

    /// `units_with_failures / total_units` as a percentage
    pub failure_rate: f64,

    pub by_category: BTreeMap<ErrorCategory, usize>,

    pub by_severity: BTreeMap<Severity, usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_common_category: Option<ErrorCategory>,

    pub hard_failed_units: Vec<String>,

    /// Recovery hints for each category present
    pub recovery_hints: BTreeMap<ErrorCategory, String>,
}

/// The aggregate report for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,

    /// Version of the keyword table used for classification
    pub classifier_version: String,

    pub summary: ErrorSummary,

    pub categorized_failures: BTreeMap<ErrorCategory, Vec<FailureRecord>>,

    pub patterns: Vec<Pattern>,

    pub quality: QualitySummary,

    pub recommendations: Vec<Recommendation>,
}

impl BatchReport {
    /// The overall quality score.
    pub fn quality_score(&self) -> f64 {
        self.quality.overall_score
    }

    /// Whether a pattern of the given kind was detected.
    pub fn has_pattern(&self, kind: PatternKind) -> bool {
        self.patterns.iter().any(|p| p.name == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_outcome_json_shape() {
        let outcome = UnitOutcome::hard_failure("q1", "LLM quota exceeded");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["unit_id"], "q1");
        assert_eq!(json["status"], "hard_failure");
        assert_eq!(json["error"], "LLM quota exceeded");

        let back: UnitOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_unit_outcome_rejects_missing_payload() {
        let json = serde_json::json!({ "unit_id": "q1", "status": "success" });
        assert!(serde_json::from_value::<UnitOutcome>(json).is_err());
    }

    #[test]
    fn test_severity_escalation() {
        assert_eq!(Severity::Low.escalate(), Severity::Medium);
        assert_eq!(Severity::High.escalate(), Severity::Critical);
        assert_eq!(Severity::Critical.escalate(), Severity::Critical);
    }

    #[test]
    fn test_failure_reason_display() {
        let failure = VerificationFailure::QuoteNotFound {
            unmatched_segments: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(failure.to_string(), "Quote not found in respondent text: a | b");
        assert_eq!(failure.kind(), "quote_not_found");
    }

    #[test]
    fn test_category_map_serializes_as_names() {
        let mut map = BTreeMap::new();
        map.insert(ErrorCategory::QuotaExceeded, 1usize);
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"QUOTA_EXCEEDED":1}"#);
    }
}
