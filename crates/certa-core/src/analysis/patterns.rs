//! Cross-unit failure pattern detection.
//!
//! Rules are evaluated independently over the flattened failure records of
//! a batch and may co-fire. The returned list follows rule declaration
//! order, not severity.

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

use crate::config::PatternThresholds;
use crate::events::{default_sink, AuditEvent, EventSink};
use crate::types::{
    ErrorCategory, FailureRecord, Pattern, PatternKind, Severity, UnitOutcome,
    COMPONENT_CLASSIFICATION, COMPONENT_QUOTE_EXTRACTION,
};

use super::FailureClassifier;

lazy_static! {
    static ref QUOTE_RELATED: Regex = Regex::new(r"(?i)\b(?:quot|hallucinat)").unwrap();
}

/// Detects failure signatures shared by many units of a batch.
#[derive(Clone)]
pub struct PatternDetector {
    classifier: FailureClassifier,
    thresholds: PatternThresholds,
    sink: Arc<dyn EventSink>,
}

impl PatternDetector {
    pub fn new(
        classifier: FailureClassifier,
        thresholds: PatternThresholds,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            classifier,
            thresholds,
            sink,
        }
    }

    /// The classifier used to flatten outcomes into failure records.
    pub fn classifier(&self) -> &FailureClassifier {
        &self.classifier
    }

    /// Classify every failure in the batch and detect patterns.
    pub fn detect(&self, outcomes: &[UnitOutcome]) -> Vec<Pattern> {
        let records = self.classifier.collect(outcomes);
        self.detect_in(&records, outcomes.len())
    }

    /// Detect patterns over already-classified records.
    ///
    /// `batch_size` is the number of units in the batch, which the
    /// fractional thresholds are taken of.
    pub fn detect_in(&self, records: &[FailureRecord], batch_size: usize) -> Vec<Pattern> {
        let llm_threshold = fraction_threshold(self.thresholds.llm_issue_fraction, batch_size);
        let data_threshold = fraction_threshold(self.thresholds.data_quality_fraction, batch_size);

        let candidates = [
            self.rule(
                PatternKind::WidespreadLlmIssues,
                records,
                llm_threshold,
                is_llm_issue,
            ),
            self.rule(
                PatternKind::ClassificationBatchIssues,
                records,
                self.thresholds.min_classification_failures,
                |r| r.component.as_deref() == Some(COMPONENT_CLASSIFICATION),
            ),
            self.rule(
                PatternKind::QuoteValidationIssues,
                records,
                self.thresholds.min_quote_failures,
                is_quote_issue,
            ),
            self.rule(
                PatternKind::DataQualityIssues,
                records,
                data_threshold,
                |r| r.category == ErrorCategory::DataQuality,
            ),
        ];

        let patterns: Vec<Pattern> = candidates.into_iter().flatten().collect();

        for pattern in &patterns {
            self.sink.record(AuditEvent::PatternDetected {
                pattern: pattern.name,
                affected_count: pattern.affected_count,
            });
        }

        patterns
    }

    fn rule(
        &self,
        kind: PatternKind,
        records: &[FailureRecord],
        threshold: usize,
        predicate: impl Fn(&FailureRecord) -> bool,
    ) -> Option<Pattern> {
        let matching: Vec<&FailureRecord> = records.iter().filter(|r| predicate(*r)).collect();
        let count = matching.len();

        // A zero threshold would fire on an empty batch.
        if count == 0 || count < threshold.max(1) {
            return None;
        }

        let mut affected_units: Vec<String> =
            matching.iter().map(|r| r.unit_id.clone()).collect();
        affected_units.sort();
        affected_units.dedup();

        Some(Pattern {
            name: kind,
            severity: pattern_severity(kind),
            affected_count: count,
            description: describe(kind, count, affected_units.len()),
            recommendation: pattern_recommendation(kind).to_string(),
            affected_units,
        })
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new(
            FailureClassifier::default(),
            PatternThresholds::default(),
            default_sink(),
        )
    }
}

/// `ceil(fraction * batch_size)`, tolerant of float noise such as
/// `0.3 * 10 = 3.0000000000000004`.
fn fraction_threshold(fraction: f64, batch_size: usize) -> usize {
    let raw = fraction * batch_size as f64;
    (raw - 1e-9).ceil().max(0.0) as usize
}

fn is_llm_issue(record: &FailureRecord) -> bool {
    matches!(
        record.category,
        ErrorCategory::LlmFailure | ErrorCategory::QuotaExceeded | ErrorCategory::Timeout
    )
}

fn is_quote_issue(record: &FailureRecord) -> bool {
    record.component.as_deref() == Some(COMPONENT_QUOTE_EXTRACTION)
        || (record.category == ErrorCategory::ValidationFailure
            && QUOTE_RELATED.is_match(&record.raw_message))
}

fn pattern_severity(kind: PatternKind) -> Severity {
    match kind {
        PatternKind::WidespreadLlmIssues => Severity::Critical,
        PatternKind::ClassificationBatchIssues => Severity::High,
        PatternKind::QuoteValidationIssues => Severity::High,
        PatternKind::DataQualityIssues => Severity::Medium,
    }
}

fn describe(kind: PatternKind, count: usize, units: usize) -> String {
    match kind {
        PatternKind::WidespreadLlmIssues => format!(
            "{} LLM, quota or timeout failures across {} units",
            count, units
        ),
        PatternKind::ClassificationBatchIssues => {
            format!("Classification failed {} times across {} units", count, units)
        }
        PatternKind::QuoteValidationIssues => format!(
            "{} quote extraction or validation failures across {} units",
            count, units
        ),
        PatternKind::DataQualityIssues => {
            format!("{} data quality failures across {} units", count, units)
        }
    }
}

fn pattern_recommendation(kind: PatternKind) -> &'static str {
    match kind {
        PatternKind::WidespreadLlmIssues => {
            "Check LLM provider status, quota and timeout settings before re-running the batch"
        }
        PatternKind::ClassificationBatchIssues => {
            "Reduce classification batch size or simplify the classification output format"
        }
        PatternKind::QuoteValidationIssues => {
            "Review quote extraction prompts so quotes are copied verbatim from responses"
        }
        PatternKind::DataQualityIssues => {
            "Check the input data for empty or malformed participant responses"
        }
    }
}
