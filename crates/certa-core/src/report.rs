//! Batch analyzer: the fan-in stage that turns resolved unit outcomes into
//! a [`BatchReport`].
//!
//! The pipeline is strictly sequential and runs only once every unit has
//! resolved:
//! 1. Validate the outcomes (unique, non-blank ids; non-empty partials)
//! 2. Classify every failure, in unit-id order
//! 3. Detect cross-unit patterns
//! 4. Aggregate quality figures
//! 5. Derive recommendations
//!
//! The report depends only on the set of outcomes, never on their order.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::analysis::{
    percentage, FailureClassifier, PatternDetector, QualityAggregator, RecommendationGenerator,
};
use crate::config::{validate_outcomes, AnalysisConfig, BatchDocument, ConfigError};
use crate::events::{default_sink, AuditEvent, EventSink};
use crate::types::{BatchReport, ErrorCategory, ErrorSummary, FailureRecord, UnitOutcome};
use crate::AnalysisError;

/// Runs the full batch analysis pipeline.
#[derive(Clone)]
pub struct BatchAnalyzer {
    detector: PatternDetector,
    quality: QualityAggregator,
    recommender: RecommendationGenerator,
    sink: Arc<dyn EventSink>,
}

impl BatchAnalyzer {
    /// Build an analyzer from a validated configuration.
    pub fn new(config: &AnalysisConfig, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        config.validate()?;

        let classifier = FailureClassifier::new(&config.classifier, sink.clone())?;
        Ok(Self {
            detector: PatternDetector::new(classifier, config.patterns.clone(), sink.clone()),
            quality: QualityAggregator::new(config.quality.clone()),
            recommender: RecommendationGenerator::new(&config.quality),
            sink,
        })
    }

    /// Analyze a batch, stamping the report with the current time.
    pub fn analyze(&self, outcomes: &[UnitOutcome]) -> Result<BatchReport, AnalysisError> {
        self.analyze_at(outcomes, Utc::now())
    }

    /// Analyze a batch with an explicit report timestamp.
    ///
    /// Two runs over the same outcomes with the same timestamp produce
    /// identical reports.
    pub fn analyze_at(
        &self,
        outcomes: &[UnitOutcome],
        generated_at: DateTime<Utc>,
    ) -> Result<BatchReport, AnalysisError> {
        self.run(outcomes, None, generated_at)
    }

    /// Analyze a validated batch document, honoring its requested unit count.
    pub fn analyze_document(&self, document: &BatchDocument) -> Result<BatchReport, AnalysisError> {
        self.analyze_document_at(document, Utc::now())
    }

    pub fn analyze_document_at(
        &self,
        document: &BatchDocument,
        generated_at: DateTime<Utc>,
    ) -> Result<BatchReport, AnalysisError> {
        self.run(&document.outcomes, document.requested_units, generated_at)
    }

    /// The classifier, for callers that only need categories.
    pub fn classifier(&self) -> &FailureClassifier {
        self.detector.classifier()
    }

    fn run(
        &self,
        outcomes: &[UnitOutcome],
        requested: Option<usize>,
        generated_at: DateTime<Utc>,
    ) -> Result<BatchReport, AnalysisError> {
        validate_outcomes(outcomes)?;

        let mut ordered: Vec<&UnitOutcome> = outcomes.iter().collect();
        ordered.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));

        let classifier = self.detector.classifier();
        let records: Vec<FailureRecord> = ordered
            .iter()
            .flat_map(|outcome| classifier.records_for(outcome))
            .collect();

        let total_units = outcomes.len();
        let patterns = self.detector.detect_in(&records, total_units);
        let quality = self.quality.aggregate_with_requested(outcomes, requested);
        let recommendations = self.recommender.recommend(&patterns, &quality);
        let summary = error_summary(&records, total_units);

        let mut categorized_failures: BTreeMap<ErrorCategory, Vec<FailureRecord>> = BTreeMap::new();
        for record in records {
            categorized_failures
                .entry(record.category)
                .or_default()
                .push(record);
        }

        self.sink.record(AuditEvent::BatchAnalyzed {
            total_units,
            failures: summary.total_failures,
            completion_rate: quality.completion_rate,
            reliability: quality.reliability,
        });

        Ok(BatchReport {
            generated_at,
            classifier_version: classifier.version().to_string(),
            summary,
            categorized_failures,
            patterns,
            quality,
            recommendations,
        })
    }
}

impl Default for BatchAnalyzer {
    fn default() -> Self {
        let config = AnalysisConfig::default();
        Self {
            detector: PatternDetector::default(),
            quality: QualityAggregator::new(config.quality.clone()),
            recommender: RecommendationGenerator::new(&config.quality),
            sink: default_sink(),
        }
    }
}

/// Failure counts over records already ordered by unit id.
fn error_summary(records: &[FailureRecord], total_units: usize) -> ErrorSummary {
    let mut by_category = BTreeMap::new();
    let mut by_severity = BTreeMap::new();
    let mut units = BTreeSet::new();
    let mut hard_failed_units = Vec::new();

    for record in records {
        *by_category.entry(record.category).or_insert(0usize) += 1;
        *by_severity.entry(record.severity).or_insert(0usize) += 1;
        units.insert(record.unit_id.as_str());
        if record.is_hard_failure() {
            hard_failed_units.push(record.unit_id.clone());
        }
    }

    // Ties go to the category declared first.
    let most_common_category = by_category
        .iter()
        .fold(None, |best: Option<(ErrorCategory, usize)>, (&category, &count)| {
            match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((category, count)),
            }
        })
        .map(|(category, _)| category);

    let recovery_hints = by_category
        .keys()
        .map(|category| (*category, category.recovery_hint().to_string()))
        .collect();

    ErrorSummary {
        total_failures: records.len(),
        units_with_failures: units.len(),
        failure_rate: percentage(units.len() as f64, total_units),
        by_category,
        by_severity,
        most_common_category,
        hard_failed_units,
        recovery_hints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputError;
    use crate::events::RecordingSink;
    use crate::types::{FailedComponent, PatternKind, Reliability, Severity, UnitAnalysis};
    use chrono::TimeZone;

    fn batch() -> Vec<UnitOutcome> {
        vec![
            UnitOutcome::success("q1", UnitAnalysis::default()),
            UnitOutcome::partial(
                "q2",
                UnitAnalysis::default(),
                vec![FailedComponent::new("classification", "Could not parse JSON")],
            ),
            UnitOutcome::hard_failure("q3", "LLM quota exceeded"),
        ]
    }

    #[test]
    fn test_report_contents() {
        let report = BatchAnalyzer::default().analyze(&batch()).unwrap();

        assert_eq!(report.classifier_version, "1");
        assert_eq!(report.summary.total_failures, 2);
        assert_eq!(report.summary.units_with_failures, 2);
        assert_eq!(report.summary.failure_rate, 66.7);
        assert_eq!(report.summary.hard_failed_units, vec!["q3"]);
        assert_eq!(report.summary.by_severity[&Severity::Critical], 1);
        assert_eq!(report.categorized_failures[&ErrorCategory::QuotaExceeded].len(), 1);
        assert_eq!(report.categorized_failures[&ErrorCategory::ParsingError].len(), 1);
        assert!(report.summary.recovery_hints.contains_key(&ErrorCategory::ParsingError));

        // (1 + 0.7) / 3
        assert_eq!(report.quality.completion_rate, 56.7);
        assert_eq!(report.quality.reliability, Reliability::Low);
        assert_eq!(report.recommendations[0].priority, crate::types::Priority::High);
    }

    #[test]
    fn test_most_common_category_tie_breaks_by_declaration() {
        let report = BatchAnalyzer::default()
            .analyze(&[
                UnitOutcome::hard_failure("q1", "Request timed out"),
                UnitOutcome::hard_failure("q2", "Model overloaded"),
            ])
            .unwrap();
        assert_eq!(report.summary.most_common_category, Some(ErrorCategory::LlmFailure));
        assert!(report.has_pattern(PatternKind::WidespreadLlmIssues));
    }

    #[test]
    fn test_report_ignores_input_order() {
        let analyzer = BatchAnalyzer::default();
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

        let forward = analyzer.analyze_at(&batch(), at).unwrap();
        let mut reversed = batch();
        reversed.reverse();
        let backward = analyzer.analyze_at(&reversed, at).unwrap();

        assert_eq!(
            serde_json::to_string(&forward).unwrap(),
            serde_json::to_string(&backward).unwrap()
        );
    }

    #[test]
    fn test_duplicate_units_rejected() {
        let outcomes = vec![
            UnitOutcome::success("q1", UnitAnalysis::default()),
            UnitOutcome::hard_failure("q1", "timeout"),
        ];
        let err = BatchAnalyzer::default().analyze(&outcomes).unwrap_err();
        assert!(matches!(err, AnalysisError::Input(InputError::DuplicateUnit(id)) if id == "q1"));
    }

    #[test]
    fn test_empty_batch_is_reportable() {
        let report = BatchAnalyzer::default().analyze(&[]).unwrap();
        assert_eq!(report.summary.total_failures, 0);
        assert_eq!(report.summary.most_common_category, None);
        assert!(report.patterns.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = AnalysisConfig::default();
        config.quality.completion_weight = 0.9;
        assert!(BatchAnalyzer::new(&config, default_sink()).is_err());
    }

    #[test]
    fn test_batch_event_emitted_last() {
        let sink = Arc::new(RecordingSink::new());
        let analyzer = BatchAnalyzer::new(&AnalysisConfig::default(), sink.clone()).unwrap();
        analyzer.analyze(&batch()).unwrap();

        let events = sink.events();
        assert!(matches!(
            events.last(),
            Some(AuditEvent::BatchAnalyzed { total_units: 3, failures: 2, .. })
        ));
    }

    #[test]
    fn test_requested_units_from_document() {
        let document = BatchDocument {
            requested_units: Some(6),
            outcomes: batch(),
        };
        let report = BatchAnalyzer::default().analyze_document(&document).unwrap();
        assert_eq!(report.quality.requested_units, 6);
        // (1 + 0.7) / 6
        assert_eq!(report.quality.data_completeness, 28.3);
    }
}
