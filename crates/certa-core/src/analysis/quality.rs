//! Batch quality aggregation.
//!
//! Every figure is computed from integer counts, so the result does not
//! depend on the order of the outcomes.

use std::collections::BTreeMap;

use crate::config::QualityConfig;
use crate::types::{
    MatchKind, QualitySummary, Reliability, UnitOutcome, UnitStatus, VerificationSummary,
};

/// Round to one decimal place.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// `part / whole` as a percentage, or 0 for an empty whole.
pub(crate) fn percentage(part: f64, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round1(part / whole as f64 * 100.0)
    }
}

/// Computes completion, reliability and the overall quality score.
#[derive(Debug, Clone, Default)]
pub struct QualityAggregator {
    config: QualityConfig,
}

impl QualityAggregator {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Aggregate a batch where every requested unit was attempted.
    pub fn aggregate(&self, outcomes: &[UnitOutcome]) -> QualitySummary {
        self.aggregate_with_requested(outcomes, None)
    }

    /// Aggregate a batch, measuring data completeness against the number
    /// of units originally requested.
    ///
    /// A requested count below the number of outcomes is raised to it.
    pub fn aggregate_with_requested(
        &self,
        outcomes: &[UnitOutcome],
        requested: Option<usize>,
    ) -> QualitySummary {
        let total = outcomes.len();
        let (mut successful, mut partial, mut failed) = (0usize, 0usize, 0usize);
        for outcome in outcomes {
            match outcome.status {
                UnitStatus::Success { .. } => successful += 1,
                UnitStatus::PartialFailure { .. } => partial += 1,
                UnitStatus::HardFailure { .. } => failed += 1,
            }
        }

        let weighted = successful as f64 + partial as f64 * self.config.partial_weight;
        let requested_units = requested.unwrap_or(total).max(total);

        let completion_rate = percentage(weighted, total);
        let data_completeness = percentage(weighted, requested_units);
        let reliability = self.reliability(completion_rate);

        let verification = verification_summary(outcomes);
        let quote_verification_rate = if verification.total_quotes == 0 {
            None
        } else {
            Some(percentage(
                verification.verified as f64,
                verification.total_quotes,
            ))
        };

        let overall_score = match quote_verification_rate {
            Some(rate) => round1(
                self.config.completion_weight * completion_rate
                    + self.config.verification_weight * rate,
            ),
            None => completion_rate,
        };

        QualitySummary {
            total_units: total,
            requested_units,
            successful_units: successful,
            partial_units: partial,
            failed_units: failed,
            completion_rate,
            data_completeness,
            reliability,
            quote_verification_rate,
            verification,
            overall_score,
        }
    }

    /// Reliability label for a completion rate.
    pub fn reliability(&self, completion_rate: f64) -> Reliability {
        if completion_rate >= self.config.high_reliability {
            Reliability::High
        } else if completion_rate >= self.config.medium_reliability {
            Reliability::Medium
        } else {
            Reliability::Low
        }
    }
}

fn verification_summary(outcomes: &[UnitOutcome]) -> VerificationSummary {
    let mut summary = VerificationSummary::default();
    let mut failures_by_kind: BTreeMap<String, usize> = BTreeMap::new();

    for quote in outcomes.iter().filter_map(|o| o.analysis()).flat_map(|a| a.quotes()) {
        summary.total_quotes += 1;
        if quote.verified {
            summary.verified += 1;
            match quote.match_kind {
                MatchKind::Exact => summary.exact += 1,
                MatchKind::Normalized => summary.normalized += 1,
                MatchKind::None => {}
            }
        } else {
            summary.unverified += 1;
            let kind = quote.failure.as_ref().map_or("unknown", |f| f.kind());
            *failures_by_kind.entry(kind.to_string()).or_default() += 1;
        }
    }

    summary.failures_by_kind = failures_by_kind;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CandidateQuote, FailedComponent, UnitAnalysis, VerificationFailure, VerifiedQuote,
    };

    fn with_quotes(quotes: Vec<VerifiedQuote>) -> UnitAnalysis {
        let mut analysis = UnitAnalysis::default();
        analysis.quotes_by_theme.insert("t1".to_string(), quotes);
        analysis
    }

    fn partial(id: &str) -> UnitOutcome {
        UnitOutcome::partial(
            id,
            UnitAnalysis::default(),
            vec![FailedComponent::new("summary", "Model returned nothing")],
        )
    }

    #[test]
    fn test_completion_with_partial_weight() {
        let aggregator = QualityAggregator::default();
        let outcomes = vec![
            UnitOutcome::success("q1", UnitAnalysis::default()),
            partial("q2"),
            UnitOutcome::hard_failure("q3", "timeout"),
            UnitOutcome::success("q4", UnitAnalysis::default()),
        ];

        let summary = aggregator.aggregate(&outcomes);
        // (2 + 0.7) / 4 = 67.5
        assert_eq!(summary.completion_rate, 67.5);
        assert_eq!(summary.reliability, Reliability::Low);
        assert_eq!(summary.successful_units, 2);
        assert_eq!(summary.partial_units, 1);
        assert_eq!(summary.failed_units, 1);
        assert_eq!(summary.quote_verification_rate, None);
        assert_eq!(summary.overall_score, 67.5);
    }

    #[test]
    fn test_reliability_boundaries() {
        let aggregator = QualityAggregator::default();
        assert_eq!(aggregator.reliability(90.0), Reliability::High);
        assert_eq!(aggregator.reliability(89.9), Reliability::Medium);
        assert_eq!(aggregator.reliability(70.0), Reliability::Medium);
        assert_eq!(aggregator.reliability(69.9), Reliability::Low);
    }

    #[test]
    fn test_data_completeness_uses_requested_count() {
        let aggregator = QualityAggregator::default();
        let outcomes = vec![
            UnitOutcome::success("q1", UnitAnalysis::default()),
            UnitOutcome::success("q2", UnitAnalysis::default()),
        ];

        let summary = aggregator.aggregate_with_requested(&outcomes, Some(4));
        assert_eq!(summary.completion_rate, 100.0);
        assert_eq!(summary.data_completeness, 50.0);
        assert_eq!(summary.requested_units, 4);

        // Fewer requested than attempted is treated as all attempted
        let summary = aggregator.aggregate_with_requested(&outcomes, Some(1));
        assert_eq!(summary.requested_units, 2);
        assert_eq!(summary.data_completeness, 100.0);
    }

    #[test]
    fn test_empty_batch() {
        let summary = QualityAggregator::default().aggregate(&[]);
        assert_eq!(summary.total_units, 0);
        assert_eq!(summary.completion_rate, 0.0);
        assert_eq!(summary.reliability, Reliability::Low);
        assert_eq!(summary.overall_score, 0.0);
    }

    #[test]
    fn test_quote_verification_rate_and_overall_score() {
        let quote = |text: &str| CandidateQuote::new(text, "r1");
        let quotes = vec![
            VerifiedQuote::accepted(quote("a"), MatchKind::Exact),
            VerifiedQuote::accepted(quote("b"), MatchKind::Normalized),
            VerifiedQuote::accepted(quote("c"), MatchKind::Exact),
            VerifiedQuote::rejected(
                quote("d"),
                VerificationFailure::QuoteNotFound {
                    unmatched_segments: vec!["d".to_string()],
                },
            ),
        ];
        let outcomes = vec![UnitOutcome::success("q1", with_quotes(quotes))];

        let summary = QualityAggregator::default().aggregate(&outcomes);
        assert_eq!(summary.quote_verification_rate, Some(75.0));
        assert_eq!(summary.verification.total_quotes, 4);
        assert_eq!(summary.verification.exact, 2);
        assert_eq!(summary.verification.normalized, 1);
        assert_eq!(summary.verification.unverified, 1);
        assert_eq!(summary.verification.failures_by_kind["quote_not_found"], 1);
        // 0.6 * 100 + 0.4 * 75
        assert_eq!(summary.overall_score, 90.0);
    }

    #[test]
    fn test_order_independent() {
        let aggregator = QualityAggregator::default();
        let mut outcomes = vec![
            UnitOutcome::success("q1", UnitAnalysis::default()),
            partial("q2"),
            UnitOutcome::hard_failure("q3", "timeout"),
        ];
        let forward = aggregator.aggregate(&outcomes);
        outcomes.reverse();
        assert_eq!(aggregator.aggregate(&outcomes), forward);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round1(66.666_666), 66.7);
        assert_eq!(percentage(2.0, 3), 66.7);
        assert_eq!(percentage(1.0, 0), 0.0);
    }
}
