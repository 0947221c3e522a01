//! Remediation recommendations derived from patterns and quality figures.

use std::collections::HashSet;

use crate::config::QualityConfig;
use crate::types::{
    Pattern, PatternKind, Priority, QualitySummary, Recommendation, RecommendationCause,
};

/// Completion rates below this are critical rather than high priority.
const CRITICAL_COMPLETION_RATE: f64 = 50.0;

/// Turns detected patterns and quality figures into recommendations.
#[derive(Debug, Clone)]
pub struct RecommendationGenerator {
    completion_below: f64,
}

impl RecommendationGenerator {
    pub fn new(config: &QualityConfig) -> Self {
        Self {
            completion_below: config.completion_recommendation_below,
        }
    }

    /// Build recommendations: the completion-rate entry first (if the rate
    /// is low), then one per pattern in detection order. A cause appears
    /// at most once.
    pub fn recommend(&self, patterns: &[Pattern], summary: &QualitySummary) -> Vec<Recommendation> {
        let mut seen = HashSet::new();
        let mut recommendations = Vec::new();

        if summary.completion_rate < self.completion_below {
            seen.insert(RecommendationCause::CompletionRate);
            recommendations.push(self.completion_recommendation(summary));
        }

        for pattern in patterns {
            let cause = RecommendationCause::Pattern {
                pattern: pattern.name,
            };
            if seen.insert(cause) {
                recommendations.push(pattern_recommendation(pattern, cause));
            }
        }

        recommendations
    }

    fn completion_recommendation(&self, summary: &QualitySummary) -> Recommendation {
        let priority = if summary.completion_rate < CRITICAL_COMPLETION_RATE {
            Priority::Critical
        } else {
            Priority::High
        };

        Recommendation {
            cause: RecommendationCause::CompletionRate,
            priority,
            title: "Improve batch completion rate".to_string(),
            description: format!(
                "Completion rate is {:.1}% (target {:.0}%): {} of {} units failed and {} completed partially",
                summary.completion_rate,
                self.completion_below,
                summary.failed_units,
                summary.total_units,
                summary.partial_units
            ),
            actions: to_strings(&[
                "Re-run hard-failed units individually",
                "Review the most common error category for a shared cause",
                "Check upstream timeouts and concurrency limits",
            ]),
        }
    }
}

impl Default for RecommendationGenerator {
    fn default() -> Self {
        Self::new(&QualityConfig::default())
    }
}

fn pattern_recommendation(pattern: &Pattern, cause: RecommendationCause) -> Recommendation {
    let (priority, title, actions): (Priority, &str, Vec<&str>) = match pattern.name {
        PatternKind::WidespreadLlmIssues => (
            Priority::Critical,
            "Resolve LLM provider issues",
            vec![
                "Check provider status and API credentials",
                "Review quota and rate limits for the account",
                "Lower concurrency or raise timeouts before re-running",
            ],
        ),
        PatternKind::ClassificationBatchIssues => (
            Priority::High,
            "Stabilize respondent classification",
            vec![
                "Reduce the number of respondents classified per request",
                "Enforce a structured output format for classification",
            ],
        ),
        PatternKind::QuoteValidationIssues => (
            Priority::High,
            "Reduce unverifiable quotes",
            vec![
                "Instruct extraction to copy quotes verbatim from respondent turns",
                "Review rejected quotes for invented or merged fragments",
            ],
        ),
        PatternKind::DataQualityIssues => (
            Priority::Medium,
            "Review input data quality",
            vec![
                "Check for empty or very short participant responses",
                "Verify transcripts carry role markers",
            ],
        ),
    };

    Recommendation {
        cause,
        priority,
        title: title.to_string(),
        description: format!("{}. {}", pattern.description, pattern.recommendation),
        actions: to_strings(&actions),
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
