//! Unit finalization: verify a unit's quotes and decide its outcome.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::AuditEvent;
use crate::types::{
    CandidateQuote, Classification, FailedComponent, SourceTranscript, Theme, UnitAnalysis,
    UnitOutcome, UnitStatus, VerifiedQuote, COMPONENT_QUOTE_EXTRACTION,
};

use super::QuoteVerificationEngine;

/// A theme with the candidate quotes extracted for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThemeDraft {
    #[serde(flatten)]
    pub theme: Theme,

    #[serde(default)]
    pub quotes: Vec<CandidateQuote>,
}

/// Everything a unit produced before verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitDraft {
    pub unit_id: String,

    #[serde(default)]
    pub themes: Vec<ThemeDraft>,

    #[serde(default)]
    pub classifications: Vec<Classification>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Steps that already failed upstream
    #[serde(default)]
    pub failures: Vec<FailedComponent>,

    /// Set when the unit failed outright upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UnitDraft {
    pub fn new(unit_id: impl Into<String>) -> Self {
        Self {
            unit_id: unit_id.into(),
            ..Self::default()
        }
    }

    /// Whether nothing at all was produced.
    fn is_empty(&self) -> bool {
        self.themes.is_empty() && self.classifications.is_empty() && self.summary.is_none()
    }
}

impl QuoteVerificationEngine {
    /// Verify every quote of a draft and produce the unit's terminal outcome.
    ///
    /// - No failures and every quote verified: `Success`.
    /// - Some output plus failures or unverified quotes: `PartialFailure`,
    ///   with unverified quotes kept (flagged) and a `quote_extraction`
    ///   failed component added.
    /// - An upstream error, or failures and no output at all: `HardFailure`.
    pub fn finalize_unit(&self, draft: UnitDraft, transcripts: &[SourceTranscript]) -> UnitOutcome {
        let produced_nothing = draft.is_empty();
        let UnitDraft {
            unit_id,
            themes,
            classifications,
            summary,
            mut failures,
            error,
        } = draft;

        if let Some(error) = error {
            self.emit_finalized(&unit_id, "hard_failure", 0, 0);
            return UnitOutcome::hard_failure(unit_id, error);
        }

        if produced_nothing && !failures.is_empty() {
            let error = failures
                .iter()
                .map(|f| format!("{}: {}", f.component, f.message))
                .collect::<Vec<_>>()
                .join("; ");
            self.emit_finalized(&unit_id, "hard_failure", 0, 0);
            return UnitOutcome::hard_failure(unit_id, error);
        }

        let mut theme_list = Vec::with_capacity(themes.len());
        let mut quotes_by_theme: BTreeMap<String, Vec<VerifiedQuote>> = BTreeMap::new();
        for ThemeDraft { theme, quotes } in themes {
            if !quotes.is_empty() {
                let verified = self.verify_all(&quotes, transcripts);
                quotes_by_theme
                    .entry(theme.id.clone())
                    .or_default()
                    .extend(verified);
            }
            theme_list.push(theme);
        }

        let analysis = UnitAnalysis {
            themes: theme_list,
            classifications,
            quotes_by_theme,
            summary,
        };

        let total = analysis.quotes().count();
        let rejected: Vec<&VerifiedQuote> = analysis.quotes().filter(|q| !q.verified).collect();
        let unverified = rejected.len();
        if unverified > 0 {
            failures.push(FailedComponent::new(
                COMPONENT_QUOTE_EXTRACTION,
                quote_failure_message(&rejected, total),
            ));
        }

        let outcome = if failures.is_empty() {
            UnitOutcome::success(unit_id, analysis)
        } else {
            UnitOutcome::partial(unit_id, analysis, failures)
        };

        let status = match outcome.status {
            UnitStatus::Success { .. } => "success",
            UnitStatus::PartialFailure { .. } => "partial_failure",
            UnitStatus::HardFailure { .. } => "hard_failure",
        };
        self.emit_finalized(&outcome.unit_id, status, total, unverified);
        outcome
    }

    fn emit_finalized(&self, unit_id: &str, status: &'static str, quotes: usize, unverified: usize) {
        self.sink.record(AuditEvent::UnitFinalized {
            unit_id: unit_id.to_string(),
            status,
            quotes,
            unverified,
        });
    }
}

/// Summarize rejected quotes by failure kind, without quoting their text.
fn quote_failure_message(rejected: &[&VerifiedQuote], total: usize) -> String {
    let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
    for quote in rejected {
        if let Some(failure) = &quote.failure {
            *kinds.entry(failure.kind()).or_default() += 1;
        }
    }

    let breakdown = kinds
        .iter()
        .map(|(kind, count)| format!("{}: {}", kind, count))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "{} of {} quotes failed verification ({})",
        rejected.len(),
        total,
        breakdown
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::COMPONENT_CLASSIFICATION;

    fn transcripts() -> Vec<SourceTranscript> {
        vec![
            SourceTranscript::new("r1", "Interviewer: Thoughts? Respondent: The price is too high."),
            SourceTranscript::new("r2", "Moderator: And you? Participant: Support was quick."),
        ]
    }

    fn theme(id: &str, quotes: Vec<CandidateQuote>) -> ThemeDraft {
        ThemeDraft {
            theme: Theme::new(id, id.to_uppercase()),
            quotes,
        }
    }

    #[test]
    fn test_all_verified_is_success() {
        let engine = QuoteVerificationEngine::default();
        let mut draft = UnitDraft::new("q1");
        draft.themes = vec![
            theme("price", vec![CandidateQuote::new("price is too high", "r1")]),
            theme("support", vec![CandidateQuote::new("Support was quick", "r2")]),
        ];

        let outcome = engine.finalize_unit(draft, &transcripts());
        assert!(outcome.is_success());
        let analysis = outcome.analysis().unwrap();
        assert_eq!(analysis.themes.len(), 2);
        assert_eq!(analysis.quotes().count(), 2);
        assert!(analysis.quotes().all(|q| q.verified));
    }

    #[test]
    fn test_unverified_quote_makes_partial() {
        let engine = QuoteVerificationEngine::default();
        let mut draft = UnitDraft::new("q1");
        draft.themes = vec![theme(
            "price",
            vec![
                CandidateQuote::new("price is too high", "r1"),
                CandidateQuote::new("I would never pay that", "r1"),
            ],
        )];

        let outcome = engine.finalize_unit(draft, &transcripts());
        match &outcome.status {
            UnitStatus::PartialFailure { analysis, failures } => {
                assert_eq!(analysis.quotes_by_theme["price"].len(), 2);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].component, COMPONENT_QUOTE_EXTRACTION);
                assert_eq!(
                    failures[0].message,
                    "1 of 2 quotes failed verification (quote_not_found: 1)"
                );
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[test]
    fn test_upstream_failure_kept() {
        let engine = QuoteVerificationEngine::default();
        let mut draft = UnitDraft::new("q2");
        draft.themes = vec![theme("price", vec![])];
        draft.failures = vec![FailedComponent::new(COMPONENT_CLASSIFICATION, "Invalid JSON")];

        let outcome = engine.finalize_unit(draft, &transcripts());
        assert!(outcome.is_partial());
    }

    #[test]
    fn test_nothing_produced_is_hard_failure() {
        let engine = QuoteVerificationEngine::default();
        let mut draft = UnitDraft::new("q3");
        draft.failures = vec![FailedComponent::new("themes", "LLM request timed out")];

        let outcome = engine.finalize_unit(draft, &transcripts());
        match outcome.status {
            UnitStatus::HardFailure { error } => assert_eq!(error, "themes: LLM request timed out"),
            other => panic!("expected hard failure, got {:?}", other),
        }
    }

    #[test]
    fn test_upstream_error_wins() {
        let engine = QuoteVerificationEngine::default();
        let mut draft = UnitDraft::new("q5");
        draft.themes = vec![theme("price", vec![CandidateQuote::new("price is too high", "r1")])];
        draft.error = Some("Workflow state lost".to_string());

        let outcome = engine.finalize_unit(draft, &transcripts());
        assert!(outcome.is_hard_failure());
    }

    #[test]
    fn test_empty_draft_is_success() {
        let engine = QuoteVerificationEngine::default();
        let outcome = engine.finalize_unit(UnitDraft::new("q4"), &transcripts());
        assert!(outcome.is_success());
    }
}
