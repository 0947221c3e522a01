//! Quote verification against respondent-only transcript text.
//!
//! A quote found verbatim in the respondent's own turns is verified as is.
//! Otherwise it is verified only if every segment of it is found there.
//! Segments are tried verbatim first, then in
//! normalized form. A quote stitched together from one real fragment and
//! one invented fragment is rejected.
//!
//! The engine holds no mutable state; `verify` can be called from any
//! number of threads at once.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{ConfigError, NormalizeOptions, VerificationConfig};
use crate::events::{default_sink, AuditEvent, EventSink};
use crate::text::{normalize, ExtractionError, RoleExtractor};
use crate::types::{
    CandidateQuote, MatchKind, SourceTranscript, VerificationFailure, VerifiedQuote,
};

/// How a single segment matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentMatch {
    Exact,
    Normalized,
    Missing,
}

/// Verifies candidate quotes against source transcripts.
pub struct QuoteVerificationEngine {
    pub(super) separators: Vec<String>,
    pub(super) normalize: NormalizeOptions,
    pub(super) extractor: RoleExtractor,
    pub(super) sink: Arc<dyn EventSink>,
}

impl QuoteVerificationEngine {
    /// Create an engine from configuration.
    pub fn new(config: &VerificationConfig, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        let separators: Vec<String> = config
            .segment_separators
            .iter()
            .filter(|s| !s.trim().is_empty())
            .cloned()
            .collect();

        if separators.is_empty() {
            return Err(ConfigError::MissingField(
                "verification.segment_separators".to_string(),
            ));
        }

        Ok(Self {
            separators,
            normalize: config.normalize,
            extractor: RoleExtractor::new(&config.roles)?,
            sink,
        })
    }

    /// Split quote text into trimmed, non-empty segments.
    ///
    /// A quote without a separator yields one segment. Leftover dots at the
    /// segment edges are trimmed and segments left blank are dropped.
    pub fn split_segments<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut parts = vec![text];
        for separator in &self.separators {
            parts = parts
                .into_iter()
                .flat_map(|p| p.split(separator.as_str()))
                .collect();
        }

        parts
            .into_iter()
            .map(|p| p.trim_matches(|c: char| c.is_whitespace() || c == '.' || c == '\u{2026}'))
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Verify one quote against the transcript of its attributed respondent.
    pub fn verify(&self, quote: &CandidateQuote, transcripts: &[SourceTranscript]) -> VerifiedQuote {
        let result = match self.respondent_text(&quote.respondent_id, transcripts) {
            Ok(text) => self.match_quote(quote, &text),
            Err(failure) => VerifiedQuote::rejected(quote.clone(), failure),
        };
        self.report(&result);
        result
    }

    /// Verify many quotes, extracting each respondent's text once.
    pub fn verify_all(
        &self,
        quotes: &[CandidateQuote],
        transcripts: &[SourceTranscript],
    ) -> Vec<VerifiedQuote> {
        let mut extracted: HashMap<&str, Result<String, VerificationFailure>> = HashMap::new();

        quotes
            .iter()
            .map(|quote| {
                let source = extracted
                    .entry(quote.respondent_id.as_str())
                    .or_insert_with(|| self.respondent_text(&quote.respondent_id, transcripts));

                let result = match source {
                    Ok(text) => self.match_quote(quote, text),
                    Err(failure) => VerifiedQuote::rejected(quote.clone(), failure.clone()),
                };
                self.report(&result);
                result
            })
            .collect()
    }

    /// Locate the respondent's transcript and extract their turns.
    fn respondent_text(
        &self,
        respondent_id: &str,
        transcripts: &[SourceTranscript],
    ) -> Result<String, VerificationFailure> {
        let transcript = transcripts
            .iter()
            .find(|t| t.respondent_id == respondent_id)
            .ok_or_else(|| VerificationFailure::RespondentNotFound {
                respondent_id: respondent_id.to_string(),
            })?;

        self.extractor
            .extract_respondent_text(&transcript.text)
            .map_err(|e| match e {
                ExtractionError::MalformedTranscript => {
                    self.sink.record(AuditEvent::TranscriptMalformed {
                        respondent_id: respondent_id.to_string(),
                    });
                    VerificationFailure::MalformedTranscript {
                        respondent_id: respondent_id.to_string(),
                    }
                }
            })
    }

    /// Match every segment of a quote (AND semantics).
    fn match_quote(&self, quote: &CandidateQuote, source: &str) -> VerifiedQuote {
        let whole = quote.text.trim();
        if whole.is_empty() {
            return VerifiedQuote::rejected(quote.clone(), VerificationFailure::EmptyQuote);
        }

        // Verbatim text counts even when it contains a separator or is
        // nothing but punctuation.
        if source.contains(whole) {
            return VerifiedQuote::accepted(quote.clone(), MatchKind::Exact);
        }

        let segments = self.split_segments(whole);
        if segments.is_empty() {
            return VerifiedQuote::rejected(quote.clone(), VerificationFailure::EmptyQuote);
        }

        let mut normalized_source: Option<String> = None;
        let mut unmatched = Vec::new();
        let mut all_exact = true;

        for segment in segments {
            match self.match_segment(segment, source, &mut normalized_source) {
                SegmentMatch::Exact => {}
                SegmentMatch::Normalized => all_exact = false,
                SegmentMatch::Missing => unmatched.push(segment.to_string()),
            }
        }

        if !unmatched.is_empty() {
            return VerifiedQuote::rejected(
                quote.clone(),
                VerificationFailure::QuoteNotFound {
                    unmatched_segments: unmatched,
                },
            );
        }

        let kind = if all_exact {
            MatchKind::Exact
        } else {
            MatchKind::Normalized
        };
        VerifiedQuote::accepted(quote.clone(), kind)
    }

    fn match_segment(
        &self,
        segment: &str,
        source: &str,
        normalized_source: &mut Option<String>,
    ) -> SegmentMatch {
        if source.contains(segment) {
            return SegmentMatch::Exact;
        }

        if !self.normalize.any() {
            return SegmentMatch::Missing;
        }

        let needle = normalize(segment, self.normalize);
        if needle.is_empty() {
            return SegmentMatch::Missing;
        }

        let haystack = normalized_source.get_or_insert_with(|| normalize(source, self.normalize));
        if haystack.contains(&needle) {
            SegmentMatch::Normalized
        } else {
            SegmentMatch::Missing
        }
    }

    fn report(&self, result: &VerifiedQuote) {
        let respondent_id = result.quote.respondent_id.clone();

        if result.verified {
            self.sink.record(AuditEvent::QuoteVerified {
                respondent_id,
                match_kind: result.match_kind,
                segments: self.split_segments(&result.quote.text).len().max(1),
            });
            return;
        }

        if result.quote.previously_verified == Some(true) {
            self.sink.record(AuditEvent::VerificationOverturned {
                respondent_id: respondent_id.clone(),
                quote: result.quote.text.clone(),
            });
        }

        self.sink.record(AuditEvent::QuoteRejected {
            respondent_id,
            reason: result.failure_reason().unwrap_or_default(),
        });
    }
}

impl Default for QuoteVerificationEngine {
    fn default() -> Self {
        let config = VerificationConfig::default();
        Self {
            separators: config.segment_separators,
            normalize: config.normalize,
            extractor: RoleExtractor::default(),
            sink: default_sink(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingSink;

    fn transcripts() -> Vec<SourceTranscript> {
        vec![
            SourceTranscript::new(
                "r1",
                "Interviewer: What do you think of the app?\n\
                 Respondent: I love it a lot, but it's slow sometimes.\n\
                 Interviewer: Would you recommend it?\n\
                 Respondent: Probably.  The   onboarding was GREAT!",
            ),
            SourceTranscript::new("r2", "no markers in this transcript at all"),
        ]
    }

    fn engine_with(normalize: NormalizeOptions) -> QuoteVerificationEngine {
        let config = VerificationConfig {
            normalize,
            ..VerificationConfig::default()
        };
        QuoteVerificationEngine::new(&config, Arc::new(RecordingSink::new())).unwrap()
    }

    #[test]
    fn test_exact_single_segment() {
        let engine = QuoteVerificationEngine::default();
        let result = engine.verify(&CandidateQuote::new("I love it a lot", "r1"), &transcripts());
        assert!(result.verified);
        assert_eq!(result.match_kind, MatchKind::Exact);
        assert!(result.failure.is_none());
    }

    #[test]
    fn test_multi_segment_exact() {
        let engine = QuoteVerificationEngine::default();
        let quote = CandidateQuote::new("I love it ... but it's slow", "r1");
        let result = engine.verify(&quote, &transcripts());
        assert!(result.verified);
        assert_eq!(result.match_kind, MatchKind::Exact);
    }

    #[test]
    fn test_one_missing_segment_rejects_quote() {
        let engine = QuoteVerificationEngine::default();
        let quote = CandidateQuote::new("I love it ... and I would pay double", "r1");
        let result = engine.verify(&quote, &transcripts());
        assert!(!result.verified);
        assert_eq!(result.match_kind, MatchKind::None);
        assert_eq!(
            result.failure,
            Some(VerificationFailure::QuoteNotFound {
                unmatched_segments: vec!["and I would pay double".to_string()],
            })
        );
    }

    #[test]
    fn test_normalized_match() {
        let engine = QuoteVerificationEngine::default();
        let quote = CandidateQuote::new("the onboarding was great", "r1");
        let result = engine.verify(&quote, &transcripts());
        assert!(result.verified);
        assert_eq!(result.match_kind, MatchKind::Normalized);
    }

    #[test]
    fn test_mixed_exact_and_normalized_is_normalized() {
        let engine = QuoteVerificationEngine::default();
        let quote = CandidateQuote::new("I love it \u{2026} onboarding was great", "r1");
        let result = engine.verify(&quote, &transcripts());
        assert!(result.verified);
        assert_eq!(result.match_kind, MatchKind::Normalized);
    }

    #[test]
    fn test_normalization_disabled() {
        let engine = engine_with(NormalizeOptions::none());
        let quote = CandidateQuote::new("the onboarding was great", "r1");
        assert!(!engine.verify(&quote, &transcripts()).verified);
    }

    #[test]
    fn test_typo_is_not_normalized_away() {
        let engine = engine_with(NormalizeOptions {
            collapse_whitespace: false,
            fold_case: true,
            strip_punctuation: false,
        });
        let sources = vec![SourceTranscript::new(
            "r1",
            "Respondent: This is an amazing feature.",
        )];
        let result = engine.verify(&CandidateQuote::new("amazng feature", "r1"), &sources);
        assert!(!result.verified);
    }

    #[test]
    fn test_interviewer_text_does_not_verify() {
        let engine = QuoteVerificationEngine::default();
        let quote = CandidateQuote::new("Would you recommend it?", "r1");
        assert!(!engine.verify(&quote, &transcripts()).verified);
    }

    #[test]
    fn test_respondent_not_found() {
        let engine = QuoteVerificationEngine::default();
        let result = engine.verify(&CandidateQuote::new("anything", "r9"), &transcripts());
        assert!(!result.verified);
        assert!(matches!(
            result.failure,
            Some(VerificationFailure::RespondentNotFound { .. })
        ));
    }

    #[test]
    fn test_malformed_transcript_fails_loudly() {
        let engine = QuoteVerificationEngine::default();
        // The text is present, but the transcript has no role markers.
        let result = engine.verify(&CandidateQuote::new("no markers", "r2"), &transcripts());
        assert!(!result.verified);
        assert!(matches!(
            result.failure,
            Some(VerificationFailure::MalformedTranscript { .. })
        ));
    }

    #[test]
    fn test_empty_quote() {
        let engine = QuoteVerificationEngine::default();
        let result = engine.verify(&CandidateQuote::new("  ...  ", "r1"), &transcripts());
        assert_eq!(result.failure, Some(VerificationFailure::EmptyQuote));
    }

    #[test]
    fn test_blank_quote_is_empty() {
        let engine = QuoteVerificationEngine::default();
        let result = engine.verify(&CandidateQuote::new(" \n\t ", "r1"), &transcripts());
        assert_eq!(result.failure, Some(VerificationFailure::EmptyQuote));
    }

    #[test]
    fn test_punctuation_only_quote_verifies_verbatim() {
        let engine = QuoteVerificationEngine::default();
        let sources = vec![SourceTranscript::new(
            "r1",
            "Interviewer: Ok? Respondent: Fine, thanks!",
        )];

        for text in [",", "!", ", thanks!"] {
            let result = engine.verify(&CandidateQuote::new(text, "r1"), &sources);
            assert!(result.verified, "quote {:?}", text);
            assert_eq!(result.match_kind, MatchKind::Exact);
        }

        // Only the interviewer asked a question.
        let result = engine.verify(&CandidateQuote::new("?", "r1"), &sources);
        assert!(!result.verified);
        assert!(matches!(
            result.failure,
            Some(VerificationFailure::QuoteNotFound { .. })
        ));
    }

    #[test]
    fn test_separator_spoken_verbatim() {
        let engine = QuoteVerificationEngine::default();
        let sources = vec![SourceTranscript::new(
            "r1",
            "Interviewer: And then?\nRespondent: I mean... it works.",
        )];
        let result = engine.verify(&CandidateQuote::new("mean... it", "r1"), &sources);
        assert!(result.verified);
        assert_eq!(result.match_kind, MatchKind::Exact);
    }

    #[test]
    fn test_colon_phrase_in_question_is_not_respondent_text() {
        let engine = QuoteVerificationEngine::default();
        let sources = vec![SourceTranscript::new(
            "r1",
            "Interviewer: Please respond: was the price too high?\nRespondent: No.",
        )];
        let result = engine.verify(&CandidateQuote::new("was the price too high?", "r1"), &sources);
        assert!(!result.verified);
        assert!(engine.verify(&CandidateQuote::new("No.", "r1"), &sources).verified);
    }

    #[test]
    fn test_split_segments() {
        let engine = QuoteVerificationEngine::default();
        assert_eq!(engine.split_segments("one"), vec!["one"]);
        assert_eq!(engine.split_segments("a ... b \u{2026} c"), vec!["a", "b", "c"]);
        assert_eq!(engine.split_segments("a .... b"), vec!["a", "b"]);
    }

    #[test]
    fn test_verify_all_keeps_order_and_isolates_failures() {
        let engine = QuoteVerificationEngine::default();
        let quotes = vec![
            CandidateQuote::new("invented statement", "r1"),
            CandidateQuote::new("Probably.", "r1"),
            CandidateQuote::new("anything", "missing"),
        ];
        let results = engine.verify_all(&quotes, &transcripts());
        assert_eq!(results.len(), 3);
        assert!(!results[0].verified);
        assert!(results[1].verified);
        assert!(!results[2].verified);
        assert_eq!(results[1].quote.text, "Probably.");
    }

    #[test]
    fn test_overturned_prior_verification_is_reported() {
        let sink = Arc::new(RecordingSink::new());
        let engine =
            QuoteVerificationEngine::new(&VerificationConfig::default(), sink.clone()).unwrap();
        let quote = CandidateQuote::new("never said this", "r1").with_prior_verification(true);
        engine.verify(&quote, &transcripts());

        let events = sink.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, AuditEvent::VerificationOverturned { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, AuditEvent::QuoteRejected { .. })));
    }

    #[test]
    fn test_parallel_verification() {
        let engine = &QuoteVerificationEngine::default();
        let sources = &transcripts();
        let quotes: Vec<CandidateQuote> = (0..16)
            .map(|i| {
                if i % 2 == 0 {
                    CandidateQuote::new("but it's slow", "r1")
                } else {
                    CandidateQuote::new("fabricated", "r1")
                }
            })
            .collect();

        let results: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = quotes
                .iter()
                .map(|q| scope.spawn(move || engine.verify(q, sources).verified))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for (i, verified) in results.iter().enumerate() {
            assert_eq!(*verified, i % 2 == 0);
        }
    }
}
