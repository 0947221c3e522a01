//! Respondent text extraction from turn-tagged transcripts.
//!
//! A transcript is free text interleaved with role markers such as
//! `Interviewer:` and `Respondent:` (case-insensitive). A marker only opens
//! a turn at the start of a line or after a sentence end, so a label
//! followed by a colon inside running speech stays part of that speech.
//! Text before the first marker belongs to no speaker and is treated as an
//! asking turn.

use regex::Regex;
use std::collections::HashSet;
use thiserror::Error;

use crate::config::{ConfigError, RoleMarkers};

/// Errors from transcript extraction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// No role markers were found, so the format was not recognized.
    #[error("Transcript contains no recognizable role markers")]
    MalformedTranscript,
}

/// Speaker role of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Ask,
    Respond,
}

/// One turn: the text between a marker and the next marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn<'a> {
    pub role: Role,
    pub text: &'a str,
}

/// Splits transcripts on role markers and keeps the respondent's turns.
#[derive(Debug, Clone)]
pub struct RoleExtractor {
    marker: Regex,
    respond_labels: HashSet<String>,
}

impl RoleExtractor {
    /// Build an extractor for the given marker labels.
    pub fn new(markers: &RoleMarkers) -> Result<Self, ConfigError> {
        let mut labels: Vec<String> = markers
            .ask
            .iter()
            .chain(markers.respond.iter())
            .map(|l| canonical_label(l))
            .filter(|l| !l.is_empty())
            .collect();

        if labels.is_empty() {
            return Err(ConfigError::MissingField("verification.roles".to_string()));
        }

        // Longest first so "study participant" wins over "participant".
        labels.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        labels.dedup();

        let alternatives = labels
            .iter()
            .map(|l| regex::escape(l).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = format!(r"(?im)(?:^|[.?!]\s+)[ \t]*(?P<label>{})\s*:", alternatives);
        let marker = Regex::new(&pattern)
            .map_err(|e| ConfigError::ValidationError(format!("Invalid role marker: {}", e)))?;

        let respond_labels = markers
            .respond
            .iter()
            .map(|l| canonical_label(l))
            .filter(|l| !l.is_empty())
            .collect();

        Ok(Self {
            marker,
            respond_labels,
        })
    }

    /// Split a transcript into role-tagged turns.
    ///
    /// Fails with `MalformedTranscript` when no marker is present.
    pub fn turns<'a>(&self, transcript: &'a str) -> Result<Vec<Turn<'a>>, ExtractionError> {
        let mut turns = Vec::new();
        let mut role = Role::Ask;
        let mut cursor = 0;
        let mut found = false;

        for caps in self.marker.captures_iter(transcript) {
            let (Some(whole), Some(label)) = (caps.get(0), caps.name("label")) else {
                continue;
            };

            // Cut at the label so the sentence end stays with the previous turn.
            push_turn(&mut turns, role, &transcript[cursor..label.start()]);
            found = true;
            role = self.role_of(label.as_str());
            cursor = whole.end();
        }

        if !found {
            return Err(ExtractionError::MalformedTranscript);
        }

        push_turn(&mut turns, role, &transcript[cursor..]);
        Ok(turns)
    }

    /// Concatenate every respondent turn, joined by a single space.
    ///
    /// A transcript with markers but no respondent turns yields `Ok("")`.
    pub fn extract_respondent_text(&self, transcript: &str) -> Result<String, ExtractionError> {
        let turns = self.turns(transcript)?;
        let text = turns
            .iter()
            .filter(|t| t.role == Role::Respond)
            .map(|t| t.text)
            .collect::<Vec<_>>()
            .join(" ");
        Ok(text.trim().to_string())
    }

    fn role_of(&self, label: &str) -> Role {
        if self.respond_labels.contains(&canonical_label(label)) {
            Role::Respond
        } else {
            Role::Ask
        }
    }
}

impl Default for RoleExtractor {
    fn default() -> Self {
        lazy_static::lazy_static! {
            static ref DEFAULT_EXTRACTOR: RoleExtractor = RoleExtractor::new(&RoleMarkers::default())
                .expect("default role markers compile");
        }
        DEFAULT_EXTRACTOR.clone()
    }
}

fn push_turn<'a>(turns: &mut Vec<Turn<'a>>, role: Role, text: &'a str) {
    let text = text.trim();
    if !text.is_empty() {
        turns.push(Turn { role, text });
    }
}

fn canonical_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
