//! Failure classification.
//!
//! Raw failure messages are mapped onto the closed [`ErrorCategory`]
//! taxonomy with a versioned keyword table. Rules are tried in table order
//! and the first rule with a matching keyword wins, so a message mentioning
//! both a timeout and missing data is a TIMEOUT.
//!
//! Matching is approximate by nature. Keywords are whole words unless they
//! end in `*`, which makes them prefixes (`quota*` matches "quotas").

use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

use crate::config::{ConfigError, KeywordRule, KeywordTable};
use crate::events::{default_sink, AuditEvent, EventSink};
use crate::types::{ErrorCategory, FailureRecord, Severity, UnitOutcome, UnitStatus};

/// One keyword rule compiled to a single alternation.
#[derive(Debug, Clone)]
struct CompiledRule {
    category: ErrorCategory,
    matcher: Regex,
}

lazy_static! {
    static ref DEFAULT_RULES: Vec<CompiledRule> =
        compile_rules(&KeywordTable::default().rules).expect("default keyword table compiles");
}

/// Maps failure messages to categories and severities.
#[derive(Clone)]
pub struct FailureClassifier {
    version: String,
    rules: Vec<CompiledRule>,
    sink: Arc<dyn EventSink>,
}

impl FailureClassifier {
    /// Compile a classifier from a keyword table.
    pub fn new(table: &KeywordTable, sink: Arc<dyn EventSink>) -> Result<Self, ConfigError> {
        if table.version.trim().is_empty() {
            return Err(ConfigError::MissingField("classifier.version".to_string()));
        }

        Ok(Self {
            version: table.version.clone(),
            rules: compile_rules(&table.rules)?,
            sink,
        })
    }

    /// Version of the keyword table in use.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Classify a raw failure message. Unmatched messages are UNKNOWN.
    pub fn classify(&self, message: &str) -> ErrorCategory {
        self.rules
            .iter()
            .find(|rule| rule.matcher.is_match(message))
            .map(|rule| rule.category)
            .unwrap_or(ErrorCategory::Unknown)
    }

    /// Severity for a category; hard failures are one step more severe.
    pub fn severity(&self, category: ErrorCategory, hard_failure: bool) -> Severity {
        let base = category.base_severity();
        if hard_failure {
            base.escalate()
        } else {
            base
        }
    }

    /// Failure records for one unit: one per failed component of a partial
    /// failure, one for a hard failure, none for a success.
    pub fn records_for(&self, outcome: &UnitOutcome) -> Vec<FailureRecord> {
        let records: Vec<FailureRecord> = match &outcome.status {
            UnitStatus::Success { .. } => Vec::new(),
            UnitStatus::PartialFailure { failures, .. } => failures
                .iter()
                .map(|failure| {
                    self.record(&outcome.unit_id, Some(&failure.component), &failure.message)
                })
                .collect(),
            UnitStatus::HardFailure { error } => vec![self.record(&outcome.unit_id, None, error)],
        };

        for record in &records {
            self.sink.record(AuditEvent::FailureClassified {
                unit_id: record.unit_id.clone(),
                category: record.category,
                severity: record.severity,
            });
        }

        records
    }

    /// Flatten the failure records of a whole batch, in input order.
    pub fn collect(&self, outcomes: &[UnitOutcome]) -> Vec<FailureRecord> {
        outcomes.iter().flat_map(|o| self.records_for(o)).collect()
    }

    fn record(&self, unit_id: &str, component: Option<&str>, message: &str) -> FailureRecord {
        let category = self.classify(message);
        FailureRecord {
            unit_id: unit_id.to_string(),
            component: component.map(str::to_string),
            raw_message: message.to_string(),
            category,
            severity: self.severity(category, component.is_none()),
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self {
            version: KeywordTable::default().version,
            rules: DEFAULT_RULES.clone(),
            sink: default_sink(),
        }
    }
}

impl std::fmt::Debug for FailureClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureClassifier")
            .field("version", &self.version)
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn compile_rules(rules: &[KeywordRule]) -> Result<Vec<CompiledRule>, ConfigError> {
    rules
        .iter()
        .map(|rule| {
            let alternatives: Vec<String> =
                rule.keywords.iter().filter_map(|k| keyword_pattern(k)).collect();

            if alternatives.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Classifier rule {} has no keywords",
                    rule.category
                )));
            }

            let matcher = Regex::new(&format!("(?i)(?:{})", alternatives.join("|"))).map_err(
                |e| {
                    ConfigError::ValidationError(format!(
                        "Invalid keyword for {}: {}",
                        rule.category, e
                    ))
                },
            )?;

            Ok(CompiledRule {
                category: rule.category,
                matcher,
            })
        })
        .collect()
}

/// Regex fragment for one keyword, or `None` if it is blank.
fn keyword_pattern(keyword: &str) -> Option<String> {
    let keyword = keyword.trim();
    let (word, prefix) = match keyword.strip_suffix('*') {
        Some(stem) => (stem.trim(), true),
        None => (keyword, false),
    };
    if word.is_empty() {
        return None;
    }

    let body = word
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");

    // Word boundaries only make sense next to word characters.
    let lead = if word.starts_with(is_word_char) { r"\b" } else { "" };
    let trail = if !prefix && word.ends_with(is_word_char) {
        r"\b"
    } else {
        ""
    };

    Some(format!("{}{}{}", lead, body, trail))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
