//! Structured events emitted by verification and analysis components.
//!
//! Components receive an [`EventSink`] at construction instead of logging
//! through global state. [`TracingSink`] forwards to `tracing`;
//! [`RecordingSink`] keeps events in memory.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::types::{ErrorCategory, MatchKind, PatternKind, Reliability, Severity};

/// A structured event.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    QuoteVerified {
        respondent_id: String,
        match_kind: MatchKind,
        segments: usize,
    },
    QuoteRejected {
        respondent_id: String,
        reason: String,
    },
    /// Upstream marked the quote verified but it failed here
    VerificationOverturned {
        respondent_id: String,
        quote: String,
    },
    TranscriptMalformed {
        respondent_id: String,
    },
    UnitFinalized {
        unit_id: String,
        status: &'static str,
        quotes: usize,
        unverified: usize,
    },
    FailureClassified {
        unit_id: String,
        category: ErrorCategory,
        severity: Severity,
    },
    PatternDetected {
        pattern: PatternKind,
        affected_count: usize,
    },
    BatchAnalyzed {
        total_units: usize,
        failures: usize,
        completion_rate: f64,
        reliability: Reliability,
    },
}

/// Destination for [`AuditEvent`]s. Must be shareable across threads.
pub trait EventSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::QuoteVerified {
                respondent_id,
                match_kind,
                segments,
            } => {
                tracing::debug!(respondent = %respondent_id, match_kind = ?match_kind, segments, "Quote verified");
            }
            AuditEvent::QuoteRejected {
                respondent_id,
                reason,
            } => {
                tracing::warn!(respondent = %respondent_id, reason = %reason, "Quote rejected");
            }
            AuditEvent::VerificationOverturned {
                respondent_id,
                quote,
            } => {
                tracing::warn!(respondent = %respondent_id, quote = %quote, "Upstream verification overturned");
            }
            AuditEvent::TranscriptMalformed { respondent_id } => {
                tracing::warn!(respondent = %respondent_id, "Transcript has no role markers");
            }
            AuditEvent::UnitFinalized {
                unit_id,
                status,
                quotes,
                unverified,
            } => {
                tracing::info!(unit = %unit_id, status, quotes, unverified, "Unit finalized");
            }
            AuditEvent::FailureClassified {
                unit_id,
                category,
                severity,
            } => {
                tracing::debug!(unit = %unit_id, category = %category, severity = ?severity, "Failure classified");
            }
            AuditEvent::PatternDetected {
                pattern,
                affected_count,
            } => {
                tracing::warn!(pattern = %pattern, affected_count, "Failure pattern detected");
            }
            AuditEvent::BatchAnalyzed {
                total_units,
                failures,
                completion_rate,
                reliability,
            } => {
                tracing::info!(total_units, failures, completion_rate, reliability = %reliability, "Batch analyzed");
            }
        }
    }
}

/// Keeps events in memory, in emission order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Take recorded events, leaving the sink empty.
    pub fn drain(&self) -> Vec<AuditEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for RecordingSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// The sink used when none is supplied.
pub fn default_sink() -> Arc<dyn EventSink> {
    Arc::new(TracingSink)
}
