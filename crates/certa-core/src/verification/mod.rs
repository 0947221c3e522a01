//! Quote verification.
//!
//! Every quote attributed to a respondent must be found in that
//! respondent's own turns of the transcript. Failures are data on the
//! returned [`VerifiedQuote`](crate::types::VerifiedQuote), never errors,
//! and are never retried.

mod engine;
mod unit;

pub use engine::QuoteVerificationEngine;
pub use unit::{ThemeDraft, UnitDraft};
