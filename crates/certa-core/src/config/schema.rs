//! Batch input validation.
//!
//! Batch documents are validated against schema/batch.schema.json before
//! deserialization, so structural violations (outcomes not an array, a unit
//! with no payload for its status) are reported with instance paths instead
//! of a single serde message.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

use crate::types::{UnitOutcome, UnitStatus};

/// Embedded batch schema (loaded at compile time).
const BATCH_SCHEMA_JSON: &str = include_str!("../../schema/batch.schema.json");

/// The batch validator, compiled on first use. A broken embedded schema is
/// remembered as an error rather than retried on every document.
static BATCH_VALIDATOR: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Violations of the batch input contract.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read batch file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse batch JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to load schema: {0}")]
    SchemaLoad(String),

    #[error("Batch input violates schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Unit at index {0} has a blank id")]
    BlankUnitId(usize),

    #[error("Duplicate unit id: {0}")]
    DuplicateUnit(String),

    #[error("Unit {0} is a partial failure with no failed components")]
    EmptyPartialFailure(String),
}

fn batch_validator() -> Result<&'static jsonschema::Validator, InputError> {
    BATCH_VALIDATOR
        .get_or_init(|| {
            let schema: serde_json::Value = serde_json::from_str(BATCH_SCHEMA_JSON)
                .map_err(|e| format!("batch schema is not JSON: {}", e))?;
            jsonschema::options()
                .build(&schema)
                .map_err(|e| format!("batch schema does not compile: {}", e))
        })
        .as_ref()
        .map_err(|e| InputError::SchemaLoad(e.clone()))
}

/// Validate a batch document against the schema.
///
/// Returns every violation with its instance path.
pub fn validate_batch_schema(document: &serde_json::Value) -> Result<(), InputError> {
    let validator = batch_validator()?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(InputError::Schema(errors))
    }
}

/// Check the invariants the type system cannot express.
pub fn validate_outcomes(outcomes: &[UnitOutcome]) -> Result<(), InputError> {
    let mut seen = HashSet::new();

    for (index, outcome) in outcomes.iter().enumerate() {
        if outcome.unit_id.trim().is_empty() {
            return Err(InputError::BlankUnitId(index));
        }
        if !seen.insert(outcome.unit_id.as_str()) {
            return Err(InputError::DuplicateUnit(outcome.unit_id.clone()));
        }
        if let UnitStatus::PartialFailure { failures, .. } = &outcome.status {
            if failures.is_empty() {
                return Err(InputError::EmptyPartialFailure(outcome.unit_id.clone()));
            }
        }
    }

    Ok(())
}

/// A batch of resolved unit outcomes, as handed over by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchDocument {
    /// Units originally requested, if upstream dropped some before analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_units: Option<usize>,

    pub outcomes: Vec<UnitOutcome>,
}

impl BatchDocument {
    /// Parse and validate a batch document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, InputError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Validate and convert an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, InputError> {
        validate_batch_schema(&value)?;
        let document: BatchDocument = serde_json::from_value(value)?;
        validate_outcomes(&document.outcomes)?;
        Ok(document)
    }

    /// Parse and validate a batch document from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}
