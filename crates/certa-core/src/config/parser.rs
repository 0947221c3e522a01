//! Analysis configuration parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::types::ErrorCategory;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Text normalization toggles. Applied in field order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NormalizeOptions {
    pub collapse_whitespace: bool,
    pub fold_case: bool,
    pub strip_punctuation: bool,
}

impl NormalizeOptions {
    /// All toggles enabled.
    pub fn all() -> Self {
        Self {
            collapse_whitespace: true,
            fold_case: true,
            strip_punctuation: true,
        }
    }

    /// All toggles disabled (exact matching only).
    pub fn none() -> Self {
        Self {
            collapse_whitespace: false,
            fold_case: false,
            strip_punctuation: false,
        }
    }

    pub fn any(&self) -> bool {
        self.collapse_whitespace || self.fold_case || self.strip_punctuation
    }
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::all()
    }
}

/// Role marker labels recognized in transcripts (case-insensitive, followed by ':').
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoleMarkers {
    /// Labels opening an asking turn
    pub ask: Vec<String>,

    /// Labels opening a respondent turn
    pub respond: Vec<String>,
}

impl Default for RoleMarkers {
    fn default() -> Self {
        Self {
            ask: ["interviewer", "moderator", "researcher"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            respond: ["respondent", "participant", "interviewee"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Quote verification settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerificationConfig {
    /// Tokens separating segments of a multi-part quote
    pub segment_separators: Vec<String>,

    pub normalize: NormalizeOptions,

    pub roles: RoleMarkers,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            segment_separators: vec!["...".to_string(), "\u{2026}".to_string()],
            normalize: NormalizeOptions::default(),
            roles: RoleMarkers::default(),
        }
    }
}

/// One classifier rule: any keyword match assigns the category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordRule {
    pub category: ErrorCategory,

    /// Whole words or phrases, matched case-insensitively. A trailing `*`
    /// matches any word that starts with the keyword.
    pub keywords: Vec<String>,
}

impl KeywordRule {
    fn new(category: ErrorCategory, keywords: &[&str]) -> Self {
        Self {
            category,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Versioned keyword table. Rule order is match priority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeywordTable {
    pub version: String,

    pub rules: Vec<KeywordRule>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            rules: vec![
                KeywordRule::new(
                    ErrorCategory::QuotaExceeded,
                    &[
                        "quota*",
                        "rate limit*",
                        "rate-limit*",
                        "ratelimit*",
                        "rate_limit*",
                        "too many requests",
                        "429",
                        "insufficient_quota",
                    ],
                ),
                KeywordRule::new(
                    ErrorCategory::Timeout,
                    &["timeout*", "timed out", "time out", "deadline exceeded"],
                ),
                KeywordRule::new(
                    ErrorCategory::NetworkError,
                    &["network*", "connect*", "dns", "socket*", "unreachable", "ssl"],
                ),
                KeywordRule::new(
                    ErrorCategory::LlmFailure,
                    &["llm*", "api", "model*", "openai", "anthropic", "completion*", "token limit"],
                ),
                KeywordRule::new(
                    ErrorCategory::ValidationFailure,
                    &["validat*", "quote*", "hallucinat*", "verif*"],
                ),
                KeywordRule::new(
                    ErrorCategory::ParsingError,
                    &["json", "pars*", "format*", "decod*", "deserializ*", "malformed"],
                ),
                KeywordRule::new(
                    ErrorCategory::WorkflowError,
                    &["workflow*", "state", "pipeline*", "node*", "graph*"],
                ),
                KeywordRule::new(
                    ErrorCategory::DataQuality,
                    &["data", "response*", "participant*", "empty", "missing"],
                ),
            ],
        }
    }
}

/// Pattern detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PatternThresholds {
    /// Fraction of batch size that LLM-type failures must reach
    pub llm_issue_fraction: f64,

    /// Fraction of batch size that data-quality failures must reach
    pub data_quality_fraction: f64,

    pub min_classification_failures: usize,

    pub min_quote_failures: usize,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            llm_issue_fraction: 0.5,
            data_quality_fraction: 0.3,
            min_classification_failures: 2,
            min_quote_failures: 2,
        }
    }
}

/// Quality scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityConfig {
    /// Credit given to a partially successful unit (heuristic)
    pub partial_weight: f64,

    pub high_reliability: f64,

    pub medium_reliability: f64,

    /// Completion rates below this get a recommendation
    pub completion_recommendation_below: f64,

    pub completion_weight: f64,

    pub verification_weight: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            partial_weight: 0.7,
            high_reliability: 90.0,
            medium_reliability: 70.0,
            completion_recommendation_below: 80.0,
            completion_weight: 0.6,
            verification_weight: 0.4,
        }
    }
}

/// Full analysis configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    /// Version of this config document
    #[serde(default = "default_config_version")]
    pub config_version: String,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub classifier: KeywordTable,

    #[serde(default)]
    pub patterns: PatternThresholds,

    #[serde(default)]
    pub quality: QualityConfig,
}

fn default_config_version() -> String {
    "1.0".to_string()
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            verification: VerificationConfig::default(),
            classifier: KeywordTable::default(),
            patterns: PatternThresholds::default(),
            quality: QualityConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse a config from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse a config file, choosing JSON for `.json` and YAML otherwise.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_file(path),
            _ => Self::from_yaml_file(path),
        }
    }

    /// Validate the config structure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.config_version.trim().is_empty() {
            return Err(ConfigError::MissingField("config_version".to_string()));
        }

        self.validate_verification()?;
        self.validate_classifier()?;
        self.validate_patterns()?;
        self.validate_quality()?;

        Ok(())
    }

    fn validate_verification(&self) -> Result<(), ConfigError> {
        let verification = &self.verification;

        if !verification
            .segment_separators
            .iter()
            .any(|s| !s.trim().is_empty())
        {
            return Err(ConfigError::MissingField(
                "verification.segment_separators".to_string(),
            ));
        }

        let roles = &verification.roles;
        if roles.ask.iter().all(|l| l.trim().is_empty()) {
            return Err(ConfigError::MissingField("verification.roles.ask".to_string()));
        }
        if roles.respond.iter().all(|l| l.trim().is_empty()) {
            return Err(ConfigError::MissingField(
                "verification.roles.respond".to_string(),
            ));
        }

        let ask: HashSet<String> = roles.ask.iter().map(|l| l.trim().to_lowercase()).collect();
        if let Some(shared) = roles
            .respond
            .iter()
            .map(|l| l.trim().to_lowercase())
            .find(|l| ask.contains(l))
        {
            return Err(ConfigError::ValidationError(format!(
                "Role label '{}' is both an ask and a respond marker",
                shared
            )));
        }

        Ok(())
    }

    fn validate_classifier(&self) -> Result<(), ConfigError> {
        let table = &self.classifier;

        if table.version.trim().is_empty() {
            return Err(ConfigError::MissingField("classifier.version".to_string()));
        }

        let mut seen = HashSet::new();
        for rule in &table.rules {
            if rule.category == ErrorCategory::Unknown {
                return Err(ConfigError::ValidationError(
                    "UNKNOWN is the fallback category and cannot have keywords".to_string(),
                ));
            }
            if !seen.insert(rule.category) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate classifier rule for {}",
                    rule.category
                )));
            }
            if rule
                .keywords
                .iter()
                .all(|k| k.trim().trim_end_matches('*').trim().is_empty())
            {
                return Err(ConfigError::ValidationError(format!(
                    "Classifier rule for {} has no keywords",
                    rule.category
                )));
            }
        }

        Ok(())
    }

    fn validate_patterns(&self) -> Result<(), ConfigError> {
        let patterns = &self.patterns;
        for (name, value) in [
            ("patterns.llm_issue_fraction", patterns.llm_issue_fraction),
            ("patterns.data_quality_fraction", patterns.data_quality_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    fn validate_quality(&self) -> Result<(), ConfigError> {
        let quality = &self.quality;

        for (name, value) in [
            ("quality.partial_weight", quality.partial_weight),
            ("quality.completion_weight", quality.completion_weight),
            ("quality.verification_weight", quality.verification_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }

        if (quality.completion_weight + quality.verification_weight - 1.0).abs() > 1e-9 {
            return Err(ConfigError::ValidationError(
                "quality.completion_weight and quality.verification_weight must sum to 1"
                    .to_string(),
            ));
        }

        if quality.medium_reliability > quality.high_reliability {
            return Err(ConfigError::ValidationError(
                "quality.medium_reliability must not exceed quality.high_reliability".to_string(),
            ));
        }

        Ok(())
    }
}
