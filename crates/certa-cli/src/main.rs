//! certa: verify AI-extracted quotes and report on batch failures.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use certa_core::{
    AnalysisConfig, BatchAnalyzer, BatchDocument, CandidateQuote, ErrorCategory, EventSink,
    FailureClassifier, QuoteVerificationEngine, Severity, SourceTranscript, TracingSink,
};

#[derive(Parser)]
#[command(name = "certa")]
#[command(about = "Certify AI-generated qualitative analysis")]
#[command(version)]
struct Cli {
    /// Analysis config (YAML or JSON); defaults are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify candidate quotes against respondent transcripts
    Verify {
        /// JSON array of {respondent_id, text}
        #[arg(long)]
        transcripts: PathBuf,

        /// JSON array of {text, respondent_id, previously_verified?}
        #[arg(long)]
        quotes: PathBuf,

        /// Exit with status 1 if any quote fails verification
        #[arg(long)]
        strict: bool,
    },

    /// Build a batch report from resolved unit outcomes
    Report {
        /// Batch document: {requested_units?, outcomes: [...]}
        #[arg(long)]
        outcomes: PathBuf,

        /// Units originally requested (overrides the document)
        #[arg(long)]
        requested: Option<usize>,

        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },

    /// Classify raw failure messages
    Classify {
        #[arg(required = true)]
        messages: Vec<String>,
    },

    /// Validate a config file
    CheckConfig { file: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

#[derive(Serialize)]
struct Classified<'a> {
    message: &'a str,
    category: ErrorCategory,
    severity: Severity,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);

    match cli.command {
        Commands::Verify {
            transcripts,
            quotes,
            strict,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let engine = QuoteVerificationEngine::new(&config.verification, sink)?;

            let transcripts: Vec<SourceTranscript> = read_json(&transcripts)?;
            let quotes: Vec<CandidateQuote> = read_json(&quotes)?;
            info!(transcripts = transcripts.len(), quotes = quotes.len(), "Verifying quotes");

            let results = engine.verify_all(&quotes, &transcripts);
            let rejected = results.iter().filter(|r| !r.verified).count();
            println!("{}", serde_json::to_string_pretty(&results)?);

            if strict && rejected > 0 {
                eprintln!("{} of {} quotes failed verification", rejected, results.len());
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Report {
            outcomes,
            requested,
            format,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let analyzer = BatchAnalyzer::new(&config, sink)?;

            let mut document = BatchDocument::from_json_file(&outcomes)
                .with_context(|| format!("Invalid batch document {}", outcomes.display()))?;
            if requested.is_some() {
                document.requested_units = requested;
            }

            let report = analyzer.analyze_document(&document)?;
            let rendered = match format {
                Format::Json => serde_json::to_string_pretty(&report)?,
                Format::Yaml => serde_yaml::to_string(&report)?,
            };
            println!("{}", rendered);
        }

        Commands::Classify { messages } => {
            let config = load_config(cli.config.as_deref())?;
            let classifier = FailureClassifier::new(&config.classifier, sink)?;

            let classified: Vec<Classified> = messages
                .iter()
                .map(|message| {
                    let category = classifier.classify(message);
                    Classified {
                        message,
                        category,
                        severity: classifier.severity(category, false),
                    }
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&classified)?);
        }

        Commands::CheckConfig { file } => {
            let config = AnalysisConfig::from_file(&file)
                .with_context(|| format!("Invalid config {}", file.display()))?;
            println!(
                "Config OK: version {}, classifier table {} ({} rules)",
                config.config_version,
                config.classifier.version,
                config.classifier.rules.len()
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Logs go to stderr so stdout stays machine-readable. `RUST_LOG` wins
/// over `-v` when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}
