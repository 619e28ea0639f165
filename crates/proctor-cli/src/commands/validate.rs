//! `proctor validate`: check a configuration file.
//!
//! # Exit Codes
//!
//! - 0: configuration is valid
//! - 1: configuration parsed but failed validation
//! - 2: configuration could not be read or parsed

use std::path::PathBuf;

use clap::Args;
use proctor_core::{ConfigError, Difficulty, ProctorConfig};
use serde::Serialize;

use super::exit_codes;

/// Arguments for `proctor validate`.
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Path to the proctor configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Summary printed for a valid configuration.
#[derive(Debug, Serialize)]
pub struct ConfigSummary {
    /// Assessment title.
    pub title: String,
    /// Total time allowed, in seconds.
    pub duration_secs: u64,
    /// Number of questions.
    pub questions: usize,
    /// Questions per difficulty, easy/medium/hard.
    pub difficulty: [usize; 3],
    /// Allowed languages; empty means unrestricted.
    pub allowed_languages: Vec<String>,
    /// Dispatcher tick interval.
    pub tick_interval_ms: u64,
    /// Violation count that flags a submission for review.
    pub violation_review_threshold: Option<u32>,
}

impl ConfigSummary {
    /// Summarizes a configuration.
    #[must_use]
    pub fn of(config: &ProctorConfig) -> Self {
        let mut difficulty = [0; 3];
        for question in &config.assessment.questions {
            let slot = match question.difficulty {
                Difficulty::Easy => 0,
                Difficulty::Medium => 1,
                Difficulty::Hard => 2,
            };
            difficulty[slot] += 1;
        }
        Self {
            title: config.assessment.title.clone(),
            duration_secs: config.assessment.duration_secs,
            questions: config.assessment.questions.len(),
            difficulty,
            allowed_languages: config.assessment.allowed_languages.clone(),
            tick_interval_ms: config.session.tick_interval_ms,
            violation_review_threshold: config.session.violation_review_threshold,
        }
    }
}

/// Loads and validates a configuration file.
///
/// # Errors
///
/// Returns the [`ConfigError`] from reading, parsing or validating.
pub fn load_config(path: &std::path::Path) -> Result<ProctorConfig, ConfigError> {
    let config = ProctorConfig::from_file(path)?;
    config.validate()?;
    Ok(config)
}

/// Runs `proctor validate`, returning the exit code.
pub fn run_validate(args: &ValidateArgs) -> u8 {
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}: {err}", args.config.display());
            return exit_code_for(&err);
        },
    };

    let summary = ConfigSummary::of(&config);
    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                eprintln!("failed to render summary: {err}");
                return exit_codes::INPUT_ERROR;
            },
        }
    } else {
        println!(
            "{}: ok ({} questions, {}s, {}/{}/{} easy/medium/hard)",
            args.config.display(),
            summary.questions,
            summary.duration_secs,
            summary.difficulty[0],
            summary.difficulty[1],
            summary.difficulty[2],
        );
    }
    exit_codes::SUCCESS
}

/// Maps a configuration error to an exit code.
#[must_use]
pub const fn exit_code_for(err: &ConfigError) -> u8 {
    match err {
        ConfigError::Io(_) | ConfigError::Parse(_) | ConfigError::Serialize(_) => {
            exit_codes::INPUT_ERROR
        },
        ConfigError::Validation(_) | ConfigError::Assessment(_) => exit_codes::VALIDATION_ERROR,
    }
}
