//! Configuration parsing and management.
//!
//! A proctor configuration file is TOML with three sections:
//!
//! ```toml
//! [session]
//! tick_interval_ms = 250
//! violation_review_threshold = 5
//!
//! [capture]
//! display_surface = "monitor"
//! frame_rate = 15
//! include_audio = false
//!
//! [assessment]
//! title = "Backend screen"
//! duration_secs = 3600
//! allowed_languages = ["rust", "python"]
//!
//! [[assessment.questions]]
//! id = "q1"
//! title = "Two sum"
//! body = "..."
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::assessment::{Assessment, AssessmentError};
use crate::host::CaptureConstraints;

/// Smallest accepted tick interval.
pub const MIN_TICK_INTERVAL_MS: u64 = 10;

/// Largest accepted tick interval.
pub const MAX_TICK_INTERVAL_MS: u64 = 5_000;

/// Largest accepted capture frame rate.
pub const MAX_FRAME_RATE: u32 = 60;

/// Top-level proctor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProctorConfig {
    /// Session behaviour.
    #[serde(default)]
    pub session: SessionConfig,

    /// Display capture constraints.
    #[serde(default)]
    pub capture: CaptureConstraints,

    /// Assessment metadata.
    pub assessment: Assessment,
}

impl ProctorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid. Semantic checks are done by
    /// [`ProctorConfig::validate`].
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every bound.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for out-of-range session or capture
    /// settings and [`ConfigError::Assessment`] for invalid assessment
    /// metadata.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tick = self.session.tick_interval_ms;
        if !(MIN_TICK_INTERVAL_MS..=MAX_TICK_INTERVAL_MS).contains(&tick) {
            return Err(ConfigError::Validation(format!(
                "session.tick_interval_ms must be within {MIN_TICK_INTERVAL_MS}..={MAX_TICK_INTERVAL_MS}, got {tick}"
            )));
        }
        if self.session.violation_review_threshold == Some(0) {
            return Err(ConfigError::Validation(
                "session.violation_review_threshold must be at least 1".to_string(),
            ));
        }
        let rate = self.capture.frame_rate;
        if rate == 0 || rate > MAX_FRAME_RATE {
            return Err(ConfigError::Validation(format!(
                "capture.frame_rate must be within 1..={MAX_FRAME_RATE}, got {rate}"
            )));
        }
        self.assessment.validate()?;
        Ok(())
    }
}

/// Session behaviour settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How often the dispatcher ticks the exam clock.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Violation count at which a submission is flagged for closer human
    /// review. Never fails the candidate.
    #[serde(default)]
    pub violation_review_threshold: Option<u32>,
}

const fn default_tick_interval_ms() -> u64 {
    250
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            violation_review_threshold: None,
        }
    }
}

impl SessionConfig {
    /// Returns the tick interval.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),

    /// Assessment metadata is invalid.
    #[error("invalid assessment: {0}")]
    Assessment(#[from] AssessmentError),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::assessment::Difficulty;
    use crate::host::DisplaySurface;

    const FULL: &str = r#"
        [session]
        tick_interval_ms = 100
        violation_review_threshold = 3

        [capture]
        display_surface = "window"
        frame_rate = 30
        include_audio = true

        [assessment]
        title = "Backend screen"
        duration_secs = 1800
        allowed_languages = ["rust", "go"]

        [[assessment.questions]]
        id = "q1"
        title = "Two sum"
        body = "Find two numbers."
        difficulty = "easy"
        sample_input = "[1,2], 3"
        sample_output = "[0,1]"

        [[assessment.questions]]
        id = "q2"
        title = "Rate limiter"
        body = "Design a token bucket."
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = ProctorConfig::from_toml(FULL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.session.tick_interval(), Duration::from_millis(100));
        assert_eq!(config.session.violation_review_threshold, Some(3));
        assert_eq!(config.capture.display_surface, DisplaySurface::Window);
        assert!(config.capture.include_audio);
        assert_eq!(config.assessment.duration_secs, 1800);
        assert_eq!(config.assessment.questions.len(), 2);
        assert_eq!(config.assessment.questions[0].difficulty, Difficulty::Easy);
        assert_eq!(config.assessment.questions[1].difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_parse_minimal_config_uses_defaults() {
        let toml = r#"
            [assessment]
            duration_secs = 60

            [[assessment.questions]]
            id = "q1"
            title = "Only question"
            body = ""
        "#;
        let config = ProctorConfig::from_toml(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.capture, CaptureConstraints::default());
    }

    #[test]
    fn test_missing_assessment_is_parse_error() {
        let err = ProctorConfig::from_toml("[session]\ntick_interval_ms = 100\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_out_of_range_tick_rejected() {
        let mut config = ProctorConfig::from_toml(FULL).unwrap();
        config.session.tick_interval_ms = 1;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_zero_review_threshold_rejected() {
        let mut config = ProctorConfig::from_toml(FULL).unwrap();
        config.session.violation_review_threshold = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_assessment_surfaces() {
        let mut config = ProctorConfig::from_toml(FULL).unwrap();
        config.assessment.duration_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Assessment(AssessmentError::InvalidDuration { secs: 0 }))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ProctorConfig::from_toml(FULL).unwrap();
        let rendered = config.to_toml().unwrap();
        assert_eq!(ProctorConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = ProctorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.assessment.title, "Backend screen");

        let missing = ProctorConfig::from_file(Path::new("/nonexistent/proctor.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
