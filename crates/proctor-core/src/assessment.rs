//! Assessment metadata.
//!
//! Questions, duration and allowed answer languages are supplied by the
//! hosting application and are read-only for the lifetime of a session.
//! Validation bounds every string so a malformed assessment cannot grow the
//! session state without limit.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of questions in one assessment.
pub const MAX_QUESTIONS: usize = 256;

/// Maximum length for question IDs.
pub const MAX_QUESTION_ID_LEN: usize = 128;

/// Maximum length for question titles.
pub const MAX_TITLE_LEN: usize = 512;

/// Maximum length for question bodies, samples and starter code.
pub const MAX_BODY_LEN: usize = 64 * 1024;

/// Maximum number of allowed answer languages.
pub const MAX_LANGUAGES: usize = 64;

/// Longest assessment accepted (24 hours).
pub const MAX_DURATION_SECS: u64 = 24 * 60 * 60;

/// Errors produced when validating assessment metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssessmentError {
    /// The assessment has no questions.
    #[error("assessment has no questions")]
    NoQuestions,

    /// Too many questions.
    #[error("too many questions: {count} > {max}")]
    TooManyQuestions {
        /// Actual count.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Two questions share an ID.
    #[error("duplicate question id: {id}")]
    DuplicateQuestionId {
        /// The duplicated ID.
        id: String,
    },

    /// A required field is empty.
    #[error("empty field '{field}'")]
    EmptyField {
        /// Name of the empty field.
        field: &'static str,
    },

    /// A field exceeds its length bound.
    #[error("field '{field}' too long: {len} > {max}")]
    FieldTooLong {
        /// Name of the field.
        field: &'static str,
        /// Actual length in bytes.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Duration is zero or beyond [`MAX_DURATION_SECS`].
    #[error("invalid duration: {secs}s (must be between 1 and 86400)")]
    InvalidDuration {
        /// The configured duration.
        secs: u64,
    },

    /// Too many allowed languages.
    #[error("too many languages: {count} > {max}")]
    TooManyLanguages {
        /// Actual count.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },
}

/// Question difficulty as shown to the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Warm-up question.
    Easy,
    /// Default difficulty.
    #[default]
    Medium,
    /// Stretch question.
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Easy => write!(f, "easy"),
            Self::Medium => write!(f, "medium"),
            Self::Hard => write!(f, "hard"),
        }
    }
}

/// A single assessment question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Stable identifier, used as the answer map key.
    pub id: String,
    /// Short title.
    pub title: String,
    /// Full problem statement.
    pub body: String,
    /// Difficulty label.
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Example input shown with the statement.
    #[serde(default)]
    pub sample_input: String,
    /// Expected output for `sample_input`.
    #[serde(default)]
    pub sample_output: String,
    /// Code pre-filled in the answer editor.
    #[serde(default)]
    pub starter_code: String,
}

impl Question {
    /// Validates bounds on all fields.
    ///
    /// # Errors
    ///
    /// Returns [`AssessmentError`] if a required field is empty or any field
    /// exceeds its bound.
    pub fn validate(&self) -> Result<(), AssessmentError> {
        if self.id.is_empty() {
            return Err(AssessmentError::EmptyField { field: "id" });
        }
        if self.title.is_empty() {
            return Err(AssessmentError::EmptyField { field: "title" });
        }
        check_len("id", &self.id, MAX_QUESTION_ID_LEN)?;
        check_len("title", &self.title, MAX_TITLE_LEN)?;
        check_len("body", &self.body, MAX_BODY_LEN)?;
        check_len("sample_input", &self.sample_input, MAX_BODY_LEN)?;
        check_len("sample_output", &self.sample_output, MAX_BODY_LEN)?;
        check_len("starter_code", &self.starter_code, MAX_BODY_LEN)?;
        Ok(())
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), AssessmentError> {
    if value.len() > max {
        return Err(AssessmentError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

/// Read-only assessment metadata for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Total time allowed, in seconds.
    pub duration_secs: u64,
    /// Languages a candidate may answer in. Empty means unrestricted.
    #[serde(default)]
    pub allowed_languages: Vec<String>,
    /// Questions in presentation order.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Assessment {
    /// Validates the assessment.
    ///
    /// # Errors
    ///
    /// Returns the first [`AssessmentError`] found.
    pub fn validate(&self) -> Result<(), AssessmentError> {
        if self.duration_secs == 0 || self.duration_secs > MAX_DURATION_SECS {
            return Err(AssessmentError::InvalidDuration {
                secs: self.duration_secs,
            });
        }
        if self.questions.is_empty() {
            return Err(AssessmentError::NoQuestions);
        }
        if self.questions.len() > MAX_QUESTIONS {
            return Err(AssessmentError::TooManyQuestions {
                count: self.questions.len(),
                max: MAX_QUESTIONS,
            });
        }
        if self.allowed_languages.len() > MAX_LANGUAGES {
            return Err(AssessmentError::TooManyLanguages {
                count: self.allowed_languages.len(),
                max: MAX_LANGUAGES,
            });
        }
        check_len("title", &self.title, MAX_TITLE_LEN)?;

        let mut seen = HashSet::with_capacity(self.questions.len());
        for question in &self.questions {
            question.validate()?;
            if !seen.insert(question.id.as_str()) {
                return Err(AssessmentError::DuplicateQuestionId {
                    id: question.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Looks up a question by ID.
    #[must_use]
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Returns `true` if `language` may be used for answers.
    #[must_use]
    pub fn allows_language(&self, language: &str) -> bool {
        self.allowed_languages.is_empty()
            || self
                .allowed_languages
                .iter()
                .any(|l| l.eq_ignore_ascii_case(language))
    }
}
