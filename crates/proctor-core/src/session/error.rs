//! Session controller error types.

use thiserror::Error;

use super::phase::SessionPhase;
use crate::assessment::AssessmentError;
use crate::exam_clock::ClockError;
use crate::setup::{Readiness, SetupError};

/// Maximum length for a single answer.
pub const MAX_ANSWER_LEN: usize = 256 * 1024;

/// Errors returned by session actions.
///
/// None of these end the session. Setup errors are retryable, transition
/// errors leave the phase unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The action is not valid in the current phase.
    #[error("cannot {action} from phase {from}")]
    InvalidTransition {
        /// Phase the session was in.
        from: SessionPhase,
        /// The rejected action.
        action: &'static str,
    },

    /// The test cannot start until consent, capture and lockdown all hold.
    #[error(
        "not ready to start: consent={}, capture={}, lockdown={}",
        .readiness.consent_given,
        .readiness.capture_active,
        .readiness.lockdown_active
    )]
    NotReady {
        /// Readiness at the time of the request.
        readiness: Readiness,
    },

    /// Going back to the test or editing answers after the clock expired.
    #[error("exam time has expired")]
    TimeExpired,

    /// Going back to the test after the answers were submitted.
    #[error("answers have already been submitted")]
    AlreadySubmitted,

    /// Setup capability request failed.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Exam clock refused to start.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// Assessment metadata is invalid.
    #[error(transparent)]
    Assessment(#[from] AssessmentError),

    /// Answer for a question that is not in the assessment.
    #[error("unknown question: {question_id}")]
    UnknownQuestion {
        /// The rejected question ID.
        question_id: String,
    },

    /// Answer exceeds [`MAX_ANSWER_LEN`].
    #[error("answer too long: {len} > {max}")]
    AnswerTooLong {
        /// Actual length in bytes.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Language is not in the assessment's allowed list.
    #[error("language not allowed: {language}")]
    LanguageNotAllowed {
        /// The rejected language.
        language: String,
    },

    /// Results requested before the submission sink answered.
    #[error("results are not available yet")]
    ResultsPending,

    /// The session dispatcher has shut down.
    #[error("session dispatcher is no longer running")]
    DispatcherGone,
}

impl SessionError {
    /// Creates an invalid transition error.
    #[must_use]
    pub const fn invalid_transition(from: SessionPhase, action: &'static str) -> Self {
        Self::InvalidTransition { from, action }
    }

    /// Returns `true` if the candidate can retry the action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Setup(err) => err.is_retryable(),
            Self::NotReady { .. } | Self::ResultsPending => true,
            Self::InvalidTransition { .. }
            | Self::TimeExpired
            | Self::AlreadySubmitted
            | Self::Clock(_)
            | Self::Assessment(_)
            | Self::UnknownQuestion { .. }
            | Self::AnswerTooLong { .. }
            | Self::LanguageNotAllowed { .. }
            | Self::DispatcherGone => false,
        }
    }
}
