//! Session phases.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a candidate is in the proctored flow.
///
/// Phases only move forward, with two exceptions: Review may return to
/// InProgress while the clock runs, and Closed is reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Flow entry.
    Landing,
    /// Identity check (performed by the hosting application).
    Auth,
    /// Rules, consent and environment setup.
    Instructions,
    /// The timed, monitored test.
    InProgress,
    /// Answers shown for a final check.
    Review,
    /// Submission accepted.
    Confirmation,
    /// Result summary shown.
    Results,
    /// Session torn down.
    Closed,
}

impl SessionPhase {
    /// Returns the phase name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Landing => "landing",
            Self::Auth => "auth",
            Self::Instructions => "instructions",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Confirmation => "confirmation",
            Self::Results => "results",
            Self::Closed => "closed",
        }
    }

    /// Returns `true` while setup actions (consent, capture, lockdown) are
    /// accepted. InProgress is included so a candidate can re-share a screen
    /// that stopped mid-test.
    #[must_use]
    pub const fn accepts_setup(&self) -> bool {
        matches!(
            self,
            Self::Landing | Self::Auth | Self::Instructions | Self::InProgress
        )
    }

    /// Returns `true` for phases in which a submission can be made.
    #[must_use]
    pub const fn is_submittable(&self) -> bool {
        matches!(self, Self::InProgress | Self::Review)
    }

    /// Returns `true` once capture and lockdown must have been released.
    #[must_use]
    pub const fn is_released(&self) -> bool {
        matches!(self, Self::Confirmation | Self::Results | Self::Closed)
    }

    /// Returns `true` if `to` is a legal next phase from `self`.
    ///
    /// This is the structural table only; guards such as readiness or clock
    /// state are checked by the controller.
    #[must_use]
    pub const fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            (Self::Closed, _) => false,
            (_, Self::Closed)
            | (Self::Landing, Self::Auth)
            | (Self::Auth, Self::Instructions)
            | (Self::Instructions | Self::Review, Self::InProgress)
            | (Self::InProgress, Self::Review)
            | (Self::InProgress | Self::Review, Self::Confirmation)
            | (Self::Confirmation, Self::Results) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
