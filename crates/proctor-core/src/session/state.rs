//! Session read model and audit events.

use serde::{Deserialize, Serialize};

use super::phase::SessionPhase;
use crate::exam_clock::ClockState;
use crate::integrity::ViolationEvent;
use crate::setup::{Readiness, SetupError};
use crate::submission::SubmissionReceipt;

/// Point-in-time view of a session, safe to hand to a UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: String,
    /// Current phase.
    pub phase: SessionPhase,
    /// Readiness preconditions.
    pub readiness: Readiness,
    /// `true` when the test may be started.
    pub can_start_test: bool,
    /// Number of recorded violations.
    pub violation_count: usize,
    /// Whole seconds left on the clock, rounded up.
    pub remaining_seconds: u64,
    /// Clock lifecycle state.
    pub clock: ClockState,
    /// Most recent setup problem.
    pub setup_error: Option<SetupError>,
    /// Number of questions with a saved answer.
    pub answered: usize,
    /// `true` once a submission was recorded.
    pub submitted: bool,
    /// `true` when the clock forced the submission.
    pub forced: bool,
    /// Result summary from the sink.
    pub receipt: Option<SubmissionReceipt>,
}

/// Audit record of a session state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// The phase changed.
    PhaseChanged {
        /// Previous phase.
        from: SessionPhase,
        /// New phase.
        to: SessionPhase,
        /// Wall-clock time, milliseconds since UNIX epoch.
        at_ms: u64,
    },
    /// A violation was recorded.
    ViolationRecorded {
        /// The violation.
        violation: ViolationEvent,
    },
    /// A submission was recorded.
    Submitted {
        /// `true` when forced by clock expiry.
        forced: bool,
        /// Wall-clock time, milliseconds since UNIX epoch.
        at_ms: u64,
    },
    /// The submission sink failed.
    DeliveryFailed {
        /// Error description.
        reason: String,
        /// Wall-clock time, milliseconds since UNIX epoch.
        at_ms: u64,
    },
}

impl SessionEvent {
    /// Returns the event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseChanged { .. } => "session.phase_changed",
            Self::ViolationRecorded { .. } => "session.violation_recorded",
            Self::Submitted { .. } => "session.submitted",
            Self::DeliveryFailed { .. } => "session.delivery_failed",
        }
    }
}
