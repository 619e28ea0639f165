//! Session controller.
//!
//! [`SessionController`] owns the phase, the answer map and every setup and
//! monitoring component. All mutation goes through its action methods and
//! [`SessionController::handle_signal`]; the dispatcher calls them one at a
//! time, so no two of them ever interleave.
//!
//! # Phase boundary wiring
//!
//! Every phase change goes through one private `transition` method, which
//! applies the boundary rules in one place:
//!
//! - entering InProgress arms the integrity monitor (the clock is started
//!   immediately before, and cannot fail after that point)
//! - leaving InProgress, by any path, disarms the monitor
//! - reaching Confirmation or Closed releases capture and exits lockdown
//!
//! # Submission guard
//!
//! `submission` is assigned at most once. A manual submit and a forced
//! submit from clock expiry race only in the sense that either can arrive
//! first; whichever does records the submission and the other becomes a
//! silent no-op.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{MAX_ANSWER_LEN, SessionError};
use super::phase::SessionPhase;
use super::state::{SessionEvent, SessionSnapshot};
use crate::assessment::Assessment;
use crate::clock::Clock;
use crate::config::{ProctorConfig, SessionConfig};
use crate::exam_clock::{ClockState, ClockTick, ExamClock};
use crate::host::{HostCapabilities, HostSignal, SignalSender};
use crate::integrity::{IntegrityMonitor, ViolationEvent, ViolationKind};
use crate::setup::{CaptureAcquirer, LockdownController, Readiness, SetupCoordinator, SetupError};
use crate::submission::{Submission, SubmissionReceipt};

/// Outcome of a submit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// This attempt recorded the submission.
    Recorded,
    /// A submission already exists; nothing changed.
    AlreadySubmitted,
}

/// Top-level proctored session state machine.
pub struct SessionController {
    session_id: String,
    assessment: Arc<Assessment>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    phase: SessionPhase,
    setup: SetupCoordinator,
    monitor: IntegrityMonitor,
    exam_clock: ExamClock,
    answers: BTreeMap<String, String>,
    language: Option<String>,
    submission: Option<Submission>,
    undelivered: Option<Submission>,
    receipt: Option<SubmissionReceipt>,
    events: Vec<SessionEvent>,
}

impl SessionController {
    /// Creates a session in the Landing phase.
    ///
    /// `signals` is handed to the host capabilities; everything they report
    /// must be fed back through [`SessionController::handle_signal`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Assessment`] if the assessment is invalid.
    pub fn new(
        config: &ProctorConfig,
        host: HostCapabilities,
        clock: Arc<dyn Clock>,
        signals: SignalSender,
    ) -> Result<Self, SessionError> {
        config.assessment.validate()?;

        let capture = CaptureAcquirer::new(host.capture, config.capture, signals.clone());
        let lockdown = LockdownController::new(host.display, signals.clone());
        let monitor = IntegrityMonitor::new(host.visibility, signals);
        let session_id = format!("session-{}", Uuid::new_v4());
        info!(%session_id, questions = config.assessment.questions.len(), "session created");

        Ok(Self {
            session_id,
            assessment: Arc::new(config.assessment.clone()),
            config: config.session,
            clock,
            phase: SessionPhase::Landing,
            setup: SetupCoordinator::new(capture, lockdown),
            monitor,
            exam_clock: ExamClock::new(),
            answers: BTreeMap::new(),
            language: None,
            submission: None,
            undelivered: None,
            receipt: None,
            events: Vec::new(),
        })
    }

    // =========================================================================
    // Setup actions
    // =========================================================================

    /// Records consent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] once the test is over.
    pub fn set_consent(&mut self, given: bool) -> Result<(), SessionError> {
        self.require_setup_phase("set consent")?;
        self.setup.set_consent(given);
        debug!(given, "consent recorded");
        Ok(())
    }

    /// Acquires display capture. Also used to re-share after a stop.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Setup`] if the host refused; the phase does not
    /// change and the request can be retried.
    pub fn request_capture(&mut self) -> Result<(), SessionError> {
        self.require_setup_phase("request capture")?;
        self.setup.request_capture()?;
        Ok(())
    }

    /// Enters exclusive display mode. Also used to re-enter after an exit.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Setup`] if the host refused; the phase does not
    /// change and the request can be retried.
    pub fn request_lockdown(&mut self) -> Result<(), SessionError> {
        self.require_setup_phase("request lockdown")?;
        self.setup.request_lockdown()?;
        Ok(())
    }

    // =========================================================================
    // Flow actions
    // =========================================================================

    /// Moves Landing → Auth → Instructions.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] from any other phase.
    pub fn advance(&mut self) -> Result<SessionPhase, SessionError> {
        let next = match self.phase {
            SessionPhase::Landing => SessionPhase::Auth,
            SessionPhase::Auth => SessionPhase::Instructions,
            other => return Err(SessionError::invalid_transition(other, "advance")),
        };
        self.transition(next);
        Ok(next)
    }

    /// Starts the timed test: Instructions → InProgress.
    ///
    /// The clock starts and the integrity monitor arms together; if the
    /// clock cannot start, nothing is armed and the phase is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotReady`] unless consent, capture and lockdown
    /// all hold.
    pub fn start_test(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Instructions {
            return Err(SessionError::invalid_transition(self.phase, "start test"));
        }
        let readiness = self.setup.readiness();
        if !readiness.can_start_test() {
            return Err(SessionError::NotReady { readiness });
        }

        let duration = Duration::from_secs(self.assessment.duration_secs);
        self.exam_clock.start(duration, self.clock.monotonic_now())?;
        self.transition(SessionPhase::InProgress);
        Ok(())
    }

    /// Saves an answer, replacing any earlier answer for the same question.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TimeExpired`] once the deadline has passed,
    /// even before the tick that reports it. Also returns an error outside
    /// InProgress, for unknown questions, and for oversized answers.
    pub fn save_answer(
        &mut self,
        question_id: &str,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.tick();
        if self.exam_clock.is_expired() && self.phase.is_submittable() {
            return Err(SessionError::TimeExpired);
        }
        if self.phase != SessionPhase::InProgress {
            return Err(SessionError::invalid_transition(self.phase, "save answer"));
        }
        if self.assessment.question(question_id).is_none() {
            return Err(SessionError::UnknownQuestion {
                question_id: question_id.to_string(),
            });
        }
        let text = text.into();
        if text.len() > MAX_ANSWER_LEN {
            return Err(SessionError::AnswerTooLong {
                len: text.len(),
                max: MAX_ANSWER_LEN,
            });
        }
        self.answers.insert(question_id.to_string(), text);
        Ok(())
    }

    /// Selects the answer language.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::LanguageNotAllowed`] for languages outside the
    /// assessment's list, and [`SessionError::InvalidTransition`] after the
    /// test is over.
    pub fn select_language(&mut self, language: &str) -> Result<(), SessionError> {
        if !matches!(
            self.phase,
            SessionPhase::Instructions | SessionPhase::InProgress
        ) {
            return Err(SessionError::invalid_transition(self.phase, "select language"));
        }
        if !self.assessment.allows_language(language) {
            return Err(SessionError::LanguageNotAllowed {
                language: language.to_string(),
            });
        }
        self.language = Some(language.to_string());
        Ok(())
    }

    /// Opens the review page: InProgress → Review. The clock keeps running.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] outside InProgress.
    pub fn review(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::InProgress {
            return Err(SessionError::invalid_transition(self.phase, "review"));
        }
        self.transition(SessionPhase::Review);
        Ok(())
    }

    /// Returns from Review to the test while time remains.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TimeExpired`] once the clock expired,
    /// [`SessionError::AlreadySubmitted`] after a submission, and
    /// [`SessionError::InvalidTransition`] outside Review.
    pub fn go_back(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Review {
            return Err(SessionError::invalid_transition(self.phase, "go back"));
        }
        // A tick may be due; settle the clock before judging it.
        self.tick();
        if self.exam_clock.is_expired() {
            return Err(SessionError::TimeExpired);
        }
        if self.submission.is_some() {
            return Err(SessionError::AlreadySubmitted);
        }
        if !self.exam_clock.is_running() {
            return Err(SessionError::invalid_transition(self.phase, "go back"));
        }
        self.transition(SessionPhase::InProgress);
        Ok(())
    }

    /// Submits the answers: InProgress or Review → Confirmation.
    ///
    /// A second submission, manual or forced, is a silent no-op reported as
    /// [`SubmitOutcome::AlreadySubmitted`]. A submit arriving after the
    /// deadline loses to the forced one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] before the test started.
    pub fn submit(&mut self) -> Result<SubmitOutcome, SessionError> {
        self.tick();
        if self.submission.is_some() {
            debug!("manual submit ignored; already submitted");
            return Ok(SubmitOutcome::AlreadySubmitted);
        }
        if !self.phase.is_submittable() {
            return Err(SessionError::invalid_transition(self.phase, "submit"));
        }
        self.record_submission(false);
        self.transition(SessionPhase::Confirmation);
        Ok(SubmitOutcome::Recorded)
    }

    /// Leaves an auto-submitted Review: Review → Confirmation.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTransition`] unless the session is in
    /// Review with a recorded submission.
    pub fn confirm(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Review || self.submission.is_none() {
            return Err(SessionError::invalid_transition(self.phase, "confirm"));
        }
        self.transition(SessionPhase::Confirmation);
        Ok(())
    }

    /// Shows results: Confirmation → Results.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ResultsPending`] until the sink's receipt has
    /// been recorded.
    pub fn show_results(&mut self) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Confirmation {
            return Err(SessionError::invalid_transition(self.phase, "show results"));
        }
        if self.receipt.is_none() {
            return Err(SessionError::ResultsPending);
        }
        self.transition(SessionPhase::Results);
        Ok(())
    }

    /// Closes the session from any phase.
    ///
    /// Stops the clock, disarms the monitor, releases capture and exits
    /// lockdown, all before the phase reads Closed. Idempotent, and safe when
    /// some of those resources were never acquired.
    pub fn close(&mut self) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        self.exam_clock.stop(self.clock.monotonic_now());
        self.transition(SessionPhase::Closed);
    }

    // =========================================================================
    // Asynchronous inputs
    // =========================================================================

    /// Advances the exam clock. On expiry, forces a submission.
    pub fn tick(&mut self) -> ClockTick {
        let tick = self.exam_clock.tick(self.clock.monotonic_now());
        if tick == ClockTick::Expired {
            self.force_submit();
        }
        tick
    }

    /// Applies a host notification.
    pub fn handle_signal(&mut self, signal: HostSignal) {
        if self.phase == SessionPhase::Closed {
            debug!(signal = signal.signal_type(), "signal after close ignored");
            return;
        }
        match signal {
            HostSignal::TrackEnded { stream, track } => {
                if self.setup.handle_track_ended(stream, track) {
                    self.record_violation(ViolationKind::CaptureStopped);
                }
            },
            HostSignal::LockdownExited { generation } => {
                if self.setup.handle_lockdown_exit(generation) {
                    self.record_violation(ViolationKind::LockdownExited);
                }
            },
            HostSignal::VisibilityChanged { listener, hidden } => {
                let now_ms = self.clock.now_ms();
                if let Some(violation) = self.monitor.handle_visibility(listener, hidden, now_ms) {
                    self.events.push(SessionEvent::ViolationRecorded { violation });
                }
            },
        }
    }

    /// Hands out the recorded submission for delivery, once.
    pub fn take_undelivered(&mut self) -> Option<Submission> {
        self.undelivered.take()
    }

    /// Records the sink's result summary.
    pub fn record_receipt(&mut self, receipt: SubmissionReceipt) {
        info!(submission_id = %receipt.submission_id, "submission delivered");
        self.receipt = Some(receipt);
    }

    /// Records that the sink failed. The session stays where it is; the
    /// submission itself remains recorded.
    pub fn record_delivery_failure(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "submission delivery failed");
        self.events.push(SessionEvent::DeliveryFailed {
            reason,
            at_ms: self.clock.now_ms(),
        });
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Returns the readiness preconditions.
    #[must_use]
    pub const fn readiness(&self) -> Readiness {
        self.setup.readiness()
    }

    /// Returns `true` when the test may be started.
    #[must_use]
    pub const fn can_start_test(&self) -> bool {
        self.setup.can_start_test()
    }

    /// Returns the most recent setup problem.
    #[must_use]
    pub const fn setup_error(&self) -> Option<SetupError> {
        self.setup.setup_error()
    }

    /// Returns the number of recorded violations.
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.monitor.violation_count()
    }

    /// Returns the violation log.
    #[must_use]
    pub fn violations(&self) -> &[ViolationEvent] {
        self.monitor.violations()
    }

    /// Returns whole seconds left on the clock. Before the test starts this
    /// is the full assessment duration.
    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        if self.exam_clock.deadline().is_none() {
            return self.assessment.duration_secs;
        }
        self.exam_clock.remaining_secs(self.clock.monotonic_now())
    }

    /// Returns the clock lifecycle state.
    #[must_use]
    pub const fn clock_state(&self) -> ClockState {
        self.exam_clock.state()
    }

    /// Returns `true` while the integrity monitor is armed.
    #[must_use]
    pub const fn is_monitoring(&self) -> bool {
        self.monitor.is_armed()
    }

    /// Returns the saved answers.
    #[must_use]
    pub const fn answers(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    /// Returns the recorded submission.
    #[must_use]
    pub const fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    /// Returns `true` when the clock forced the submission.
    #[must_use]
    pub fn is_forced(&self) -> bool {
        self.submission.as_ref().is_some_and(|s| s.forced)
    }

    /// Returns the sink's result summary.
    #[must_use]
    pub const fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    /// Returns the audit log.
    #[must_use]
    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    /// Returns the number of live capture tracks held by this session.
    #[must_use]
    pub fn live_capture_tracks(&self) -> usize {
        self.setup.capture().live_tracks()
    }

    /// Builds a point-in-time view.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let readiness = self.readiness();
        SessionSnapshot {
            session_id: self.session_id.clone(),
            phase: self.phase,
            readiness,
            can_start_test: readiness.can_start_test(),
            violation_count: self.violation_count(),
            remaining_seconds: self.remaining_seconds(),
            clock: self.exam_clock.state(),
            setup_error: self.setup_error(),
            answered: self.answers.len(),
            submitted: self.submission.is_some(),
            forced: self.is_forced(),
            receipt: self.receipt.clone(),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require_setup_phase(&self, action: &'static str) -> Result<(), SessionError> {
        if self.phase.accepts_setup() {
            Ok(())
        } else {
            Err(SessionError::invalid_transition(self.phase, action))
        }
    }

    fn force_submit(&mut self) {
        if self.submission.is_some() {
            debug!("forced submit ignored; already submitted");
            return;
        }
        if !self.phase.is_submittable() {
            debug!(phase = %self.phase, "forced submit ignored outside the test");
            return;
        }
        self.record_submission(true);
        if self.phase == SessionPhase::InProgress {
            self.transition(SessionPhase::Review);
        }
    }

    fn record_submission(&mut self, forced: bool) {
        let now = self.clock.monotonic_now();
        let at_ms = self.clock.now_ms();
        let violation_count = self.monitor.violation_count();
        let flagged_for_review = self
            .config
            .violation_review_threshold
            .is_some_and(|threshold| {
                u32::try_from(violation_count).unwrap_or(u32::MAX) >= threshold
            });

        let submission = Submission {
            session_id: self.session_id.clone(),
            answers: self.answers.clone(),
            language: self.language.clone(),
            violation_events: self.monitor.violations().to_vec(),
            time_spent_seconds: self.exam_clock.elapsed(now).as_secs(),
            forced,
            flagged_for_review,
            submitted_at_ms: at_ms,
        };
        info!(
            forced,
            answers = submission.answers.len(),
            violations = violation_count,
            flagged_for_review,
            "submission recorded"
        );
        self.undelivered = Some(submission.clone());
        self.submission = Some(submission);
        self.events.push(SessionEvent::Submitted { forced, at_ms });
    }

    fn record_violation(&mut self, kind: ViolationKind) {
        if let Some(violation) = self.monitor.record(kind, self.clock.now_ms()) {
            self.events.push(SessionEvent::ViolationRecorded { violation });
        }
    }

    fn transition(&mut self, to: SessionPhase) {
        let from = self.phase;
        if !from.can_transition_to(to) {
            warn!(session_id = %self.session_id, %from, %to, "unexpected session phase transition");
        }
        debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");

        if from == SessionPhase::InProgress {
            self.monitor.disarm();
        }
        if to == SessionPhase::InProgress {
            self.monitor.arm();
        }
        if to.is_released() {
            self.setup.release_all();
        }

        self.phase = to;
        info!(session_id = %self.session_id, %from, %to, "session phase changed");
        self.events.push(SessionEvent::PhaseChanged {
            from,
            to,
            at_ms: self.clock.now_ms(),
        });
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.phase != SessionPhase::Closed {
            warn!(session_id = %self.session_id, phase = %self.phase, "session dropped without close");
            self.close();
        }
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("session_id", &self.session_id)
            .field("phase", &self.phase)
            .field("setup", &self.setup)
            .field("monitor", &self.monitor)
            .field("exam_clock", &self.exam_clock)
            .field("answers", &self.answers.len())
            .field("submitted", &self.submission.is_some())
            .finish_non_exhaustive()
    }
}
