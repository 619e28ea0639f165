//! Single-task session dispatcher.
//!
//! One tokio task owns the [`SessionController`]. Three inputs feed it:
//!
//! ```text
//!  SessionHandle ──commands──┐
//!  host callbacks ──signals──┼──▶ select! ──▶ SessionController ──▶ watch<SessionSnapshot>
//!  interval ───────ticks─────┘                      │
//!                                                   └──▶ SubmissionSink (once)
//! ```
//!
//! Every input is applied to completion before the next one is taken, so a
//! clock expiry, a focus loss and a submit click never observe each other
//! half-applied. After each input the dispatcher delivers a newly recorded
//! submission (if any), publishes a snapshot, and only then answers the
//! command that caused it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, instrument};

use super::controller::{SessionController, SubmitOutcome};
use super::error::SessionError;
use super::phase::SessionPhase;
use super::state::{SessionEvent, SessionSnapshot};
use crate::clock::{Clock, TokioClock};
use crate::config::{MIN_TICK_INTERVAL_MS, ProctorConfig};
use crate::host::{HostCapabilities, HostSignal, SignalReceiver, SignalSender};
use crate::integrity::ViolationEvent;
use crate::submission::{Submission, SubmissionSink};

/// Capacity of the command channel.
pub const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// A candidate action, as sent to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionCommand {
    /// Record consent.
    SetConsent {
        /// Whether consent is given.
        given: bool,
    },
    /// Acquire (or re-acquire) display capture.
    RequestCapture,
    /// Enter (or re-enter) exclusive display mode.
    RequestLockdown,
    /// Landing → Auth → Instructions.
    Advance,
    /// Instructions → InProgress.
    StartTest,
    /// Save an answer.
    SaveAnswer {
        /// Question the answer belongs to.
        question_id: String,
        /// Answer text.
        text: String,
    },
    /// Select the answer language.
    SelectLanguage {
        /// Language name.
        language: String,
    },
    /// InProgress → Review.
    Review,
    /// Review → InProgress.
    GoBack,
    /// Submit the answers.
    Submit,
    /// Leave an auto-submitted Review.
    Confirm,
    /// Confirmation → Results.
    ShowResults,
    /// Tear the session down.
    Close,
}

impl SessionCommand {
    /// Returns the command name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetConsent { .. } => "set_consent",
            Self::RequestCapture => "request_capture",
            Self::RequestLockdown => "request_lockdown",
            Self::Advance => "advance",
            Self::StartTest => "start_test",
            Self::SaveAnswer { .. } => "save_answer",
            Self::SelectLanguage { .. } => "select_language",
            Self::Review => "review",
            Self::GoBack => "go_back",
            Self::Submit => "submit",
            Self::Confirm => "confirm",
            Self::ShowResults => "show_results",
            Self::Close => "close",
        }
    }
}

/// Final state handed back when the dispatcher stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    /// Last snapshot.
    pub snapshot: SessionSnapshot,
    /// The recorded submission, if any.
    pub submission: Option<Submission>,
    /// Every recorded violation.
    pub violations: Vec<ViolationEvent>,
    /// Audit log.
    pub events: Vec<SessionEvent>,
}

type CommandResult = Result<Option<SubmitOutcome>, SessionError>;

struct Request {
    command: SessionCommand,
    reply: oneshot::Sender<Result<(SessionSnapshot, Option<SubmitOutcome>), SessionError>>,
}

/// Cloneable handle for driving a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Request>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Sends a command and waits until it has been applied.
    ///
    /// # Errors
    ///
    /// Returns the controller's error, or [`SessionError::DispatcherGone`]
    /// if the session already stopped.
    pub async fn execute(&self, command: SessionCommand) -> Result<SessionSnapshot, SessionError> {
        self.call(command).await.map(|(snapshot, _)| snapshot)
    }

    async fn call(
        &self,
        command: SessionCommand,
    ) -> Result<(SessionSnapshot, Option<SubmitOutcome>), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Request { command, reply })
            .await
            .map_err(|_| SessionError::DispatcherGone)?;
        rx.await.map_err(|_| SessionError::DispatcherGone)?
    }

    /// Records consent.
    ///
    /// # Errors
    ///
    /// See [`SessionController::set_consent`].
    pub async fn set_consent(&self, given: bool) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::SetConsent { given }).await
    }

    /// Acquires display capture.
    ///
    /// # Errors
    ///
    /// See [`SessionController::request_capture`].
    pub async fn request_capture(&self) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::RequestCapture).await
    }

    /// Enters exclusive display mode.
    ///
    /// # Errors
    ///
    /// See [`SessionController::request_lockdown`].
    pub async fn request_lockdown(&self) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::RequestLockdown).await
    }

    /// Moves to the next pre-test phase.
    ///
    /// # Errors
    ///
    /// See [`SessionController::advance`].
    pub async fn advance(&self) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::Advance).await
    }

    /// Starts the test.
    ///
    /// # Errors
    ///
    /// See [`SessionController::start_test`].
    pub async fn start_test(&self) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::StartTest).await
    }

    /// Saves an answer.
    ///
    /// # Errors
    ///
    /// See [`SessionController::save_answer`].
    pub async fn save_answer(
        &self,
        question_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::SaveAnswer {
            question_id: question_id.into(),
            text: text.into(),
        })
        .await
    }

    /// Selects the answer language.
    ///
    /// # Errors
    ///
    /// See [`SessionController::select_language`].
    pub async fn select_language(
        &self,
        language: impl Into<String>,
    ) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::SelectLanguage {
            language: language.into(),
        })
        .await
    }

    /// Opens the review page.
    ///
    /// # Errors
    ///
    /// See [`SessionController::review`].
    pub async fn review(&self) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::Review).await
    }

    /// Returns from review to the test.
    ///
    /// # Errors
    ///
    /// See [`SessionController::go_back`].
    pub async fn go_back(&self) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::GoBack).await
    }

    /// Submits the answers.
    ///
    /// # Errors
    ///
    /// See [`SessionController::submit`].
    pub async fn submit(&self) -> Result<SubmitOutcome, SessionError> {
        let (_, outcome) = self.call(SessionCommand::Submit).await?;
        Ok(outcome.unwrap_or(SubmitOutcome::AlreadySubmitted))
    }

    /// Leaves an auto-submitted review.
    ///
    /// # Errors
    ///
    /// See [`SessionController::confirm`].
    pub async fn confirm(&self) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::Confirm).await
    }

    /// Shows results.
    ///
    /// # Errors
    ///
    /// See [`SessionController::show_results`].
    pub async fn show_results(&self) -> Result<SessionSnapshot, SessionError> {
        self.execute(SessionCommand::ShowResults).await
    }

    /// Closes the session. Closing a session that already stopped returns its
    /// last snapshot.
    pub async fn close(&self) -> SessionSnapshot {
        match self.execute(SessionCommand::Close).await {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }

    /// Returns the latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Waits until a published snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::DispatcherGone`] if the session stopped before
    /// the predicate held.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, SessionError> {
        let mut rx = self.snapshot.clone();
        rx.wait_for(|snapshot| predicate(snapshot))
            .await
            .map(|snapshot| snapshot.clone())
            .map_err(|_| SessionError::DispatcherGone)
    }
}

/// Owns a session and serializes every input to it.
pub struct SessionDispatcher {
    controller: SessionController,
    sink: Arc<dyn SubmissionSink>,
    commands: mpsc::Receiver<Request>,
    signals: SignalReceiver,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionDispatcher {
    /// Creates a dispatcher and its handle. Nothing runs until
    /// [`SessionDispatcher::run`] is polled.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Assessment`] if the assessment is invalid.
    pub fn new(
        config: &ProctorConfig,
        host: HostCapabilities,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn SubmissionSink>,
    ) -> Result<(Self, SessionHandle), SessionError> {
        let (signal_tx, signals) = SignalSender::channel();
        let controller = SessionController::new(config, host, clock, signal_tx)?;
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (snapshot, snapshot_rx) = watch::channel(controller.snapshot());

        let dispatcher = Self {
            controller,
            sink,
            commands,
            signals,
            snapshot,
        };
        let handle = SessionHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
        };
        Ok((dispatcher, handle))
    }

    /// Runs until the session is closed, either by [`SessionCommand::Close`]
    /// or by every [`SessionHandle`] being dropped.
    ///
    /// `tick_interval` is clamped to at least [`MIN_TICK_INTERVAL_MS`].
    #[instrument(skip_all, fields(session_id = %self.controller.session_id()))]
    pub async fn run(mut self, tick_interval: Duration) -> SessionReport {
        let tick_interval = tick_interval.max(Duration::from_millis(MIN_TICK_INTERVAL_MS));
        info!(tick_ms = tick_interval.as_millis(), "session dispatcher started");

        let mut ticker = time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let mut pending_reply = None;

            tokio::select! {
                biased;

                Some(signal) = self.signals.recv() => {
                    self.apply_signal(signal);
                },
                request = self.commands.recv() => match request {
                    Some(Request { command, reply }) => {
                        let starting = command == SessionCommand::StartTest;
                        let result = self.apply_command(command);
                        if starting && result.is_ok() {
                            ticker.reset();
                        }
                        pending_reply = Some((reply, result));
                    },
                    None => {
                        info!("all session handles dropped");
                        self.controller.close();
                    },
                },
                _ = ticker.tick() => {
                    self.controller.tick();
                },
            }

            self.deliver().await;
            let snapshot = self.controller.snapshot();
            self.snapshot.send_replace(snapshot.clone());

            if let Some((reply, result)) = pending_reply {
                // The caller may have stopped waiting.
                let _ = reply.send(result.map(|outcome| (snapshot, outcome)));
            }

            if self.controller.phase() == SessionPhase::Closed {
                break;
            }
        }

        info!("session dispatcher stopped");
        SessionReport {
            snapshot: self.controller.snapshot(),
            submission: self.controller.submission().cloned(),
            violations: self.controller.violations().to_vec(),
            events: self.controller.events().to_vec(),
        }
    }

    fn apply_signal(&mut self, signal: HostSignal) {
        debug!(signal = signal.signal_type(), "host signal");
        self.controller.handle_signal(signal);
    }

    fn apply_command(&mut self, command: SessionCommand) -> CommandResult {
        debug!(command = command.name(), phase = %self.controller.phase(), "session command");
        let c = &mut self.controller;
        let result = match command {
            SessionCommand::SetConsent { given } => c.set_consent(given),
            SessionCommand::RequestCapture => c.request_capture(),
            SessionCommand::RequestLockdown => c.request_lockdown(),
            SessionCommand::Advance => c.advance().map(|_| ()),
            SessionCommand::StartTest => c.start_test(),
            SessionCommand::SaveAnswer { question_id, text } => c.save_answer(&question_id, text),
            SessionCommand::SelectLanguage { language } => c.select_language(&language),
            SessionCommand::Review => c.review(),
            SessionCommand::GoBack => c.go_back(),
            SessionCommand::Submit => return c.submit().map(Some),
            SessionCommand::Confirm => c.confirm(),
            SessionCommand::ShowResults => c.show_results(),
            SessionCommand::Close => {
                c.close();
                Ok(())
            },
        };
        result.map(|()| None)
    }

    async fn deliver(&mut self) {
        let Some(submission) = self.controller.take_undelivered() else {
            return;
        };
        match self.sink.submit(submission).await {
            Ok(receipt) => self.controller.record_receipt(receipt),
            Err(err) => self.controller.record_delivery_failure(err.to_string()),
        }
    }
}

impl fmt::Debug for SessionDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDispatcher")
            .field("controller", &self.controller)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

/// Spawns a session on the current tokio runtime.
///
/// Deadlines follow tokio time, so tests running with paused time control the
/// exam clock.
///
/// # Errors
///
/// Returns [`SessionError::Assessment`] if the assessment is invalid.
pub fn spawn_session(
    config: &ProctorConfig,
    host: HostCapabilities,
    sink: Arc<dyn SubmissionSink>,
) -> Result<(SessionHandle, JoinHandle<SessionReport>), SessionError> {
    let (dispatcher, handle) =
        SessionDispatcher::new(config, host, Arc::new(TokioClock::new()), sink)?;
    let task = tokio::spawn(dispatcher.run(config.session.tick_interval()));
    Ok((handle, task))
}
