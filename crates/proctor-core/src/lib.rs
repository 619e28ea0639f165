//! # proctor-core
//!
//! Session controller for proctored, timed coding assessments.
//!
//! A candidate consents to monitoring, shares their display and enters
//! exclusive display mode; only then can the timed test start. While the
//! test runs, every loss of page visibility, capture stop and lockdown exit
//! is recorded as a violation. When time runs out the answers are submitted
//! automatically, exactly once.
//!
//! ## Layout
//!
//! - [`setup`]: consent, display capture and exclusive display mode, and the
//!   readiness they derive
//! - [`integrity`]: violation monitoring during the test
//! - [`exam_clock`]: countdown with a fixed deadline
//! - [`session`]: the phase state machine and its async dispatcher
//! - [`submission`]: the submission payload and the sink it is sent to
//! - [`host`]: the capability traits a host environment implements, plus a
//!   simulated host
//! - [`config`]: TOML configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use proctor_core::prelude::*;
//!
//! # async fn demo(config: ProctorConfig) -> Result<(), SessionError> {
//! let host = SimulatedHost::new();
//! let sink = Arc::new(InMemorySink::new());
//! let (session, task) =
//!     spawn_session(&config, HostCapabilities::from_host(host.clone()), sink)?;
//!
//! session.advance().await?;
//! session.advance().await?;
//! session.set_consent(true).await?;
//! session.request_capture().await?;
//! session.request_lockdown().await?;
//! session.start_test().await?;
//! session.save_answer("q1", "fn main() {}").await?;
//! session.submit().await?;
//!
//! session.close().await;
//! let report = task.await.expect("dispatcher panicked");
//! assert!(report.submission.is_some());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod assessment;
pub mod clock;
pub mod config;
pub mod exam_clock;
pub mod host;
pub mod integrity;
pub mod session;
pub mod setup;
pub mod submission;

pub use assessment::{Assessment, AssessmentError, Difficulty, Question};
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use config::{ConfigError, ProctorConfig, SessionConfig};
pub use exam_clock::{ClockError, ClockState, ClockTick, ExamClock};
pub use host::{HostCapabilities, HostSignal};
pub use integrity::{IntegrityMonitor, ViolationEvent, ViolationKind};
pub use session::{
    SessionCommand, SessionController, SessionError, SessionHandle, SessionPhase, SessionReport,
    SessionSnapshot, spawn_session,
};
pub use setup::{Readiness, SetupError};
pub use submission::{InMemorySink, Submission, SubmissionError, SubmissionReceipt, SubmissionSink};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::assessment::{Assessment, Question};
    pub use crate::config::ProctorConfig;
    pub use crate::host::HostCapabilities;
    pub use crate::host::sim::{SimResponse, SimulatedHost};
    pub use crate::integrity::{ViolationEvent, ViolationKind};
    pub use crate::session::{
        SessionCommand, SessionError, SessionHandle, SessionPhase, SessionReport,
        SessionSnapshot, SubmitOutcome, spawn_session,
    };
    pub use crate::setup::{Readiness, SetupError};
    pub use crate::submission::{InMemorySink, Submission, SubmissionSink};
}
