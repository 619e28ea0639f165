//! Proctored session state machine.
//!
//! A session walks a candidate from landing to results:
//!
//! ```text
//! Landing ──advance──▶ Auth ──advance──▶ Instructions
//!                                            │ start_test (consent ∧ capture ∧ lockdown)
//!                                            ▼
//!                        ┌──── go_back ── InProgress ◀── monitor armed, clock running
//!                        │                   │    │
//!                        ▼      review       │    │ clock expiry (forced submit)
//!                     Review ◀───────────────┘    │
//!                      │  ▲                       │
//!                      │  └───────────────────────┘
//!                      │ submit / confirm          submit
//!                      ▼                              │
//!                 Confirmation ◀──────────────────────┘
//!                      │ show_results (receipt recorded)
//!                      ▼
//!                   Results
//!
//!   any phase ──close──▶ Closed
//! ```
//!
//! # Invariants
//!
//! - The integrity monitor is armed exactly while the phase is InProgress.
//! - At most one submission is recorded per session, whether manual or forced.
//! - Confirmation, Results and Closed hold no capture stream and no exclusive
//!   display mode.
//! - Host notifications that arrive after the resource they describe was
//!   released (stale stream, old lockdown generation, dropped listener) are
//!   ignored.
//!
//! [`SessionController`] is the synchronous core; [`SessionDispatcher`] runs
//! it on a tokio task and is what applications normally use, through
//! [`spawn_session`] and [`SessionHandle`].

mod controller;
mod dispatcher;
mod error;
mod phase;
mod state;

pub use controller::{SessionController, SubmitOutcome};
pub use dispatcher::{
    COMMAND_CHANNEL_CAPACITY, SessionCommand, SessionDispatcher, SessionHandle, SessionReport,
    spawn_session,
};
pub use error::{MAX_ANSWER_LEN, SessionError};
pub use phase::SessionPhase;
pub use state::{SessionEvent, SessionSnapshot};
