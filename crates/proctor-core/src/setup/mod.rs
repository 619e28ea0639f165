//! Environment setup: consent, display capture and exclusive display mode.
//!
//! # Components
//!
//! - [`ConsentGate`]: the candidate's consent flag
//! - [`CaptureAcquirer`]: owns the display capture stream
//! - [`LockdownController`]: owns exclusive display mode
//! - [`SetupCoordinator`]: derives [`Readiness`] and surfaces one
//!   [`SetupError`]

pub mod capture;
pub mod consent;
pub mod coordinator;
pub mod error;
pub mod lockdown;

pub use capture::{CaptureAcquirer, CaptureHandle};
pub use consent::ConsentGate;
pub use coordinator::{Readiness, SetupCoordinator};
pub use error::{CaptureError, LockdownError, SetupError};
pub use lockdown::LockdownController;
