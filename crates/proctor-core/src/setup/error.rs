//! Setup error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display capture acquisition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureError {
    /// The candidate declined the capture prompt.
    #[error("screen capture permission denied")]
    PermissionDenied,

    /// The host has no display capture capability.
    #[error("screen capture is not supported on this host")]
    Unsupported,
}

/// Exclusive display mode request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockdownError {
    /// The host has no exclusive display capability.
    #[error("exclusive display mode is not supported on this host")]
    Unsupported,

    /// The host refused the request.
    #[error("exclusive display mode request was rejected")]
    Rejected,
}

/// The single setup problem surfaced to the candidate.
///
/// Setup is a one-shot gate: only the most recent error is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SetupError {
    /// Capture could not be acquired.
    #[error("screen capture failed: {reason}")]
    CaptureFailed {
        /// Underlying capture error.
        reason: CaptureError,
    },

    /// A previously acquired capture stopped.
    #[error("screen capture stopped; share your screen again to continue")]
    CaptureStopped,

    /// Lockdown request was rejected, or lockdown was left during setup.
    #[error("could not enter full-screen mode")]
    LockdownFailed,

    /// The host cannot enter exclusive display mode at all.
    #[error("full-screen mode is not supported on this device")]
    LockdownUnsupported,
}

impl SetupError {
    /// Returns `true` if retrying the same request can succeed.
    ///
    /// Unsupported capabilities will not appear on retry; everything else is
    /// a user decision that can be reversed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::CaptureFailed { reason } => matches!(reason, CaptureError::PermissionDenied),
            Self::CaptureStopped | Self::LockdownFailed => true,
            Self::LockdownUnsupported => false,
        }
    }

    /// Returns `true` if this error concerns display capture.
    #[must_use]
    pub const fn is_capture_error(&self) -> bool {
        matches!(self, Self::CaptureFailed { .. } | Self::CaptureStopped)
    }
}

impl From<CaptureError> for SetupError {
    fn from(reason: CaptureError) -> Self {
        Self::CaptureFailed { reason }
    }
}

impl From<LockdownError> for SetupError {
    fn from(err: LockdownError) -> Self {
        match err {
            LockdownError::Unsupported => Self::LockdownUnsupported,
            LockdownError::Rejected => Self::LockdownFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SetupError::from(CaptureError::PermissionDenied).is_retryable());
        assert!(!SetupError::from(CaptureError::Unsupported).is_retryable());
        assert!(SetupError::CaptureStopped.is_retryable());
        assert!(SetupError::from(LockdownError::Rejected).is_retryable());
        assert!(!SetupError::from(LockdownError::Unsupported).is_retryable());
    }

    #[test]
    fn lockdown_error_mapping() {
        assert_eq!(
            SetupError::from(LockdownError::Unsupported),
            SetupError::LockdownUnsupported
        );
        assert_eq!(
            SetupError::from(LockdownError::Rejected),
            SetupError::LockdownFailed
        );
    }

    #[test]
    fn capture_failed_message_includes_reason() {
        let err = SetupError::from(CaptureError::PermissionDenied);
        assert!(err.to_string().contains("permission denied"));
    }
}
