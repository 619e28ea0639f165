//! Readiness gate combining consent, capture and lockdown.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::capture::CaptureAcquirer;
use super::consent::ConsentGate;
use super::error::SetupError;
use super::lockdown::LockdownController;
use crate::host::{StreamId, TrackId};

/// The three readiness preconditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Readiness {
    /// Candidate consented to monitoring.
    pub consent_given: bool,
    /// A display capture stream is held.
    pub capture_active: bool,
    /// Exclusive display mode is held.
    pub lockdown_active: bool,
}

impl Readiness {
    /// `true` only when all three preconditions hold.
    #[must_use]
    pub const fn can_start_test(&self) -> bool {
        self.consent_given && self.capture_active && self.lockdown_active
    }
}

/// Owns the setup components and derives readiness from their live state.
///
/// Readiness is computed on every read rather than cached, so a capture stop
/// or lockdown exit downgrades it immediately.
#[derive(Debug)]
pub struct SetupCoordinator {
    consent: ConsentGate,
    capture: CaptureAcquirer,
    lockdown: LockdownController,
    last_error: Option<SetupError>,
}

impl SetupCoordinator {
    /// Creates a coordinator from its components.
    #[must_use]
    pub const fn new(capture: CaptureAcquirer, lockdown: LockdownController) -> Self {
        Self {
            consent: ConsentGate::new(),
            capture,
            lockdown,
            last_error: None,
        }
    }

    /// Records the candidate's consent.
    pub fn set_consent(&mut self, given: bool) {
        self.consent.set_consent(given);
    }

    /// Acquires display capture.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::CaptureFailed`], which also becomes the surfaced
    /// error.
    pub fn request_capture(&mut self) -> Result<StreamId, SetupError> {
        match self.capture.acquire() {
            Ok(stream) => {
                if self.last_error.is_some_and(|e| e.is_capture_error()) {
                    self.last_error = None;
                }
                Ok(stream)
            },
            Err(err) => Err(self.surface(err.into())),
        }
    }

    /// Enters exclusive display mode.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::LockdownFailed`] or
    /// [`SetupError::LockdownUnsupported`], which also becomes the surfaced
    /// error.
    pub fn request_lockdown(&mut self) -> Result<(), SetupError> {
        match self.lockdown.enter() {
            Ok(()) => {
                if self.last_error.is_some_and(|e| !e.is_capture_error()) {
                    self.last_error = None;
                }
                Ok(())
            },
            Err(err) => Err(self.surface(err.into())),
        }
    }

    /// Routes a track end notification. Returns `true` if it stopped the
    /// held capture.
    pub fn handle_track_ended(&mut self, stream: StreamId, track: TrackId) -> bool {
        let stopped = self.capture.handle_track_ended(stream, track);
        if stopped {
            self.surface(SetupError::CaptureStopped);
        }
        stopped
    }

    /// Routes a lockdown exit notification. Returns `true` if it ended the
    /// held lockdown.
    pub fn handle_lockdown_exit(&mut self, generation: u64) -> bool {
        let exited = self.lockdown.handle_exit_signal(generation);
        if exited {
            self.surface(SetupError::LockdownFailed);
        }
        exited
    }

    /// Releases capture and exits lockdown. Idempotent; safe when neither was
    /// ever acquired.
    pub fn release_all(&mut self) {
        self.capture.release();
        self.lockdown.exit();
    }

    /// Returns the current readiness preconditions.
    #[must_use]
    pub const fn readiness(&self) -> Readiness {
        Readiness {
            consent_given: self.consent.is_given(),
            capture_active: self.capture.is_active(),
            lockdown_active: self.lockdown.is_active(),
        }
    }

    /// Returns `true` when consent, capture and lockdown all hold.
    #[must_use]
    pub const fn can_start_test(&self) -> bool {
        self.readiness().can_start_test()
    }

    /// Returns the most recent setup error.
    #[must_use]
    pub const fn setup_error(&self) -> Option<SetupError> {
        self.last_error
    }

    /// Returns the capture component.
    #[must_use]
    pub const fn capture(&self) -> &CaptureAcquirer {
        &self.capture
    }

    /// Returns the lockdown component.
    #[must_use]
    pub const fn lockdown(&self) -> &LockdownController {
        &self.lockdown
    }

    fn surface(&mut self, err: SetupError) -> SetupError {
        debug!(error = %err, "setup error surfaced");
        self.last_error = Some(err);
        err
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::host::sim::{SimResponse, SimulatedHost};
    use crate::host::{CaptureConstraints, HostSignal, SignalReceiver, SignalSender};
    use crate::setup::CaptureError;

    fn coordinator(host: &SimulatedHost) -> (SetupCoordinator, SignalReceiver) {
        let (signals, rx) = SignalSender::channel();
        let provider = Arc::new(host.clone());
        let capture = CaptureAcquirer::new(
            provider.clone(),
            CaptureConstraints::default(),
            signals.clone(),
        );
        let lockdown = LockdownController::new(provider, signals);
        (SetupCoordinator::new(capture, lockdown), rx)
    }

    #[test]
    fn readiness_is_conjunction_for_all_combinations() {
        for bits in 0u8..8 {
            let readiness = Readiness {
                consent_given: bits & 1 != 0,
                capture_active: bits & 2 != 0,
                lockdown_active: bits & 4 != 0,
            };
            assert_eq!(readiness.can_start_test(), bits == 7, "bits={bits:03b}");
        }
    }

    #[test]
    fn live_readiness_for_all_combinations() {
        for bits in 0u8..8 {
            let host = SimulatedHost::new();
            let (mut setup, _rx) = coordinator(&host);
            setup.set_consent(bits & 1 != 0);
            if bits & 2 != 0 {
                setup.request_capture().unwrap();
            }
            if bits & 4 != 0 {
                setup.request_lockdown().unwrap();
            }
            assert_eq!(setup.can_start_test(), bits == 7, "bits={bits:03b}");
        }
    }

    #[test]
    fn capture_stop_downgrades_readiness() {
        let host = SimulatedHost::new();
        let (mut setup, mut rx) = coordinator(&host);
        setup.set_consent(true);
        setup.request_capture().unwrap();
        setup.request_lockdown().unwrap();
        assert!(setup.can_start_test());

        host.revoke_capture();
        while let Ok(HostSignal::TrackEnded { stream, track }) = rx.try_recv() {
            setup.handle_track_ended(stream, track);
        }

        assert!(!setup.can_start_test());
        assert_eq!(setup.setup_error(), Some(SetupError::CaptureStopped));
    }

    #[test]
    fn newest_error_wins_and_retry_clears_it() {
        let host = SimulatedHost::new();
        let (mut setup, _rx) = coordinator(&host);

        host.set_capture_response(SimResponse::Deny);
        assert!(setup.request_capture().is_err());
        host.set_lockdown_response(SimResponse::Unsupported);
        assert!(setup.request_lockdown().is_err());
        assert_eq!(setup.setup_error(), Some(SetupError::LockdownUnsupported));

        host.set_lockdown_response(SimResponse::Grant);
        setup.request_lockdown().unwrap();
        assert_eq!(setup.setup_error(), None);

        assert_eq!(
            setup.request_capture(),
            Err(SetupError::CaptureFailed {
                reason: CaptureError::PermissionDenied
            })
        );
        host.set_capture_response(SimResponse::Grant);
        setup.request_capture().unwrap();
        assert_eq!(setup.setup_error(), None);
    }

    #[test]
    fn release_all_without_acquisition_is_safe() {
        let host = SimulatedHost::new();
        let (mut setup, _rx) = coordinator(&host);
        setup.release_all();
        setup.release_all();
        assert_eq!(setup.readiness(), Readiness::default());
    }
}
