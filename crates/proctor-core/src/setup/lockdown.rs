//! Exclusive display mode.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::LockdownError;
use crate::host::{ExclusiveDisplay, SignalSender};

/// Wraps the exclusive display capability and owns lockdown state.
///
/// Each successful [`LockdownController::enter`] starts a new generation.
/// Exit notifications are matched against the current generation, so a late
/// notification from an earlier lockdown cannot end the current one.
pub struct LockdownController {
    provider: Arc<dyn ExclusiveDisplay>,
    signals: SignalSender,
    generation: u64,
    active: bool,
}

impl LockdownController {
    /// Creates a controller with lockdown inactive.
    #[must_use]
    pub fn new(provider: Arc<dyn ExclusiveDisplay>, signals: SignalSender) -> Self {
        Self {
            provider,
            signals,
            generation: 0,
            active: false,
        }
    }

    /// Requests exclusive display mode.
    ///
    /// Re-entering while already active is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LockdownError`] if the host cannot or will not enter the
    /// mode. Lockdown stays inactive in that case.
    pub fn enter(&mut self) -> Result<(), LockdownError> {
        if self.active {
            return Ok(());
        }
        let generation = self.generation + 1;
        if let Err(err) = self.provider.enter(generation, self.signals.clone()) {
            warn!(error = %err, "exclusive display mode not entered");
            return Err(err);
        }
        self.generation = generation;
        self.active = true;
        info!(generation, "exclusive display mode entered");
        Ok(())
    }

    /// Leaves exclusive display mode. Best effort: host errors are logged and
    /// swallowed, and the controller is inactive afterwards either way.
    pub fn exit(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        match self.provider.exit() {
            Ok(()) => debug!(generation = self.generation, "exclusive display mode exited"),
            Err(err) => warn!(
                generation = self.generation,
                error = %err,
                "exclusive display exit failed; continuing teardown"
            ),
        }
    }

    /// Handles an exit notification from the host.
    ///
    /// Returns `true` only when this notification is what ended the current
    /// lockdown, i.e. the exit was external. Notifications that follow a
    /// programmatic [`LockdownController::exit`], duplicates, and stale
    /// generations return `false`.
    pub fn handle_exit_signal(&mut self, generation: u64) -> bool {
        if !self.active || generation != self.generation {
            debug!(generation, current = self.generation, "ignoring lockdown exit notification");
            return false;
        }
        self.active = false;
        warn!(generation, "exclusive display mode exited externally");
        true
    }

    /// Returns `true` while exclusive display mode is held.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the current generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for LockdownController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockdownController")
            .field("generation", &self.generation)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostSignal;
    use crate::host::sim::{SimResponse, SimulatedHost};

    fn controller(host: &SimulatedHost) -> (LockdownController, crate::host::SignalReceiver) {
        let (signals, rx) = SignalSender::channel();
        (LockdownController::new(Arc::new(host.clone()), signals), rx)
    }

    #[test]
    fn enter_and_exit() {
        let host = SimulatedHost::new();
        let (mut lockdown, _rx) = controller(&host);

        lockdown.enter().unwrap();
        assert!(lockdown.is_active());
        assert!(host.lockdown_active());

        lockdown.exit();
        assert!(!lockdown.is_active());
        assert!(!host.lockdown_active());
    }

    #[test]
    fn enter_failures_leave_inactive() {
        let host = SimulatedHost::new();
        let (mut lockdown, _rx) = controller(&host);

        host.set_lockdown_response(SimResponse::Unsupported);
        assert_eq!(lockdown.enter(), Err(LockdownError::Unsupported));
        host.set_lockdown_response(SimResponse::Deny);
        assert_eq!(lockdown.enter(), Err(LockdownError::Rejected));
        assert!(!lockdown.is_active());
    }

    #[test]
    fn exit_is_idempotent() {
        let host = SimulatedHost::new();
        let (mut lockdown, _rx) = controller(&host);
        lockdown.enter().unwrap();

        lockdown.exit();
        lockdown.exit();

        assert!(!lockdown.is_active());
        assert_eq!(host.exit_calls(), 1);
    }

    #[test]
    fn exit_swallows_host_errors() {
        let host = SimulatedHost::new();
        host.set_exit_fails(true);
        let (mut lockdown, _rx) = controller(&host);
        lockdown.enter().unwrap();

        lockdown.exit();

        assert!(!lockdown.is_active());
    }

    #[test]
    fn external_exit_flips_once() {
        let host = SimulatedHost::new();
        let (mut lockdown, mut rx) = controller(&host);
        lockdown.enter().unwrap();

        host.press_escape();
        let Ok(HostSignal::LockdownExited { generation }) = rx.try_recv() else {
            panic!("expected lockdown exit signal");
        };

        assert!(lockdown.handle_exit_signal(generation));
        assert!(!lockdown.handle_exit_signal(generation));
        assert!(!lockdown.is_active());
    }

    #[test]
    fn programmatic_exit_notification_is_not_external() {
        let host = SimulatedHost::new();
        let (mut lockdown, mut rx) = controller(&host);
        lockdown.enter().unwrap();

        lockdown.exit();
        let Ok(HostSignal::LockdownExited { generation }) = rx.try_recv() else {
            panic!("expected lockdown exit signal");
        };
        assert!(!lockdown.handle_exit_signal(generation));
    }

    #[test]
    fn stale_generation_ignored() {
        let host = SimulatedHost::new();
        let (mut lockdown, _rx) = controller(&host);
        lockdown.enter().unwrap();
        let first = lockdown.generation();
        lockdown.exit();
        lockdown.enter().unwrap();

        assert!(!lockdown.handle_exit_signal(first));
        assert!(lockdown.is_active());
    }
}
