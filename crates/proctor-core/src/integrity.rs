//! Integrity monitoring during an active session.
//!
//! # State Machine
//!
//! ```text
//!            arm()                  (subscribes to visibility)
//!   ┌──────────┐ ───────────────► ┌───────┐
//!   │ Disarmed │                  │ Armed │
//!   └──────────┘ ◄─────────────── └───────┘
//!            disarm()               (unsubscribes)
//! ```
//!
//! # Invariants
//!
//! - The monitor holds a visibility subscription if and only if it is Armed.
//! - Violations are only recorded while Armed.
//! - The violation log is append-only and ordered by arrival.
//! - Visibility toggles are not debounced: every loss counts.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::host::{ListenerId, SignalSender, VisibilitySource};

/// Kind of integrity-policy deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The page lost visibility (tab switch, window minimised).
    FocusLost,
    /// Display capture ended during the session.
    CaptureStopped,
    /// Exclusive display mode was left during the session.
    LockdownExited,
}

impl ViolationKind {
    /// Returns the kind as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FocusLost => "focus_lost",
            Self::CaptureStopped => "capture_stopped",
            Self::LockdownExited => "lockdown_exited",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded violation, kept for human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    /// What happened.
    pub kind: ViolationKind,
    /// Wall-clock time, milliseconds since UNIX epoch.
    pub timestamp_ms: u64,
}

/// Arms a visibility subscription during the active session and records
/// violations.
pub struct IntegrityMonitor {
    visibility: Arc<dyn VisibilitySource>,
    signals: SignalSender,
    listener: Option<ListenerId>,
    violations: Vec<ViolationEvent>,
}

impl IntegrityMonitor {
    /// Creates a disarmed monitor with an empty log.
    #[must_use]
    pub fn new(visibility: Arc<dyn VisibilitySource>, signals: SignalSender) -> Self {
        Self {
            visibility,
            signals,
            listener: None,
            violations: Vec::new(),
        }
    }

    /// Subscribes to visibility changes. No-op if already armed.
    pub fn arm(&mut self) {
        if self.listener.is_some() {
            return;
        }
        let listener = self.visibility.subscribe(self.signals.clone());
        info!(%listener, "integrity monitor armed");
        self.listener = Some(listener);
    }

    /// Unsubscribes. No-op if already disarmed.
    pub fn disarm(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.visibility.unsubscribe(listener);
            info!(%listener, violations = self.violations.len(), "integrity monitor disarmed");
        }
    }

    /// Returns `true` while subscribed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.listener.is_some()
    }

    /// Handles a visibility change. Returns the recorded violation when the
    /// page became hidden while armed on `listener`.
    pub fn handle_visibility(
        &mut self,
        listener: ListenerId,
        hidden: bool,
        now_ms: u64,
    ) -> Option<ViolationEvent> {
        if self.listener != Some(listener) {
            debug!(%listener, "ignoring visibility change from inactive listener");
            return None;
        }
        if !hidden {
            debug!(%listener, "page visible again");
            return None;
        }
        self.record(ViolationKind::FocusLost, now_ms)
    }

    /// Records a violation if armed.
    pub fn record(&mut self, kind: ViolationKind, now_ms: u64) -> Option<ViolationEvent> {
        if !self.is_armed() {
            return None;
        }
        let event = ViolationEvent {
            kind,
            timestamp_ms: now_ms,
        };
        self.violations.push(event);
        warn!(%kind, count = self.violations.len(), "integrity violation recorded");
        Some(event)
    }

    /// Returns the violation log.
    #[must_use]
    pub fn violations(&self) -> &[ViolationEvent] {
        &self.violations
    }

    /// Returns the number of recorded violations.
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }
}

impl fmt::Debug for IntegrityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityMonitor")
            .field("listener", &self.listener)
            .field("violations", &self.violations.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::host::HostSignal;
    use crate::host::sim::SimulatedHost;

    fn monitor(host: &SimulatedHost) -> (IntegrityMonitor, crate::host::SignalReceiver) {
        let (signals, rx) = SignalSender::channel();
        (IntegrityMonitor::new(Arc::new(host.clone()), signals), rx)
    }

    fn drain(monitor: &mut IntegrityMonitor, rx: &mut crate::host::SignalReceiver) {
        while let Ok(signal) = rx.try_recv() {
            if let HostSignal::VisibilityChanged { listener, hidden } = signal {
                monitor.handle_visibility(listener, hidden, 1_000);
            }
        }
    }

    #[test]
    fn arm_and_disarm_manage_subscription() {
        let host = SimulatedHost::new();
        let (mut monitor, _rx) = monitor(&host);

        monitor.arm();
        monitor.arm();
        assert_eq!(host.active_listeners(), 1);

        monitor.disarm();
        monitor.disarm();
        assert_eq!(host.active_listeners(), 0);
        assert!(!monitor.is_armed());
    }

    #[test]
    fn disarmed_monitor_records_nothing() {
        let host = SimulatedHost::new();
        let (mut monitor, _rx) = monitor(&host);
        assert!(monitor.record(ViolationKind::FocusLost, 1).is_none());
        assert_eq!(monitor.violation_count(), 0);
    }

    #[test]
    fn stale_listener_ignored() {
        let host = SimulatedHost::new();
        let (mut monitor, mut rx) = monitor(&host);
        monitor.arm();
        host.set_hidden(true);
        monitor.disarm();
        monitor.arm();

        // The queued event belongs to the first subscription.
        drain(&mut monitor, &mut rx);
        assert_eq!(monitor.violation_count(), 0);
    }

    #[test]
    fn log_preserves_order() {
        let host = SimulatedHost::new();
        let (mut monitor, _rx) = monitor(&host);
        monitor.arm();
        monitor.record(ViolationKind::FocusLost, 10);
        monitor.record(ViolationKind::CaptureStopped, 20);
        monitor.record(ViolationKind::LockdownExited, 30);

        let kinds: Vec<_> = monitor.violations().iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::FocusLost,
                ViolationKind::CaptureStopped,
                ViolationKind::LockdownExited
            ]
        );
    }

    proptest! {
        #[test]
        fn every_visibility_loss_counts(losses in 0usize..64) {
            let host = SimulatedHost::new();
            let (mut monitor, mut rx) = monitor(&host);
            monitor.arm();
            for _ in 0..losses {
                host.blur_and_return();
            }
            drain(&mut monitor, &mut rx);
            prop_assert_eq!(monitor.violation_count(), losses);
        }
    }
}
