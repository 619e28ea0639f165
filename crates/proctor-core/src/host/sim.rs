//! In-memory host used by tests and scripted drills.
//!
//! [`SimulatedHost`] implements all three host capabilities and exposes knobs
//! for the things a real candidate or operating system does to a session:
//! declining a prompt, revoking screen sharing, pressing escape, switching
//! tabs. It also exposes counters (live tracks, active listeners, lockdown
//! state) so tests can assert that nothing leaks.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{
    CaptureConstraints, CaptureStream, DisplayCapture, ExclusiveDisplay, HostSignal, ListenerId,
    SignalSender, StreamId, TrackId, VisibilitySource,
};
use crate::setup::{CaptureError, LockdownError};

/// How the simulated host answers a capability request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimResponse {
    /// The request is granted.
    #[default]
    Grant,
    /// The user declined the prompt.
    Deny,
    /// The capability does not exist on this host.
    Unsupported,
}

#[derive(Debug)]
struct SimTrack {
    live: bool,
    listener: Option<SignalSender>,
}

#[derive(Debug, Default)]
struct SimState {
    capture_response: SimResponse,
    lockdown_response: SimResponse,
    exit_fails: bool,
    next_id: u64,
    streams: BTreeMap<StreamId, BTreeMap<TrackId, SimTrack>>,
    acquisitions: u64,
    lockdown: Option<(u64, SignalSender)>,
    exit_calls: u64,
    listeners: HashMap<ListenerId, SignalSender>,
    hidden: bool,
}

impl SimState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Simulated host environment.
///
/// Cloning yields another handle to the same host.
#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    state: Arc<Mutex<SimState>>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedHost {
    /// Creates a host that grants every request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how the next capture prompt is answered.
    pub fn set_capture_response(&self, response: SimResponse) {
        lock(&self.state).capture_response = response;
    }

    /// Sets how the next lockdown request is answered.
    pub fn set_lockdown_response(&self, response: SimResponse) {
        lock(&self.state).lockdown_response = response;
    }

    /// Makes programmatic lockdown exit fail.
    pub fn set_exit_fails(&self, fails: bool) {
        lock(&self.state).exit_fails = fails;
    }

    /// Ends a single track, as if the OS stopped it.
    pub fn end_track(&self, stream: StreamId, track: TrackId) {
        let mut state = lock(&self.state);
        let Some(t) = state
            .streams
            .get_mut(&stream)
            .and_then(|tracks| tracks.get_mut(&track))
        else {
            return;
        };
        if !t.live {
            return;
        }
        t.live = false;
        if let Some(listener) = &t.listener {
            listener.emit(HostSignal::TrackEnded { stream, track });
        }
    }

    /// Ends every live track of every stream, as if the user pressed "stop
    /// sharing".
    pub fn revoke_capture(&self) {
        let mut state = lock(&self.state);
        debug!("sim: capture revoked");
        for (stream, tracks) in &mut state.streams {
            for (track, t) in tracks.iter_mut().filter(|(_, t)| t.live) {
                t.live = false;
                if let Some(listener) = &t.listener {
                    listener.emit(HostSignal::TrackEnded {
                        stream: *stream,
                        track: *track,
                    });
                }
            }
        }
    }

    /// Leaves exclusive display mode from outside the application, as if the
    /// user pressed escape.
    pub fn press_escape(&self) {
        let mut state = lock(&self.state);
        if let Some((generation, signals)) = state.lockdown.take() {
            debug!(generation, "sim: escape pressed");
            signals.emit(HostSignal::LockdownExited { generation });
        }
    }

    /// Changes page visibility and notifies every subscriber.
    pub fn set_hidden(&self, hidden: bool) {
        let mut state = lock(&self.state);
        if state.hidden == hidden {
            return;
        }
        state.hidden = hidden;
        for (listener, signals) in &state.listeners {
            signals.emit(HostSignal::VisibilityChanged {
                listener: *listener,
                hidden,
            });
        }
    }

    /// Hides then shows the page, one full focus-loss cycle.
    pub fn blur_and_return(&self) {
        self.set_hidden(true);
        self.set_hidden(false);
    }

    /// Returns the number of live tracks across all streams.
    #[must_use]
    pub fn live_tracks(&self) -> usize {
        lock(&self.state)
            .streams
            .values()
            .flat_map(BTreeMap::values)
            .filter(|t| t.live)
            .count()
    }

    /// Returns the most recently acquired stream and its tracks.
    #[must_use]
    pub fn latest_stream(&self) -> Option<(StreamId, Vec<TrackId>)> {
        lock(&self.state)
            .streams
            .iter()
            .next_back()
            .map(|(id, tracks)| (*id, tracks.keys().copied().collect()))
    }

    /// Returns how many streams have been acquired.
    #[must_use]
    pub fn acquisitions(&self) -> u64 {
        lock(&self.state).acquisitions
    }

    /// Returns `true` while exclusive display mode is held.
    #[must_use]
    pub fn lockdown_active(&self) -> bool {
        lock(&self.state).lockdown.is_some()
    }

    /// Returns how many times programmatic exit was requested.
    #[must_use]
    pub fn exit_calls(&self) -> u64 {
        lock(&self.state).exit_calls
    }

    /// Returns the number of live visibility subscriptions.
    #[must_use]
    pub fn active_listeners(&self) -> usize {
        lock(&self.state).listeners.len()
    }
}

/// Stream handed out by [`SimulatedHost`].
#[derive(Debug)]
pub struct SimStream {
    id: StreamId,
    state: Arc<Mutex<SimState>>,
}

impl CaptureStream for SimStream {
    fn id(&self) -> StreamId {
        self.id
    }

    fn tracks(&self) -> Vec<TrackId> {
        lock(&self.state)
            .streams
            .get(&self.id)
            .map(|tracks| tracks.keys().copied().collect())
            .unwrap_or_default()
    }

    fn on_track_ended(&mut self, track: TrackId, signals: SignalSender) {
        if let Some(t) = lock(&self.state)
            .streams
            .get_mut(&self.id)
            .and_then(|tracks| tracks.get_mut(&track))
        {
            t.listener = Some(signals);
        }
    }

    fn stop_all(&mut self) {
        if let Some(tracks) = lock(&self.state).streams.get_mut(&self.id) {
            for t in tracks.values_mut() {
                t.live = false;
            }
        }
    }

    fn live_tracks(&self) -> usize {
        lock(&self.state)
            .streams
            .get(&self.id)
            .map_or(0, |tracks| tracks.values().filter(|t| t.live).count())
    }
}

impl DisplayCapture for SimulatedHost {
    fn acquire_display_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let mut state = lock(&self.state);
        match state.capture_response {
            SimResponse::Grant => {},
            SimResponse::Deny => return Err(CaptureError::PermissionDenied),
            SimResponse::Unsupported => return Err(CaptureError::Unsupported),
        }

        let id = StreamId(state.next_id());
        let track_count = if constraints.include_audio { 2 } else { 1 };
        let mut tracks = BTreeMap::new();
        for _ in 0..track_count {
            tracks.insert(
                TrackId(state.next_id()),
                SimTrack {
                    live: true,
                    listener: None,
                },
            );
        }
        state.streams.insert(id, tracks);
        state.acquisitions += 1;
        debug!(stream = %id, track_count, "sim: display stream granted");

        Ok(Box::new(SimStream {
            id,
            state: Arc::clone(&self.state),
        }))
    }
}

impl ExclusiveDisplay for SimulatedHost {
    fn enter(&self, generation: u64, signals: SignalSender) -> Result<(), LockdownError> {
        let mut state = lock(&self.state);
        match state.lockdown_response {
            SimResponse::Grant => {},
            SimResponse::Deny => return Err(LockdownError::Rejected),
            SimResponse::Unsupported => return Err(LockdownError::Unsupported),
        }
        state.lockdown = Some((generation, signals));
        Ok(())
    }

    fn exit(&self) -> Result<(), LockdownError> {
        let mut state = lock(&self.state);
        state.exit_calls += 1;
        if state.exit_fails {
            return Err(LockdownError::Rejected);
        }
        // Programmatic exits still raise the change notification, like a real
        // display-mode change event does.
        if let Some((generation, signals)) = state.lockdown.take() {
            signals.emit(HostSignal::LockdownExited { generation });
        }
        Ok(())
    }
}

impl VisibilitySource for SimulatedHost {
    fn subscribe(&self, signals: SignalSender) -> ListenerId {
        let mut state = lock(&self.state);
        let id = ListenerId(state.next_id());
        state.listeners.insert(id, signals);
        id
    }

    fn unsubscribe(&self, listener: ListenerId) {
        lock(&self.state).listeners.remove(&listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoke_emits_one_signal_per_live_track() {
        let host = SimulatedHost::new();
        let (signals, mut rx) = SignalSender::channel();
        let constraints = CaptureConstraints {
            include_audio: true,
            ..CaptureConstraints::default()
        };
        let mut stream = host.acquire_display_stream(&constraints).unwrap();
        for track in stream.tracks() {
            stream.on_track_ended(track, signals.clone());
        }
        assert_eq!(host.live_tracks(), 2);

        host.revoke_capture();
        host.revoke_capture();

        assert_eq!(host.live_tracks(), 0);
        assert!(matches!(rx.try_recv(), Ok(HostSignal::TrackEnded { .. })));
        assert!(matches!(rx.try_recv(), Ok(HostSignal::TrackEnded { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_all_is_silent() {
        let host = SimulatedHost::new();
        let (signals, mut rx) = SignalSender::channel();
        let mut stream = host
            .acquire_display_stream(&CaptureConstraints::default())
            .unwrap();
        for track in stream.tracks() {
            stream.on_track_ended(track, signals.clone());
        }
        stream.stop_all();
        assert_eq!(stream.live_tracks(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn denied_capture_creates_no_stream() {
        let host = SimulatedHost::new();
        host.set_capture_response(SimResponse::Deny);
        let err = host
            .acquire_display_stream(&CaptureConstraints::default())
            .unwrap_err();
        assert_eq!(err, CaptureError::PermissionDenied);
        assert_eq!(host.acquisitions(), 0);
    }

    #[test]
    fn visibility_reaches_only_subscribed_listeners() {
        let host = SimulatedHost::new();
        let (signals, mut rx) = SignalSender::channel();
        let listener = host.subscribe(signals);
        host.set_hidden(true);
        host.unsubscribe(listener);
        host.set_hidden(false);

        assert_eq!(
            rx.try_recv().ok(),
            Some(HostSignal::VisibilityChanged {
                listener,
                hidden: true
            })
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(host.active_listeners(), 0);
    }

    #[test]
    fn escape_without_lockdown_is_noop() {
        let host = SimulatedHost::new();
        host.press_escape();
        assert!(!host.lockdown_active());
    }
}
