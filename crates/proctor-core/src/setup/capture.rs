//! Display capture acquisition.
//!
//! [`CaptureAcquirer`] is the only owner of the live capture stream. It is
//! used from two places (the initial setup request and the retry after a
//! stream stopped) and both go through [`CaptureAcquirer::acquire`].
//!
//! # Invariants
//!
//! - At most one stream is held at a time.
//! - Exactly one stop is reported per stream instance, however many of its
//!   tracks end and however often the host repeats the notification.
//! - [`CaptureAcquirer::release`] never reports a stop.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::CaptureError;
use crate::host::{
    CaptureConstraints, CaptureStream, DisplayCapture, SignalSender, StreamId, TrackId,
};

/// Live capture stream plus its end-notification registration.
pub struct CaptureHandle {
    stream: Box<dyn CaptureStream>,
    tracks: Vec<TrackId>,
}

impl CaptureHandle {
    /// Returns the stream identifier.
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream.id()
    }

    /// Returns the tracks an end listener was registered on.
    #[must_use]
    pub fn tracks(&self) -> &[TrackId] {
        &self.tracks
    }

    fn stop(&mut self) {
        self.stream.stop_all();
    }
}

impl fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("stream_id", &self.stream.id())
            .field("tracks", &self.tracks)
            .field("live_tracks", &self.stream.live_tracks())
            .finish()
    }
}

/// Wraps the display capture capability.
pub struct CaptureAcquirer {
    provider: Arc<dyn DisplayCapture>,
    constraints: CaptureConstraints,
    signals: SignalSender,
    handle: Option<CaptureHandle>,
}

impl CaptureAcquirer {
    /// Creates an acquirer that has not acquired anything yet.
    #[must_use]
    pub fn new(
        provider: Arc<dyn DisplayCapture>,
        constraints: CaptureConstraints,
        signals: SignalSender,
    ) -> Self {
        Self {
            provider,
            constraints,
            signals,
            handle: None,
        }
    }

    /// Acquires a display stream and registers an end listener on every
    /// track.
    ///
    /// A stream that is still held is released only once its replacement is
    /// live, so retrying never leaks the previous one and a refused retry
    /// leaves it running.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] if the capability is missing or the prompt was
    /// declined. The capture state is unchanged in that case.
    pub fn acquire(&mut self) -> Result<StreamId, CaptureError> {
        let mut stream = match self.provider.acquire_display_stream(&self.constraints) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "display capture not acquired");
                return Err(err);
            },
        };

        let tracks = stream.tracks();
        for track in &tracks {
            stream.on_track_ended(*track, self.signals.clone());
        }
        let stream_id = stream.id();
        info!(stream = %stream_id, tracks = tracks.len(), "display capture acquired");

        if let Some(mut previous) = self.handle.replace(CaptureHandle { stream, tracks }) {
            previous.stop();
            debug!(stream = %previous.stream_id(), "previous display capture released");
        }
        Ok(stream_id)
    }

    /// Stops all tracks and drops the handle. Safe to call when nothing is
    /// held.
    pub fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
            debug!(stream = %handle.stream_id(), "display capture released");
        }
    }

    /// Handles a track end notification.
    ///
    /// Returns `true` exactly once per stream instance: the first time any of
    /// its tracks ends while it is held. Notifications for released or stale
    /// streams return `false`.
    pub fn handle_track_ended(&mut self, stream: StreamId, track: TrackId) -> bool {
        let matches = self
            .handle
            .as_ref()
            .is_some_and(|h| h.stream_id() == stream);
        if !matches {
            debug!(%stream, %track, "ignoring end of stale capture track");
            return false;
        }

        if let Some(mut handle) = self.handle.take() {
            // A stream missing any track is unusable; stop what is left.
            handle.stop();
        }
        warn!(%stream, %track, "display capture stopped by host");
        true
    }

    /// Returns `true` while a stream is held.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    /// Returns the held handle, if any.
    #[must_use]
    pub const fn handle(&self) -> Option<&CaptureHandle> {
        self.handle.as_ref()
    }

    /// Returns the number of live tracks in the held stream.
    #[must_use]
    pub fn live_tracks(&self) -> usize {
        self.handle.as_ref().map_or(0, |h| h.stream.live_tracks())
    }
}

impl fmt::Debug for CaptureAcquirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureAcquirer")
            .field("constraints", &self.constraints)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
