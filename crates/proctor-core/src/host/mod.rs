//! Host capability boundary.
//!
//! The session controller never talks to a display, a screen recorder or a
//! page directly. It consumes three host capabilities through the traits in
//! this module:
//!
//! - [`DisplayCapture`]: acquire a display stream made of [`CaptureStream`]
//!   tracks, each of which can report that it ended
//! - [`ExclusiveDisplay`]: enter and exit exclusive (full-viewport) display
//!   mode, reporting externally triggered exits
//! - [`VisibilitySource`]: subscribe to page visibility changes
//!
//! Every asynchronous host callback is delivered as a [`HostSignal`] through a
//! [`SignalSender`]. The session dispatcher is the only consumer of those
//! signals, which keeps all session mutation on one timeline.

pub mod sim;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::setup::{CaptureError, LockdownError};

/// Identifies one acquired capture stream.
///
/// A fresh ID is issued per acquisition so that end notifications from a
/// previously released stream can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(pub u64);

/// Identifies one track inside a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

/// Identifies one visibility subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track-{}", self.0)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Asynchronous notification from the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum HostSignal {
    /// A capture track ended (user revoked sharing, OS-level stop).
    TrackEnded {
        /// Stream the track belongs to.
        stream: StreamId,
        /// The track that ended.
        track: TrackId,
    },
    /// Exclusive display mode was left.
    LockdownExited {
        /// Generation passed to [`ExclusiveDisplay::enter`].
        generation: u64,
    },
    /// Page visibility changed.
    VisibilityChanged {
        /// Subscription that observed the change.
        listener: ListenerId,
        /// `true` when the page became hidden.
        hidden: bool,
    },
}

impl HostSignal {
    /// Returns the signal name used in logs.
    #[must_use]
    pub const fn signal_type(&self) -> &'static str {
        match self {
            Self::TrackEnded { .. } => "host.track_ended",
            Self::LockdownExited { .. } => "host.lockdown_exited",
            Self::VisibilityChanged { .. } => "host.visibility_changed",
        }
    }
}

/// Sending half of the host signal channel.
///
/// Host callbacks are synchronous and may fire after the session is gone, so
/// sending never blocks and a closed channel is ignored.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<HostSignal>,
}

/// Receiving half of the host signal channel.
pub type SignalReceiver = mpsc::UnboundedReceiver<HostSignal>;

impl SignalSender {
    /// Creates a connected sender/receiver pair.
    #[must_use]
    pub fn channel() -> (Self, SignalReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers a signal to the session. Returns `false` if the session has
    /// already shut down.
    pub fn emit(&self, signal: HostSignal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Where a display capture should come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplaySurface {
    /// The whole monitor.
    #[default]
    Monitor,
    /// A single application window.
    Window,
    /// A single browser tab.
    Browser,
}

/// Constraints passed to [`DisplayCapture::acquire_display_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    /// Requested display surface.
    #[serde(default)]
    pub display_surface: DisplaySurface,
    /// Requested frame rate.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    /// Whether an audio track is requested along with video.
    #[serde(default)]
    pub include_audio: bool,
}

const fn default_frame_rate() -> u32 {
    15
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            display_surface: DisplaySurface::default(),
            frame_rate: default_frame_rate(),
            include_audio: false,
        }
    }
}

/// A live display stream.
///
/// Owned exclusively by the capture acquirer; other components only see its
/// [`StreamId`].
pub trait CaptureStream: Send + fmt::Debug {
    /// Returns the stream identifier.
    fn id(&self) -> StreamId;

    /// Returns every constituent track.
    fn tracks(&self) -> Vec<TrackId>;

    /// Registers an end notification for `track`. When the track ends for a
    /// reason other than [`CaptureStream::stop_all`], the host emits
    /// [`HostSignal::TrackEnded`] through `signals`.
    fn on_track_ended(&mut self, track: TrackId, signals: SignalSender);

    /// Stops every track. Must be idempotent.
    fn stop_all(&mut self);

    /// Returns the number of tracks that are still live.
    fn live_tracks(&self) -> usize;
}

/// Display capture capability.
pub trait DisplayCapture: Send + Sync + fmt::Debug {
    /// Prompts for and acquires a display stream.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Unsupported`] if the host cannot capture and
    /// [`CaptureError::PermissionDenied`] if the prompt was declined.
    fn acquire_display_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// Exclusive display mode capability.
pub trait ExclusiveDisplay: Send + Sync + fmt::Debug {
    /// Requests exclusive display mode.
    ///
    /// On success the host reports any later exit, whatever triggered it, as
    /// [`HostSignal::LockdownExited`] carrying `generation`.
    ///
    /// # Errors
    ///
    /// Returns [`LockdownError::Unsupported`] or [`LockdownError::Rejected`].
    fn enter(&self, generation: u64, signals: SignalSender) -> Result<(), LockdownError>;

    /// Leaves exclusive display mode.
    ///
    /// # Errors
    ///
    /// Returns [`LockdownError::Rejected`] if the host refused. Callers on
    /// teardown paths discard this error.
    fn exit(&self) -> Result<(), LockdownError>;
}

/// Page visibility capability.
pub trait VisibilitySource: Send + Sync + fmt::Debug {
    /// Starts delivering [`HostSignal::VisibilityChanged`] through `signals`.
    fn subscribe(&self, signals: SignalSender) -> ListenerId;

    /// Stops delivery for `listener`. Unknown IDs are ignored.
    fn unsubscribe(&self, listener: ListenerId);
}

/// The three capabilities a session needs from its host.
#[derive(Debug, Clone)]
pub struct HostCapabilities {
    /// Display capture.
    pub capture: Arc<dyn DisplayCapture>,
    /// Exclusive display mode.
    pub display: Arc<dyn ExclusiveDisplay>,
    /// Page visibility.
    pub visibility: Arc<dyn VisibilitySource>,
}

impl HostCapabilities {
    /// Uses one host object for all three capabilities.
    #[must_use]
    pub fn from_host<H>(host: H) -> Self
    where
        H: DisplayCapture + ExclusiveDisplay + VisibilitySource + 'static,
    {
        let host = Arc::new(host);
        Self {
            capture: host.clone(),
            display: host.clone(),
            visibility: host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_sender_reports_closed_channel() {
        let (tx, rx) = SignalSender::channel();
        assert!(tx.emit(HostSignal::LockdownExited { generation: 1 }));
        drop(rx);
        assert!(!tx.emit(HostSignal::LockdownExited { generation: 2 }));
    }

    #[test]
    fn signal_serializes_with_tag() {
        let json = serde_json::to_string(&HostSignal::VisibilityChanged {
            listener: ListenerId(3),
            hidden: true,
        })
        .unwrap();
        assert!(json.contains("\"signal\":\"visibility_changed\""));
    }

    #[test]
    fn capture_constraints_defaults() {
        let constraints: CaptureConstraints = toml::from_str("").unwrap();
        assert_eq!(constraints, CaptureConstraints::default());
        assert_eq!(constraints.frame_rate, 15);
    }
}
