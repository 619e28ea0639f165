//! Countdown clock for a session.
//!
//! # State Machine
//!
//! ```text
//!   ┌──────┐  start()   ┌─────────┐  remaining == 0   ┌─────────┐
//!   │ Idle │ ─────────► │ Running │ ────────────────► │ Expired │
//!   └──────┘            └────┬────┘                   └─────────┘
//!       ▲        stop()      │
//!       └────────────────────┘
//! ```
//!
//! Remaining time is always `max(0, deadline - now)`. Nothing is subtracted
//! per tick, so late or skipped ticks cannot make the clock drift.
//!
//! The transition to Expired is reported by [`ExamClock::tick`] as
//! [`ClockTick::Expired`] exactly once; the session controller turns that
//! into a forced submission.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Clock lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockState {
    /// Not started, or stopped by an abort.
    Idle,
    /// Counting down.
    Running,
    /// Deadline reached.
    Expired,
}

/// Result of a clock tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    /// The clock is not running.
    Idle,
    /// Time remains.
    Running {
        /// Time left until the deadline.
        remaining: Duration,
    },
    /// The deadline was reached by this tick. Returned once.
    Expired,
    /// The deadline was reached by an earlier tick.
    AlreadyExpired,
}

/// Clock operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClockError {
    /// The deadline has already been set for this session.
    #[error("exam clock already started")]
    AlreadyStarted,

    /// A zero duration was requested.
    #[error("exam duration must be positive")]
    ZeroDuration,
}

/// Countdown clock with a deadline fixed at start.
#[derive(Debug, Clone)]
pub struct ExamClock {
    state: ClockState,
    duration: Duration,
    started_at: Option<Instant>,
    deadline: Option<Instant>,
    frozen_remaining: Option<Duration>,
}

impl Default for ExamClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ExamClock {
    /// Creates an idle clock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ClockState::Idle,
            duration: Duration::ZERO,
            started_at: None,
            deadline: None,
            frozen_remaining: None,
        }
    }

    /// Starts the countdown and fixes the deadline at `now + duration`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::AlreadyStarted`] if a deadline was ever set (the
    /// deadline is never moved), or [`ClockError::ZeroDuration`].
    pub fn start(&mut self, duration: Duration, now: Instant) -> Result<Instant, ClockError> {
        if self.deadline.is_some() {
            return Err(ClockError::AlreadyStarted);
        }
        if duration.is_zero() {
            return Err(ClockError::ZeroDuration);
        }
        let deadline = now + duration;
        self.duration = duration;
        self.started_at = Some(now);
        self.deadline = Some(deadline);
        self.state = ClockState::Running;
        info!(duration_secs = duration.as_secs(), "exam clock started");
        Ok(deadline)
    }

    /// Advances the state machine to `now`.
    pub fn tick(&mut self, now: Instant) -> ClockTick {
        match self.state {
            ClockState::Idle => ClockTick::Idle,
            ClockState::Expired => ClockTick::AlreadyExpired,
            ClockState::Running => {
                let remaining = self.remaining(now);
                if remaining.is_zero() {
                    self.state = ClockState::Expired;
                    info!("exam clock expired");
                    ClockTick::Expired
                } else {
                    ClockTick::Running { remaining }
                }
            },
        }
    }

    /// Stops a running clock without expiring it. Used only when the whole
    /// session is aborted.
    pub fn stop(&mut self, now: Instant) {
        if self.state == ClockState::Running {
            self.frozen_remaining = Some(self.remaining(now));
            self.state = ClockState::Idle;
            info!("exam clock stopped");
        }
    }

    /// Returns the time left at `now`.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        match (self.state, self.deadline) {
            (ClockState::Running, Some(deadline)) => deadline.saturating_duration_since(now),
            (ClockState::Expired, _) => Duration::ZERO,
            _ => self.frozen_remaining.unwrap_or(self.duration),
        }
    }

    /// Returns the time left at `now` in whole seconds, rounded up so the
    /// display never reads zero while time remains.
    #[must_use]
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        let remaining = self.remaining(now);
        let secs = remaining.as_secs();
        if remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Returns the time spent since start, capped at the configured duration.
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.started_at.map_or(Duration::ZERO, |started| {
            now.saturating_duration_since(started).min(self.duration)
        })
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ClockState {
        self.state
    }

    /// Returns `true` while counting down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    /// Returns `true` once the deadline was reached.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.state == ClockState::Expired
    }

    /// Returns the fixed deadline, if started.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_exactly_once() {
        let t0 = Instant::now();
        let mut clock = ExamClock::new();
        clock.start(Duration::from_secs(600), t0).unwrap();

        assert_eq!(
            clock.tick(t0 + Duration::from_secs(599)),
            ClockTick::Running {
                remaining: Duration::from_secs(1)
            }
        );
        assert_eq!(clock.tick(t0 + Duration::from_secs(600)), ClockTick::Expired);
        assert_eq!(
            clock.tick(t0 + Duration::from_secs(601)),
            ClockTick::AlreadyExpired
        );
        assert!(clock.is_expired());
    }

    #[test]
    fn late_tick_still_expires() {
        let t0 = Instant::now();
        let mut clock = ExamClock::new();
        clock.start(Duration::from_secs(10), t0).unwrap();
        assert_eq!(clock.tick(t0 + Duration::from_secs(3_600)), ClockTick::Expired);
    }

    #[test]
    fn remaining_is_computed_from_deadline() {
        let t0 = Instant::now();
        let mut clock = ExamClock::new();
        assert_eq!(clock.remaining(t0), Duration::ZERO);
        clock.start(Duration::from_secs(60), t0).unwrap();

        // No ticks at all: remaining still tracks wall progress.
        assert_eq!(
            clock.remaining(t0 + Duration::from_millis(59_500)),
            Duration::from_millis(500)
        );
        assert_eq!(clock.remaining_secs(t0 + Duration::from_millis(59_500)), 1);
        assert_eq!(clock.remaining(t0 + Duration::from_secs(90)), Duration::ZERO);
    }

    #[test]
    fn deadline_is_fixed() {
        let t0 = Instant::now();
        let mut clock = ExamClock::new();
        let deadline = clock.start(Duration::from_secs(60), t0).unwrap();
        assert_eq!(
            clock.start(Duration::from_secs(120), t0),
            Err(ClockError::AlreadyStarted)
        );
        clock.stop(t0 + Duration::from_secs(1));
        assert_eq!(
            clock.start(Duration::from_secs(60), t0),
            Err(ClockError::AlreadyStarted)
        );
        assert_eq!(clock.deadline(), Some(deadline));
    }

    #[test]
    fn stop_does_not_expire() {
        let t0 = Instant::now();
        let mut clock = ExamClock::new();
        clock.start(Duration::from_secs(60), t0).unwrap();
        clock.stop(t0 + Duration::from_secs(20));

        assert_eq!(clock.state(), ClockState::Idle);
        assert_eq!(clock.tick(t0 + Duration::from_secs(120)), ClockTick::Idle);
        assert_eq!(
            clock.remaining(t0 + Duration::from_secs(120)),
            Duration::from_secs(40)
        );
    }

    #[test]
    fn zero_duration_rejected() {
        let mut clock = ExamClock::new();
        assert_eq!(
            clock.start(Duration::ZERO, Instant::now()),
            Err(ClockError::ZeroDuration)
        );
        assert_eq!(clock.state(), ClockState::Idle);
    }

    #[test]
    fn elapsed_is_capped() {
        let t0 = Instant::now();
        let mut clock = ExamClock::new();
        clock.start(Duration::from_secs(30), t0).unwrap();
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(10)), Duration::from_secs(10));
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(99)), Duration::from_secs(30));
    }
}
