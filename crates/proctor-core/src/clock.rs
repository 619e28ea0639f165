//! Clock abstraction.
//!
//! Every time-dependent decision in a session (deadline computation,
//! violation timestamps, time spent) reads from an injected [`Clock`] rather
//! than calling `SystemTime`/`Instant` directly. Production code uses
//! [`SystemClock`]; the dispatcher uses [`TokioClock`] so paused tokio time in
//! tests drives the exam deadline; unit tests use [`ManualClock`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Abstraction over time sources.
///
/// `now_ms` is wall-clock time used only for recorded timestamps.
/// `monotonic_now` is used for every deadline and elapsed-time comparison.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current wall-clock time in milliseconds since UNIX epoch.
    fn now_ms(&self) -> u64;

    /// Returns a monotonic instant for deadline comparisons.
    fn monotonic_now(&self) -> Instant;
}

/// Production clock backed by `SystemTime` and `Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock backed by tokio's time driver.
///
/// Under `tokio::time::pause()` the monotonic reading follows the paused
/// clock, which lets dispatcher tests advance an exam deadline without
/// sleeping. Wall-clock readings are derived from the same offset so recorded
/// timestamps stay consistent with the deadline.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
    origin_ms: u64,
}

impl TokioClock {
    /// Creates a clock anchored at the current tokio instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
            origin_ms: SystemClock.now_ms(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u64 {
        let elapsed = tokio::time::Instant::now().duration_since(self.origin);
        self.origin_ms.saturating_add(elapsed.as_millis() as u64)
    }

    fn monotonic_now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// Manually advanced clock for deterministic tests.
///
/// Starts at a fixed wall-clock timestamp and only moves when
/// [`ManualClock::advance`] is called.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    base_ms: u64,
    offset_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock whose wall-clock reading starts at `base_ms`.
    #[must_use]
    pub fn new(base_ms: u64) -> Self {
        Self {
            base: Instant::now(),
            base_ms,
            offset_ms: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward.
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Returns how far the clock has been advanced since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000_000)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.base_ms
            .saturating_add(self.offset_ms.load(Ordering::SeqCst))
    }

    fn monotonic_now(&self) -> Instant {
        self.base + self.elapsed()
    }
}
