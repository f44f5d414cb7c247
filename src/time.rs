//! Monotonic time references, shared by the musical clock and all grain schedulers.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

// -------------------------------------------------------------------------------------------------

mod musical;
mod ticker;

pub use musical::MusicalClock;
pub use ticker::Ticker;

// -------------------------------------------------------------------------------------------------

/// A monotonically increasing time reference in seconds.
///
/// All grain start times are expressed in this time base, so the output sink which receives
/// grains must render them against the same clock.
pub trait TimeSource: Send + Sync {
    /// Current time in seconds. Must never decrease.
    fn now(&self) -> f64;
}

// -------------------------------------------------------------------------------------------------

/// Wall-clock [`TimeSource`], counting seconds since its creation.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    start: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

// -------------------------------------------------------------------------------------------------

/// Manually advanced [`TimeSource`], e.g. to drive an engine from an audio callback's frame
/// counter or to run deterministic tests.
///
/// Clones share the same time value, so one clone can be handed to the engine while another one
/// advances time.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    seconds: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds: Arc::new(AtomicU64::new(seconds.max(0.0).to_bits())),
        }
    }

    /// Move time to the given position. Moving backwards is ignored.
    pub fn set(&self, seconds: f64) {
        let _ = self
            .seconds
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                if seconds > f64::from_bits(bits) {
                    Some(seconds.to_bits())
                } else {
                    None
                }
            });
    }

    /// Move time forward by the given duration.
    pub fn advance(&self, duration: Duration) {
        self.set(self.now() + duration.as_secs_f64());
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> f64 {
        f64::from_bits(self.seconds.load(Ordering::Acquire))
    }
}

// -------------------------------------------------------------------------------------------------
