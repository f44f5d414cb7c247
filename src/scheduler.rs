use std::time::Duration;

use rand::{rngs::SmallRng, Rng};

use crate::{
    quantize::{normalized_to_exponential, RhythmQuantize},
    time::Ticker,
};

// -------------------------------------------------------------------------------------------------

/// Inter-onset time in seconds for a normalized value of 0.
pub const SLOWEST_INTER_ONSET: f64 = 0.5;
/// Inter-onset time in seconds for a normalized value of 1.
pub const FASTEST_INTER_ONSET: f64 = 0.005;
/// Lower bound for all inter-onset times.
pub const MIN_INTER_ONSET: f64 = 0.001;

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    #[default]
    Stopped,
    Running,
}

/// Time between two consecutive grain onsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterOnset {
    /// Fixed time in seconds.
    Fixed(f64),
    /// Random normalized range: each onset draws a value in `[min, max]`, which is mapped
    /// exponentially from slow (0) to fast (1), or to a rhythmic subdivision when quantized.
    Range { min: f64, max: f64 },
}

impl Default for InterOnset {
    fn default() -> Self {
        Self::Fixed(0.05)
    }
}

impl InterOnset {
    /// Create a new normalized range, ordering and clamping the bounds.
    pub fn range(min: f64, max: f64) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self::Range {
            min: min.clamp(0.0, 1.0),
            max: max.clamp(0.0, 1.0),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Look-ahead grain scheduler of a single voice.
///
/// Whenever its ticker is due, the scheduler commits all grain onsets that fall into the
/// look-ahead window `[now, now + schedule_ahead)` and then re-arms its ticker. As long as the
/// host calls [`Self::tick`] at least once per look-ahead window, no onset gets lost.
#[derive(Debug, Clone)]
pub struct GrainScheduler {
    state: SchedulerState,
    next_grain_time: f64,
    schedule_ahead: f64,
    ticker: Ticker,
    inter_onset: InterOnset,
    quantize: Option<RhythmQuantize>,
    rng: SmallRng,
}

impl GrainScheduler {
    pub fn new(schedule_ahead: Duration, tick_interval: Duration, rng: SmallRng) -> Self {
        debug_assert!(
            tick_interval < schedule_ahead,
            "The tick interval should be shorter than the look-ahead window"
        );
        Self {
            state: SchedulerState::Stopped,
            next_grain_time: 0.0,
            schedule_ahead: schedule_ahead.as_secs_f64(),
            ticker: Ticker::new(tick_interval),
            inter_onset: InterOnset::default(),
            quantize: None,
            rng,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SchedulerState::Running
    }

    /// Time of the next uncommitted onset.
    pub fn next_grain_time(&self) -> f64 {
        self.next_grain_time
    }

    pub fn inter_onset(&self) -> InterOnset {
        self.inter_onset
    }

    pub fn set_inter_onset(&mut self, inter_onset: InterOnset) {
        self.inter_onset = inter_onset;
    }

    pub fn quantize(&self) -> Option<RhythmQuantize> {
        self.quantize
    }

    /// Set or clear rhythmic snapping. Only applies to random inter-onset ranges.
    pub fn set_quantize(&mut self, quantize: Option<RhythmQuantize>) {
        self.quantize = quantize;
    }

    /// Start scheduling, with the first onset at `now`.
    pub fn start(&mut self, now: f64) {
        self.state = SchedulerState::Running;
        self.next_grain_time = now;
        self.ticker.arm(now);
    }

    /// Stop scheduling. Already committed onsets are not affected.
    pub fn stop(&mut self) {
        self.state = SchedulerState::Stopped;
        self.ticker.disarm();
    }

    /// Draw the next inter-onset time in seconds.
    pub fn next_interval(&mut self) -> f64 {
        let seconds = match self.inter_onset {
            InterOnset::Fixed(seconds) => seconds,
            InterOnset::Range { min, max } => {
                let value = if max > min {
                    self.rng.random_range(min..=max)
                } else {
                    min
                };
                match self.quantize {
                    Some(quantize) => quantize.seconds_for(value),
                    None => normalized_to_exponential(
                        value,
                        SLOWEST_INTER_ONSET,
                        FASTEST_INTER_ONSET,
                    ),
                }
            }
        };
        seconds.max(MIN_INTER_ONSET)
    }

    /// Commit all onsets of the current look-ahead window when the ticker is due, invoking
    /// `on_grain(when, inter_onset)` for each of them in increasing time order.
    /// Returns the number of committed onsets.
    pub fn tick<F: FnMut(f64, f64)>(&mut self, now: f64, mut on_grain: F) -> usize {
        if !self.is_running() || !self.ticker.is_due(now) {
            return 0;
        }
        if self.next_grain_time + self.schedule_ahead < now {
            log::debug!(
                "Grain scheduler lagged behind by {:.3}s, skipping missed onsets",
                now - self.next_grain_time
            );
            self.next_grain_time = now;
        }
        let mut count = 0;
        let horizon = now + self.schedule_ahead;
        while self.next_grain_time < horizon {
            let interval = self.next_interval();
            on_grain(self.next_grain_time, interval);
            self.next_grain_time += interval;
            count += 1;
        }
        self.ticker.rearm(now);
        count
    }
}

// -------------------------------------------------------------------------------------------------
