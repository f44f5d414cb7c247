use crate::Error;

// -------------------------------------------------------------------------------------------------

/// Maps a monotonic time reference plus tempo and time signature to beat and bar positions.
///
/// Durations are derived on demand from the current tempo and signature, so changing them takes
/// effect immediately for all following queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MusicalClock {
    epoch: f64,
    bpm: f64,
    numerator: u32,
    denominator: u32,
}

impl Default for MusicalClock {
    fn default() -> Self {
        Self {
            epoch: 0.0,
            bpm: 120.0,
            numerator: 4,
            denominator: 4,
        }
    }
}

impl MusicalClock {
    pub const MIN_BPM: f64 = 40.0;
    pub const MAX_BPM: f64 = 300.0;
    pub const MIN_NUMERATOR: u32 = 2;
    pub const MAX_NUMERATOR: u32 = 12;
    pub const DENOMINATORS: [u32; 3] = [4, 8, 16];

    /// Create a new clock with the given tempo and signature. Out of range tempo and numerator
    /// values are clamped, invalid denominators fall back to 4.
    pub fn new(bpm: f64, numerator: u32, denominator: u32) -> Self {
        let mut clock = Self::default();
        clock.set_bpm(bpm);
        clock.set_numerator(numerator);
        if clock.set_denominator(denominator).is_err() {
            log::warn!("Invalid time signature denominator {denominator}, using 4");
        }
        clock
    }

    pub fn epoch(&self) -> f64 {
        self.epoch
    }
    /// Set the time reference of beat 0.
    pub fn set_epoch(&mut self, time: f64) {
        self.epoch = time;
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }
    /// Set the tempo. Values outside `[MIN_BPM, MAX_BPM]` are clamped.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = if bpm.is_finite() {
            bpm.clamp(Self::MIN_BPM, Self::MAX_BPM)
        } else {
            Self::MIN_BPM
        };
    }

    pub fn numerator(&self) -> u32 {
        self.numerator
    }
    /// Set the time signature's beats per bar. Values outside `[2, 12]` are clamped.
    pub fn set_numerator(&mut self, numerator: u32) {
        self.numerator = numerator.clamp(Self::MIN_NUMERATOR, Self::MAX_NUMERATOR);
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }
    /// Set the time signature's beat unit. Only 4, 8 and 16 are accepted: other values are
    /// rejected and the previous denominator is retained.
    pub fn set_denominator(&mut self, denominator: u32) -> Result<(), Error> {
        if Self::DENOMINATORS.contains(&denominator) {
            self.denominator = denominator;
            Ok(())
        } else {
            Err(Error::ParameterError(format!(
                "time signature denominator must be one of {:?}, got {denominator}",
                Self::DENOMINATORS
            )))
        }
    }

    /// Duration of a single beat in seconds.
    pub fn beat_duration(&self) -> f64 {
        (60.0 / self.bpm) * (4.0 / self.denominator as f64)
    }

    /// Duration of a bar in seconds.
    pub fn bar_duration(&self) -> f64 {
        self.beat_duration() * self.numerator as f64
    }

    /// Phase within the current beat in range `[0, 1)`.
    pub fn beat_phase(&self, now: f64) -> f64 {
        (self.elapsed(now) / self.beat_duration()).fract()
    }

    /// Fractional beat position within the current bar in range `[0, numerator)`.
    pub fn beat_in_bar(&self, now: f64) -> f64 {
        (self.elapsed(now) % self.bar_duration()) / self.beat_duration()
    }

    /// Number of whole beats since the epoch. 0 for times before the epoch.
    pub fn current_beat(&self, now: f64) -> u64 {
        (self.elapsed(now) / self.beat_duration()).floor() as u64
    }

    /// Number of whole bars since the epoch. 0 for times before the epoch.
    pub fn current_bar(&self, now: f64) -> u64 {
        (self.elapsed(now) / self.bar_duration()).floor() as u64
    }

    /// Time of the next beat line strictly after `now`.
    pub fn next_beat_time(&self, now: f64) -> f64 {
        if now < self.epoch {
            return self.epoch;
        }
        self.epoch + (self.current_beat(now) + 1) as f64 * self.beat_duration()
    }

    /// Time of the next bar line strictly after `now`.
    pub fn next_bar_time(&self, now: f64) -> f64 {
        if now < self.epoch {
            return self.epoch;
        }
        self.epoch + (self.current_bar(now) + 1) as f64 * self.bar_duration()
    }

    /// Snap the given time to the nearest beat line, rounding half up.
    pub fn quantize_to_beat(&self, time: f64) -> f64 {
        self.quantize_to_grid(time, self.beat_duration())
    }

    /// Snap the given time to the nearest bar line, rounding half up.
    pub fn quantize_to_bar(&self, time: f64) -> f64 {
        self.quantize_to_grid(time, self.bar_duration())
    }

    /// Round a duration to the nearest whole number of bars, with a minimum of one bar.
    pub fn quantize_duration_to_bar(&self, duration: f64) -> f64 {
        let bar = self.bar_duration();
        let bars = (duration / bar).round().max(1.0);
        bars * bar
    }

    fn elapsed(&self, now: f64) -> f64 {
        (now - self.epoch).max(0.0)
    }

    fn quantize_to_grid(&self, time: f64, grid: f64) -> f64 {
        let steps = ((time - self.epoch) / grid + 0.5).floor();
        self.epoch + steps * grid
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn durations() {
        let clock = MusicalClock::new(120.0, 4, 4);
        assert_near(clock.beat_duration(), 0.5);
        assert_near(clock.bar_duration(), 2.0);

        let clock = MusicalClock::new(120.0, 6, 8);
        assert_near(clock.beat_duration(), 0.25);
        assert_near(clock.bar_duration(), 1.5);

        for bpm in [40.0, 97.5, 120.0, 300.0] {
            for numerator in 2..=12 {
                for denominator in MusicalClock::DENOMINATORS {
                    let clock = MusicalClock::new(bpm, numerator, denominator);
                    assert!(clock.beat_duration() > 0.0);
                    assert_near(
                        clock.bar_duration(),
                        clock.beat_duration() * numerator as f64,
                    );
                }
            }
        }
    }

    #[test]
    fn clamping_and_rejection() {
        let mut clock = MusicalClock::default();
        clock.set_bpm(1000.0);
        assert_eq!(clock.bpm(), 300.0);
        clock.set_bpm(10.0);
        assert_eq!(clock.bpm(), 40.0);
        clock.set_numerator(1);
        assert_eq!(clock.numerator(), 2);
        clock.set_numerator(20);
        assert_eq!(clock.numerator(), 12);

        assert!(clock.set_denominator(8).is_ok());
        assert!(matches!(
            clock.set_denominator(3),
            Err(Error::ParameterError(_))
        ));
        assert_eq!(clock.denominator(), 8);
    }

    #[test]
    fn phases_and_counts() {
        let mut clock = MusicalClock::new(120.0, 4, 4);
        clock.set_epoch(1.0);

        // before epoch
        assert_eq!(clock.current_beat(0.5), 0);
        assert_eq!(clock.current_bar(0.5), 0);
        assert_near(clock.beat_phase(0.5), 0.0);
        assert_near(clock.next_beat_time(0.5), 1.0);
        assert_near(clock.next_bar_time(0.5), 1.0);

        assert_near(clock.beat_phase(1.25), 0.5);
        assert_eq!(clock.current_beat(3.75), 5);
        assert_eq!(clock.current_bar(3.75), 1);
        assert_near(clock.beat_in_bar(3.75), 1.5);
        assert_near(clock.next_beat_time(1.0), 1.5);
        assert_near(clock.next_beat_time(3.75), 4.0);
        assert_near(clock.next_bar_time(3.75), 5.0);
    }

    #[test]
    fn quantization() {
        let clock = MusicalClock::new(120.0, 4, 4);
        assert_near(clock.quantize_to_beat(0.74), 0.5);
        assert_near(clock.quantize_to_beat(0.75), 1.0);
        assert_near(clock.quantize_to_bar(2.9), 2.0);
        assert_near(clock.quantize_to_bar(3.0), 4.0);

        assert_near(clock.quantize_duration_to_bar(0.1), 2.0);
        assert_near(clock.quantize_duration_to_bar(4.9), 4.0);
        assert_near(clock.quantize_duration_to_bar(5.1), 6.0);
    }
}
