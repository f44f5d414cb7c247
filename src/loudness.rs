//! Loudness compensation for overlapping grains and concurrently active voices.
//!
//! Uncorrelated sources sum by power, so N overlapping grains or voices are scaled by 1/√N
//! to keep the summed RMS level constant.

// -------------------------------------------------------------------------------------------------

/// Default output level of a single active voice.
pub const DEFAULT_BASE_LEVEL: f32 = 0.4;

// -------------------------------------------------------------------------------------------------

/// Computes the per-grain overlap and per-voice active count gain factors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessCompensator {
    base_level: f32,
}

impl Default for LoudnessCompensator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_LEVEL)
    }
}

impl LoudnessCompensator {
    pub fn new(base_level: f32) -> Self {
        Self {
            base_level: base_level.clamp(0.0, 1.0),
        }
    }

    pub fn base_level(&self) -> f32 {
        self.base_level
    }

    /// Estimated number of concurrently sounding grains in a single voice. At least 1.
    pub fn overlap(grain_duration: f64, inter_onset: f64) -> f64 {
        if inter_onset <= 0.0 {
            return 1.0;
        }
        (grain_duration / inter_onset).max(1.0)
    }

    /// Amplitude scale for a grain with the given overlap.
    pub fn grain_scale(overlap: f64) -> f32 {
        (1.0 / overlap.max(1.0).sqrt()) as f32
    }

    /// Gain of each voice when `active_count` voices are playing. 0 when no voice is active.
    pub fn voice_gain(&self, active_count: usize) -> f32 {
        if active_count == 0 {
            0.0
        } else {
            self.base_level / (active_count as f32).sqrt()
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn grain_compensation() {
        let overlap = LoudnessCompensator::overlap(0.1, 0.025);
        assert!((overlap - 4.0).abs() < 1e-9);
        assert_near(LoudnessCompensator::grain_scale(overlap), 0.5);

        // sparse grains never get boosted
        assert_eq!(LoudnessCompensator::overlap(0.01, 0.1), 1.0);
        assert_near(LoudnessCompensator::grain_scale(0.5), 1.0);
        assert_eq!(LoudnessCompensator::overlap(0.1, 0.0), 1.0);

        for overlap in [1.0, 2.0, 3.5, 16.0] {
            assert_near(
                LoudnessCompensator::grain_scale(overlap),
                1.0 / (overlap as f32).sqrt(),
            );
        }
    }

    #[test]
    fn voice_compensation() {
        let loudness = LoudnessCompensator::default();
        assert_eq!(loudness.voice_gain(0), 0.0);
        assert_near(loudness.voice_gain(1), 0.4);
        assert_near(loudness.voice_gain(4), 0.2);
        for count in 1..16 {
            assert_near(
                loudness.voice_gain(count),
                DEFAULT_BASE_LEVEL / (count as f32).sqrt(),
            );
        }
    }
}
