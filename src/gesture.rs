use crate::voice::ParamUpdate;

// -------------------------------------------------------------------------------------------------

/// Normalized state of a single touch or pointer contact. All values are in range `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GestureState {
    pub x: f64,
    pub y: f64,
    pub pressure: f64,
    pub size: f64,
    pub velocity: f64,
}

impl GestureState {
    /// Create a new gesture state, clamping all values into range `[0, 1]`.
    pub fn new(x: f64, y: f64, pressure: f64, size: f64, velocity: f64) -> Self {
        let clamp = |value: f64| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        Self {
            x: clamp(x),
            y: clamp(y),
            pressure: clamp(pressure),
            size: clamp(size),
            velocity: clamp(velocity),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Maps gesture states to voice parameter updates.
///
/// - x: sample position
/// - y: pitch, exponentially over `pitch_octaves`, centered on the original pitch
/// - pressure: amplitude, starting at `min_amplitude`
/// - size: position spread, up to `max_spread`
/// - velocity: width of the random inter-onset range around `density`, up to `max_jitter`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureMapping {
    pub pitch_octaves: f64,
    pub min_amplitude: f32,
    pub max_spread: f64,
    /// Normalized inter-onset center: 0 is slow, 1 is fast.
    pub density: f64,
    pub max_jitter: f64,
}

impl Default for GestureMapping {
    fn default() -> Self {
        Self {
            pitch_octaves: 2.0,
            min_amplitude: 0.1,
            max_spread: 0.5,
            density: 0.5,
            max_jitter: 0.5,
        }
    }
}

impl GestureMapping {
    pub fn with_pitch_octaves(mut self, octaves: f64) -> Self {
        self.pitch_octaves = octaves.max(0.0);
        self
    }

    pub fn with_min_amplitude(mut self, amplitude: f32) -> Self {
        self.min_amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_spread(mut self, spread: f64) -> Self {
        self.max_spread = spread.clamp(0.0, 1.0);
        self
    }

    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_jitter(mut self, jitter: f64) -> Self {
        self.max_jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn to_update(&self, gesture: &GestureState) -> ParamUpdate {
        let pitch_rate = 2.0_f64.powf((gesture.y - 0.5) * self.pitch_octaves);
        let amplitude =
            self.min_amplitude + (1.0 - self.min_amplitude) * gesture.pressure as f32;
        let half_width = gesture.velocity * self.max_jitter / 2.0;
        ParamUpdate::new()
            .with_position(gesture.x)
            .with_pitch_rate(pitch_rate)
            .with_amplitude(amplitude)
            .with_spread(gesture.size * self.max_spread)
            .with_inter_onset_range(self.density - half_width, self.density + half_width)
    }
}

// -------------------------------------------------------------------------------------------------
