use rand::Rng;

use crate::{
    buffer::SampleBuffer,
    envelope::{AdsrShape, Envelope, EnvelopeLibrary},
    loudness::LoudnessCompensator,
};

// -------------------------------------------------------------------------------------------------

/// Fraction of a voice's spread that is applied as random pan jitter.
const PAN_JITTER: f64 = 0.2;

// -------------------------------------------------------------------------------------------------

/// A single, fully specified grain: a short enveloped playback of a sample buffer fragment.
///
/// Grains are plain values which are moved into a [`GrainSink`](crate::GrainSink) for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Grain {
    /// Start time in the engine's time source base, in seconds.
    pub start_time: f64,
    /// Playback start offset in the sample buffer, in seconds.
    pub source_offset: f64,
    /// Duration in seconds.
    pub duration: f64,
    /// Playback rate: 1 plays at original pitch, 2 an octave higher.
    pub pitch_rate: f64,
    /// Stereo pan in range `[-1, 1]`.
    pub pan: f32,
    /// Overall amplitude factor, already applied to `envelope`.
    pub amplitude_scale: f32,
    /// Amplitude envelope, spread evenly over the grain's duration.
    pub envelope: Box<[f32]>,
}

// -------------------------------------------------------------------------------------------------

/// Resolved parameters of a single grain, as produced by a voice for each scheduled onset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainParameters {
    /// Normalized position in the sample buffer.
    pub position: f64,
    pub amplitude: f32,
    /// Random position offset range, normalized.
    pub spread: f64,
    pub grain_duration: f64,
    /// Time until the next grain of the voice. Used to estimate overlap.
    pub inter_onset: f64,
    pub pitch_rate: f64,
    pub pan: f32,
    pub envelope: Envelope,
    /// Overrides `envelope` when set.
    pub adsr: Option<AdsrShape>,
}

impl Default for GrainParameters {
    fn default() -> Self {
        Self {
            position: 0.5,
            amplitude: 0.8,
            spread: 0.0,
            grain_duration: 0.1,
            inter_onset: 0.05,
            pitch_rate: 1.0,
            pan: 0.0,
            envelope: Envelope::default(),
            adsr: None,
        }
    }
}

impl GrainParameters {
    /// The envelope shape that gets applied.
    pub fn effective_envelope(&self) -> Envelope {
        self.adsr.map_or(self.envelope, Envelope::Adsr)
    }
}

// -------------------------------------------------------------------------------------------------

/// Per voice grain counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GrainStats {
    /// Grains handed over to the sink.
    pub emitted: u64,
    /// Degenerate grains which were rejected.
    pub dropped: u64,
    /// Onsets skipped by muted arpeggiator steps.
    pub muted: u64,
}

// -------------------------------------------------------------------------------------------------

/// Build a grain from the given resolved parameters, starting at `when`.
///
/// Returns None when the grain would start at or beyond the end of the buffer, or when its
/// duration, clamped to the remaining buffer length, is shorter than `min_duration`.
pub fn instantiate_grain<R: Rng + ?Sized>(
    params: &GrainParameters,
    buffer: &SampleBuffer,
    when: f64,
    envelopes: &EnvelopeLibrary,
    min_duration: f64,
    rng: &mut R,
) -> Option<Grain> {
    // apply spread
    let mut position = params.position;
    if params.spread > 0.0 {
        position += (rng.random::<f64>() - 0.5) * params.spread;
    }
    let position = position.clamp(0.0, 1.0);

    let buffer_duration = buffer.duration();
    let source_offset = position * buffer_duration;
    let remaining = buffer_duration - source_offset;
    if remaining <= 0.0 {
        log::trace!("Dropping grain at {when:.3}s: position is at the end of the buffer");
        return None;
    }
    let duration = params.grain_duration.min(remaining);
    if duration < min_duration {
        log::trace!("Dropping grain at {when:.3}s: duration {duration:.5}s is too short");
        return None;
    }

    let overlap = LoudnessCompensator::overlap(duration, params.inter_onset);
    let amplitude_scale = params.amplitude * LoudnessCompensator::grain_scale(overlap);

    let length = EnvelopeLibrary::length_for_duration(duration);
    let curve = envelopes.curve(&params.effective_envelope(), length);
    let envelope = curve.iter().map(|value| value * amplitude_scale).collect();

    let mut pan = params.pan as f64;
    if params.spread > 0.0 {
        pan += params.spread * PAN_JITTER * (2.0 * rng.random::<f64>() - 1.0);
    }
    let pan = pan.clamp(-1.0, 1.0) as f32;

    log::trace!(
        "Emitting grain at {when:.3}s: offset {source_offset:.3}s, duration {duration:.3}s"
    );
    Some(Grain {
        start_time: when,
        source_offset,
        duration,
        pitch_rate: params.pitch_rate,
        pan,
        amplitude_scale,
        envelope,
    })
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::SmallRng, SeedableRng};

    fn one_second_buffer() -> SampleBuffer {
        SampleBuffer::from_mono(vec![0.0; 1000], 1000).unwrap()
    }

    #[test]
    fn overlap_compensation() {
        let buffer = one_second_buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let params = GrainParameters {
            position: 0.25,
            amplitude: 1.0,
            grain_duration: 0.1,
            inter_onset: 0.025,
            ..Default::default()
        };
        let grain = instantiate_grain(&params, &buffer, 2.0, &envelopes, 0.001, &mut rng).unwrap();
        assert_eq!(grain.start_time, 2.0);
        assert!((grain.source_offset - 0.25).abs() < 1e-9);
        assert!((grain.duration - 0.1).abs() < 1e-9);
        assert!((grain.amplitude_scale - 0.5).abs() < 1e-6);
        assert_eq!(grain.envelope.len(), 128);
        let peak = grain.envelope.iter().cloned().fold(0.0_f32, f32::max);
        assert!(peak <= 0.5 + 1e-6 && peak > 0.49);
        assert_eq!(grain.pan, 0.0);
    }

    #[test]
    fn duration_is_clamped_to_buffer_end() {
        let buffer = one_second_buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let params = GrainParameters {
            position: 0.95,
            grain_duration: 0.2,
            ..Default::default()
        };
        let grain = instantiate_grain(&params, &buffer, 0.0, &envelopes, 0.001, &mut rng).unwrap();
        assert!((grain.duration - 0.05).abs() < 1e-9);
        assert_eq!(grain.envelope.len(), 128);
    }

    #[test]
    fn degenerate_grains_are_rejected() {
        let buffer = one_second_buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut rng = SmallRng::seed_from_u64(1);

        let at_end = GrainParameters {
            position: 1.0,
            ..Default::default()
        };
        assert!(instantiate_grain(&at_end, &buffer, 0.0, &envelopes, 0.001, &mut rng).is_none());

        let too_short = GrainParameters {
            position: 0.9995,
            ..Default::default()
        };
        assert!(
            instantiate_grain(&too_short, &buffer, 0.0, &envelopes, 0.001, &mut rng).is_none()
        );

        let tiny = GrainParameters {
            grain_duration: 0.0005,
            ..Default::default()
        };
        assert!(instantiate_grain(&tiny, &buffer, 0.0, &envelopes, 0.001, &mut rng).is_none());
    }

    #[test]
    fn spread_stays_in_bounds() {
        let buffer = one_second_buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut rng = SmallRng::seed_from_u64(7);
        let params = GrainParameters {
            position: 0.1,
            spread: 1.0,
            pan: 0.95,
            grain_duration: 0.01,
            ..Default::default()
        };
        for _ in 0..200 {
            if let Some(grain) =
                instantiate_grain(&params, &buffer, 0.0, &envelopes, 0.001, &mut rng)
            {
                assert!((0.0..1.0).contains(&grain.source_offset));
                assert!(grain.source_offset <= 0.6 + 1e-9);
                assert!((-1.0..=1.0).contains(&grain.pan));
                assert!((grain.pan - 0.95).abs() <= 0.2 + 1e-6);
            }
        }
    }

    #[test]
    fn adsr_overrides_envelope() {
        let params = GrainParameters {
            envelope: Envelope::Triangle,
            adsr: Some(AdsrShape::default()),
            ..Default::default()
        };
        assert_eq!(
            params.effective_envelope(),
            Envelope::Adsr(AdsrShape::default())
        );
    }
}
