//! Musical quantization helpers: pitch to scale snapping, rhythmic subdivisions and normalized
//! control value mappings.

use strum::{Display, EnumIter, EnumString, VariantNames};

// -------------------------------------------------------------------------------------------------

mod arpeggio;

pub use arpeggio::{
    build_note_table, get_permutations, nth_permutation, select_arp_notes, ArpConfig, ArpMode,
    ArpPattern, ArpPlayback, ArpState, ArpStep, MAX_ARP_STEPS, MAX_NOTE_SPAN,
};

// -------------------------------------------------------------------------------------------------

/// Convert a playback rate to a pitch offset in semitones.
pub fn rate_to_semitones(rate: f64) -> f64 {
    12.0 * rate.log2()
}

/// Convert a pitch offset in semitones to a playback rate.
pub fn semitones_to_rate(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Snap an absolute pitch in semitones to the nearest degree of the given scale.
///
/// Scale degrees are scanned in the given order and the first degree with the minimal distance
/// wins, so exact ties resolve to the earlier listed degree. The next octave's root is picked
/// when it is strictly closer than all degrees. An empty scale returns the input unchanged.
pub fn quantize_pitch(semitones: f64, scale_intervals: &[i32], root_note: i32) -> f64 {
    if scale_intervals.is_empty() {
        return semitones;
    }
    let relative = semitones - root_note as f64;
    let octave = (relative / 12.0).floor();
    let within = relative - octave * 12.0;

    let mut best_degree = scale_intervals[0] as f64;
    let mut best_distance = (within - best_degree).abs();
    for &degree in &scale_intervals[1..] {
        let distance = (within - degree as f64).abs();
        if distance < best_distance {
            best_distance = distance;
            best_degree = degree as f64;
        }
    }
    if 12.0 - within < best_distance {
        return (octave + 1.0) * 12.0 + root_note as f64;
    }
    octave * 12.0 + best_degree + root_note as f64
}

// -------------------------------------------------------------------------------------------------

/// Predefined scales, usable as pitch quantization and arpeggiator source.
#[derive(
    Default, Clone, Copy, PartialEq, Eq, Debug, Display, EnumIter, EnumString, VariantNames,
)]
pub enum ScalePreset {
    #[default]
    Major,
    Minor,
    HarmonicMinor,
    PentatonicMajor,
    PentatonicMinor,
    Blues,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    Chromatic,
}

impl ScalePreset {
    /// Semitone intervals of the scale's degrees, relative to the root.
    pub fn intervals(&self) -> &'static [i32] {
        match self {
            Self::Major => &[0, 2, 4, 5, 7, 9, 11],
            Self::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Self::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Self::PentatonicMajor => &[0, 2, 4, 7, 9],
            Self::PentatonicMinor => &[0, 3, 5, 7, 10],
            Self::Blues => &[0, 3, 5, 6, 7, 10],
            Self::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Self::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Self::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Self::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Self::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Self::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Named rhythmic fractions of a whole note, ordered from slowest to fastest.
#[derive(
    Default, Clone, Copy, PartialEq, Eq, Debug, Display, EnumIter, EnumString, VariantNames,
)]
pub enum Subdivision {
    Whole,
    Half,
    HalfTriplet,
    #[default]
    Quarter,
    QuarterTriplet,
    Eighth,
    EighthTriplet,
    Sixteenth,
    SixteenthTriplet,
    ThirtySecond,
}

/// All subdivisions, ordered from slowest to fastest.
pub const SUBDIVISIONS: [Subdivision; 10] = [
    Subdivision::Whole,
    Subdivision::Half,
    Subdivision::HalfTriplet,
    Subdivision::Quarter,
    Subdivision::QuarterTriplet,
    Subdivision::Eighth,
    Subdivision::EighthTriplet,
    Subdivision::Sixteenth,
    Subdivision::SixteenthTriplet,
    Subdivision::ThirtySecond,
];

impl Subdivision {
    /// Number of subdivisions per whole note.
    pub fn divisor(&self) -> u32 {
        match self {
            Self::Whole => 1,
            Self::Half => 2,
            Self::HalfTriplet => 3,
            Self::Quarter => 4,
            Self::QuarterTriplet => 6,
            Self::Eighth => 8,
            Self::EighthTriplet => 12,
            Self::Sixteenth => 16,
            Self::SixteenthTriplet => 24,
            Self::ThirtySecond => 32,
        }
    }

    /// Duration of the subdivision in seconds at the given tempo.
    pub fn seconds(&self, bpm: f64) -> f64 {
        get_subdivision_seconds(bpm, self.divisor())
    }
}

/// Duration in seconds of a whole note divided by `divisor` at the given tempo.
pub fn get_subdivision_seconds(bpm: f64, divisor: u32) -> f64 {
    (60.0 / bpm) * (4.0 / divisor.max(1) as f64)
}

/// Find the subdivision whose duration at the given tempo is closest to `seconds`.
/// On ties the slower subdivision wins.
pub fn quantize_density(seconds: f64, bpm: f64) -> Subdivision {
    let mut best = SUBDIVISIONS[0];
    let mut best_distance = (best.seconds(bpm) - seconds).abs();
    for subdivision in &SUBDIVISIONS[1..] {
        let distance = (subdivision.seconds(bpm) - seconds).abs();
        if distance < best_distance {
            best = *subdivision;
            best_distance = distance;
        }
    }
    best
}

/// Map a normalized value to a subdivision: 0 selects the slowest, 1 the fastest one.
pub fn normalized_to_subdivision(value: f64) -> Subdivision {
    let max_index = (SUBDIVISIONS.len() - 1) as f64;
    let index = (value.clamp(0.0, 1.0) * max_index).round() as usize;
    SUBDIVISIONS[index]
}

/// Map a normalized value exponentially into the range `[from, to]`.
pub fn normalized_to_exponential(value: f64, from: f64, to: f64) -> f64 {
    debug_assert!(from > 0.0 && to > 0.0, "Expecting positive range bounds");
    from * (to / from).powf(value.clamp(0.0, 1.0))
}

// -------------------------------------------------------------------------------------------------

/// Rhythmic quantization config: snaps normalized random draws to tempo synced subdivisions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhythmQuantize {
    pub bpm: f64,
}

impl RhythmQuantize {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm: bpm.clamp(20.0, 999.0),
        }
    }

    /// Duration in seconds of the subdivision selected by the given normalized value.
    pub fn seconds_for(&self, value: f64) -> f64 {
        normalized_to_subdivision(value).seconds(self.bpm)
    }
}

/// Pitch quantization config: snaps pitches to the degrees of a scale.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchQuantize {
    pub scale: Vec<i32>,
    pub root: i32,
}

impl PitchQuantize {
    pub fn new(scale: &[i32], root: i32) -> Self {
        Self {
            scale: scale.to_vec(),
            root,
        }
    }

    pub fn from_preset(preset: ScalePreset, root: i32) -> Self {
        Self::new(preset.intervals(), root)
    }

    /// Snap the given playback rate to the nearest scale degree, returning a playback rate.
    pub fn apply(&self, rate: f64) -> f64 {
        let semitones = quantize_pitch(rate_to_semitones(rate), &self.scale, self.root);
        semitones_to_rate(semitones)
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use strum::IntoEnumIterator;

    fn assert_near(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn rate_conversion() {
        assert_near(rate_to_semitones(2.0), 12.0);
        assert_near(rate_to_semitones(0.5), -12.0);
        assert_near(semitones_to_rate(7.0), 2.0_f64.powf(7.0 / 12.0));
        assert_near(semitones_to_rate(rate_to_semitones(1.37)), 1.37);
    }

    #[test]
    fn pitch_quantization() {
        let major = ScalePreset::Major.intervals();
        // ties resolve to the first listed degree
        assert_near(quantize_pitch(1.0, major, 0), 0.0);
        assert_near(quantize_pitch(2.4, major, 0), 2.0);
        // octave up root
        assert_near(quantize_pitch(11.7, major, 0), 12.0);
        // negative input
        assert_near(quantize_pitch(-1.2, major, 0), -1.0);
        assert_near(quantize_pitch(-13.0, major, 0), -13.0);
        // root offset
        assert_near(quantize_pitch(3.0, major, 2), 2.0);
        assert_near(quantize_pitch(4.6, major, 2), 4.0);
        // empty scale
        assert_near(quantize_pitch(3.3, &[], 0), 3.3);
    }

    #[test]
    fn pitch_quantization_is_idempotent() {
        for preset in ScalePreset::iter() {
            for root in [-5, 0, 3] {
                for octave in -2..=2 {
                    for degree in preset.intervals() {
                        let pitch = (octave * 12 + degree + root) as f64;
                        assert_near(quantize_pitch(pitch, preset.intervals(), root), pitch);
                    }
                }
            }
        }
    }

    #[test]
    fn subdivisions() {
        assert_near(get_subdivision_seconds(120.0, 4), 0.5);
        assert_near(get_subdivision_seconds(120.0, 16), 0.125);
        for bpm in [40.0, 120.0, 300.0] {
            for pair in SUBDIVISIONS.windows(2) {
                assert!(pair[0].divisor() < pair[1].divisor());
                assert!(pair[0].seconds(bpm) > pair[1].seconds(bpm));
            }
        }
        assert_eq!(Subdivision::iter().count(), SUBDIVISIONS.len());
        assert_eq!(Subdivision::VARIANTS.len(), SUBDIVISIONS.len());
        assert_eq!("EighthTriplet".parse::<Subdivision>(), Ok(Subdivision::EighthTriplet));
    }

    #[test]
    fn density_quantization() {
        assert_eq!(quantize_density(0.5, 120.0), Subdivision::Quarter);
        assert_eq!(quantize_density(0.13, 120.0), Subdivision::Sixteenth);
        assert_eq!(quantize_density(100.0, 120.0), Subdivision::Whole);
        assert_eq!(quantize_density(0.0, 120.0), Subdivision::ThirtySecond);

        assert_eq!(normalized_to_subdivision(0.0), Subdivision::Whole);
        assert_eq!(normalized_to_subdivision(1.0), Subdivision::ThirtySecond);
        assert_eq!(normalized_to_subdivision(0.5), Subdivision::Eighth);

        let rhythm = RhythmQuantize::new(120.0);
        assert_near(rhythm.seconds_for(1.0), 0.0625);
    }

    #[test]
    fn exponential_mapping() {
        assert_near(normalized_to_exponential(0.0, 0.5, 0.005), 0.5);
        assert_near(normalized_to_exponential(1.0, 0.5, 0.005), 0.005);
        assert_near(normalized_to_exponential(0.5, 0.5, 0.005), 0.05);
    }

    #[test]
    fn pitch_quantize_config() {
        let quantize = PitchQuantize::from_preset(ScalePreset::Major, 0);
        assert_near(quantize.apply(semitones_to_rate(6.9)), semitones_to_rate(7.0));
        assert_near(quantize.apply(1.0), 1.0);
    }
}
