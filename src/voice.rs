use crossbeam_channel::Sender;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    allocator::VoiceId,
    buffer::SampleBuffer,
    engine::EngineOptions,
    envelope::{AdsrShape, Envelope, EnvelopeLibrary},
    grain::{instantiate_grain, GrainParameters, GrainStats},
    quantize::{
        normalized_to_exponential, semitones_to_rate, ArpConfig, ArpMode, ArpState, PitchQuantize,
        RhythmQuantize,
    },
    scheduler::{GrainScheduler, InterOnset, MIN_INTER_ONSET},
    sink::{GrainNotification, GrainSink},
};

// -------------------------------------------------------------------------------------------------

/// Grain duration in seconds for a normalized random draw of 0.
pub const LONGEST_GRAIN_DURATION: f64 = 1.0;
/// Grain duration in seconds for a normalized random draw of 1.
pub const SHORTEST_GRAIN_DURATION: f64 = 0.005;

const MIN_PITCH_RATE: f64 = 1.0 / 16.0;
const MAX_PITCH_RATE: f64 = 16.0;

// -------------------------------------------------------------------------------------------------

/// An inclusive value range for randomized parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    /// Create a new range. Swapped bounds are reordered.
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// True when both bounds are finite.
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Draw a uniformly distributed value. Ranges with non finite bounds return `min`.
    pub fn sample_uniform<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.is_finite() && self.max > self.min {
            rng.random_range(self.min..=self.max)
        } else {
            self.min
        }
    }

    /// Draw a log-uniformly distributed value. Falls back to a uniform draw when the range is not
    /// strictly positive.
    pub fn sample_log<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if !self.is_finite() || self.min <= 0.0 || self.max <= self.min {
            return self.sample_uniform(rng);
        }
        rng.random_range(self.min.ln()..=self.max.ln()).exp()
    }

    fn clamped(&self, min: f64, max: f64) -> Self {
        Self::new(self.min.clamp(min, max), self.max.clamp(min, max))
    }
}

// -------------------------------------------------------------------------------------------------

/// Live parameter state of a voice.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamState {
    /// Normalized position in the sample buffer.
    pub position: f64,
    pub amplitude: f32,
    /// Grain duration in seconds.
    pub grain_duration: f64,
    pub inter_onset: InterOnset,
    pub pitch_rate: f64,
    pub pan: f32,
    /// Normalized random position offset range.
    pub spread: f64,
    pub envelope: Envelope,
    /// Overrides `envelope` when set.
    pub adsr: Option<AdsrShape>,
    /// Normalized random grain duration range: 0 maps to long, 1 to short grains.
    pub grain_duration_random: Option<ValueRange>,
    /// Random playback rate range, drawn log-uniformly.
    pub pitch_random: Option<ValueRange>,
    /// Random pan range.
    pub pan_random: Option<ValueRange>,
    pub grain_duration_quantize: Option<RhythmQuantize>,
    pub inter_onset_quantize: Option<RhythmQuantize>,
    pub pitch_quantize: Option<PitchQuantize>,
    pub arpeggiator: Option<ArpConfig>,
}

impl Default for ParamState {
    fn default() -> Self {
        Self {
            position: 0.5,
            amplitude: 0.8,
            grain_duration: 0.1,
            inter_onset: InterOnset::Fixed(0.05),
            pitch_rate: 1.0,
            pan: 0.0,
            spread: 0.0,
            envelope: Envelope::Hann,
            adsr: None,
            grain_duration_random: None,
            pitch_random: None,
            pan_random: None,
            grain_duration_quantize: None,
            inter_onset_quantize: None,
            pitch_quantize: None,
            arpeggiator: None,
        }
    }
}

impl ParamState {
    /// Merge all fields which are set in the given update, clamping them into their valid range.
    /// Non finite values and ranges with non finite bounds are ignored.
    pub fn apply(&mut self, update: &ParamUpdate) {
        fn merge(target: &mut f64, value: Option<f64>, min: f64, max: f64) {
            if let Some(value) = value.filter(|v| v.is_finite()) {
                *target = value.clamp(min, max);
            }
        }
        fn merge_f32(target: &mut f32, value: Option<f32>, min: f32, max: f32) {
            if let Some(value) = value.filter(|v| v.is_finite()) {
                *target = value.clamp(min, max);
            }
        }
        merge(&mut self.position, update.position, 0.0, 1.0);
        merge_f32(&mut self.amplitude, update.amplitude, 0.0, 1.0);
        merge(&mut self.grain_duration, update.grain_duration, 0.001, 10.0);
        merge(&mut self.pitch_rate, update.pitch_rate, MIN_PITCH_RATE, MAX_PITCH_RATE);
        merge_f32(&mut self.pan, update.pan, -1.0, 1.0);
        merge(&mut self.spread, update.spread, 0.0, 1.0);

        if let Some(seconds) = update.inter_onset.filter(|v| v.is_finite()) {
            self.inter_onset = InterOnset::Fixed(seconds.clamp(MIN_INTER_ONSET, 10.0));
        }
        if let Some((min, max)) = update
            .inter_onset_range
            .filter(|(min, max)| min.is_finite() && max.is_finite())
        {
            self.inter_onset = InterOnset::range(min, max);
        }

        if let Some(envelope) = update.envelope {
            self.envelope = envelope;
        }
        if let Some(adsr) = update.adsr {
            self.adsr = adsr.map(|shape| shape.normalized());
        }
        if let Some(range) = update
            .grain_duration_random
            .filter(|range| range.is_none_or(|r| r.is_finite()))
        {
            self.grain_duration_random = range.map(|r| r.clamped(0.0, 1.0));
        }
        if let Some(range) = update
            .pitch_random
            .filter(|range| range.is_none_or(|r| r.is_finite()))
        {
            self.pitch_random = range.map(|r| r.clamped(MIN_PITCH_RATE, MAX_PITCH_RATE));
        }
        if let Some(range) = update
            .pan_random
            .filter(|range| range.is_none_or(|r| r.is_finite()))
        {
            self.pan_random = range.map(|r| r.clamped(-1.0, 1.0));
        }
        if let Some(quantize) = update.grain_duration_quantize {
            self.grain_duration_quantize = quantize;
        }
        if let Some(quantize) = update.inter_onset_quantize {
            self.inter_onset_quantize = quantize;
        }
        if let Some(quantize) = &update.pitch_quantize {
            self.pitch_quantize = quantize.clone();
        }
        if let Some(arpeggiator) = &update.arpeggiator {
            self.arpeggiator = arpeggiator.clone();
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// A partial voice parameter update. Only fields which are set get merged into the voice's
/// [`ParamState`]. Optional features use a nested option: `Some(None)` clears the feature, while
/// `None` leaves it untouched.
///
/// Setting a fixed inter-onset time disables a previously set inter-onset range and vice versa.
/// When both are set in the same update, the range wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamUpdate {
    pub position: Option<f64>,
    pub amplitude: Option<f32>,
    pub grain_duration: Option<f64>,
    pub inter_onset: Option<f64>,
    pub inter_onset_range: Option<(f64, f64)>,
    pub pitch_rate: Option<f64>,
    pub pan: Option<f32>,
    pub spread: Option<f64>,
    pub envelope: Option<Envelope>,
    pub adsr: Option<Option<AdsrShape>>,
    pub grain_duration_random: Option<Option<ValueRange>>,
    pub pitch_random: Option<Option<ValueRange>>,
    pub pan_random: Option<Option<ValueRange>>,
    pub grain_duration_quantize: Option<Option<RhythmQuantize>>,
    pub inter_onset_quantize: Option<Option<RhythmQuantize>>,
    pub pitch_quantize: Option<Option<PitchQuantize>>,
    pub arpeggiator: Option<Option<ArpConfig>>,
}

impl ParamUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn with_position(mut self, position: f64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = Some(amplitude);
        self
    }

    pub fn with_grain_duration(mut self, seconds: f64) -> Self {
        self.grain_duration = Some(seconds);
        self
    }

    /// Set a fixed inter-onset time in seconds.
    pub fn with_inter_onset(mut self, seconds: f64) -> Self {
        self.inter_onset = Some(seconds);
        self
    }

    /// Set a normalized random inter-onset range: 0 is slow, 1 is fast.
    pub fn with_inter_onset_range(mut self, min: f64, max: f64) -> Self {
        self.inter_onset_range = Some((min, max));
        self
    }

    pub fn with_pitch_rate(mut self, rate: f64) -> Self {
        self.pitch_rate = Some(rate);
        self
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = Some(pan);
        self
    }

    pub fn with_spread(mut self, spread: f64) -> Self {
        self.spread = Some(spread);
        self
    }

    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn with_adsr(mut self, adsr: Option<AdsrShape>) -> Self {
        self.adsr = Some(adsr);
        self
    }

    pub fn with_grain_duration_random(mut self, range: Option<ValueRange>) -> Self {
        self.grain_duration_random = Some(range);
        self
    }

    pub fn with_pitch_random(mut self, range: Option<ValueRange>) -> Self {
        self.pitch_random = Some(range);
        self
    }

    pub fn with_pan_random(mut self, range: Option<ValueRange>) -> Self {
        self.pan_random = Some(range);
        self
    }

    pub fn with_grain_duration_quantize(mut self, quantize: Option<RhythmQuantize>) -> Self {
        self.grain_duration_quantize = Some(quantize);
        self
    }

    pub fn with_inter_onset_quantize(mut self, quantize: Option<RhythmQuantize>) -> Self {
        self.inter_onset_quantize = Some(quantize);
        self
    }

    pub fn with_pitch_quantize(mut self, quantize: Option<PitchQuantize>) -> Self {
        self.pitch_quantize = Some(quantize);
        self
    }

    pub fn with_arpeggiator(mut self, config: Option<ArpConfig>) -> Self {
        self.arpeggiator = Some(config);
        self
    }
}

// -------------------------------------------------------------------------------------------------

/// A single stream of grains in the voice pool.
///
/// A voice owns its live parameter state, its grain scheduler and its arpeggiator cursor, and
/// resolves the concrete parameters of each grain whenever its scheduler commits an onset.
#[derive(Debug)]
pub struct Voice {
    index: usize,
    id: Option<VoiceId>,
    active: bool,
    params: ParamState,
    scheduler: GrainScheduler,
    arp: Option<ArpState>,
    gain: f32,
    rng: SmallRng,
    stats: GrainStats,
    stop_fade: f64,
    min_grain_duration: f64,
}

impl Voice {
    pub fn new(index: usize, options: &EngineOptions) -> Self {
        let mut rng = match options.seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => SmallRng::from_os_rng(),
        };
        let scheduler_rng = SmallRng::from_rng(&mut rng);
        Self {
            index,
            id: None,
            active: false,
            params: ParamState::default(),
            scheduler: GrainScheduler::new(
                options.schedule_ahead,
                options.tick_interval,
                scheduler_rng,
            ),
            arp: None,
            gain: 0.0,
            rng,
            stats: GrainStats::default(),
            stop_fade: options.stop_fade.as_secs_f64(),
            min_grain_duration: options.min_grain_duration.as_secs_f64(),
        }
    }

    /// Pool slot index. Never changes.
    pub fn index(&self) -> usize {
        self.index
    }

    /// External id of the stream this voice currently plays, if any.
    pub fn id(&self) -> Option<VoiceId> {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn params(&self) -> &ParamState {
        &self.params
    }

    pub fn scheduler(&self) -> &GrainScheduler {
        &self.scheduler
    }

    pub fn arp_state(&self) -> Option<&ArpState> {
        self.arp.as_ref()
    }

    /// Last gain that got applied to the voice's output.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn stats(&self) -> GrainStats {
        self.stats
    }

    /// Bind the voice to an external stream id, resetting the previous stream's stats.
    pub(crate) fn claim(&mut self, id: VoiceId) {
        self.id = Some(id);
        self.active = true;
        self.stats = GrainStats::default();
    }

    /// Merge the given parameters, rewind the arpeggiator and start scheduling at `now`.
    pub fn start(&mut self, update: &ParamUpdate, now: f64) {
        self.params.apply(update);
        self.arp = self.params.arpeggiator.as_ref().map(ArpState::new);
        self.sync_scheduler();
        self.scheduler.start(now);
        self.active = true;
    }

    /// Merge a partial parameter update. Takes effect with the next committed onset.
    pub fn update(&mut self, update: &ParamUpdate) {
        self.params.apply(update);
        if update.arpeggiator.is_some() {
            self.arp = self.params.arpeggiator.as_ref().map(ArpState::new);
        }
        self.sync_scheduler();
    }

    /// Stop scheduling and fade out the voice's gain. Already scheduled grains keep playing
    /// through the fading gain.
    pub fn stop<S: GrainSink + ?Sized>(&mut self, now: f64, sink: &mut S) {
        self.halt();
        self.set_gain(0.0, now, self.stop_fade, sink);
    }

    /// Stop scheduling without touching the gain, so already scheduled grains play out.
    pub fn release(&mut self) {
        self.halt();
    }

    /// Ramp the voice's output gain to `gain`.
    pub fn set_gain<S: GrainSink + ?Sized>(&mut self, gain: f32, now: f64, ramp: f64, sink: &mut S) {
        self.gain = gain;
        sink.ramp_voice_gain(self.index, gain, now, ramp);
    }

    /// Commit all grains of the current look-ahead window to the sink.
    /// Returns the number of emitted grains.
    pub fn tick<S: GrainSink + ?Sized>(
        &mut self,
        now: f64,
        buffer: &SampleBuffer,
        envelopes: &EnvelopeLibrary,
        sink: &mut S,
        observer: Option<&Sender<GrainNotification>>,
    ) -> usize {
        if !self.active {
            return 0;
        }
        let Self {
            index,
            id,
            params,
            scheduler,
            arp,
            rng,
            stats,
            min_grain_duration,
            ..
        } = self;

        let buffer_duration = buffer.duration();
        let mut emitted = 0;
        scheduler.tick(now, |when, inter_onset| {
            let Some(grain_params) =
                resolve_grain(params, arp.as_mut(), inter_onset, &mut *rng)
            else {
                stats.muted += 1;
                return;
            };
            let Some(grain) = instantiate_grain(
                &grain_params,
                buffer,
                when,
                envelopes,
                *min_grain_duration,
                &mut *rng,
            ) else {
                stats.dropped += 1;
                return;
            };
            if let (Some(observer), Some(id)) = (observer, *id) {
                let _ = observer.try_send(GrainNotification {
                    voice: id,
                    position: grain.source_offset / buffer_duration,
                    duration: grain.duration,
                    amplitude: grain.amplitude_scale,
                    pitch: grain.pitch_rate,
                    start_time: grain.start_time,
                });
            }
            sink.schedule_grain(*index, grain);
            stats.emitted += 1;
            emitted += 1;
        });
        emitted
    }

    fn halt(&mut self) {
        self.scheduler.stop();
        self.active = false;
        self.id = None;
    }

    fn sync_scheduler(&mut self) {
        self.scheduler.set_inter_onset(self.params.inter_onset);
        self.scheduler.set_quantize(self.params.inter_onset_quantize);
    }
}

// -------------------------------------------------------------------------------------------------

/// Resolve the concrete parameters of a single grain. Returns None for muted arpeggiator steps.
fn resolve_grain<R: Rng + ?Sized>(
    params: &ParamState,
    arp: Option<&mut ArpState>,
    inter_onset: f64,
    rng: &mut R,
) -> Option<GrainParameters> {
    let mut grain_duration = params.grain_duration;
    if let Some(range) = params.grain_duration_random {
        let value = range.sample_uniform(rng);
        grain_duration = match params.grain_duration_quantize {
            Some(quantize) => quantize.seconds_for(value),
            None => {
                normalized_to_exponential(value, LONGEST_GRAIN_DURATION, SHORTEST_GRAIN_DURATION)
            }
        };
    }

    let pitch_rate = match arp {
        Some(arp) if arp.mode() == ArpMode::Sequence => match arp.next_step() {
            Some(step) if step.muted => return None,
            Some(step) => semitones_to_rate(step.semitones as f64),
            None => params.pitch_rate,
        },
        Some(arp) => arp
            .random_note(rng)
            .map_or(params.pitch_rate, |note| semitones_to_rate(note as f64)),
        None => {
            let mut rate = params.pitch_rate;
            if let Some(range) = params.pitch_random {
                rate = range.sample_log(rng);
            }
            if let Some(quantize) = &params.pitch_quantize {
                rate = quantize.apply(rate);
            }
            rate
        }
    };

    let pan = match params.pan_random {
        Some(range) => range.sample_uniform(rng).clamp(-1.0, 1.0) as f32,
        None => params.pan,
    };

    Some(GrainParameters {
        position: params.position,
        amplitude: params.amplitude,
        spread: params.spread,
        grain_duration,
        inter_onset,
        pitch_rate,
        pan,
        envelope: params.envelope,
        adsr: params.adsr,
    })
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{
        quantize::{rate_to_semitones, ArpPattern, ScalePreset},
        sink::RecordingSink,
    };

    fn voice() -> Voice {
        Voice::new(2, &EngineOptions::default().seed(1234))
    }

    fn buffer() -> SampleBuffer {
        SampleBuffer::from_mono(vec![0.0; 44100 * 2], 44100).unwrap()
    }

    #[test]
    fn update_merging() {
        let mut params = ParamState::default();
        params.apply(
            &ParamUpdate::new()
                .with_position(1.5)
                .with_amplitude(-1.0)
                .with_pan(0.25)
                .with_pitch_rate(f64::NAN),
        );
        assert_eq!(params.position, 1.0);
        assert_eq!(params.amplitude, 0.0);
        assert_eq!(params.pan, 0.25);
        assert_eq!(params.pitch_rate, 1.0);

        params.apply(&ParamUpdate::new().with_inter_onset_range(0.8, 0.2));
        assert_eq!(params.inter_onset, InterOnset::Range { min: 0.2, max: 0.8 });
        params.apply(&ParamUpdate::new().with_inter_onset(0.02));
        assert_eq!(params.inter_onset, InterOnset::Fixed(0.02));
        params.apply(
            &ParamUpdate::new()
                .with_inter_onset(0.02)
                .with_inter_onset_range(0.0, 1.0),
        );
        assert_eq!(params.inter_onset, InterOnset::Range { min: 0.0, max: 1.0 });

        // absent fields are untouched, nested none clears
        params.apply(&ParamUpdate::new().with_pan_random(Some(ValueRange::new(-2.0, 0.5))));
        assert_eq!(params.pan_random, Some(ValueRange::new(-1.0, 0.5)));
        params.apply(&ParamUpdate::new().with_spread(0.5));
        assert!(params.pan_random.is_some());
        params.apply(&ParamUpdate::new().with_pan_random(None));
        assert!(params.pan_random.is_none());

        assert!(ParamUpdate::new().is_empty());
        assert!(!ParamUpdate::new().with_spread(0.1).is_empty());
    }

    #[test]
    fn value_ranges() {
        let mut rng = SmallRng::seed_from_u64(3);
        let range = ValueRange::new(2.0, 0.5);
        assert_eq!(range.min, 0.5);
        for _ in 0..100 {
            let value = range.sample_log(&mut rng);
            assert!((0.5..=2.0).contains(&value));
            let value = range.sample_uniform(&mut rng);
            assert!((0.5..=2.0).contains(&value));
        }
        assert_eq!(ValueRange::new(0.3, 0.3).sample_log(&mut rng), 0.3);
    }

    #[test]
    fn non_finite_ranges_are_ignored() {
        let mut params = ParamState::default();
        params.apply(&ParamUpdate::new().with_pan_random(Some(ValueRange::new(-0.5, 0.5))));
        params.apply(
            &ParamUpdate::new()
                .with_pitch_random(Some(ValueRange::new(f64::NAN, 2.0)))
                .with_pan_random(Some(ValueRange::new(0.0, f64::INFINITY)))
                .with_grain_duration_random(Some(ValueRange::new(f64::NAN, f64::NAN)))
                .with_inter_onset_range(f64::NAN, 0.5),
        );
        assert_eq!(params.pitch_random, None);
        assert_eq!(params.pan_random, Some(ValueRange::new(-0.5, 0.5)));
        assert_eq!(params.grain_duration_random, None);
        assert_eq!(params.inter_onset, InterOnset::Fixed(0.05));

        let mut rng = SmallRng::seed_from_u64(1);
        let range = ValueRange {
            min: f64::NAN,
            max: 2.0,
        };
        assert!(range.sample_log(&mut rng).is_nan());
        let range = ValueRange::new(0.5, f64::INFINITY);
        assert_eq!(range.sample_uniform(&mut rng), 0.5);
        assert_eq!(range.sample_log(&mut rng), 0.5);
    }

    #[test]
    fn non_finite_ranges_keep_scheduling() {
        let buffer = buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut voice = voice();
        let mut sink = RecordingSink::new();
        voice.claim(VoiceId::touch(0));
        voice.start(
            &ParamUpdate::new()
                .with_inter_onset(0.03)
                .with_pitch_random(Some(ValueRange::new(f64::NAN, 2.0)))
                .with_pan_random(Some(ValueRange::new(f64::NAN, 1.0)))
                .with_grain_duration_random(Some(ValueRange::new(0.0, f64::NAN)))
                .with_inter_onset_range(0.0, f64::NAN),
            0.0,
        );
        assert_eq!(voice.tick(0.0, &buffer, &envelopes, &mut sink, None), 4);
        for (_, grain) in sink.grains() {
            assert_eq!(grain.pitch_rate, 1.0);
            assert_eq!(grain.pan, 0.0);
            assert!((grain.duration - 0.1).abs() < 1e-9);
        }
    }

    #[test]
    fn claiming_resets_stats() {
        let buffer = buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut voice = voice();
        let mut sink = RecordingSink::new();
        voice.claim(VoiceId::touch(0));
        voice.start(&ParamUpdate::new().with_inter_onset(0.03), 0.0);
        voice.tick(0.0, &buffer, &envelopes, &mut sink, None);
        assert_eq!(voice.stats().emitted, 4);
        voice.stop(0.05, &mut sink);

        voice.claim(VoiceId::touch(1));
        assert_eq!(voice.stats(), GrainStats::default());
        voice.start(&ParamUpdate::new(), 1.0);
        voice.tick(1.0, &buffer, &envelopes, &mut sink, None);
        assert_eq!(voice.stats().emitted, 4);
    }

    #[test]
    fn start_and_tick() {
        let mut voice = voice();
        let mut sink = RecordingSink::new();
        let envelopes = EnvelopeLibrary::new();
        let buffer = buffer();

        voice.claim(VoiceId::touch(7));
        voice.start(&ParamUpdate::new().with_inter_onset(0.03), 5.0);
        assert!(voice.is_active());
        assert_eq!(voice.id(), Some(VoiceId::touch(7)));

        let emitted = voice.tick(5.0, &buffer, &envelopes, &mut sink, None);
        assert_eq!(emitted, 4);
        let times = sink
            .grains()
            .map(|(voice, grain)| {
                assert_eq!(voice, 2);
                grain.start_time
            })
            .collect::<Vec<_>>();
        for (time, expected) in times.iter().zip([5.0, 5.03, 5.06, 5.09]) {
            assert!((time - expected).abs() < 1e-9);
        }
        assert_eq!(voice.stats().emitted, 4);
    }

    #[test]
    fn stop_fades_out_and_release_keeps_gain() {
        let buffer = buffer();
        let envelopes = EnvelopeLibrary::new();

        let mut voice = voice();
        let mut sink = RecordingSink::new();
        voice.claim(VoiceId::touch(1));
        voice.start(&ParamUpdate::new(), 0.0);
        voice.set_gain(0.4, 0.0, 0.02, &mut sink);
        voice.tick(0.0, &buffer, &envelopes, &mut sink, None);
        voice.stop(0.05, &mut sink);
        assert!(!voice.is_active());
        assert_eq!(voice.id(), None);
        assert_eq!(
            sink.gain_changes().last(),
            Some((2, 0.0, 0.05, EngineOptions::default().stop_fade.as_secs_f64()))
        );
        let grains = sink.grains().count();
        assert_eq!(voice.tick(1.0, &buffer, &envelopes, &mut sink, None), 0);
        assert_eq!(sink.grains().count(), grains);

        let mut voice = self::voice();
        let mut sink = RecordingSink::new();
        voice.claim(VoiceId::touch(1));
        voice.start(&ParamUpdate::new(), 0.0);
        voice.set_gain(0.4, 0.0, 0.02, &mut sink);
        voice.release();
        assert_eq!(voice.gain(), 0.4);
        assert_eq!(sink.gain_changes().count(), 1);
        assert_eq!(voice.tick(1.0, &buffer, &envelopes, &mut sink, None), 0);
    }

    #[test]
    fn muted_arp_steps_skip_grains() {
        let buffer = buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut voice = voice();
        let mut sink = RecordingSink::new();

        let pattern = ArpPattern::new(vec![0, 1, 2, 3], vec![false, true, false, true]);
        let config = ArpConfig::default().with_range(0, 12).with_pattern(pattern);
        voice.start(
            &ParamUpdate::new()
                .with_inter_onset(0.03)
                .with_arpeggiator(Some(config)),
            0.0,
        );
        // onsets at 0, 0.03, 0.06, 0.09
        voice.tick(0.0, &buffer, &envelopes, &mut sink, None);
        assert_eq!(voice.stats().emitted, 2);
        assert_eq!(voice.stats().muted, 2);
        let semitones = sink
            .grains()
            .map(|(_, grain)| rate_to_semitones(grain.pitch_rate).round() as i32)
            .collect::<Vec<_>>();
        assert_eq!(semitones, vec![0, 4]);

        // restarting rewinds the cursor
        voice.start(&ParamUpdate::new(), 1.0);
        sink.clear();
        voice.tick(1.0, &buffer, &envelopes, &mut sink, None);
        assert_eq!(
            sink.grains()
                .next()
                .map(|(_, grain)| rate_to_semitones(grain.pitch_rate).round() as i32),
            Some(0)
        );
    }

    #[test]
    fn random_pitch_snaps_to_scale() {
        let buffer = buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut voice = voice();
        let mut sink = RecordingSink::new();
        voice.start(
            &ParamUpdate::new()
                .with_inter_onset(0.005)
                .with_pitch_random(Some(ValueRange::new(0.5, 2.0)))
                .with_pitch_quantize(Some(PitchQuantize::from_preset(ScalePreset::Major, 0))),
            0.0,
        );
        voice.tick(0.0, &buffer, &envelopes, &mut sink, None);
        assert!(sink.grains().count() > 10);
        for (_, grain) in sink.grains() {
            let semitones = rate_to_semitones(grain.pitch_rate);
            assert!((semitones - semitones.round()).abs() < 1e-6);
            let degree = (semitones.round() as i32).rem_euclid(12);
            assert!(ScalePreset::Major.intervals().contains(&degree));
        }
    }

    #[test]
    fn quantized_grain_durations() {
        let buffer = buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut voice = voice();
        let mut sink = RecordingSink::new();
        voice.start(
            &ParamUpdate::new()
                .with_position(0.0)
                .with_inter_onset(0.01)
                .with_grain_duration_random(Some(ValueRange::new(0.5, 1.0)))
                .with_grain_duration_quantize(Some(RhythmQuantize::new(120.0))),
            0.0,
        );
        voice.tick(0.0, &buffer, &envelopes, &mut sink, None);
        let grid = crate::quantize::SUBDIVISIONS.map(|subdivision| subdivision.seconds(120.0));
        for (_, grain) in sink.grains() {
            assert!(grid.iter().any(|seconds| (seconds - grain.duration).abs() < 1e-12));
        }
    }

    #[test]
    fn grain_observer() {
        let buffer = buffer();
        let envelopes = EnvelopeLibrary::new();
        let mut voice = voice();
        let mut sink = RecordingSink::new();
        let (sender, receiver) = crossbeam_channel::bounded(2);

        voice.claim(VoiceId::automation(3));
        voice.start(
            &ParamUpdate::new()
                .with_position(0.25)
                .with_inter_onset(0.03),
            0.0,
        );
        voice.tick(0.0, &buffer, &envelopes, &mut sink, Some(&sender));
        // a full observer channel never blocks scheduling
        assert_eq!(sink.grains().count(), 4);
        let notifications = receiver.try_iter().collect::<Vec<_>>();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[0].voice, VoiceId::automation(3));
        assert!((notifications[0].position - 0.25).abs() < 1e-9);
        assert_eq!(notifications[0].start_time, 0.0);
    }
}
