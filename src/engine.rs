use std::{path::Path, sync::Arc, time::Duration};

use crossbeam_channel::Sender;

use crate::{
    allocator::{VoiceAllocator, VoiceId},
    buffer::SampleBuffer,
    envelope::EnvelopeLibrary,
    error::Error,
    grain::GrainStats,
    loudness::DEFAULT_BASE_LEVEL,
    sink::{GrainNotification, GrainSink},
    time::{MusicalClock, TimeSource},
    voice::{ParamUpdate, Voice},
};

// -------------------------------------------------------------------------------------------------

/// Options for creating a new [`Engine`].
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// By default 12. Number of voices which can play concurrently.
    pub voices: usize,

    /// By default 0.4. Output level of a single active voice. With more voices playing, each
    /// voice is scaled by `1/√active_count` of this level.
    pub base_level: f32,

    /// By default 100ms. How far into the future grains get scheduled.
    pub schedule_ahead: Duration,

    /// By default 25ms. Minimum time between two look-ahead passes of a voice. Must be shorter
    /// than `schedule_ahead`.
    pub tick_interval: Duration,

    /// By default 30ms. Gain fade-out time of stopped voices.
    pub stop_fade: Duration,

    /// By default 20ms. Ramp time of voice gain changes, when the number of active voices changes.
    pub gain_ramp: Duration,

    /// By default 1ms. Grains which would be shorter than this are dropped.
    pub min_grain_duration: Duration,

    /// By default None, which seeds all random generators from the OS. When set, all random
    /// decisions are reproducible.
    pub seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            voices: 12,
            base_level: DEFAULT_BASE_LEVEL,
            schedule_ahead: Duration::from_millis(100),
            tick_interval: Duration::from_millis(25),
            stop_fade: Duration::from_millis(30),
            gain_ramp: Duration::from_millis(20),
            min_grain_duration: Duration::from_millis(1),
            seed: None,
        }
    }
}

impl EngineOptions {
    pub fn voices(mut self, voices: usize) -> Self {
        self.voices = voices;
        self
    }

    pub fn base_level(mut self, level: f32) -> Self {
        self.base_level = level;
        self
    }

    pub fn schedule_ahead(mut self, duration: Duration) -> Self {
        self.schedule_ahead = duration;
        self
    }

    pub fn tick_interval(mut self, duration: Duration) -> Self {
        self.tick_interval = duration;
        self
    }

    pub fn stop_fade(mut self, duration: Duration) -> Self {
        self.stop_fade = duration;
        self
    }

    pub fn gain_ramp(mut self, duration: Duration) -> Self {
        self.gain_ramp = duration;
        self
    }

    pub fn min_grain_duration(mut self, duration: Duration) -> Self {
        self.min_grain_duration = duration;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate all parameters. Returns Error::ParameterError on errors.
    pub fn validate(&self) -> Result<(), Error> {
        if self.voices == 0 {
            return Err(Error::ParameterError(
                "engine options 'voices' must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.base_level) {
            return Err(Error::ParameterError(format!(
                "engine options 'base_level' value is '{}'",
                self.base_level
            )));
        }
        if self.tick_interval.is_zero() || self.tick_interval >= self.schedule_ahead {
            return Err(Error::ParameterError(format!(
                "engine options 'tick_interval' ({:?}) must be > 0 and shorter than 'schedule_ahead' ({:?})",
                self.tick_interval, self.schedule_ahead
            )));
        }
        if self.min_grain_duration.is_zero() {
            return Err(Error::ParameterError(
                "engine options 'min_grain_duration' must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Granular engine façade: binds a voice pool to a shared sample buffer, a time source and an
/// output sink.
///
/// All operations are keyed by external [`VoiceId`]s and never fail: exhausted voice pools,
/// unknown ids or a missing sample buffer are logged and ignored. The host must call
/// [`Self::tick`] regularly, at least once per look-ahead window, to keep all voices fed.
///
/// The engine is `Send`, but not `Sync`: drive it from a single control thread, or wrap it
/// into a `Mutex` when voices get started or updated from other threads.
pub struct Engine<S: GrainSink> {
    options: EngineOptions,
    allocator: VoiceAllocator,
    buffer: Option<Arc<SampleBuffer>>,
    sink: S,
    time: Arc<dyn TimeSource>,
    clock: MusicalClock,
    envelopes: Arc<EnvelopeLibrary>,
    observer: Option<Sender<GrainNotification>>,
}

impl<S: GrainSink> Engine<S> {
    /// Create a new engine without a sample buffer. The musical clock's epoch is set to the
    /// time source's current time.
    pub fn new(options: EngineOptions, sink: S, time: Arc<dyn TimeSource>) -> Result<Self, Error> {
        options.validate()?;
        let allocator = VoiceAllocator::new(&options);
        let mut clock = MusicalClock::default();
        clock.set_epoch(time.now());
        Ok(Self {
            options,
            allocator,
            buffer: None,
            sink,
            time,
            clock,
            envelopes: EnvelopeLibrary::shared(),
            observer: None,
        })
    }

    /// Use the given envelope cache instead of the process wide shared one.
    pub fn with_envelope_library(mut self, envelopes: Arc<EnvelopeLibrary>) -> Self {
        self.envelopes = envelopes;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Current time of the engine's time source.
    pub fn now(&self) -> f64 {
        self.time.now()
    }

    /// Set a new sample buffer. Stops all playing voices.
    pub fn load_buffer(&mut self, buffer: Arc<SampleBuffer>) {
        self.stop_all_voices();
        log::debug!(
            "Loaded sample buffer: {:.3}s, {} channels, {} Hz",
            buffer.duration(),
            buffer.channel_count(),
            buffer.sample_rate()
        );
        self.buffer = Some(buffer);
    }

    /// Decode the given audio file and set it as new sample buffer.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let buffer = SampleBuffer::from_file(path)?;
        self.load_buffer(Arc::new(buffer));
        Ok(())
    }

    pub fn buffer(&self) -> Option<&Arc<SampleBuffer>> {
        self.buffer.as_ref()
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Start a new grain stream for the given id and immediately schedule its first look-ahead
    /// window. Returns the voice slot index, or None when no buffer is loaded or all voices are
    /// busy. Starting an already playing id updates its parameters instead.
    pub fn start_voice(&mut self, id: VoiceId, params: &ParamUpdate) -> Option<usize> {
        let Some(buffer) = self.buffer.clone() else {
            log::warn!("Can't start voice {id}: no sample buffer loaded");
            return None;
        };
        let now = self.time.now();
        if let Some(voice) = self.allocator.voice_mut(id) {
            log::debug!("Voice {id} is already playing, updating it");
            voice.update(params);
            return Some(voice.index());
        }
        let index = self.allocator.allocate(id, now, &mut self.sink)?;
        let voice = &mut self.allocator.voices_mut()[index];
        voice.start(params, now);
        voice.tick(
            now,
            &buffer,
            &self.envelopes,
            &mut self.sink,
            self.observer.as_ref(),
        );
        Some(index)
    }

    /// Merge a partial parameter update into the given id's voice.
    /// Returns false when the id is not playing.
    pub fn update_voice(&mut self, id: VoiceId, params: &ParamUpdate) -> bool {
        match self.allocator.voice_mut(id) {
            Some(voice) => {
                voice.update(params);
                true
            }
            None => false,
        }
    }

    /// Stop the given id's voice, fading out its gain. Returns false when the id is not playing.
    pub fn stop_voice(&mut self, id: VoiceId) -> bool {
        let now = self.time.now();
        self.allocator.release(id, now, &mut self.sink)
    }

    /// Stop scheduling new grains for the given id, letting already scheduled grains play out.
    /// Returns false when the id is not playing.
    pub fn release_voice(&mut self, id: VoiceId) -> bool {
        let now = self.time.now();
        self.allocator.release_draining(id, now, &mut self.sink)
    }

    /// Stop all playing voices.
    pub fn stop_all_voices(&mut self) {
        let now = self.time.now();
        self.allocator.release_all(now, &mut self.sink);
    }

    /// Run the look-ahead pass of all playing voices. Returns the number of emitted grains.
    pub fn tick(&mut self) -> usize {
        let Some(buffer) = self.buffer.as_ref() else {
            return 0;
        };
        let now = self.time.now();
        let mut emitted = 0;
        for voice in self.allocator.voices_mut() {
            emitted += voice.tick(
                now,
                buffer,
                &self.envelopes,
                &mut self.sink,
                self.observer.as_ref(),
            );
        }
        emitted
    }

    pub fn active_voice_count(&self) -> usize {
        self.allocator.active_count()
    }

    /// Current gain of each active voice.
    pub fn voice_gain(&self) -> f32 {
        self.allocator.voice_gain()
    }

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.allocator.voice(id)
    }

    pub fn voice_stats(&self, id: VoiceId) -> Option<GrainStats> {
        self.allocator.voice(id).map(Voice::stats)
    }

    pub fn allocator(&self) -> &VoiceAllocator {
        &self.allocator
    }

    pub fn clock(&self) -> &MusicalClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut MusicalClock {
        &mut self.clock
    }

    /// Set or remove a channel which receives a notification for every emitted grain.
    /// Notifications are dropped when the channel is full.
    pub fn set_grain_observer(&mut self, observer: Option<Sender<GrainNotification>>) {
        self.observer = observer;
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

// -------------------------------------------------------------------------------------------------
