use std::{collections::HashMap, fmt};

use crate::{
    engine::EngineOptions, loudness::LoudnessCompensator, sink::GrainSink, voice::Voice,
};

// -------------------------------------------------------------------------------------------------

/// Driver category of a [`VoiceId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceSource {
    /// A live touch or pointer contact.
    Touch,
    /// A synthetic id used by automation playback.
    Automation,
    /// Any other id, outside of the predefined ranges.
    Other,
}

/// External identifier of a grain stream.
///
/// All drivers share one id space: touch ids occupy `[0, 2^32)` and automation ids
/// `[2^32, 2^33)`, so ids of different drivers never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(u64);

impl VoiceId {
    const AUTOMATION_BASE: u64 = 1 << 32;
    const OTHER_BASE: u64 = 1 << 33;

    pub fn touch(id: u32) -> Self {
        Self(id as u64)
    }

    pub fn automation(id: u32) -> Self {
        Self(Self::AUTOMATION_BASE + id as u64)
    }

    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn source(&self) -> VoiceSource {
        if self.0 < Self::AUTOMATION_BASE {
            VoiceSource::Touch
        } else if self.0 < Self::OTHER_BASE {
            VoiceSource::Automation
        } else {
            VoiceSource::Other
        }
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source() {
            VoiceSource::Touch => write!(f, "touch:{}", self.0),
            VoiceSource::Automation => write!(f, "automation:{}", self.0 - Self::AUTOMATION_BASE),
            VoiceSource::Other => write!(f, "voice:{}", self.0),
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Fixed size voice pool, mapping external stream ids to voice slots.
///
/// When all slots are in use, new streams are rejected rather than queued or stolen. Whenever the
/// number of active voices changes, the gain of all active voices is recomputed and ramped to
/// `base_level / √active_count`.
#[derive(Debug)]
pub struct VoiceAllocator {
    voices: Vec<Voice>,
    mapping: HashMap<VoiceId, usize>,
    loudness: LoudnessCompensator,
    gain_ramp: f64,
}

impl VoiceAllocator {
    pub fn new(options: &EngineOptions) -> Self {
        let voices = (0..options.voices)
            .map(|index| Voice::new(index, options))
            .collect();
        Self {
            voices,
            mapping: HashMap::with_capacity(options.voices),
            loudness: LoudnessCompensator::new(options.base_level),
            gain_ramp: options.gain_ramp.as_secs_f64(),
        }
    }

    /// Number of voice slots.
    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    /// Get the slot of the given id or claim the first idle slot for it.
    /// Returns None when the pool is exhausted.
    pub fn allocate<S: GrainSink + ?Sized>(
        &mut self,
        id: VoiceId,
        now: f64,
        sink: &mut S,
    ) -> Option<usize> {
        if let Some(index) = self.mapping.get(&id) {
            return Some(*index);
        }
        let Some(index) = self.voices.iter().position(|voice| !voice.is_active()) else {
            log::debug!("No free voice for {id}: all {} voices are busy", self.capacity());
            return None;
        };
        self.voices[index].claim(id);
        self.mapping.insert(id, index);
        log::debug!("Allocated voice {index} for {id}");
        self.update_gains(now, sink);
        Some(index)
    }

    /// Slot index of the given id, if mapped.
    pub fn slot_of(&self, id: VoiceId) -> Option<usize> {
        self.mapping.get(&id).copied()
    }

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.slot_of(id).map(|index| &self.voices[index])
    }

    pub fn voice_mut(&mut self, id: VoiceId) -> Option<&mut Voice> {
        self.slot_of(id).map(|index| &mut self.voices[index])
    }

    /// All voice slots, in slot order.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub(crate) fn voices_mut(&mut self) -> &mut [Voice] {
        &mut self.voices
    }

    /// Stop the voice of the given id, fading out its gain, and free its slot.
    /// Returns false when the id is not mapped.
    pub fn release<S: GrainSink + ?Sized>(&mut self, id: VoiceId, now: f64, sink: &mut S) -> bool {
        let Some(index) = self.mapping.remove(&id) else {
            return false;
        };
        self.voices[index].stop(now, sink);
        log::debug!("Released voice {index} of {id}");
        self.update_gains(now, sink);
        true
    }

    /// Stop scheduling new grains for the given id and free its slot, letting already scheduled
    /// grains play out at their current gain. Returns false when the id is not mapped.
    pub fn release_draining<S: GrainSink + ?Sized>(
        &mut self,
        id: VoiceId,
        now: f64,
        sink: &mut S,
    ) -> bool {
        let Some(index) = self.mapping.remove(&id) else {
            return false;
        };
        self.voices[index].release();
        log::debug!("Released voice {index} of {id}, draining scheduled grains");
        self.update_gains(now, sink);
        true
    }

    /// Stop all voices and clear all mappings. Draining voices are faded out too.
    pub fn release_all<S: GrainSink + ?Sized>(&mut self, now: f64, sink: &mut S) {
        for voice in &mut self.voices {
            if voice.is_active() || voice.gain() != 0.0 {
                voice.stop(now, sink);
            }
        }
        if !self.mapping.is_empty() {
            log::debug!("Released all {} voices", self.mapping.len());
        }
        self.mapping.clear();
        self.update_gains(now, sink);
    }

    /// Number of active voices.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_active()).count()
    }

    /// Gain which each active voice gets at the current occupancy.
    pub fn voice_gain(&self) -> f32 {
        self.loudness.voice_gain(self.active_count())
    }

    fn update_gains<S: GrainSink + ?Sized>(&mut self, now: f64, sink: &mut S) {
        let gain = self.voice_gain();
        for voice in self.voices.iter_mut().filter(|voice| voice.is_active()) {
            voice.set_gain(gain, now, self.gain_ramp, sink);
        }
    }
}

// -------------------------------------------------------------------------------------------------
