//! Destinations for scheduled grains and voice gain changes.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use crate::{allocator::VoiceId, grain::Grain};

// -------------------------------------------------------------------------------------------------

/// Receives fully specified, fire-and-forget grains and per-voice gain ramps.
///
/// Grains are moved into the sink: once handed over, the scheduler keeps no reference to them
/// and can't cancel them anymore. Gain ramps address the destination gain node of a voice slot,
/// which all grains of that slot are rendered through.
pub trait GrainSink: Send {
    /// Schedule a grain on the given voice slot.
    fn schedule_grain(&mut self, voice_index: usize, grain: Grain);

    /// Ramp the given voice slot's gain to `gain`, starting at `at_time`, over `ramp` seconds.
    fn ramp_voice_gain(&mut self, voice_index: usize, gain: f32, at_time: f64, ramp: f64);
}

impl<S: GrainSink + ?Sized> GrainSink for Box<S> {
    fn schedule_grain(&mut self, voice_index: usize, grain: Grain) {
        (**self).schedule_grain(voice_index, grain);
    }

    fn ramp_voice_gain(&mut self, voice_index: usize, gain: f32, at_time: f64, ramp: f64) {
        (**self).ramp_voice_gain(voice_index, gain, at_time, ramp);
    }
}

// -------------------------------------------------------------------------------------------------

/// Events as passed to sinks.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Grain {
        voice: usize,
        grain: Grain,
    },
    Gain {
        voice: usize,
        gain: f32,
        at: f64,
        ramp: f64,
    },
}

// -------------------------------------------------------------------------------------------------

/// Sink which pushes all events into a bounded lock-free queue, which can be drained by an
/// audio renderer from another thread.
#[derive(Debug, Clone)]
pub struct QueueSink {
    queue: Arc<ArrayQueue<SinkEvent>>,
}

impl QueueSink {
    pub const DEFAULT_CAPACITY: usize = 4096;

    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
        }
    }

    /// Shared access to the queue for consumers.
    pub fn queue(&self) -> Arc<ArrayQueue<SinkEvent>> {
        Arc::clone(&self.queue)
    }

    /// Pop the oldest pending event.
    pub fn pop(&self) -> Option<SinkEvent> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn push(&self, event: SinkEvent) {
        if self.queue.push(event).is_err() {
            log::warn!("Grain sink queue is full, dropping event");
        }
    }
}

impl Default for QueueSink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl GrainSink for QueueSink {
    fn schedule_grain(&mut self, voice_index: usize, grain: Grain) {
        self.push(SinkEvent::Grain {
            voice: voice_index,
            grain,
        });
    }

    fn ramp_voice_gain(&mut self, voice_index: usize, gain: f32, at_time: f64, ramp: f64) {
        self.push(SinkEvent::Gain {
            voice: voice_index,
            gain,
            at: at_time,
            ramp,
        });
    }
}

// -------------------------------------------------------------------------------------------------

/// Sink which records all events in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    /// All recorded grains with their voice slot index.
    pub fn grains(&self) -> impl Iterator<Item = (usize, &Grain)> + '_ {
        self.events.iter().filter_map(|event| match event {
            SinkEvent::Grain { voice, grain } => Some((*voice, grain)),
            _ => None,
        })
    }

    /// All recorded gain changes as `(voice, gain, at, ramp)`.
    pub fn gain_changes(&self) -> impl Iterator<Item = (usize, f32, f64, f64)> + '_ {
        self.events.iter().filter_map(|event| match event {
            SinkEvent::Gain {
                voice,
                gain,
                at,
                ramp,
            } => Some((*voice, *gain, *at, *ramp)),
            _ => None,
        })
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl GrainSink for RecordingSink {
    fn schedule_grain(&mut self, voice_index: usize, grain: Grain) {
        self.events.push(SinkEvent::Grain {
            voice: voice_index,
            grain,
        });
    }

    fn ramp_voice_gain(&mut self, voice_index: usize, gain: f32, at_time: f64, ramp: f64) {
        self.events.push(SinkEvent::Gain {
            voice: voice_index,
            gain,
            at: at_time,
            ramp,
        });
    }
}

// -------------------------------------------------------------------------------------------------

/// Observational info about an emitted grain, e.g. for visualization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainNotification {
    pub voice: VoiceId,
    /// Normalized position in the sample buffer.
    pub position: f64,
    pub duration: f64,
    pub amplitude: f32,
    pub pitch: f64,
    pub start_time: f64,
}

// -------------------------------------------------------------------------------------------------
