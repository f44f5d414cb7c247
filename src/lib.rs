#![doc = include_str!("../README.md")]

// private mods (will be partly re-exported)
mod allocator;
mod buffer;
mod engine;
mod envelope;
mod error;
mod gesture;
mod grain;
mod loudness;
mod scheduler;
mod sink;
mod voice;

// public, flat re-exports
pub use error::Error;

pub use allocator::{VoiceAllocator, VoiceId, VoiceSource};
pub use buffer::SampleBuffer;
pub use engine::{Engine, EngineOptions};
pub use envelope::{AdsrShape, Envelope, EnvelopeKind, EnvelopeLibrary};
pub use gesture::{GestureMapping, GestureState};
pub use grain::{instantiate_grain, Grain, GrainParameters, GrainStats};
pub use loudness::{LoudnessCompensator, DEFAULT_BASE_LEVEL};
pub use scheduler::{
    GrainScheduler, InterOnset, SchedulerState, FASTEST_INTER_ONSET, MIN_INTER_ONSET,
    SLOWEST_INTER_ONSET,
};
pub use sink::{GrainNotification, GrainSink, QueueSink, RecordingSink, SinkEvent};
pub use time::{ManualTimeSource, MusicalClock, SystemTimeSource, Ticker, TimeSource};
pub use voice::{
    ParamState, ParamUpdate, ValueRange, Voice, LONGEST_GRAIN_DURATION, SHORTEST_GRAIN_DURATION,
};

pub use quantize::{
    ArpConfig, ArpMode, ArpPattern, ArpPlayback, PitchQuantize, RhythmQuantize, ScalePreset,
    Subdivision,
};

// public mods
pub mod quantize;
pub mod time;
