use std::path::Path;

use crate::error::Error;

// -------------------------------------------------------------------------------------------------

mod decoder;

use decoder::AudioDecoder;

// -------------------------------------------------------------------------------------------------

/// Immutable, interleaved audio sample buffer, shared by all voices of an engine.
///
/// Buffers are usually wrapped into an `Arc`, so they can be read from many voices and threads
/// without locking.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Box<[f32]>,
    channel_count: usize,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Create a new buffer from interleaved samples.
    pub fn new(samples: Vec<f32>, channel_count: usize, sample_rate: u32) -> Result<Self, Error> {
        if channel_count == 0 {
            return Err(Error::ParameterError(
                "sample buffer needs at least one channel".to_string(),
            ));
        }
        if sample_rate == 0 {
            return Err(Error::ParameterError(
                "sample buffer needs a valid sample rate".to_string(),
            ));
        }
        if samples.len() % channel_count != 0 {
            return Err(Error::ParameterError(format!(
                "sample count {} is not a multiple of the channel count {channel_count}",
                samples.len()
            )));
        }
        Ok(Self {
            samples: samples.into_boxed_slice(),
            channel_count,
            sample_rate,
        })
    }

    /// Create a new single channel buffer.
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self, Error> {
        Self::new(samples, 1, sample_rate)
    }

    /// Decode the given audio file into a new buffer.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut decoder = AudioDecoder::from_file(path)?;
        let (samples, channel_count, sample_rate) = decoder.decode_all()?;
        Self::new(samples, channel_count, sample_rate)
    }

    /// Decode the given encoded audio file contents into a new buffer.
    pub fn from_file_buffer(file_buffer: Vec<u8>) -> Result<Self, Error> {
        let mut decoder = AudioDecoder::from_buffer(file_buffer)?;
        let (samples, channel_count, sample_rate) = decoder.decode_all()?;
        Self::new(samples, channel_count, sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channel_count
    }

    /// Total duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Raw interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Samples of the given frame, one per channel. None when out of bounds.
    pub fn frame(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.channel_count)?;
        self.samples.get(start..start + self.channel_count)
    }

    /// Iterate over the samples of a single channel.
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = f32> + '_ {
        let skip = if channel < self.channel_count {
            channel
        } else {
            self.samples.len()
        };
        self.samples
            .iter()
            .skip(skip)
            .step_by(self.channel_count)
            .copied()
    }
}

// -------------------------------------------------------------------------------------------------
