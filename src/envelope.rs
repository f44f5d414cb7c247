//! Grain envelope shapes and a shared cache of sampled envelope curves.

use std::{
    f32::consts::PI,
    sync::{Arc, LazyLock},
};

use dashmap::DashMap;
use strum::{Display, EnumDiscriminants, EnumIter, EnumString, VariantNames};

// -------------------------------------------------------------------------------------------------

/// Attack, decay, sustain, release envelope shape, with all times expressed as fractions of the
/// grain's duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrShape {
    pub attack: f32,
    pub decay: f32,
    /// Sustain level in range `[0, 1]`.
    pub sustain: f32,
    pub release: f32,
}

impl Default for AdsrShape {
    fn default() -> Self {
        Self {
            attack: 0.1,
            decay: 0.2,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

impl AdsrShape {
    pub fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }

    /// Clamp all values to `[0, 1]` and scale down attack, decay and release when they together
    /// exceed the grain's duration.
    pub fn normalized(&self) -> Self {
        let sanitize = |value: f32| {
            if value.is_finite() {
                value.clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        let mut attack = sanitize(self.attack);
        let mut decay = sanitize(self.decay);
        let mut release = sanitize(self.release);
        let total = attack + decay + release;
        if total > 1.0 {
            attack /= total;
            decay /= total;
            release /= total;
        }
        Self {
            attack,
            decay,
            sustain: sanitize(self.sustain),
            release,
        }
    }

    fn value_at(&self, phase: f32) -> f32 {
        let Self {
            attack,
            decay,
            sustain,
            release,
        } = *self;
        if phase < attack {
            phase / attack
        } else if phase < attack + decay {
            1.0 - (1.0 - sustain) * (phase - attack) / decay
        } else if phase < 1.0 - release {
            sustain
        } else if release > 0.0 {
            sustain * (1.0 - phase) / release
        } else {
            sustain
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Grain envelope shape selector.
#[derive(Debug, Default, Clone, Copy, PartialEq, EnumDiscriminants)]
#[strum_discriminants(
    name(EnvelopeKind),
    derive(Hash, Display, EnumIter, EnumString, VariantNames)
)]
pub enum Envelope {
    /// Raised cosine.
    #[default]
    Hann,
    /// Tapered cosine with a flat top covering `flat_ratio` of the grain.
    Tukey { flat_ratio: f32 },
    Triangle,
    Gaussian,
    /// Logistic rise and mirrored fall.
    Sigmoid,
    Blackman,
    /// Short linear attack followed by an exponential decay.
    ExponentialDecay,
    /// Exponential rise followed by a short linear release.
    ReverseExponentialDecay,
    /// Explicit attack, decay, sustain, release polyline.
    Adsr(AdsrShape),
}

impl Envelope {
    const GAUSSIAN_SIGMA: f32 = 0.15;
    const SIGMOID_STEEPNESS: f32 = 12.0;
    const DECAY_ATTACK: f32 = 0.02;
    const DECAY_RATE: f32 = 6.0;
    const PARAM_RESOLUTION: f32 = 1000.0;

    pub fn kind(&self) -> EnvelopeKind {
        EnvelopeKind::from(self)
    }

    /// Evaluate the envelope at the given normalized phase in range `[0, 1]`.
    pub fn value_at(&self, phase: f32) -> f32 {
        let t = phase.clamp(0.0, 1.0);
        let value = match self {
            Self::Hann => 0.5 * (1.0 - (2.0 * PI * t).cos()),
            Self::Tukey { flat_ratio } => {
                let width = (1.0 - flat_ratio.clamp(0.0, 1.0)) / 2.0;
                if width <= 0.0 {
                    1.0
                } else if t < width {
                    0.5 * (1.0 - (PI * t / width).cos())
                } else if t > 1.0 - width {
                    0.5 * (1.0 - (PI * (1.0 - t) / width).cos())
                } else {
                    1.0
                }
            }
            Self::Triangle => 1.0 - (2.0 * t - 1.0).abs(),
            Self::Gaussian => {
                let x = (t - 0.5) / Self::GAUSSIAN_SIGMA;
                (-0.5 * x * x).exp()
            }
            Self::Sigmoid => {
                let logistic = |x: f32| 1.0 / (1.0 + (-Self::SIGMOID_STEEPNESS * (x - 0.25)).exp());
                let (low, high) = (logistic(0.0), logistic(0.5));
                (logistic(t.min(1.0 - t)) - low) / (high - low)
            }
            Self::Blackman => 0.42 - 0.5 * (2.0 * PI * t).cos() + 0.08 * (4.0 * PI * t).cos(),
            Self::ExponentialDecay => Self::exponential_decay(t),
            Self::ReverseExponentialDecay => Self::exponential_decay(1.0 - t),
            Self::Adsr(shape) => shape.normalized().value_at(t),
        };
        value.clamp(0.0, 1.0)
    }

    /// Sample the envelope into `length` values, with the first and last value at phase 0 and 1.
    pub fn generate(&self, length: usize) -> Vec<f32> {
        let length = length.max(2);
        let last = (length - 1) as f32;
        (0..length)
            .map(|index| self.value_at(index as f32 / last))
            .collect()
    }

    /// Copy of the envelope with its parameters rounded to the cache's resolution.
    fn rounded(&self) -> Self {
        let round = |value: f32| (value * Self::PARAM_RESOLUTION).round() / Self::PARAM_RESOLUTION;
        match *self {
            Self::Tukey { flat_ratio } => Self::Tukey {
                flat_ratio: round(flat_ratio.clamp(0.0, 1.0)),
            },
            Self::Adsr(shape) => {
                let shape = shape.normalized();
                Self::Adsr(AdsrShape {
                    attack: round(shape.attack),
                    decay: round(shape.decay),
                    sustain: round(shape.sustain),
                    release: round(shape.release),
                })
            }
            other => other,
        }
    }

    fn params(&self) -> [i32; 4] {
        let quantize = |value: f32| (value * Self::PARAM_RESOLUTION).round() as i32;
        match self {
            Self::Tukey { flat_ratio } => [quantize(*flat_ratio), 0, 0, 0],
            Self::Adsr(shape) => [
                quantize(shape.attack),
                quantize(shape.decay),
                quantize(shape.sustain),
                quantize(shape.release),
            ],
            _ => [0; 4],
        }
    }

    fn exponential_decay(t: f32) -> f32 {
        if t < Self::DECAY_ATTACK {
            t / Self::DECAY_ATTACK
        } else {
            (-Self::DECAY_RATE * (t - Self::DECAY_ATTACK) / (1.0 - Self::DECAY_ATTACK)).exp()
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EnvelopeKey {
    kind: EnvelopeKind,
    length: usize,
    params: [i32; 4],
}

/// Shared instance, used when no explicit library is given.
static SHARED_LIBRARY: LazyLock<Arc<EnvelopeLibrary>> =
    LazyLock::new(|| Arc::new(EnvelopeLibrary::new()));

/// Cache of sampled envelope curves, keyed by shape, length and rounded shape parameters.
///
/// The cache grows with every distinct key and is never evicted. Parameters are rounded to three
/// decimals, so continuously changing shape parameters only produce a bounded set of entries.
#[derive(Debug, Default)]
pub struct EnvelopeLibrary {
    cache: DashMap<EnvelopeKey, Arc<[f32]>>,
}

impl EnvelopeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process wide shared library.
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED_LIBRARY)
    }

    /// Curve length to use for a grain of the given duration in seconds.
    pub fn length_for_duration(duration: f64) -> usize {
        if duration < 0.05 {
            64
        } else if duration < 0.2 {
            128
        } else {
            256
        }
    }

    /// Get or create the sampled curve of the given envelope.
    pub fn curve(&self, envelope: &Envelope, length: usize) -> Arc<[f32]> {
        let length = length.max(2);
        let envelope = envelope.rounded();
        let key = EnvelopeKey {
            kind: envelope.kind(),
            length,
            params: envelope.params(),
        };
        if let Some(curve) = self.cache.get(&key) {
            return Arc::clone(curve.value());
        }
        let entry = self
            .cache
            .entry(key)
            .or_insert_with(|| Arc::from(envelope.generate(length)));
        Arc::clone(entry.value())
    }

    /// Number of cached curves.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

// -------------------------------------------------------------------------------------------------
