//! Audio plumbing between raw caller chunks and model frames.
//!
//! The model only ever sees 16 kHz mono frames of a fixed length. `Framer`
//! hides whether that takes a resampler or plain slicing of an owned carry
//! buffer (input already at 16 kHz). Input below 16 kHz is not interpolated:
//! each native sample is held for as many model samples as it covers.

pub mod resample;
pub mod wav;

use tracing::debug;

use crate::{
    buffering::SampleQueue,
    error::{Result, VadError},
};

use resample::{ResampleMode, Resampler};

/// Sample rate every Silero model variant runs at (Hz).
pub const MODEL_SAMPLE_RATE: u32 = 16_000;

/// Number of frames needed to cover at least `ms` milliseconds of 16 kHz audio.
pub fn frames_for_ms(ms: u32, frame_samples: usize) -> usize {
    if frame_samples == 0 {
        return 0;
    }
    let samples = (u64::from(ms) * u64::from(MODEL_SAMPLE_RATE)).div_ceil(1000);
    samples.div_ceil(frame_samples as u64) as usize
}

/// Duration of `frames` model frames in milliseconds.
pub fn frames_to_ms(frames: u64, frame_samples: usize) -> u64 {
    frames * frame_samples as u64 * 1000 / u64::from(MODEL_SAMPLE_RATE)
}

/// Turns arbitrary-length input chunks into model-sized 16 kHz frames.
pub enum Framer {
    /// Input already at 16 kHz: slice the carry buffer.
    Direct {
        queue: SampleQueue,
        frame_samples: usize,
    },
    /// Input at any other rate: convert, then frame.
    Resampled(Resampler),
}

impl Framer {
    /// Below 16 kHz `mode` is ignored and samples are held
    /// ([`ResampleMode::Average`] with an empty averaging window).
    ///
    /// # Errors
    /// `VadError::Configuration` for a zero sample rate or frame size.
    pub fn new(sample_rate: u32, frame_samples: usize, mode: ResampleMode) -> Result<Self> {
        if frame_samples == 0 {
            return Err(VadError::Configuration(
                "frame size must be non-zero".into(),
            ));
        }
        if sample_rate == MODEL_SAMPLE_RATE {
            debug!(frame_samples, "framing 16 kHz input directly");
            return Ok(Self::Direct {
                queue: SampleQueue::new(),
                frame_samples,
            });
        }
        let mode = if sample_rate < MODEL_SAMPLE_RATE {
            debug!(sample_rate, "holding samples up to the model rate");
            ResampleMode::Average
        } else {
            mode
        };
        Ok(Self::Resampled(Resampler::new(
            sample_rate,
            MODEL_SAMPLE_RATE,
            frame_samples,
            mode,
        )?))
    }

    /// Buffer `samples` and return every frame that is now complete, in order.
    ///
    /// # Errors
    /// `VadError::Inference` if the rate converter fails.
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Direct {
                queue,
                frame_samples,
            } => {
                queue.push(samples);
                Ok(std::iter::from_fn(|| queue.pop_frame(*frame_samples)).collect())
            }
            Self::Resampled(resampler) => resampler.process(samples).collect(),
        }
    }

    /// Return whatever is left as zero-padded frames and empty the buffers.
    ///
    /// # Errors
    /// `VadError::Inference` if the rate converter fails.
    pub fn flush(&mut self) -> Result<Vec<Vec<f32>>> {
        match self {
            Self::Direct {
                queue,
                frame_samples,
            } => {
                let mut frames: Vec<Vec<f32>> =
                    std::iter::from_fn(|| queue.pop_frame(*frame_samples)).collect();
                frames.extend(queue.drain_padded(*frame_samples));
                Ok(frames)
            }
            Self::Resampled(resampler) => resampler.flush(),
        }
    }

    /// Discard buffered samples without producing frames.
    pub fn clear(&mut self) {
        match self {
            Self::Direct { queue, .. } => queue.clear(),
            Self::Resampled(resampler) => resampler.reset(),
        }
    }

    pub fn is_resampling(&self) -> bool {
        matches!(self, Self::Resampled(_))
    }
}
