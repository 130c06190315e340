//! Sample-rate conversion into fixed-size model frames.
//!
//! ## Design
//!
//! Callers push audio at whatever rate their source delivers (8–48 kHz is
//! typical for SIP media bridges). Silero needs 16 kHz frames of exactly 512
//! or 1536 samples. `Resampler` converts and frames in one step:
//!
//! ```text
//! native samples ─► input carry ─► Converter ─► target carry ─► frames
//! ```
//!
//! Two converters are available:
//!
//! - [`ResampleMode::Average`]: box-filter decimation. Output sample `j`
//!   is the mean of input samples `[ceil(j·r), ceil((j+1)·r))` with
//!   `r = native / target`, tracked with exact integer positions so no
//!   fractional drift accumulates across calls. At equal rates every output
//!   sample is exactly the input sample. When `r < 1` the range can be empty
//!   and the previous input sample is held (nearest neighbour).
//! - [`ResampleMode::Cubic`]: rubato `FastFixedIn` cubic interpolation, fed
//!   in 10 ms blocks.
//!
//! Frames are produced lazily by [`ResampledFrames`]; samples that do not yet
//! make a whole frame stay buffered until the next call or [`Resampler::flush`].

use rubato::{FastFixedIn, PolynomialDegree, Resampler as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, VadError};

/// Conversion algorithm used when the input rate differs from the model rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMode {
    /// Block-average decimation (nearest-neighbour when upsampling).
    #[default]
    Average,
    /// Cubic polynomial interpolation via rubato.
    Cubic,
}

/// Stateful rate converter that emits frames of `target_frame_size` samples.
pub struct Resampler {
    native_sample_rate: u32,
    target_sample_rate: u32,
    target_frame_size: usize,
    converter: Converter,
    /// Target-rate samples that do not yet fill a frame.
    pending: Vec<f32>,
}

impl Resampler {
    /// Create a new resampler.
    ///
    /// # Errors
    /// Returns `VadError::Configuration` for zero rates / frame size, or if
    /// rubato refuses the ratio.
    pub fn new(
        native_sample_rate: u32,
        target_sample_rate: u32,
        target_frame_size: usize,
        mode: ResampleMode,
    ) -> Result<Self> {
        if native_sample_rate == 0 || target_sample_rate == 0 {
            return Err(VadError::Configuration(format!(
                "sample rates must be non-zero (native={native_sample_rate}, target={target_sample_rate})"
            )));
        }
        if target_frame_size == 0 {
            return Err(VadError::Configuration(
                "target frame size must be non-zero".into(),
            ));
        }

        let converter = match mode {
            ResampleMode::Average => {
                Converter::Average(AverageConverter::new(native_sample_rate, target_sample_rate))
            }
            ResampleMode::Cubic => {
                Converter::Cubic(CubicConverter::new(native_sample_rate, target_sample_rate)?)
            }
        };

        debug!(
            native_sample_rate,
            target_sample_rate,
            target_frame_size,
            mode = ?mode,
            "resampler created"
        );

        Ok(Self {
            native_sample_rate,
            target_sample_rate,
            target_frame_size,
            converter,
            pending: Vec::with_capacity(target_frame_size),
        })
    }

    /// Buffer `samples` and return the frames that are now complete.
    ///
    /// The returned iterator converts lazily; frames it does not yield (for
    /// example if it is dropped early) remain buffered for the next call.
    /// A conversion failure is yielded as `Err` and leaves the failing input
    /// block buffered.
    pub fn process(&mut self, samples: &[f32]) -> ResampledFrames<'_> {
        self.converter.push(samples);
        ResampledFrames { resampler: self }
    }

    /// Convert everything still buffered and return the remaining frames,
    /// the last one zero-padded. Empty when nothing is buffered.
    ///
    /// # Errors
    /// `VadError::Inference` if the cubic converter rejects a block.
    pub fn flush(&mut self) -> Result<Vec<Vec<f32>>> {
        self.converter.drain_into(&mut self.pending)?;
        let mut frames = Vec::new();
        while self.pending.len() >= self.target_frame_size {
            frames.push(self.pending.drain(..self.target_frame_size).collect());
        }
        if !self.pending.is_empty() {
            let mut last = std::mem::take(&mut self.pending);
            last.resize(self.target_frame_size, 0.0);
            frames.push(last);
        }
        debug!(frames = frames.len(), "resampler flushed");
        Ok(frames)
    }

    /// Drop all buffered samples and restart position tracking.
    pub fn reset(&mut self) {
        self.converter.reset();
        self.pending.clear();
    }

    pub fn native_sample_rate(&self) -> u32 {
        self.native_sample_rate
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    pub fn target_frame_size(&self) -> usize {
        self.target_frame_size
    }

    fn next_frame(&mut self) -> Result<Option<Vec<f32>>> {
        if self.pending.len() < self.target_frame_size
            && !self
                .converter
                .fill(&mut self.pending, self.target_frame_size)?
        {
            return Ok(None);
        }
        Ok(Some(self.pending.drain(..self.target_frame_size).collect()))
    }
}

/// Lazy sequence of complete frames produced by one [`Resampler::process`] call.
pub struct ResampledFrames<'a> {
    resampler: &'a mut Resampler,
}

impl Iterator for ResampledFrames<'_> {
    type Item = Result<Vec<f32>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.resampler.next_frame().transpose()
    }
}

enum Converter {
    Average(AverageConverter),
    Cubic(CubicConverter),
}

impl Converter {
    fn push(&mut self, samples: &[f32]) {
        match self {
            Self::Average(c) => c.push(samples),
            Self::Cubic(c) => c.input.extend_from_slice(samples),
        }
    }

    /// Convert until `out` holds at least `want` samples. Returns `false` if
    /// the buffered input ran out first.
    fn fill(&mut self, out: &mut Vec<f32>, want: usize) -> Result<bool> {
        match self {
            Self::Average(c) => {
                while out.len() < want {
                    match c.next_sample() {
                        Some(s) => out.push(s),
                        None => return Ok(false),
                    }
                }
                Ok(true)
            }
            Self::Cubic(c) => {
                while out.len() < want {
                    if !c.next_block(out)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Convert every buffered input sample, including a trailing partial group.
    fn drain_into(&mut self, out: &mut Vec<f32>) -> Result<()> {
        match self {
            Self::Average(c) => {
                while let Some(s) = c.next_sample() {
                    out.push(s);
                }
                if let Some(s) = c.take_partial() {
                    out.push(s);
                }
            }
            Self::Cubic(c) => {
                while c.next_block(out)? {}
                c.flush_partial(out)?;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        match self {
            Self::Average(c) => c.reset(),
            Self::Cubic(c) => c.reset(),
        }
    }
}

struct AverageConverter {
    native: u64,
    target: u64,
    input: Vec<f32>,
    /// Read cursor into `input`.
    pos: usize,
    /// Absolute index of `input[pos]`; always `ceil(produced * native / target)`.
    consumed: u64,
    produced: u64,
    last: f32,
}

impl AverageConverter {
    fn new(native: u32, target: u32) -> Self {
        Self {
            native: u64::from(native),
            target: u64::from(target),
            input: Vec::new(),
            pos: 0,
            consumed: 0,
            produced: 0,
            last: 0.0,
        }
    }

    fn push(&mut self, samples: &[f32]) {
        if self.pos > 0 {
            self.input.drain(..self.pos);
            self.pos = 0;
        }
        self.input.extend_from_slice(samples);
    }

    fn next_sample(&mut self) -> Option<f32> {
        let end = ((self.produced + 1) * self.native).div_ceil(self.target);
        let needed = (end - self.consumed) as usize;
        if needed > self.input.len() - self.pos {
            return None;
        }

        let value = if needed == 0 {
            self.last
        } else {
            let window = &self.input[self.pos..self.pos + needed];
            self.last = window[needed - 1];
            window.iter().sum::<f32>() / needed as f32
        };

        self.pos += needed;
        self.consumed = end;
        self.produced += 1;
        Some(value)
    }

    /// Average of the input samples that do not cover a whole output sample.
    fn take_partial(&mut self) -> Option<f32> {
        let window = &self.input[self.pos..];
        if window.is_empty() {
            return None;
        }
        let value = window.iter().sum::<f32>() / window.len() as f32;
        self.reset();
        Some(value)
    }

    fn reset(&mut self) {
        self.input.clear();
        self.pos = 0;
        self.consumed = 0;
        self.produced = 0;
        self.last = 0.0;
    }
}

struct CubicConverter {
    resampler: FastFixedIn<f32>,
    /// Input frame count per rubato call (10 ms at the native rate).
    chunk_size: usize,
    input: Vec<f32>,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl CubicConverter {
    fn new(native: u32, target: u32) -> Result<Self> {
        let chunk_size = (native as usize / 100).max(1);
        let ratio = target as f64 / native as f64;

        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| VadError::Configuration(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        Ok(Self {
            resampler,
            chunk_size,
            input: Vec::new(),
            output_buf,
        })
    }

    /// Run one rubato block if enough input is buffered. The block is only
    /// consumed once rubato accepts it.
    fn next_block(&mut self, out: &mut Vec<f32>) -> Result<bool> {
        if self.input.len() < self.chunk_size {
            return Ok(false);
        }

        let input_slice = &self.input[..self.chunk_size];
        let (_consumed, produced) = self
            .resampler
            .process_into_buffer(&[input_slice], &mut self.output_buf, None)
            .map_err(|e| VadError::Inference(format!("resampler process error: {e}")))?;
        out.extend_from_slice(&self.output_buf[0][..produced]);

        self.input.drain(..self.chunk_size);
        Ok(true)
    }

    fn flush_partial(&mut self, out: &mut Vec<f32>) -> Result<()> {
        if self.input.is_empty() {
            return Ok(());
        }
        self.input.resize(self.chunk_size, 0.0);
        self.next_block(out)?;
        Ok(())
    }

    fn reset(&mut self) {
        self.resampler.reset();
        self.input.clear();
    }
}
