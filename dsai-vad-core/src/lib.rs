//! # dsai-vad
//!
//! Streaming voice activity detection built on the Silero VAD network.
//!
//! ## Architecture
//!
//! ```text
//! process_audio(&[f32]) → Framer (Resampler | SampleQueue) → 16 kHz frames
//!                                                               │
//!                                              SileroModel::process (InferenceSession)
//!                                                               │
//!                                                  FrameProcessor state machine
//!                                                               │
//!                                                  VadEvent → VadCallbacks
//! ```
//!
//! The inference runtime is pluggable through [`InferenceEngine`]. ONNX
//! Runtime is available behind the `onnx` feature; [`EnergyEngine`] needs no
//! weights at all.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod events;
pub mod inference;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::resample::ResampleMode;
pub use engine::{
    batch::NonRealTimeVad,
    frame_processor::{FrameProcessor, FrameProcessorOptions, SpeechState},
    options::VadOptions,
    RealTimeVad,
};
pub use error::{Result, VadError};
pub use events::{SpeechProbabilities, SpeechSegment, VadCallbacks, VadEvent};
pub use inference::{energy::EnergyEngine, read_model_file, InferenceEngine, InferenceSession};
pub use vad::{ModelVersion, SileroModel};

#[cfg(feature = "onnx")]
pub use inference::OrtEngine;
