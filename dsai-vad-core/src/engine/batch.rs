//! Offline scanning of a complete recording.
//!
//! `NonRealTimeVad` runs the same framing, model and state machine as
//! [`super::RealTimeVad`] over a whole buffer and collects the confirmed
//! segments with millisecond timestamps instead of dispatching callbacks.
//! Each `run` starts from a zeroed model and a fresh state machine, so
//! results do not depend on earlier runs.

use std::future::Future;

use tracing::info;

use super::{frame_processor::FrameProcessor, options::VadOptions};
use crate::{
    audio::{frames_to_ms, Framer},
    buffering::chunk::AudioChunk,
    error::Result,
    events::{SpeechSegment, VadEvent},
    inference::InferenceEngine,
    vad::SileroModel,
};

pub struct NonRealTimeVad {
    options: VadOptions,
    model: SileroModel,
}

impl NonRealTimeVad {
    /// # Errors
    /// - `VadError::Configuration` for invalid options.
    /// - `VadError::ModelLoad` if the weights cannot be fetched or loaded.
    pub async fn new<F, Fut>(
        engine: &dyn InferenceEngine,
        fetch: F,
        options: VadOptions,
    ) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<u8>>>,
    {
        options.validate()?;
        let model = SileroModel::load(options.model, engine, fetch).await?;
        Self::with_model(model, options)
    }

    pub fn with_model(model: SileroModel, mut options: VadOptions) -> Result<Self> {
        options.model = model.version();
        options.validate()?;
        Ok(Self { options, model })
    }

    /// Find every confirmed speech segment in `audio`, sampled at
    /// `sample_rate`. Speech still open at the end of the buffer is closed
    /// as if the stream had ended.
    ///
    /// # Errors
    /// `VadError::Configuration` for a zero rate,
    /// `VadError::Inference` if rate conversion or the model fails.
    pub async fn run(&mut self, audio: &[f32], sample_rate: u32) -> Result<Vec<SpeechSegment>> {
        let frame_samples = self.model.frame_samples();
        let mut framer = Framer::new(sample_rate, frame_samples, self.options.resample_mode)?;
        let mut processor = FrameProcessor::new(self.options.frame_processor_options())?;
        self.model.reset_state();

        let mut frames = framer.push(audio)?;
        frames.extend(framer.flush()?);
        let frame_count = frames.len();

        let mut segments = Vec::new();
        for frame in frames {
            let probabilities = self.model.process(&frame).await?;
            processor.process(frame, probabilities, &mut |event| {
                collect_segment(&mut segments, event, frame_samples)
            });
        }
        processor.end_segment(&mut |event| collect_segment(&mut segments, event, frame_samples));

        info!(
            sample_rate,
            frames = frame_count,
            segments = segments.len(),
            "offline scan complete"
        );
        Ok(segments)
    }

    /// [`Self::run`] over a decoded chunk, at the chunk's own rate.
    pub async fn run_chunk(&mut self, chunk: &AudioChunk) -> Result<Vec<SpeechSegment>> {
        self.run(&chunk.samples, chunk.sample_rate).await
    }

    pub fn options(&self) -> &VadOptions {
        &self.options
    }
}

fn collect_segment(segments: &mut Vec<SpeechSegment>, event: VadEvent<'_>, frame_samples: usize) {
    if let VadEvent::SpeechEnd {
        audio,
        start_frame,
        end_frame,
    } = event
    {
        segments.push(SpeechSegment {
            audio,
            start_ms: frames_to_ms(start_frame, frame_samples),
            end_ms: frames_to_ms(end_frame, frame_samples),
        });
    }
}
