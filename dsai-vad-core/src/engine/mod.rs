//! `RealTimeVad`: streaming voice-activity detection over caller-pushed audio.
//!
//! ## Lifecycle
//!
//! ```text
//! RealTimeVad::new().await     → options validated, model loaded, inactive
//!     └─► start()              → active = true
//!         └─► process_audio()  → frames → model → state machine → callbacks
//!         └─► pause()          → active = false, segment submitted or dropped
//!     └─► flush().await        → last partial frame processed, segment ended
//!     └─► reset()              → carry buffers + model state cleared
//!     └─► destroy()            → pause() + reset(), instance consumed
//! ```
//!
//! `process_audio` is a no-op while inactive, so a paused instance can keep
//! receiving audio without doing any work.
//!
//! ## Ordering
//!
//! Every mutator takes `&mut self`: one chunk is fully framed, inferred and
//! stepped through the state machine before the next can be pushed. Callbacks
//! run synchronously on the caller's task, in frame order. The only suspension
//! point is model inference.
//!
//! `reset()` deliberately leaves the frame processor alone. A segment that was
//! in progress survives a model-state reset and continues with the next frame.

pub mod batch;
pub mod frame_processor;
pub mod options;

use std::future::Future;

use tracing::{debug, info};

use crate::{
    audio::Framer,
    error::Result,
    events::VadCallbacks,
    inference::InferenceEngine,
    vad::SileroModel,
};

use frame_processor::{FrameProcessor, SpeechState};
use options::VadOptions;

/// Streaming VAD session. One instance per audio stream.
pub struct RealTimeVad {
    options: VadOptions,
    model: SileroModel,
    framer: Framer,
    frame_processor: FrameProcessor,
    callbacks: VadCallbacks,
    active: bool,
}

impl RealTimeVad {
    /// Validate `options`, fetch and load the model, and build the framing
    /// and state-machine stages. The instance starts inactive.
    ///
    /// # Errors
    /// - `VadError::Configuration` for invalid options.
    /// - `VadError::ModelLoad` if the weights cannot be fetched or loaded.
    pub async fn new<F, Fut>(
        engine: &dyn InferenceEngine,
        fetch: F,
        options: VadOptions,
        callbacks: VadCallbacks,
    ) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<u8>>>,
    {
        options.validate()?;
        let model = SileroModel::load(options.model, engine, fetch).await?;
        Self::with_model(model, options, callbacks)
    }

    /// Build around an already-loaded model. `options.model` is ignored in
    /// favour of the model's own version.
    ///
    /// # Errors
    /// `VadError::Configuration` for invalid options.
    pub fn with_model(
        model: SileroModel,
        mut options: VadOptions,
        callbacks: VadCallbacks,
    ) -> Result<Self> {
        options.model = model.version();
        options.validate()?;

        let framer = Framer::new(
            options.sample_rate,
            model.frame_samples(),
            options.resample_mode,
        )?;
        let frame_processor = FrameProcessor::new(options.frame_processor_options())?;

        info!(
            model = %options.model,
            sample_rate = options.sample_rate,
            resampling = framer.is_resampling(),
            positive = options.positive_speech_threshold,
            negative = options.negative_speech_threshold,
            redemption_frames = options.redemption_frames,
            "RealTimeVad ready"
        );

        Ok(Self {
            options,
            model,
            framer,
            frame_processor,
            callbacks,
            active: false,
        })
    }

    pub fn start(&mut self) {
        debug!("RealTimeVad started");
        self.active = true;
    }

    /// Stop processing. The in-progress segment is emitted when
    /// `submit_user_speech_on_pause` is set and silently dropped otherwise.
    pub fn pause(&mut self) {
        debug!("RealTimeVad paused");
        self.active = false;
        let callbacks = &mut self.callbacks;
        self.frame_processor.pause(&mut |event| callbacks.dispatch(event));
    }

    /// Push a chunk of mono samples at `options.sample_rate`. Any length is
    /// accepted; samples that do not yet fill a frame are carried over.
    ///
    /// # Errors
    /// `VadError::Inference` if rate conversion or the model fails on a
    /// frame. Frames after the failing one in the same chunk are dropped;
    /// destroy and rebuild the instance to recover.
    pub async fn process_audio(&mut self, samples: &[f32]) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let frames = self.framer.push(samples)?;
        self.run_frames(frames).await
    }

    /// Process the buffered partial frame (zero-padded), then end the current
    /// segment.
    ///
    /// # Errors
    /// `VadError::Inference` if rate conversion or the model fails on the
    /// remaining frames.
    pub async fn flush(&mut self) -> Result<()> {
        let frames = self.framer.flush()?;
        debug!(frames = frames.len(), "flushing");
        self.run_frames(frames).await?;

        let callbacks = &mut self.callbacks;
        self.frame_processor
            .end_segment(&mut |event| callbacks.dispatch(event));
        Ok(())
    }

    /// Drop buffered samples and zero the model state. The frame processor's
    /// state machine is not touched.
    pub fn reset(&mut self) {
        self.framer.clear();
        self.model.reset_state();
    }

    /// Pause, reset and release the instance.
    pub fn destroy(mut self) {
        self.pause();
        self.reset();
        info!("RealTimeVad destroyed");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn options(&self) -> &VadOptions {
        &self.options
    }

    pub fn speech_state(&self) -> SpeechState {
        self.frame_processor.state()
    }

    async fn run_frames(&mut self, frames: Vec<Vec<f32>>) -> Result<()> {
        for frame in frames {
            let probabilities = self.model.process(&frame).await?;
            let callbacks = &mut self.callbacks;
            self.frame_processor
                .process(frame, probabilities, &mut |event| callbacks.dispatch(event));
        }
        Ok(())
    }
}

impl std::fmt::Debug for RealTimeVad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealTimeVad")
            .field("options", &self.options)
            .field("model", &self.model)
            .field("active", &self.active)
            .field("state", &self.frame_processor.state())
            .finish_non_exhaustive()
    }
}
