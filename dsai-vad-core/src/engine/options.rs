//! User-facing configuration for [`super::RealTimeVad`] and
//! [`super::batch::NonRealTimeVad`].
//!
//! Defaults, shared by both model generations:
//!
//! | Field                      | Default |
//! |----------------------------|---------|
//! | `positiveSpeechThreshold`  | 0.5     |
//! | `negativeSpeechThreshold`  | 0.35    |
//! | `redemptionFrames`         | 8       |
//! | `preSpeechPadFrames`       | 1       |
//! | `minSpeechFrames`          | 3       |
//!
//! Frame counts are in model frames, so the same count spans three times as
//! long with the 1536-sample legacy frames.
//!
//! Options serialize as camelCase JSON. [`VadOptions::from_json`] fills any
//! missing field from the defaults of the `model` named in the document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::frame_processor::FrameProcessorOptions;
use crate::{
    audio::{frames_for_ms, resample::ResampleMode, MODEL_SAMPLE_RATE},
    error::{Result, VadError},
    vad::ModelVersion,
};

/// Detection settings.
///
/// Deserializing this type directly fills missing fields from
/// [`VadOptions::default`], the v5 defaults, whatever `model` says and
/// without validating. [`VadOptions::from_json`] merges over
/// [`VadOptions::for_model`] for the named model and validates the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VadOptions {
    /// Rate of the audio passed to `process_audio` (Hz). Rates below 16000
    /// are held up to the model rate, not interpolated.
    pub sample_rate: u32,
    pub model: ModelVersion,
    pub resample_mode: ResampleMode,
    pub positive_speech_threshold: f32,
    pub negative_speech_threshold: f32,
    pub redemption_frames: usize,
    pub pre_speech_pad_frames: usize,
    pub post_speech_pad_frames: usize,
    pub min_speech_frames: usize,
    pub submit_user_speech_on_pause: bool,
}

impl Default for VadOptions {
    fn default() -> Self {
        Self::for_model(ModelVersion::V5)
    }
}

impl VadOptions {
    /// Defaults for `version`, with 16 kHz input.
    pub fn for_model(version: ModelVersion) -> Self {
        Self {
            sample_rate: MODEL_SAMPLE_RATE,
            model: version,
            resample_mode: ResampleMode::default(),
            positive_speech_threshold: 0.5,
            negative_speech_threshold: 0.35,
            redemption_frames: 8,
            pre_speech_pad_frames: 1,
            post_speech_pad_frames: 0,
            min_speech_frames: 3,
            submit_user_speech_on_pause: false,
        }
    }

    /// Parse a (possibly partial) JSON document and validate the result.
    ///
    /// ```ignore
    /// let opts = VadOptions::from_json(r#"{ "model": "legacy", "sampleRate": 48000 }"#)?;
    /// assert_eq!(opts.frame_samples(), 1536);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let overrides: Value = serde_json::from_str(json)
            .map_err(|e| VadError::Configuration(format!("invalid options JSON: {e}")))?;
        let Value::Object(overrides) = overrides else {
            return Err(VadError::Configuration(
                "options JSON must be an object".into(),
            ));
        };

        let version = match overrides.get("model") {
            Some(v) => serde_json::from_value::<ModelVersion>(v.clone())
                .map_err(|e| VadError::Configuration(format!("invalid model: {e}")))?,
            None => ModelVersion::default(),
        };

        let mut merged = serde_json::to_value(Self::for_model(version))
            .map_err(|e| VadError::Configuration(e.to_string()))?;
        if let Value::Object(base) = &mut merged {
            base.extend(overrides);
        }

        let options: Self = serde_json::from_value(merged)
            .map_err(|e| VadError::Configuration(format!("invalid options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_redemption_ms(mut self, ms: u32) -> Self {
        self.redemption_frames = frames_for_ms(ms, self.frame_samples());
        self
    }

    pub fn with_pre_speech_pad_ms(mut self, ms: u32) -> Self {
        self.pre_speech_pad_frames = frames_for_ms(ms, self.frame_samples());
        self
    }

    pub fn with_min_speech_ms(mut self, ms: u32) -> Self {
        self.min_speech_frames = frames_for_ms(ms, self.frame_samples());
        self
    }

    pub fn frame_samples(&self) -> usize {
        self.model.frame_samples()
    }

    /// # Errors
    /// `VadError::Configuration` for a zero sample rate or invalid
    /// frame-processor settings.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(VadError::Configuration(
                "sample_rate must be non-zero".into(),
            ));
        }
        self.frame_processor_options().validate()
    }

    pub fn frame_processor_options(&self) -> FrameProcessorOptions {
        FrameProcessorOptions {
            positive_speech_threshold: self.positive_speech_threshold,
            negative_speech_threshold: self.negative_speech_threshold,
            redemption_frames: self.redemption_frames,
            pre_speech_pad_frames: self.pre_speech_pad_frames,
            post_speech_pad_frames: self.post_speech_pad_frames,
            min_speech_frames: self.min_speech_frames,
            submit_user_speech_on_pause: self.submit_user_speech_on_pause,
        }
    }
}
