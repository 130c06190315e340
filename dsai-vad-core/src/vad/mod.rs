//! Silero speech-probability model adapters.
//!
//! Two generations of the Silero VAD network are supported. They differ in
//! frame length and in how recurrent state is threaded through the graph:
//!
//! | Version  | Frame  | State inputs            | State outputs  | Reports      |
//! |----------|--------|-------------------------|----------------|--------------|
//! | `legacy` | 1536   | `h`, `c` `[2,1,64]`     | `hn`, `cn`     | `not_speech` |
//! | `v5`     | 512    | `state` `[2,1,128]`     | `stateN`       |              |
//!
//! Both take `input [1, frame]` (f32) and `sr [1]` (i64, always 16000) and
//! produce `output [1, 1]`, the speech probability.
//!
//! [`SileroModel`] picks the variant once, at construction, from a
//! [`ModelVersion`]. The recurrent state is owned by the variant and only
//! replaced after a fully successful run, so a failed inference leaves the
//! model exactly as it was.

pub mod legacy;
pub mod v5;

use std::future::Future;

use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{Result, VadError},
    events::SpeechProbabilities,
    inference::{fetch_model_bytes, InferenceEngine, InferenceSession, InputTensor, SessionOutputs},
};

pub use legacy::LegacyModel;
pub use v5::V5Model;

/// Which Silero network the weights belong to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVersion {
    Legacy,
    #[default]
    V5,
}

impl ModelVersion {
    /// Samples per model frame at 16 kHz.
    pub fn frame_samples(self) -> usize {
        match self {
            Self::Legacy => legacy::FRAME_SAMPLES,
            Self::V5 => v5::FRAME_SAMPLES,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::V5 => "v5",
        }
    }
}

impl std::fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelVersion {
    type Err = VadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "v5" => Ok(Self::V5),
            other => Err(VadError::Configuration(format!(
                "unknown model version '{other}' (expected 'v5' or 'legacy')"
            ))),
        }
    }
}

/// A loaded Silero model of either generation.
pub enum SileroModel {
    Legacy(LegacyModel),
    V5(V5Model),
}

impl SileroModel {
    /// Fetch the weights, open an inference session and wrap it in the
    /// adapter for `version`.
    ///
    /// # Errors
    /// `VadError::ModelLoad` if the fetch fails or the engine rejects the weights.
    pub async fn load<F, Fut>(
        version: ModelVersion,
        engine: &dyn InferenceEngine,
        fetch: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<u8>>>,
    {
        let bytes = fetch_model_bytes(fetch).await?;
        let session = engine.create_session(&bytes).map_err(|e| match e {
            VadError::ModelLoad(_) => e,
            other => VadError::ModelLoad(other.to_string()),
        })?;

        info!(
            version = %version,
            frame_samples = version.frame_samples(),
            bytes = bytes.len(),
            "Silero model loaded"
        );

        Ok(Self::from_session(version, session))
    }

    /// Wrap an already-open session.
    pub fn from_session(version: ModelVersion, session: Box<dyn InferenceSession>) -> Self {
        match version {
            ModelVersion::Legacy => Self::Legacy(LegacyModel::new(session)),
            ModelVersion::V5 => Self::V5(V5Model::new(session)),
        }
    }

    /// Run one frame of exactly [`Self::frame_samples`] samples.
    ///
    /// # Errors
    /// `VadError::Inference` for a frame of the wrong length, a failed run,
    /// a missing or malformed output, or a probability that is non-finite or
    /// outside `[0, 1]`.
    pub async fn process(&mut self, frame: &[f32]) -> Result<SpeechProbabilities> {
        match self {
            Self::Legacy(model) => model.process(frame).await,
            Self::V5(model) => model.process(frame).await,
        }
    }

    /// Zero the recurrent state, as if freshly loaded.
    pub fn reset_state(&mut self) {
        match self {
            Self::Legacy(model) => model.reset_state(),
            Self::V5(model) => model.reset_state(),
        }
    }

    pub fn version(&self) -> ModelVersion {
        match self {
            Self::Legacy(_) => ModelVersion::Legacy,
            Self::V5(_) => ModelVersion::V5,
        }
    }

    pub fn frame_samples(&self) -> usize {
        self.version().frame_samples()
    }
}

impl std::fmt::Debug for SileroModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SileroModel")
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// `input [1, frame]`, rejecting frames of the wrong length.
fn frame_input(frame: &[f32], expected: usize) -> Result<InputTensor> {
    if frame.len() != expected {
        return Err(VadError::Inference(format!(
            "frame has {} samples, model expects {expected}",
            frame.len()
        )));
    }
    let array = Array2::from_shape_vec((1, expected), frame.to_vec())
        .map_err(|e| VadError::Inference(e.to_string()))?;
    Ok(InputTensor::Float32(array.into_dyn()))
}

/// `sr [1]`, the model sample rate as i64.
fn sample_rate_input() -> InputTensor {
    InputTensor::Int64(
        Array1::from_elem(1, i64::from(crate::audio::MODEL_SAMPLE_RATE)).into_dyn(),
    )
}

fn state_input(state: &Array3<f32>) -> InputTensor {
    InputTensor::Float32(state.clone().into_dyn())
}

fn take_output(outputs: &mut SessionOutputs, name: &str) -> Result<Vec<f32>> {
    outputs
        .remove(name)
        .ok_or_else(|| VadError::Inference(format!("model did not return '{name}'")))
}

/// Read and check the scalar speech probability from `output`.
fn speech_probability(outputs: &mut SessionOutputs) -> Result<f32> {
    let data = take_output(outputs, "output")?;
    let p = data
        .first()
        .copied()
        .ok_or_else(|| VadError::Inference("'output' tensor is empty".into()))?;
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(VadError::Inference(format!(
            "speech probability {p} is outside [0, 1]"
        )));
    }
    Ok(p)
}

/// Reshape a flat state output, rejecting the wrong element count.
fn state_from(
    outputs: &mut SessionOutputs,
    name: &str,
    shape: (usize, usize, usize),
) -> Result<Array3<f32>> {
    let data = take_output(outputs, name)?;
    let len = data.len();
    Array3::from_shape_vec(shape, data).map_err(|_| {
        VadError::Inference(format!(
            "'{name}' has {len} values, expected {}",
            shape.0 * shape.1 * shape.2
        ))
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{BrokenEngine, ScriptedSession};
    use super::*;

    use crate::inference::energy::EnergyEngine;

    #[test]
    fn version_parsing_and_frame_sizes() {
        assert_eq!("v5".parse::<ModelVersion>().unwrap(), ModelVersion::V5);
        assert_eq!(" Legacy ".parse::<ModelVersion>().unwrap(), ModelVersion::Legacy);
        assert!(matches!(
            "v4".parse::<ModelVersion>(),
            Err(VadError::Configuration(_))
        ));
        assert_eq!(ModelVersion::V5.frame_samples(), 512);
        assert_eq!(ModelVersion::Legacy.frame_samples(), 1536);
        assert_eq!(ModelVersion::default(), ModelVersion::V5);
        assert_eq!(
            serde_json::to_string(&ModelVersion::Legacy).unwrap(),
            "\"legacy\""
        );
    }

    #[tokio::test]
    async fn load_dispatches_on_version() {
        let engine = EnergyEngine::default();
        let model = SileroModel::load(ModelVersion::Legacy, &engine, || async { Ok(vec![1, 2, 3]) })
            .await
            .unwrap();
        assert!(matches!(model, SileroModel::Legacy(_)));
        assert_eq!(model.frame_samples(), 1536);
    }

    #[tokio::test]
    async fn fetch_failure_is_model_load() {
        let engine = EnergyEngine::default();
        let err = SileroModel::load(ModelVersion::V5, &engine, || async {
            Err(anyhow::anyhow!("connection refused"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, VadError::ModelLoad(_)));
    }

    #[tokio::test]
    async fn engine_rejection_is_model_load() {
        let err = SileroModel::load(ModelVersion::V5, &BrokenEngine, || async { Ok(vec![0]) })
            .await
            .unwrap_err();
        match err {
            VadError::ModelLoad(msg) => assert!(msg.contains("not an onnx graph"), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn out_of_range_probability_is_rejected_not_clamped() {
        for bad in [1.2_f32, -0.1, f32::NAN, f32::INFINITY] {
            let mut model =
                SileroModel::from_session(ModelVersion::V5, Box::new(ScriptedSession::new([bad])));
            let err = model.process(&[0.0; 512]).await.unwrap_err();
            assert!(matches!(err, VadError::Inference(_)), "{bad}: {err:?}");
        }
    }

    #[tokio::test]
    async fn boundary_probabilities_are_accepted() {
        let mut model = SileroModel::from_session(
            ModelVersion::V5,
            Box::new(ScriptedSession::new([0.0, 1.0])),
        );
        assert_eq!(model.process(&[0.0; 512]).await.unwrap().is_speech, 0.0);
        assert_eq!(model.process(&[0.0; 512]).await.unwrap().is_speech, 1.0);
    }

    #[tokio::test]
    async fn missing_output_is_an_inference_error() {
        let mut session = ScriptedSession::new([0.5]);
        session.omit = Some("output");
        let mut model = SileroModel::from_session(ModelVersion::V5, Box::new(session));
        assert!(matches!(
            model.process(&[0.0; 512]).await,
            Err(VadError::Inference(_))
        ));
    }
}
