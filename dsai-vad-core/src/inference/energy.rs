//! Energy-based stand-in for the neural model.
//!
//! `EnergyEngine` ignores the weights it is given and scores each frame by
//! its RMS level, so the full VAD pipeline can run where no Silero weights
//! (or no ONNX Runtime) are available.
//!
//! ## Scoring
//!
//! ```text
//! p = rms / (rms + threshold)
//! ```
//!
//! `p` is 0 for digital silence, exactly 0.5 when `rms == threshold`, and
//! approaches 1 for loud frames. Recurrent state tensors are echoed back
//! unchanged so either Silero adapter can drive it.

use async_trait::async_trait;
use tracing::debug;

use super::{InferenceEngine, InferenceSession, InputTensor, SessionOutputs};
use crate::error::{Result, VadError};

/// Weights-free engine producing RMS-derived speech probabilities.
#[derive(Debug, Clone, Copy)]
pub struct EnergyEngine {
    /// RMS level mapped to probability 0.5. Typical range: 0.01–0.05.
    threshold: f32,
}

impl EnergyEngine {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(f32::EPSILON),
        }
    }

    /// Compute the root-mean-square of a sample slice.
    fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        (sum_sq / samples.len() as f32).sqrt()
    }
}

impl Default for EnergyEngine {
    fn default() -> Self {
        Self::new(0.02)
    }
}

impl InferenceEngine for EnergyEngine {
    fn create_session(&self, model_bytes: &[u8]) -> Result<Box<dyn InferenceSession>> {
        debug!(
            ignored_bytes = model_bytes.len(),
            threshold = self.threshold,
            "energy session created"
        );
        Ok(Box::new(EnergySession {
            threshold: self.threshold,
        }))
    }
}

struct EnergySession {
    threshold: f32,
}

/// Which input a recurrent-state output mirrors.
fn state_input_for(output: &str) -> Option<&'static str> {
    match output {
        "hn" => Some("h"),
        "cn" => Some("c"),
        "stateN" => Some("state"),
        _ => None,
    }
}

#[async_trait]
impl InferenceSession for EnergySession {
    async fn run(
        &mut self,
        inputs: Vec<(&'static str, InputTensor)>,
        outputs: &[&'static str],
    ) -> Result<SessionOutputs> {
        let mut result = SessionOutputs::new();

        for &name in outputs {
            let data = if name == "output" {
                let frame = inputs
                    .iter()
                    .find_map(|(n, t)| match (n, t) {
                        (&"input", InputTensor::Float32(a)) => Some(a),
                        _ => None,
                    })
                    .ok_or_else(|| VadError::Inference("missing input 'input'".into()))?;
                let samples = frame
                    .as_slice()
                    .ok_or_else(|| VadError::Inference("input tensor is not contiguous".into()))?;
                let rms = EnergyEngine::rms(samples);
                vec![rms / (rms + self.threshold)]
            } else {
                let source = state_input_for(name)
                    .ok_or_else(|| VadError::Inference(format!("unknown output '{name}'")))?;
                inputs
                    .iter()
                    .find_map(|(n, t)| match t {
                        InputTensor::Float32(a) if *n == source => Some(a.iter().copied().collect()),
                        _ => None,
                    })
                    .ok_or_else(|| VadError::Inference(format!("missing input '{source}'")))?
            };
            result.insert(name.to_string(), data);
        }

        Ok(result)
    }
}
