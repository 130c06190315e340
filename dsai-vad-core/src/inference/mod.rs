//! Inference engine abstraction.
//!
//! The model adapters in [`crate::vad`] never talk to ONNX Runtime directly.
//! They hand named tensors to an [`InferenceSession`] created by an
//! [`InferenceEngine`] from serialized weights, so the runtime stays an opaque
//! collaborator:
//!
//! - `onnx::OrtEngine`: ONNX Runtime via `ort` (feature `onnx`)
//! - `energy::EnergyEngine`: weights-free RMS heuristic
//!
//! `run` is async: the ONNX backend moves each call onto Tokio's blocking
//! pool, so the awaiting caller is the only thing that suspends.

pub mod energy;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub use onnx::OrtEngine;

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use ndarray::ArrayD;

use crate::error::{Result, VadError};

/// A named model input.
#[derive(Debug, Clone)]
pub enum InputTensor {
    Float32(ArrayD<f32>),
    Int64(ArrayD<i64>),
}

/// Requested outputs, flattened in row-major order, keyed by name.
pub type SessionOutputs = HashMap<String, Vec<f32>>;

/// Factory for inference sessions.
pub trait InferenceEngine: Send + Sync {
    /// Build a session from serialized model weights.
    ///
    /// # Errors
    /// Implementations return `VadError::ModelLoad` when the weights cannot be
    /// turned into a runnable session.
    fn create_session(&self, model_bytes: &[u8]) -> Result<Box<dyn InferenceSession>>;
}

/// One loaded model. Stateless from the engine's point of view; recurrent
/// state is passed in and out as tensors by the caller.
#[async_trait]
pub trait InferenceSession: Send {
    /// Run the model and return the requested outputs.
    ///
    /// # Errors
    /// `VadError::Inference` if the run fails or a requested output is missing.
    async fn run(
        &mut self,
        inputs: Vec<(&'static str, InputTensor)>,
        outputs: &[&'static str],
    ) -> Result<SessionOutputs>;
}

/// Await a caller-supplied weight fetcher, mapping failure to `ModelLoad`.
pub async fn fetch_model_bytes<F, Fut>(fetch: F) -> Result<Vec<u8>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<u8>>>,
{
    let bytes = fetch()
        .await
        .map_err(|e| VadError::ModelLoad(format!("weight fetch failed: {e:#}")))?;
    tracing::debug!(bytes = bytes.len(), "model weights fetched");
    Ok(bytes)
}

/// Weight fetcher for model files on local disk.
///
/// ```ignore
/// let path = PathBuf::from("models/silero_vad.onnx");
/// RealTimeVad::new(&engine, move || read_model_file(path), options, callbacks).await?;
/// ```
pub async fn read_model_file(path: PathBuf) -> anyhow::Result<Vec<u8>> {
    use anyhow::Context;

    tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading model file {}", path.display()))
}
