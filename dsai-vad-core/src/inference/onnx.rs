//! ONNX Runtime backend via the `ort` crate.
//!
//! Sessions are built from in-memory weights (`commit_from_memory`), so the
//! caller decides where the bytes come from. Each `run` executes on Tokio's
//! blocking pool; the session itself sits behind a `parking_lot::Mutex` so the
//! blocking closure can own a handle to it.
//!
//! ## Environment overrides
//!
//! | Variable                      | Default | Range |
//! |-------------------------------|---------|-------|
//! | `DSAI_VAD_ORT_INTRA_THREADS`  | 1       | 1–32  |
//! | `DSAI_VAD_ORT_INTER_THREADS`  | 1       | 1–8   |
//!
//! Silero is tiny; a single intra-op thread per stream keeps many concurrent
//! streams from oversubscribing the CPU.

use std::sync::Arc;

use async_trait::async_trait;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::{Session, SessionInputValue};
use ort::value::Value;
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{InferenceEngine, InferenceSession, InputTensor, SessionOutputs};
use crate::error::{Result, VadError};

const DEFAULT_INTRA_THREADS: usize = 1;
const DEFAULT_INTER_THREADS: usize = 1;

/// Engine handle that turns serialized ONNX models into `ort` sessions.
#[derive(Debug, Clone, Copy)]
pub struct OrtEngine {
    intra_threads: usize,
    inter_threads: usize,
}

impl OrtEngine {
    pub fn new() -> Self {
        Self {
            intra_threads: DEFAULT_INTRA_THREADS,
            inter_threads: DEFAULT_INTER_THREADS,
        }
    }

    /// Engine configured from `DSAI_VAD_ORT_*` environment variables.
    pub fn from_env() -> Self {
        let intra_threads = env_usize("DSAI_VAD_ORT_INTRA_THREADS")
            .unwrap_or(DEFAULT_INTRA_THREADS)
            .clamp(1, 32);
        let inter_threads = env_usize("DSAI_VAD_ORT_INTER_THREADS")
            .unwrap_or(DEFAULT_INTER_THREADS)
            .clamp(1, 8);
        Self {
            intra_threads,
            inter_threads,
        }
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }
}

impl Default for OrtEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn load_err(e: impl std::fmt::Display) -> VadError {
    VadError::ModelLoad(e.to_string())
}

fn infer_err(e: impl std::fmt::Display) -> VadError {
    VadError::Inference(e.to_string())
}

impl InferenceEngine for OrtEngine {
    fn create_session(&self, model_bytes: &[u8]) -> Result<Box<dyn InferenceSession>> {
        let session = SessionBuilder::new()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::All)
            .map_err(load_err)?
            .with_intra_threads(self.intra_threads)
            .map_err(load_err)?
            .with_inter_threads(self.inter_threads)
            .map_err(load_err)?
            .commit_from_memory(model_bytes)
            .map_err(load_err)?;

        let input_names: Vec<String> = session
            .inputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();
        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|outlet| outlet.name().to_string())
            .collect();

        info!(
            size_kb = model_bytes.len() / 1024,
            intra_threads = self.intra_threads,
            inter_threads = self.inter_threads,
            inputs = ?input_names,
            outputs = ?output_names,
            "ONNX session ready"
        );

        Ok(Box::new(OrtSession {
            session: Arc::new(Mutex::new(session)),
        }))
    }
}

struct OrtSession {
    session: Arc<Mutex<Session>>,
}

#[async_trait]
impl InferenceSession for OrtSession {
    async fn run(
        &mut self,
        inputs: Vec<(&'static str, InputTensor)>,
        outputs: &[&'static str],
    ) -> Result<SessionOutputs> {
        let session = Arc::clone(&self.session);
        let output_names = outputs.to_vec();

        tokio::task::spawn_blocking(move || run_blocking(&session, inputs, &output_names))
            .await
            .map_err(|e| VadError::Inference(format!("inference task failed: {e}")))?
    }
}

fn run_blocking(
    session: &Mutex<Session>,
    inputs: Vec<(&'static str, InputTensor)>,
    output_names: &[&'static str],
) -> Result<SessionOutputs> {
    let mut input_values: Vec<(String, SessionInputValue<'static>)> =
        Vec::with_capacity(inputs.len());
    for (name, tensor) in inputs {
        let value: SessionInputValue<'static> = match tensor {
            InputTensor::Float32(array) => Value::from_array(array)
                .map_err(|e: ort::Error| infer_err(e))?
                .into(),
            InputTensor::Int64(array) => Value::from_array(array)
                .map_err(|e: ort::Error| infer_err(e))?
                .into(),
        };
        input_values.push((name.to_string(), value));
    }

    let mut session = session.lock();
    let outputs = session.run(input_values).map_err(infer_err)?;

    let mut result = SessionOutputs::with_capacity(output_names.len());
    for &name in output_names {
        let value = outputs
            .get(name)
            .ok_or_else(|| VadError::Inference(format!("missing output '{name}'")))?;
        let (_, data) = value.try_extract_tensor::<f32>().map_err(infer_err)?;
        result.insert(name.to_string(), data.to_vec());
    }

    debug!(outputs = result.len(), "ONNX run complete");
    Ok(result)
}
