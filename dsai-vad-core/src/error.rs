use thiserror::Error;

/// All errors produced by dsai-vad.
#[derive(Debug, Error)]
pub enum VadError {
    /// Invalid threshold / frame-count / sample-rate combination.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Weight fetch or inference-engine session creation failed.
    #[error("model load failed: {0}")]
    ModelLoad(String),

    /// The engine or the rate converter failed, or the engine returned a
    /// non-finite / out-of-range probability.
    #[error("inference error: {0}")]
    Inference(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VadError>;
