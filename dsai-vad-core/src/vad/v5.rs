//! Silero v5 GRU model: 512-sample frames, one combined `state` tensor.

use ndarray::Array3;

use super::{frame_input, sample_rate_input, speech_probability, state_from, state_input};
use crate::{error::Result, events::SpeechProbabilities, inference::InferenceSession};

/// Samples per frame (32 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = 512;

const STATE_SHAPE: (usize, usize, usize) = (2, 1, 128);

pub struct V5Model {
    session: Box<dyn InferenceSession>,
    state: Array3<f32>,
}

impl V5Model {
    pub fn new(session: Box<dyn InferenceSession>) -> Self {
        Self {
            session,
            state: Array3::zeros(STATE_SHAPE),
        }
    }

    pub async fn process(&mut self, frame: &[f32]) -> Result<SpeechProbabilities> {
        let inputs = vec![
            ("input", frame_input(frame, FRAME_SAMPLES)?),
            ("state", state_input(&self.state)),
            ("sr", sample_rate_input()),
        ];
        let mut outputs = self.session.run(inputs, &["output", "stateN"]).await?;

        let is_speech = speech_probability(&mut outputs)?;
        self.state = state_from(&mut outputs, "stateN", STATE_SHAPE)?;

        Ok(SpeechProbabilities::new(is_speech))
    }

    pub fn reset_state(&mut self) {
        self.state.fill(0.0);
    }
}
