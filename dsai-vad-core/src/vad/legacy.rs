//! Silero v3/v4 LSTM model: 1536-sample frames, separate `h`/`c` state.

use ndarray::Array3;

use super::{frame_input, sample_rate_input, speech_probability, state_from, state_input};
use crate::{error::Result, events::SpeechProbabilities, inference::InferenceSession};

/// Samples per frame (96 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = 1536;

/// 2 layers × 1 batch × 64 units, for each of `h` and `c`.
const STATE_SHAPE: (usize, usize, usize) = (2, 1, 64);

pub struct LegacyModel {
    session: Box<dyn InferenceSession>,
    h: Array3<f32>,
    c: Array3<f32>,
}

impl LegacyModel {
    pub fn new(session: Box<dyn InferenceSession>) -> Self {
        Self {
            session,
            h: Array3::zeros(STATE_SHAPE),
            c: Array3::zeros(STATE_SHAPE),
        }
    }

    pub async fn process(&mut self, frame: &[f32]) -> Result<SpeechProbabilities> {
        let inputs = vec![
            ("input", frame_input(frame, FRAME_SAMPLES)?),
            ("sr", sample_rate_input()),
            ("h", state_input(&self.h)),
            ("c", state_input(&self.c)),
        ];
        let mut outputs = self.session.run(inputs, &["output", "hn", "cn"]).await?;

        let is_speech = speech_probability(&mut outputs)?;
        let h = state_from(&mut outputs, "hn", STATE_SHAPE)?;
        let c = state_from(&mut outputs, "cn", STATE_SHAPE)?;
        self.h = h;
        self.c = c;

        Ok(SpeechProbabilities {
            is_speech,
            not_speech: Some(1.0 - is_speech),
        })
    }

    pub fn reset_state(&mut self) {
        self.h.fill(0.0);
        self.c.fill(0.0);
    }
}
