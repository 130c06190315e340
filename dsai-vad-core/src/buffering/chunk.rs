//! Typed audio chunk handed from file/stream readers to the VAD.

/// A contiguous block of mono PCM samples at a known sample rate.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Build a mono chunk from interleaved multi-channel samples by averaging
    /// each frame across channels. A trailing incomplete frame is dropped.
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        if channels == 1 {
            return Self::new(interleaved.to_vec(), sample_rate);
        }
        let samples = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stereo_is_averaged_to_mono() {
        let chunk = AudioChunk::from_interleaved(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0, 0.3], 2, 48_000);
        assert_eq!(chunk.samples, vec![0.5, 0.5, 0.0]);
        assert_eq!(chunk.sample_rate, 48_000);
    }

    #[test]
    fn duration_matches_rate() {
        let chunk = AudioChunk::new(vec![0.0; 8_000], 16_000);
        assert!((chunk.duration_secs() - 0.5).abs() < 1e-9);
        assert!(!chunk.is_empty());
    }
}
