//! Owned FIFO sample storage.
//!
//! `SampleQueue` is the carry buffer between arbitrarily sized input chunks
//! and fixed-size model frames. Every read consumes what it returns; there are
//! no shared views into the backing storage.

pub mod chunk;

use std::collections::VecDeque;

/// FIFO of mono f32 samples with frame-sized consume-and-advance reads.
#[derive(Debug, Clone, Default)]
pub struct SampleQueue {
    samples: VecDeque<f32>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append samples at the back of the queue.
    pub fn push(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied());
    }

    /// Remove and return the oldest `frame_samples` samples, or `None` if
    /// fewer than that are buffered.
    pub fn pop_frame(&mut self, frame_samples: usize) -> Option<Vec<f32>> {
        if frame_samples == 0 || self.samples.len() < frame_samples {
            return None;
        }
        Some(self.samples.drain(..frame_samples).collect())
    }

    /// Remove every buffered sample and return them zero-padded to
    /// `frame_samples`. Returns `None` when the queue is empty.
    ///
    /// Callers drain whole frames with [`pop_frame`](Self::pop_frame) first;
    /// anything longer than one frame is truncated to the frame size.
    pub fn drain_padded(&mut self, frame_samples: usize) -> Option<Vec<f32>> {
        if self.samples.is_empty() {
            return None;
        }
        let mut frame: Vec<f32> = self.samples.drain(..).take(frame_samples).collect();
        frame.resize(frame_samples, 0.0);
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
