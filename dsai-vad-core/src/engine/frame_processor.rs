//! Speech/silence state machine driven by per-frame speech probabilities.
//!
//! ## States
//!
//! ```text
//!            p ≥ pos                 active ≥ min
//!   Idle ───────────► SpeechCandidate ───────────► InSpeech
//!    ▲                    │    ▲                     │   ▲
//!    │             p ≤ neg│    │p ≥ pos       p ≤ neg│   │p ≥ pos
//!    │                    ▼    │ (unconfirmed)       ▼   │ (confirmed)
//!    └──── counter = 0 ── Redemption ◄───────────────┘───┘
//!          SpeechEnd | VadMisfire
//! ```
//!
//! Both thresholds are inclusive. While idle the processor keeps the last
//! `pre_speech_pad_frames` frames so the emitted segment starts a little
//! before the trigger. Frames seen during redemption are held apart from the
//! segment: they join it if speech resumes, and otherwise only the first
//! `post_speech_pad_frames` of them are kept.
//!
//! Events are handed to a caller-supplied closure synchronously, in the order
//! they happen within the frame. `FrameProcessed` always comes first.

use std::collections::VecDeque;

use tracing::debug;

use crate::{
    error::{Result, VadError},
    events::{SpeechProbabilities, VadEvent},
};

/// Tuning for [`FrameProcessor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameProcessorOptions {
    /// A frame at or above this probability counts as speech.
    pub positive_speech_threshold: f32,
    /// A frame at or below this probability counts as silence. Must be
    /// strictly below `positive_speech_threshold`.
    pub negative_speech_threshold: f32,
    /// Silent frames tolerated before a segment ends. At least 1.
    pub redemption_frames: usize,
    pub pre_speech_pad_frames: usize,
    /// Redemption frames appended to the end of an emitted segment.
    pub post_speech_pad_frames: usize,
    /// Speech frames needed before a segment is confirmed. At least 1.
    pub min_speech_frames: usize,
    /// Whether `pause()` emits the in-progress segment instead of dropping it.
    pub submit_user_speech_on_pause: bool,
}

impl Default for FrameProcessorOptions {
    fn default() -> Self {
        Self {
            positive_speech_threshold: 0.5,
            negative_speech_threshold: 0.35,
            redemption_frames: 8,
            pre_speech_pad_frames: 1,
            post_speech_pad_frames: 0,
            min_speech_frames: 3,
            submit_user_speech_on_pause: false,
        }
    }
}

impl FrameProcessorOptions {
    /// # Errors
    /// `VadError::Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let in_unit_range = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);

        if !in_unit_range(self.positive_speech_threshold) {
            return Err(VadError::Configuration(format!(
                "positive_speech_threshold {} must be within [0, 1]",
                self.positive_speech_threshold
            )));
        }
        if !in_unit_range(self.negative_speech_threshold) {
            return Err(VadError::Configuration(format!(
                "negative_speech_threshold {} must be within [0, 1]",
                self.negative_speech_threshold
            )));
        }
        if self.negative_speech_threshold >= self.positive_speech_threshold {
            return Err(VadError::Configuration(format!(
                "negative_speech_threshold {} must be below positive_speech_threshold {}",
                self.negative_speech_threshold, self.positive_speech_threshold
            )));
        }
        if self.redemption_frames == 0 {
            return Err(VadError::Configuration(
                "redemption_frames must be at least 1".into(),
            ));
        }
        if self.min_speech_frames == 0 {
            return Err(VadError::Configuration(
                "min_speech_frames must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    Idle,
    /// Speech detected but not yet `min_speech_frames` long.
    SpeechCandidate,
    /// Confirmed speech.
    InSpeech,
    /// Silence after speech; counting down `redemption_frames`.
    Redemption,
}

pub struct FrameProcessor {
    options: FrameProcessorOptions,
    state: SpeechState,
    pre_speech_buffer: VecDeque<Vec<f32>>,
    speech_buffer: Vec<Vec<f32>>,
    redemption_tail: Vec<Vec<f32>>,
    redemption_counter: usize,
    active_frame_count: usize,
    real_start_fired: bool,
    /// Stream position of the next frame.
    frame_index: u64,
    /// Stream position of `speech_buffer[0]`.
    segment_start: u64,
}

impl FrameProcessor {
    /// # Errors
    /// `VadError::Configuration` if `options` fail validation.
    pub fn new(options: FrameProcessorOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            state: SpeechState::Idle,
            pre_speech_buffer: VecDeque::with_capacity(options.pre_speech_pad_frames + 1),
            speech_buffer: Vec::new(),
            redemption_tail: Vec::new(),
            redemption_counter: 0,
            active_frame_count: 0,
            real_start_fired: false,
            frame_index: 0,
            segment_start: 0,
        })
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    pub fn options(&self) -> &FrameProcessorOptions {
        &self.options
    }

    /// Frames processed since construction.
    pub fn frames_processed(&self) -> u64 {
        self.frame_index
    }

    /// Advance the state machine by one frame.
    pub fn process<F>(
        &mut self,
        frame: Vec<f32>,
        probabilities: SpeechProbabilities,
        handle_event: &mut F,
    ) where
        F: FnMut(VadEvent<'_>),
    {
        handle_event(VadEvent::FrameProcessed {
            probabilities,
            frame: &frame,
        });

        let p = probabilities.is_speech;
        let is_positive = p >= self.options.positive_speech_threshold;
        let is_negative = p <= self.options.negative_speech_threshold;
        let position = self.frame_index;
        self.frame_index += 1;

        match self.state {
            SpeechState::Idle => {
                if is_positive {
                    self.segment_start =
                        position.saturating_sub(self.pre_speech_buffer.len() as u64);
                    self.speech_buffer.extend(self.pre_speech_buffer.drain(..));
                    self.speech_buffer.push(frame);
                    self.active_frame_count = 1;
                    self.state = SpeechState::SpeechCandidate;
                    debug!(position, p, "speech start");
                    handle_event(VadEvent::SpeechStart);
                    self.confirm_if_ready(handle_event);
                } else if self.options.pre_speech_pad_frames > 0 {
                    self.pre_speech_buffer.push_back(frame);
                    while self.pre_speech_buffer.len() > self.options.pre_speech_pad_frames {
                        self.pre_speech_buffer.pop_front();
                    }
                }
            }
            SpeechState::SpeechCandidate => {
                self.speech_buffer.push(frame);
                if is_negative {
                    self.enter_redemption();
                } else {
                    if is_positive {
                        self.active_frame_count += 1;
                    }
                    self.confirm_if_ready(handle_event);
                }
            }
            SpeechState::InSpeech => {
                self.speech_buffer.push(frame);
                if is_negative {
                    self.enter_redemption();
                }
            }
            SpeechState::Redemption => {
                if is_positive {
                    self.speech_buffer.append(&mut self.redemption_tail);
                    self.speech_buffer.push(frame);
                    self.active_frame_count += 1;
                    self.redemption_counter = 0;
                    if self.real_start_fired {
                        self.state = SpeechState::InSpeech;
                    } else {
                        self.state = SpeechState::SpeechCandidate;
                        self.confirm_if_ready(handle_event);
                    }
                } else {
                    self.redemption_tail.push(frame);
                    self.redemption_counter = self.redemption_counter.saturating_sub(1);
                    if self.redemption_counter == 0 {
                        self.finish_segment(handle_event);
                    }
                }
            }
        }
    }

    /// End any in-progress segment now: `SpeechEnd` if it was confirmed,
    /// `VadMisfire` otherwise. Does nothing while idle.
    pub fn end_segment<F>(&mut self, handle_event: &mut F)
    where
        F: FnMut(VadEvent<'_>),
    {
        self.finish_segment(handle_event);
    }

    /// Submit or drop the in-progress segment, per `submit_user_speech_on_pause`.
    pub fn pause<F>(&mut self, handle_event: &mut F)
    where
        F: FnMut(VadEvent<'_>),
    {
        if self.options.submit_user_speech_on_pause {
            self.end_segment(handle_event);
        } else {
            self.reset();
        }
    }

    /// Return to `Idle` and drop every buffered frame without emitting events.
    /// The stream position keeps counting.
    pub fn reset(&mut self) {
        self.state = SpeechState::Idle;
        self.pre_speech_buffer.clear();
        self.speech_buffer.clear();
        self.redemption_tail.clear();
        self.redemption_counter = 0;
        self.active_frame_count = 0;
        self.real_start_fired = false;
    }

    fn enter_redemption(&mut self) {
        self.state = SpeechState::Redemption;
        self.redemption_counter = self.options.redemption_frames;
    }

    fn confirm_if_ready<F>(&mut self, handle_event: &mut F)
    where
        F: FnMut(VadEvent<'_>),
    {
        if !self.real_start_fired && self.active_frame_count >= self.options.min_speech_frames {
            self.real_start_fired = true;
            self.state = SpeechState::InSpeech;
            debug!(
                active_frames = self.active_frame_count,
                "speech confirmed"
            );
            handle_event(VadEvent::SpeechRealStart);
        }
    }

    fn finish_segment<F>(&mut self, handle_event: &mut F)
    where
        F: FnMut(VadEvent<'_>),
    {
        if self.state == SpeechState::Idle {
            return;
        }

        if self.real_start_fired {
            let keep = self.options.post_speech_pad_frames.min(self.redemption_tail.len());
            let mut frames = std::mem::take(&mut self.speech_buffer);
            frames.extend(self.redemption_tail.drain(..keep));

            let start_frame = self.segment_start;
            let end_frame = start_frame + frames.len() as u64;
            let audio = frames.concat();
            debug!(start_frame, end_frame, samples = audio.len(), "speech end");
            handle_event(VadEvent::SpeechEnd {
                audio,
                start_frame,
                end_frame,
            });
        } else {
            debug!(
                active_frames = self.active_frame_count,
                "segment too short, misfire"
            );
            handle_event(VadEvent::VadMisfire);
        }

        self.reset();
    }
}
