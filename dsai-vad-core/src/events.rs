//! Events emitted by the frame processor and the callbacks that receive them.
//!
//! | Event              | Callback                 | When                                     |
//! |--------------------|--------------------------|------------------------------------------|
//! | `FrameProcessed`   | `on_frame_processed`     | every frame, before any state change     |
//! | `SpeechStart`      | `on_speech_start`        | first frame at/above the positive threshold |
//! | `SpeechRealStart`  | `on_speech_real_start`   | segment reaches `min_speech_frames`      |
//! | `SpeechEnd`        | `on_speech_end`          | confirmed segment ends                   |
//! | `VadMisfire`       | `on_vad_misfire`         | unconfirmed segment ends                 |

use serde::{Deserialize, Serialize};

/// Model output for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechProbabilities {
    /// Speech probability in [0.0, 1.0].
    pub is_speech: f32,
    /// Complementary score; only reported by the legacy model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_speech: Option<f32>,
}

impl SpeechProbabilities {
    pub fn new(is_speech: f32) -> Self {
        Self {
            is_speech,
            not_speech: None,
        }
    }
}

/// A single frame-processor event.
///
/// `FrameProcessed` borrows the frame being processed; every other variant
/// owns its data.
#[derive(Debug, Clone, PartialEq)]
pub enum VadEvent<'a> {
    FrameProcessed {
        probabilities: SpeechProbabilities,
        frame: &'a [f32],
    },
    SpeechStart,
    SpeechRealStart,
    SpeechEnd {
        /// Concatenated 16 kHz audio of the segment, pre-speech padding included.
        audio: Vec<f32>,
        /// Stream position (frame index) of the first frame in `audio`.
        start_frame: u64,
        /// Stream position one past the last frame in `audio`.
        end_frame: u64,
    },
    VadMisfire,
}

/// A detected speech segment with timestamps, as returned by offline scanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechSegment {
    /// 16 kHz mono audio; omitted from serialized output.
    #[serde(skip)]
    pub audio: Vec<f32>,
    pub start_ms: u64,
    pub end_ms: u64,
}

type FrameCallback = Box<dyn FnMut(SpeechProbabilities, &[f32]) + Send>;
type SignalCallback = Box<dyn FnMut() + Send>;
type AudioCallback = Box<dyn FnMut(Vec<f32>) + Send>;

/// User callbacks invoked synchronously as events are produced.
///
/// ```ignore
/// let callbacks = VadCallbacks::new()
///     .on_speech_start(|| println!("speech started"))
///     .on_speech_end(|audio| println!("segment of {} samples", audio.len()));
/// ```
#[derive(Default)]
pub struct VadCallbacks {
    on_frame_processed: Option<FrameCallback>,
    on_vad_misfire: Option<SignalCallback>,
    on_speech_start: Option<SignalCallback>,
    on_speech_real_start: Option<SignalCallback>,
    on_speech_end: Option<AudioCallback>,
}

impl VadCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_frame_processed(
        mut self,
        f: impl FnMut(SpeechProbabilities, &[f32]) + Send + 'static,
    ) -> Self {
        self.on_frame_processed = Some(Box::new(f));
        self
    }

    pub fn on_vad_misfire(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_vad_misfire = Some(Box::new(f));
        self
    }

    pub fn on_speech_start(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_speech_start = Some(Box::new(f));
        self
    }

    pub fn on_speech_real_start(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_speech_real_start = Some(Box::new(f));
        self
    }

    pub fn on_speech_end(mut self, f: impl FnMut(Vec<f32>) + Send + 'static) -> Self {
        self.on_speech_end = Some(Box::new(f));
        self
    }

    /// Route one event to its callback, if registered.
    pub fn dispatch(&mut self, event: VadEvent<'_>) {
        match event {
            VadEvent::FrameProcessed {
                probabilities,
                frame,
            } => {
                if let Some(cb) = self.on_frame_processed.as_mut() {
                    cb(probabilities, frame);
                }
            }
            VadEvent::SpeechStart => {
                if let Some(cb) = self.on_speech_start.as_mut() {
                    cb();
                }
            }
            VadEvent::SpeechRealStart => {
                if let Some(cb) = self.on_speech_real_start.as_mut() {
                    cb();
                }
            }
            VadEvent::SpeechEnd { audio, .. } => {
                if let Some(cb) = self.on_speech_end.as_mut() {
                    cb(audio);
                }
            }
            VadEvent::VadMisfire => {
                if let Some(cb) = self.on_vad_misfire.as_mut() {
                    cb();
                }
            }
        }
    }
}

impl std::fmt::Debug for VadCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VadCallbacks")
            .field("on_frame_processed", &self.on_frame_processed.is_some())
            .field("on_vad_misfire", &self.on_vad_misfire.is_some())
            .field("on_speech_start", &self.on_speech_start.is_some())
            .field("on_speech_real_start", &self.on_speech_real_start.is_some())
            .field("on_speech_end", &self.on_speech_end.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;

    #[test]
    fn dispatch_routes_each_event_to_its_callback() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let (l1, l2, l3, l4, l5) = (
            Arc::clone(&log),
            Arc::clone(&log),
            Arc::clone(&log),
            Arc::clone(&log),
            Arc::clone(&log),
        );

        let mut callbacks = VadCallbacks::new()
            .on_frame_processed(move |p, frame| {
                l1.lock().push(format!("frame {} {}", p.is_speech, frame.len()))
            })
            .on_speech_start(move || l2.lock().push("start".into()))
            .on_speech_real_start(move || l3.lock().push("real".into()))
            .on_speech_end(move |audio| l4.lock().push(format!("end {}", audio.len())))
            .on_vad_misfire(move || l5.lock().push("misfire".into()));

        let frame = [0.0f32; 4];
        callbacks.dispatch(VadEvent::FrameProcessed {
            probabilities: SpeechProbabilities::new(0.75),
            frame: &frame,
        });
        callbacks.dispatch(VadEvent::SpeechStart);
        callbacks.dispatch(VadEvent::SpeechRealStart);
        callbacks.dispatch(VadEvent::SpeechEnd {
            audio: vec![0.0; 8],
            start_frame: 0,
            end_frame: 2,
        });
        callbacks.dispatch(VadEvent::VadMisfire);

        assert_eq!(
            &*log.lock(),
            &["frame 0.75 4", "start", "real", "end 8", "misfire"]
        );
    }

    #[test]
    fn missing_callbacks_are_skipped() {
        let mut callbacks = VadCallbacks::new();
        callbacks.dispatch(VadEvent::SpeechStart);
        callbacks.dispatch(VadEvent::VadMisfire);
        assert!(format!("{callbacks:?}").contains("on_speech_end: false"));
    }

    #[test]
    fn segment_serializes_timestamps_without_audio() {
        let segment = SpeechSegment {
            audio: vec![0.1; 512],
            start_ms: 32,
            end_ms: 256,
        };
        let json = serde_json::to_value(&segment).expect("serialize segment");
        assert_eq!(json["startMs"], 32);
        assert_eq!(json["endMs"], 256);
        assert!(json.get("audio").is_none());
    }

    #[test]
    fn probabilities_omit_missing_not_speech() {
        let json = serde_json::to_value(SpeechProbabilities::new(0.5)).unwrap();
        assert_eq!(json["isSpeech"], 0.5);
        assert!(json.get("notSpeech").is_none());
    }
}
