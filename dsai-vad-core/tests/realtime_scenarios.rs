//! End-to-end `RealTimeVad` behaviour with a probe engine.
//!
//! The probe engine reports the first sample of each frame as its speech
//! probability, so a test writes the probability script straight into the
//! audio: frame `n` is 512 (or 1536 for legacy) copies of `probs[n]`.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use async_trait::async_trait;
use parking_lot::Mutex;

use dsai_vad::{
    inference::{InputTensor, SessionOutputs},
    InferenceEngine, InferenceSession, ModelVersion, RealTimeVad, Result, SpeechState,
    VadCallbacks, VadError, VadOptions,
};

const FRAME: usize = 512;

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Start,
    RealStart,
    End(Vec<f32>),
    Misfire,
}

/// Events in order, each tagged with the number of frames processed so far.
type Log = Arc<Mutex<Vec<(usize, Event)>>>;

#[derive(Default, Clone)]
struct ProbeEngine {
    /// First element of the `state` (v5) or `h` (legacy) input on every run.
    state_heads: Arc<Mutex<Vec<f32>>>,
    /// Length of every `input` frame.
    frame_lens: Arc<Mutex<Vec<usize>>>,
}

struct ProbeSession {
    state_heads: Arc<Mutex<Vec<f32>>>,
    frame_lens: Arc<Mutex<Vec<usize>>>,
}

impl InferenceEngine for ProbeEngine {
    fn create_session(&self, _model_bytes: &[u8]) -> Result<Box<dyn InferenceSession>> {
        Ok(Box::new(ProbeSession {
            state_heads: Arc::clone(&self.state_heads),
            frame_lens: Arc::clone(&self.frame_lens),
        }))
    }
}

#[async_trait]
impl InferenceSession for ProbeSession {
    async fn run(
        &mut self,
        inputs: Vec<(&'static str, InputTensor)>,
        _outputs: &[&'static str],
    ) -> Result<SessionOutputs> {
        let tensor = |name: &str| {
            inputs.iter().find_map(|(n, t)| match t {
                InputTensor::Float32(a) if *n == name => Some(a.iter().copied().collect::<Vec<_>>()),
                _ => None,
            })
        };
        let missing = |name: &str| VadError::Inference(format!("no {name}"));
        let frame = tensor("input").ok_or_else(|| missing("input"))?;
        self.frame_lens.lock().push(frame.len());

        let mut outputs = SessionOutputs::new();
        outputs.insert("output".into(), vec![frame[0]]);
        if let Some(state) = tensor("state") {
            self.state_heads.lock().push(state[0]);
            outputs.insert("stateN".into(), state.iter().map(|v| v + 1.0).collect());
        } else {
            let h = tensor("h").ok_or_else(|| missing("h"))?;
            let c = tensor("c").ok_or_else(|| missing("c"))?;
            self.state_heads.lock().push(h[0]);
            outputs.insert("hn".into(), h.iter().map(|v| v + 1.0).collect());
            outputs.insert("cn".into(), c);
        }
        Ok(outputs)
    }
}

fn audio_for(probs: &[f32]) -> Vec<f32> {
    audio_in_frames_of(FRAME, probs)
}

fn audio_in_frames_of(frame: usize, probs: &[f32]) -> Vec<f32> {
    probs.iter().flat_map(|&p| vec![p; frame]).collect()
}

fn logging_callbacks(log: &Log) -> VadCallbacks {
    let frames = Arc::new(Mutex::new(0usize));
    let push = |event: Event| {
        let log = Arc::clone(log);
        let frames = Arc::clone(&frames);
        move || log.lock().push((*frames.lock(), event.clone()))
    };
    let on_start = push(Event::Start);
    let on_real = push(Event::RealStart);
    let on_misfire = push(Event::Misfire);
    let end_log = Arc::clone(log);
    let end_frames = Arc::clone(&frames);

    VadCallbacks::new()
        .on_frame_processed(move |_, _| *frames.lock() += 1)
        .on_speech_start(move || on_start())
        .on_speech_real_start(move || on_real())
        .on_vad_misfire(move || on_misfire())
        .on_speech_end(move |audio| end_log.lock().push((*end_frames.lock(), Event::End(audio))))
}

async fn started_vad(engine: &ProbeEngine, options: VadOptions, log: &Log) -> RealTimeVad {
    let mut vad = RealTimeVad::new(
        engine,
        || async { Ok(b"probe".to_vec()) },
        options,
        logging_callbacks(log),
    )
    .await
    .expect("construct vad");
    vad.start();
    vad
}

const SUSTAINED: [f32; 16] = [
    0.1, 0.1, 0.6, 0.7, 0.8, 0.9, 0.9, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2,
];

#[tokio::test]
async fn sustained_speech_produces_start_confirm_and_padded_end() {
    let engine = ProbeEngine::default();
    let log = Log::default();
    let mut vad = started_vad(&engine, VadOptions::default(), &log).await;

    // odd chunk sizes exercise the carry buffer
    let audio = audio_for(&SUSTAINED);
    for chunk in audio.chunks(700) {
        vad.process_audio(chunk).await.unwrap();
    }

    assert_eq!(
        *log.lock(),
        vec![
            (3, Event::Start),
            (5, Event::RealStart),
            (16, Event::End(audio_for(&SUSTAINED[1..8]))),
        ]
    );
}

#[tokio::test]
async fn short_burst_is_reported_as_misfire() {
    let engine = ProbeEngine::default();
    let log = Log::default();
    let mut vad = started_vad(&engine, VadOptions::default(), &log).await;

    let mut probs = vec![0.1, 0.6, 0.7];
    probs.extend([0.2; 9]);
    vad.process_audio(&audio_for(&probs)).await.unwrap();

    assert_eq!(*log.lock(), vec![(2, Event::Start), (12, Event::Misfire)]);
}

#[tokio::test]
async fn reset_then_replay_reproduces_events() {
    let engine = ProbeEngine::default();
    let log = Log::default();
    let mut vad = started_vad(&engine, VadOptions::default(), &log).await;
    let audio = audio_for(&SUSTAINED);

    vad.process_audio(&audio).await.unwrap();
    let first: Vec<Event> = log.lock().drain(..).map(|(_, e)| e).collect();

    vad.reset();
    vad.process_audio(&audio).await.unwrap();
    let second: Vec<Event> = log.lock().drain(..).map(|(_, e)| e).collect();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);

    let heads = engine.state_heads.lock();
    assert_eq!(heads.len(), 32);
    // model state restarts from zero after reset
    assert_eq!(heads[15], 15.0);
    assert_eq!(heads[16], 0.0);
}

#[tokio::test]
async fn reset_keeps_in_progress_segment() {
    // reset() clears carry buffers and model state only; a segment already
    // under way is finished by the frames that follow
    let engine = ProbeEngine::default();
    let log = Log::default();
    let mut vad = started_vad(&engine, VadOptions::default(), &log).await;

    vad.process_audio(&audio_for(&[0.9, 0.9, 0.9])).await.unwrap();
    assert_eq!(vad.speech_state(), SpeechState::InSpeech);

    vad.reset();
    assert_eq!(vad.speech_state(), SpeechState::InSpeech);

    vad.process_audio(&audio_for(&[0.1; 9])).await.unwrap();
    let events: Vec<Event> = log.lock().iter().map(|(_, e)| e.clone()).collect();
    assert_eq!(
        events,
        vec![
            Event::Start,
            Event::RealStart,
            Event::End(audio_for(&[0.9, 0.9, 0.9, 0.1])),
        ]
    );
}

#[tokio::test]
async fn pause_drops_segment_unless_submitting() {
    let engine = ProbeEngine::default();

    let log = Log::default();
    let mut vad = started_vad(&engine, VadOptions::default(), &log).await;
    vad.process_audio(&audio_for(&[0.9; 4])).await.unwrap();
    vad.pause();
    assert!(!vad.is_active());
    assert_eq!(vad.speech_state(), SpeechState::Idle);
    assert!(!log.lock().iter().any(|(_, e)| matches!(e, Event::End(_))));

    // inactive: audio is ignored entirely
    vad.process_audio(&audio_for(&[0.9; 4])).await.unwrap();
    assert_eq!(log.lock().len(), 2);

    let log = Log::default();
    let options = VadOptions {
        submit_user_speech_on_pause: true,
        ..VadOptions::default()
    };
    let mut vad = started_vad(&engine, options, &log).await;
    vad.process_audio(&audio_for(&[0.9; 4])).await.unwrap();
    vad.pause();
    assert_eq!(
        log.lock().last().map(|(_, e)| e.clone()),
        Some(Event::End(audio_for(&[0.9; 4])))
    );
}

#[tokio::test]
async fn flush_processes_the_partial_frame_and_ends_speech() {
    let engine = ProbeEngine::default();
    let log = Log::default();
    let mut vad = started_vad(&engine, VadOptions::default(), &log).await;

    let mut audio = audio_for(&[0.9; 3]);
    audio.extend([0.8; 100]);
    vad.process_audio(&audio).await.unwrap();
    vad.flush().await.unwrap();

    let mut expected = audio_for(&[0.9; 3]);
    expected.extend([0.8; 100]);
    expected.resize(4 * FRAME, 0.0);
    assert_eq!(
        log.lock().last().cloned(),
        Some((4, Event::End(expected)))
    );
    assert_eq!(vad.speech_state(), SpeechState::Idle);
}

#[tokio::test]
async fn destroy_submits_when_configured() {
    let engine = ProbeEngine::default();
    let log = Log::default();
    let options = VadOptions {
        submit_user_speech_on_pause: true,
        ..VadOptions::default()
    };
    let mut vad = started_vad(&engine, options, &log).await;
    vad.process_audio(&audio_for(&[0.9; 3])).await.unwrap();
    vad.destroy();

    assert!(matches!(log.lock().last(), Some((3, Event::End(_)))));
}

#[tokio::test]
async fn high_rate_input_is_resampled_to_model_frames() {
    let engine = ProbeEngine::default();
    let log = Log::default();
    let options = VadOptions::default().with_sample_rate(48_000);
    let mut vad = started_vad(&engine, options, &log).await;

    // each 16 kHz frame becomes 1536 samples at 48 kHz
    let audio: Vec<f32> = SUSTAINED.iter().flat_map(|&p| vec![p; 3 * FRAME]).collect();
    vad.process_audio(&audio).await.unwrap();

    assert_eq!(engine.state_heads.lock().len(), 16);
    let log = log.lock();
    assert_eq!(log[0], (3, Event::Start));
    assert_eq!(log[1], (5, Event::RealStart));
    match &log[2] {
        (16, Event::End(audio)) => {
            let expected = audio_for(&SUSTAINED[1..8]);
            assert_eq!(audio.len(), expected.len());
            for (a, b) in audio.iter().zip(&expected) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
            }
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn out_of_range_probability_surfaces_as_inference_error() {
    let engine = ProbeEngine::default();
    let log = Log::default();
    let mut vad = started_vad(&engine, VadOptions::default(), &log).await;

    let err = vad.process_audio(&audio_for(&[0.2, 1.5])).await.unwrap_err();
    assert!(matches!(err, VadError::Inference(_)), "{err:?}");
}

#[tokio::test]
async fn legacy_model_runs_the_same_scenario_on_long_frames() {
    let engine = ProbeEngine::default();
    let log = Log::default();
    let options = VadOptions::for_model(ModelVersion::Legacy);
    let mut vad = started_vad(&engine, options, &log).await;

    let audio = audio_in_frames_of(1536, &SUSTAINED);
    for chunk in audio.chunks(1000) {
        vad.process_audio(chunk).await.unwrap();
    }

    assert_eq!(
        *log.lock(),
        vec![
            (3, Event::Start),
            (5, Event::RealStart),
            (16, Event::End(audio_in_frames_of(1536, &SUSTAINED[1..8]))),
        ]
    );
    assert!(engine.frame_lens.lock().iter().all(|&n| n == 1536));
    // h is threaded from hn between frames
    let heads = engine.state_heads.lock();
    assert_eq!(heads.len(), 16);
    assert_eq!(heads[15], 15.0);
}

#[tokio::test]
async fn low_rate_input_is_held_up_to_model_frames() {
    let engine = ProbeEngine::default();
    let log = Log::default();
    let options = VadOptions::default().with_sample_rate(8_000);
    let mut vad = started_vad(&engine, options, &log).await;

    // each 16 kHz frame is 256 samples at 8 kHz, every one held twice
    let audio = audio_in_frames_of(FRAME / 2, &SUSTAINED);
    for chunk in audio.chunks(300) {
        vad.process_audio(chunk).await.unwrap();
    }

    assert_eq!(engine.frame_lens.lock().len(), 16);
    assert_eq!(
        *log.lock(),
        vec![
            (3, Event::Start),
            (5, Event::RealStart),
            (16, Event::End(audio_for(&SUSTAINED[1..8]))),
        ]
    );
}

#[tokio::test]
async fn zero_sample_rate_is_rejected_at_construction() {
    let err = RealTimeVad::new(
        &ProbeEngine::default(),
        || async { Ok(Vec::new()) },
        VadOptions::default().with_sample_rate(0),
        VadCallbacks::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VadError::Configuration(_)));
}
