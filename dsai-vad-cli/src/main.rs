//! `dsai-vad`: find speech segments in a WAV file.
//!
//! Offline mode (default) scans the whole file with `NonRealTimeVad` and
//! prints the segments as JSON. `--stream-chunk <n>` instead pushes the file
//! through `RealTimeVad` in `n`-sample chunks, the way a live caller would,
//! and logs every event.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use dsai_vad::{
    audio::{
        wav::{read_wav, write_wav},
        MODEL_SAMPLE_RATE,
    },
    read_model_file, EnergyEngine, InferenceEngine, ModelVersion, NonRealTimeVad, RealTimeVad,
    SpeechSegment, VadCallbacks, VadOptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineKind {
    Onnx,
    Energy,
}

#[derive(Debug)]
struct Args {
    input: PathBuf,
    model_path: PathBuf,
    model: Option<ModelVersion>,
    config: Option<PathBuf>,
    engine: EngineKind,
    energy_threshold: f32,
    out_dir: Option<PathBuf>,
    stream_chunk: Option<usize>,
}

const USAGE: &str = "Usage: dsai-vad <input.wav> [--engine onnx|energy] [--model v5|legacy] \\
  [--model-path <silero_vad.onnx>] [--config <options.json>] [--energy-threshold <rms>] \\
  [--out-dir <dir>] [--stream-chunk <samples>]";

fn parse_args() -> anyhow::Result<Args> {
    let mut input: Option<PathBuf> = None;
    let mut model_path = PathBuf::from("models/silero_vad.onnx");
    let mut model = None;
    let mut config = None;
    let mut engine = if cfg!(feature = "onnx") {
        EngineKind::Onnx
    } else {
        EngineKind::Energy
    };
    let mut energy_threshold = 0.02_f32;
    let mut out_dir = None;
    let mut stream_chunk = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| {
            it.next()
                .with_context(|| format!("missing value for {flag}"))
        };
        match arg.as_str() {
            "--model-path" => model_path = PathBuf::from(value("--model-path")?),
            "--model" => model = Some(value("--model")?.parse::<ModelVersion>()?),
            "--config" => config = Some(PathBuf::from(value("--config")?)),
            "--engine" => {
                engine = match value("--engine")?.as_str() {
                    "onnx" => EngineKind::Onnx,
                    "energy" => EngineKind::Energy,
                    other => bail!("unknown engine '{other}' (expected onnx or energy)"),
                }
            }
            "--energy-threshold" => {
                energy_threshold = value("--energy-threshold")?
                    .parse()
                    .context("invalid value for --energy-threshold")?
            }
            "--out-dir" => out_dir = Some(PathBuf::from(value("--out-dir")?)),
            "--stream-chunk" => {
                let n: usize = value("--stream-chunk")?
                    .parse()
                    .context("invalid value for --stream-chunk")?;
                if n == 0 {
                    bail!("--stream-chunk must be positive");
                }
                stream_chunk = Some(n);
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other if other.starts_with("--") => bail!("unknown argument: {other}"),
            other => {
                if input.replace(PathBuf::from(other)).is_some() {
                    bail!("only one input file is supported");
                }
            }
        }
    }

    let Some(input) = input else {
        bail!("missing input file\n{USAGE}");
    };
    Ok(Args {
        input,
        model_path,
        model,
        config,
        engine,
        energy_threshold,
        out_dir,
        stream_chunk,
    })
}

/// Options from `--config` (if any), with `--model` taking precedence.
fn load_options(args: &Args) -> anyhow::Result<VadOptions> {
    let Some(path) = &args.config else {
        return Ok(VadOptions::for_model(args.model.unwrap_or_default()));
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading options file {}", path.display()))?;
    let mut doc: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    if let (Some(version), Some(obj)) = (args.model, doc.as_object_mut()) {
        obj.insert("model".into(), serde_json::Value::from(version.as_str()));
    }
    Ok(VadOptions::from_json(&doc.to_string())?)
}

fn build_engine(args: &Args) -> anyhow::Result<Box<dyn InferenceEngine>> {
    match args.engine {
        EngineKind::Energy => Ok(Box::new(EnergyEngine::new(args.energy_threshold))),
        #[cfg(feature = "onnx")]
        EngineKind::Onnx => Ok(Box::new(dsai_vad::OrtEngine::from_env())),
        #[cfg(not(feature = "onnx"))]
        EngineKind::Onnx => bail!("this build has no ONNX support; use --engine energy"),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanReport<'a> {
    input: String,
    model: ModelVersion,
    sample_rate: u32,
    segments: &'a [SpeechSegment],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamReport {
    input: String,
    model: ModelVersion,
    chunk_samples: usize,
    segment_durations_ms: Vec<u64>,
    misfires: usize,
}

fn write_segments<'a>(
    out_dir: &Path,
    segments: impl IntoIterator<Item = &'a [f32]>,
) -> anyhow::Result<usize> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let mut written = 0;
    for (i, audio) in segments.into_iter().enumerate() {
        let path = out_dir.join(format!("segment_{i:03}.wav"));
        write_wav(&path, audio, MODEL_SAMPLE_RATE)?;
        written += 1;
    }
    info!(count = written, dir = %out_dir.display(), "segments written");
    Ok(written)
}

async fn scan(
    args: &Args,
    engine: &dyn InferenceEngine,
    weights: Vec<u8>,
    mut options: VadOptions,
) -> anyhow::Result<()> {
    let chunk = read_wav(&args.input)?;
    options.sample_rate = chunk.sample_rate;
    info!(
        file = %args.input.display(),
        sample_rate = chunk.sample_rate,
        seconds = chunk.duration_secs(),
        "scanning"
    );

    let mut vad = NonRealTimeVad::new(engine, move || async move { Ok(weights) }, options).await?;
    let segments = vad.run_chunk(&chunk).await?;

    let report = ScanReport {
        input: args.input.display().to_string(),
        model: vad.options().model,
        sample_rate: chunk.sample_rate,
        segments: &segments,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(dir) = &args.out_dir {
        write_segments(dir, segments.iter().map(|s| s.audio.as_slice()))?;
    }
    Ok(())
}

async fn stream(
    args: &Args,
    engine: &dyn InferenceEngine,
    weights: Vec<u8>,
    mut options: VadOptions,
    chunk_samples: usize,
) -> anyhow::Result<()> {
    let chunk = read_wav(&args.input)?;
    options.sample_rate = chunk.sample_rate;

    let ended: Arc<Mutex<Vec<Vec<f32>>>> = Arc::default();
    let misfires = Arc::new(Mutex::new(0usize));
    let ended_cb = Arc::clone(&ended);
    let misfires_cb = Arc::clone(&misfires);

    let callbacks = VadCallbacks::new()
        .on_speech_start(|| info!("speech start"))
        .on_speech_real_start(|| info!("speech confirmed"))
        .on_vad_misfire(move || {
            warn!("misfire");
            *misfires_cb.lock() += 1;
        })
        .on_speech_end(move |audio| {
            info!(samples = audio.len(), "speech end");
            ended_cb.lock().push(audio);
        });

    let mut vad =
        RealTimeVad::new(engine, move || async move { Ok(weights) }, options, callbacks).await?;
    let model = vad.options().model;
    vad.start();
    for piece in chunk.samples.chunks(chunk_samples) {
        vad.process_audio(piece).await?;
    }
    vad.flush().await?;
    vad.destroy();

    let ended = std::mem::take(&mut *ended.lock());
    let report = StreamReport {
        input: args.input.display().to_string(),
        model,
        chunk_samples,
        segment_durations_ms: ended
            .iter()
            .map(|a| a.len() as u64 * 1000 / u64::from(MODEL_SAMPLE_RATE))
            .collect(),
        misfires: *misfires.lock(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(dir) = &args.out_dir {
        write_segments(dir, ended.iter().map(Vec::as_slice))?;
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    let options = load_options(&args)?;
    let engine = build_engine(&args)?;

    let weights = match args.engine {
        EngineKind::Onnx => read_model_file(args.model_path.clone()).await?,
        EngineKind::Energy => Vec::new(),
    };

    match args.stream_chunk {
        Some(n) => stream(&args, engine.as_ref(), weights, options, n).await,
        None => scan(&args, engine.as_ref(), weights, options).await,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dsai_vad=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("dsai-vad failed: {e:#}");
        std::process::exit(1);
    }
}
