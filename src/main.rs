use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cadence_voice::audio::{AudioCapture, AudioPlayback};
use cadence_voice::profile::{JsonProfileStore, ProfileStore};
use cadence_voice::speech::accent::{AccentProfile, ThreadRandom, accentize, apply_text_accent};
use cadence_voice::speech::prosody::ProsodyPlanner;
use cadence_voice::speech::synth::FormantSynthesizer;
use cadence_voice::supervisor::TracingDiagnostics;
use cadence_voice::{Config, EventBus, Pipeline, RecognitionService};

/// Cadence - real-time voice interaction pipeline
#[derive(Parser)]
#[command(name = "cadence", version, about)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll the wake keyword from the microphone
    EnrollWake,
    /// Enroll a named speaker voiceprint from the microphone
    EnrollSpeaker {
        /// Profile id to save under
        #[arg(short, long)]
        id: String,
    },
    /// Speak text through the formant synthesizer
    Say {
        /// Text to speak
        #[arg(default_value = "Hello, world.")]
        text: String,
        /// Accent profile override
        #[arg(short, long)]
        accent: Option<String>,
        /// Write a WAV file instead of playing
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List saved speaker profiles
    Profiles,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,cadence_voice=info",
        1 => "info,cadence_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Recognition placeholder for standalone runs; the host service is wired in
/// by the embedding application
struct NoopRecognizer;

#[async_trait::async_trait]
impl RecognitionService for NoopRecognizer {
    async fn transcribe(&self, _wav: Vec<u8>) -> cadence_voice::Result<String> {
        Err(cadence_voice::Error::Recognition(
            "no recognition service configured".to_string(),
        ))
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::EnrollWake => enroll_wake(config).await,
            Command::EnrollSpeaker { id } => enroll_speaker(config, &id).await,
            Command::Say { text, accent, out } => say(config, &text, accent.as_deref(), out).await,
            Command::Profiles => list_profiles(&config),
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
        };
    }

    tracing::info!(keyword = %config.wake_keyword, "starting cadence");

    let bus = Arc::new(EventBus::new());
    bus.subscribe(|event| {
        tracing::info!(?event, "pipeline event");
    });

    let pipeline = Arc::new(Pipeline::new(config, Arc::clone(&bus), Arc::new(NoopRecognizer))?);
    let supervisor = pipeline.supervisor(Arc::new(TracingDiagnostics));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let supervisor_shutdown = shutdown_rx.clone();

    let supervisor_task = tokio::spawn(async move {
        supervisor.run(supervisor_shutdown).await;
    });

    // The pipeline owns the capture stream, so it runs on this task
    let run = pipeline.run(shutdown_rx);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
            shutdown_tx.send(true)?;
            run.await?;
        }
    }

    supervisor_task.await?;
    Ok(())
}

/// Capture from the default microphone for `duration`
async fn capture_for(duration: Duration) -> anyhow::Result<Vec<f32>> {
    let mut capture = AudioCapture::new()?;
    capture.start()?;
    tracing::info!(secs = duration.as_secs_f32(), "recording...");
    tokio::time::sleep(duration).await;
    capture.stop();
    Ok(capture.take_buffer())
}

async fn enroll_wake(config: Config) -> anyhow::Result<()> {
    let keyword = config.wake_keyword.clone();
    let capture_secs = config.enroll.clamped_capture();
    let pipeline = Pipeline::new(config, Arc::new(EventBus::new()), Arc::new(NoopRecognizer))?;

    println!("Say \"{keyword}\" after the prompt.");
    println!("Recording...");
    let samples = capture_for(capture_secs).await?;

    let frames = pipeline.enroll_wake(&samples)?;
    println!("Enrolled wake keyword \"{keyword}\" ({frames} frames).");
    Ok(())
}

async fn enroll_speaker(config: Config, id: &str) -> anyhow::Result<()> {
    let capture_secs = config.enroll.clamped_capture();
    let store = JsonProfileStore::new(&config.data_dir.join("profiles"))?;
    let pipeline = Pipeline::new(config, Arc::new(EventBus::new()), Arc::new(NoopRecognizer))?;

    println!("Speak naturally after the prompt.");
    println!("Recording...");
    let samples = capture_for(capture_secs).await?;

    let voiceprint = pipeline.enroll_speaker(&samples)?;
    store.save(id, &voiceprint)?;
    println!("Saved voiceprint \"{id}\" ({} coefficients).", voiceprint.len());
    Ok(())
}

async fn say(
    config: Config,
    text: &str,
    accent_override: Option<&str>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let accent_name = accent_override.unwrap_or(&config.accent);
    let accent = AccentProfile::by_name(accent_name)
        .ok_or_else(|| anyhow::anyhow!("unknown accent profile: {accent_name}"))?;

    let mut rng = ThreadRandom::new();
    let accented = apply_text_accent(text, accent, config.accent_intensity, &mut rng);
    let mut units = ProsodyPlanner::new().plan(&accented);
    accentize(&mut units, accent);

    let synthesizer = FormantSynthesizer::new(config.synth);
    let samples = synthesizer.render(&units, &config.voice);

    if let Some(path) = out {
        write_wav(&path, &samples, synthesizer.sample_rate())?;
        println!("Wrote {} samples to {}", samples.len(), path.display());
        return Ok(());
    }

    AudioPlayback::new()
        .play(samples, synthesizer.sample_rate())
        .await?;
    Ok(())
}

fn write_wav(path: &std::path::Path, samples: &[f32], sample_rate: u32) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

fn list_profiles(config: &Config) -> anyhow::Result<()> {
    let store = JsonProfileStore::new(&config.data_dir.join("profiles"))?;
    let profiles = store.list()?;

    if profiles.is_empty() {
        println!("No saved profiles.");
        return Ok(());
    }

    for p in profiles {
        println!("{}  ({} coefficients, created {})", p.id, p.coefficients, p.created_at);
    }
    Ok(())
}

async fn test_mic(duration: u64) -> anyhow::Result<()> {
    let samples = capture_for(Duration::from_secs(duration)).await?;
    let peak = samples.iter().fold(0.0_f32, |m, s| m.max(s.abs()));

    println!("Captured {} samples, peak amplitude {peak:.3}", samples.len());
    if peak < 0.01 {
        println!("Warning: input looks silent - check the microphone.");
    }
    Ok(())
}

async fn test_speaker() -> anyhow::Result<()> {
    let sample_rate = 22050_u32;
    let samples: Vec<f32> = (0..sample_rate)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.3
        })
        .collect();

    println!("Playing a 1s test tone...");
    AudioPlayback::new().play(samples, sample_rate).await?;
    Ok(())
}
