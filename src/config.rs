//! Configuration for the voice pipeline
//!
//! Runtime configuration is assembled from defaults, an optional TOML file,
//! and a couple of environment overrides. The file format is a separate
//! serde struct with every field optional, merged onto the typed defaults,
//! so a config file only states what it changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::dsp::FeatureConfig;
use crate::speech::accent::AccentProfile;
use crate::speech::synth::{SynthConfig, SynthOptions};
use crate::supervisor::SupervisorConfig;
use crate::vad::VadConfig;
use crate::wake::MatcherConfig;
use crate::wake::enroll::EnrollConfig;
use crate::{Error, Result};

/// Complete pipeline configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Data directory (profiles, recordings)
    pub data_dir: PathBuf,
    /// Wake keyword the matcher listens for
    pub wake_keyword: String,
    /// Accent profile name applied to replies
    pub accent: String,
    /// Accent text-substitution intensity in `[0, 1]`
    pub accent_intensity: f32,
    /// Require speaker verification before acting on commands
    pub verify_speaker: bool,
    /// MFCC extraction settings
    pub features: FeatureConfig,
    /// Voice activity detection settings
    pub vad: VadConfig,
    /// Wake/verify thresholds
    pub matcher: MatcherConfig,
    /// Enrollment capture settings
    pub enroll: EnrollConfig,
    /// Synthesizer output settings
    pub synth: SynthConfig,
    /// Default speaking rate/pitch/volume
    pub voice: SynthOptions,
    /// Watchdog thresholds and cadences
    pub supervisor: SupervisorConfig,
    /// Optional `host:port` for the network reachability probe
    pub probe_addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            wake_keyword: "hey cadence".to_string(),
            accent: "neutral".to_string(),
            accent_intensity: 0.6,
            verify_speaker: false,
            features: FeatureConfig::default(),
            vad: VadConfig::default(),
            matcher: MatcherConfig::default(),
            enroll: EnrollConfig::default(),
            synth: SynthConfig::default(),
            voice: SynthOptions::default(),
            supervisor: SupervisorConfig::default(),
            probe_addr: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "omni", "cadence")
        .map_or_else(|| PathBuf::from(".cadence"), |d| d.data_dir().to_path_buf())
}

/// On-disk TOML format; everything optional
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    wake_keyword: Option<String>,
    accent: Option<String>,
    accent_intensity: Option<f32>,
    verify_speaker: Option<bool>,
    probe_addr: Option<String>,
    #[serde(default)]
    vad: FileVad,
    #[serde(default)]
    matcher: FileMatcher,
    #[serde(default)]
    voice: FileVoice,
    #[serde(default)]
    supervisor: FileSupervisor,
}

#[derive(Debug, Default, Deserialize)]
struct FileVad {
    start_threshold: Option<f32>,
    stop_threshold: Option<f32>,
    min_hold_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileMatcher {
    wake_threshold: Option<f32>,
    verify_threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct FileVoice {
    rate: Option<f32>,
    pitch: Option<f32>,
    volume: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct FileSupervisor {
    cooldown_secs: Option<u64>,
    poll_interval_ms: Option<u64>,
}

impl Config {
    /// Load configuration: defaults, then the file at `path` (when given),
    /// then environment overrides
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, or when the
    /// merged configuration fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            let text = std::fs::read_to_string(path)?;
            let file: FileConfig = toml::from_str(&text)?;
            config.apply(file);
            tracing::debug!(path = %path.display(), "config file loaded");
        }

        if let Ok(dir) = std::env::var("CADENCE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(accent) = std::env::var("CADENCE_ACCENT") {
            config.accent = accent;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, file: FileConfig) {
        if let Some(v) = file.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = file.wake_keyword {
            self.wake_keyword = v;
        }
        if let Some(v) = file.accent {
            self.accent = v;
        }
        if let Some(v) = file.accent_intensity {
            self.accent_intensity = v;
        }
        if let Some(v) = file.verify_speaker {
            self.verify_speaker = v;
        }
        if let Some(v) = file.probe_addr {
            self.probe_addr = Some(v);
        }

        if let Some(v) = file.vad.start_threshold {
            self.vad.start_threshold = v;
        }
        if let Some(v) = file.vad.stop_threshold {
            self.vad.stop_threshold = v;
        }
        if let Some(v) = file.vad.min_hold_ms {
            self.vad.min_hold = Duration::from_millis(v);
        }

        if let Some(v) = file.matcher.wake_threshold {
            self.matcher.wake_threshold = v;
        }
        if let Some(v) = file.matcher.verify_threshold {
            self.matcher.verify_threshold = v;
        }

        if let Some(v) = file.voice.rate {
            self.voice.rate = v;
        }
        if let Some(v) = file.voice.pitch {
            self.voice.pitch = v;
        }
        if let Some(v) = file.voice.volume {
            self.voice.volume = v;
        }

        if let Some(v) = file.supervisor.cooldown_secs {
            self.supervisor.cooldown = Duration::from_secs(v);
        }
        if let Some(v) = file.supervisor.poll_interval_ms {
            self.supervisor.poll_interval = Duration::from_millis(v);
        }
    }

    fn validate(&self) -> Result<()> {
        if AccentProfile::by_name(&self.accent).is_none() {
            return Err(Error::Config(format!(
                "unknown accent profile: {} (available: {})",
                self.accent,
                AccentProfile::names().join(", ")
            )));
        }

        if self.vad.stop_threshold >= self.vad.start_threshold {
            return Err(Error::Config(
                "vad stop threshold must be below start threshold".to_string(),
            ));
        }

        if self.wake_keyword.trim().is_empty() {
            return Err(Error::Config("wake keyword must not be empty".to_string()));
        }

        if !(0.0..=1.0).contains(&self.accent_intensity) {
            return Err(Error::Config(
                "accent intensity must be in [0, 1]".to_string(),
            ));
        }

        Ok(())
    }
}
