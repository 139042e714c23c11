//! Cadence - Real-time voice interaction pipeline
//!
//! This library provides the core of a self-healing voice front end:
//! - Voice activity detection (energy + spectral flux with hysteresis)
//! - MFCC feature extraction for speaker and wake-word matching
//! - Wake-word matching via dynamic time warping, speaker verification via
//!   cosine-scored voiceprints
//! - Prosody planning and accent transformation feeding a formant synthesizer
//! - A duplex guard that keeps the pipeline from transcribing its own output
//! - A watchdog supervisor with tiered anomaly detection and rate-limited
//!   recovery
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Capture device                        │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │ frames
//! ┌───────────────────────────▼──────────────────────────────┐
//! │   VAD ──► MFCC ──► Wake/Speaker match ──► Recognition    │
//! │                                               │ text     │
//! │   Duplex guard ◄── Formant synth ◄── Accent ◄─┘          │
//! └───────────────────────────┬──────────────────────────────┘
//!                             │ heartbeats
//! ┌───────────────────────────▼──────────────────────────────┐
//! │        Supervisor (watchdog, rate-limited auto-heal)      │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod dsp;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod profile;
pub mod speech;
pub mod supervisor;
pub mod turn;
pub mod vad;
pub mod wake;

pub use config::Config;
pub use dsp::{FeatureConfig, FeatureExtractor, cosine, resample_coefficients};
pub use error::{Error, Result};
pub use events::{EventBus, PipelineEvent};
pub use pipeline::{Pipeline, RecognitionService};
pub use profile::{JsonProfileStore, ProfileRecord, ProfileStore};
pub use speech::accent::{AccentProfile, RandomSource, ThreadRandom, accentize, apply_text_accent};
pub use speech::prosody::{Boundary, PhonemeUnit, ProsodyPlanner};
pub use speech::synth::{FormantSynthesizer, SynthOptions};
pub use supervisor::{
    DiagnosticsSink, Heartbeats, Severity, SignalKind, Supervisor, SupervisorSignal,
    TracingDiagnostics,
};
pub use turn::{SpeechState, TurnStateMachine};
pub use vad::{VadConfig, VadEvent, VoiceActivityDetector};
pub use wake::{MatcherConfig, SpeakerVerifier, WakeWordMatcher};
