//! Voice activity detection
//!
//! Energy + spectral-flux scoring over fixed-size frames with hysteresis: the
//! detector enters `Speech` when the weighted score crosses the start
//! threshold and leaves it only after a minimum hold time once the score
//! drops below the (lower) stop threshold. The emitted
//! [`VadEvent::SpeechStarted`] / [`VadEvent::SpeechStopped`] events are its
//! only observable side effects.
//!
//! The detector is pure frame-in/event-out; acquiring the capture device (and
//! failing with `DeviceUnavailable` when it is missing) is
//! [`crate::audio::capture`]'s job, and recovering from a dead device is the
//! supervisor's. The VAD itself never retries anything.
//!
//! Time is derived from the sample count, not the wall clock, so a frame
//! sequence always produces the same events.

use std::time::Duration;

/// Weight of the mean-square energy term in the frame score
const ENERGY_WEIGHT: f32 = 0.85;

/// Weight of the spectral-flux term in the frame score
const FLUX_WEIGHT: f32 = 0.15;

/// Detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// Waiting for speech
    Idle,
    /// Inside a speech segment
    Speech,
}

/// Events emitted on state transitions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VadEvent {
    /// Score crossed the start threshold
    SpeechStarted {
        /// Stream time of the triggering frame
        at: Duration,
        /// Score of the triggering frame
        score: f32,
    },
    /// Score fell below the stop threshold after the hold time
    SpeechStopped {
        /// Stream time of the triggering frame
        at: Duration,
        /// Score of the triggering frame
        score: f32,
    },
}

/// Configuration for voice activity detection
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// Score at or above which `Idle` transitions to `Speech`
    pub start_threshold: f32,
    /// Score below which `Speech` transitions back to `Idle`; must be lower
    /// than `start_threshold` (hysteresis against borderline toggling)
    pub stop_threshold: f32,
    /// Minimum time in `Speech` before a stop is allowed
    pub min_hold: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            start_threshold: 0.015,
            stop_threshold: 0.008,
            min_hold: Duration::from_millis(150),
        }
    }
}

/// Two-state voice activity detector with hysteresis
pub struct VoiceActivityDetector {
    config: VadConfig,
    sample_rate: u32,
    state: VadState,
    prev_frame: Vec<f32>,
    clock_samples: u64,
    speech_started_at: Option<Duration>,
}

impl VoiceActivityDetector {
    /// Create a detector for frames at the given sample rate
    #[must_use]
    pub const fn new(config: VadConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            state: VadState::Idle,
            prev_frame: Vec::new(),
            clock_samples: 0,
            speech_started_at: None,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> VadState {
        self.state
    }

    /// True while inside a speech segment
    #[must_use]
    pub fn is_speech_active(&self) -> bool {
        self.state == VadState::Speech
    }

    /// Stream time consumed so far
    #[must_use]
    pub const fn clock(&self) -> Duration {
        Duration::from_nanos(
            self.clock_samples * 1_000_000_000 / self.sample_rate as u64,
        )
    }

    /// Score one frame: weighted energy plus flux against the previous frame
    ///
    /// Both terms are per-sample means, which keeps the score independent of
    /// the frame length.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, frame: &[f32]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }

        let energy: f32 =
            frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32;

        let flux = if self.prev_frame.is_empty() {
            0.0
        } else {
            let n = frame.len().min(self.prev_frame.len());
            frame[..n]
                .iter()
                .zip(&self.prev_frame[..n])
                .map(|(a, b)| (a - b).abs())
                .sum::<f32>()
                / n as f32
        };

        FLUX_WEIGHT.mul_add(flux, ENERGY_WEIGHT * energy)
    }

    /// Feed one frame; returns an event on a state transition
    pub fn process(&mut self, frame: &[f32]) -> Option<VadEvent> {
        let score = self.score(frame);

        self.prev_frame.clear();
        self.prev_frame.extend_from_slice(frame);
        self.clock_samples += frame.len() as u64;
        let now = self.clock();

        match self.state {
            VadState::Idle => {
                if score >= self.config.start_threshold {
                    self.state = VadState::Speech;
                    self.speech_started_at = Some(now);
                    tracing::trace!(?now, score, "speech started");
                    return Some(VadEvent::SpeechStarted { at: now, score });
                }
            }
            VadState::Speech => {
                let held = self
                    .speech_started_at
                    .is_some_and(|start| now.saturating_sub(start) > self.config.min_hold);

                if held && score < self.config.stop_threshold {
                    self.state = VadState::Idle;
                    self.speech_started_at = None;
                    tracing::trace!(?now, score, "speech stopped");
                    return Some(VadEvent::SpeechStopped { at: now, score });
                }
            }
        }

        None
    }

    /// Return to `Idle` and forget the previous frame
    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.prev_frame.clear();
        self.speech_started_at = None;
        tracing::debug!("vad reset");
    }
}
