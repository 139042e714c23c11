//! Pipeline orchestration
//!
//! Wires the whole voice path together: capture frames feed the VAD; closed
//! speech segments go to a scoring worker (MFCC + DTW are pure CPU work and
//! stay off the audio loop, results come back over a channel); wake matches
//! gate recognition; recognized text passes the duplex guard before anyone
//! acts on it; replies flow through prosody, accent, and the formant
//! synthesizer. The supervisor watches heartbeats the pipeline publishes and
//! owns every retry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::audio::capture::{AudioCapture, samples_to_wav};
use crate::audio::playback::AudioPlayback;
use crate::config::Config;
use crate::dsp::FeatureExtractor;
use crate::events::{EventBus, PipelineEvent};
use crate::speech::accent::{AccentProfile, RandomSource, ThreadRandom, accentize, apply_text_accent};
use crate::speech::prosody::ProsodyPlanner;
use crate::speech::synth::FormantSynthesizer;
use crate::supervisor::{
    DiagnosticsSink, Heartbeats, ReachabilityProbe, RecoveryActions, Supervisor, TcpProbe,
};
use crate::turn::{SpeechState, TurnStateMachine};
use crate::vad::{VadEvent, VoiceActivityDetector};
use crate::wake::enroll::{Enroller, slice_frames};
use crate::wake::{SpeakerVerifier, VerifyDecision, WakeMatch, WakeWordMatcher};
use crate::{Error, Result};

/// Capture poll cadence
const CHUNK_INTERVAL: Duration = Duration::from_millis(50);

/// Hard cap on one speech segment (bounds memory if the VAD never closes)
const MAX_SEGMENT_SECS: usize = 10;

/// Deadline for one recognition round trip
const RECOGNITION_TIMEOUT: Duration = Duration::from_secs(15);

/// TCP probe connect timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// External speech recognition; this crate gates it, it does not implement it
#[async_trait]
pub trait RecognitionService: Send + Sync {
    /// Transcribe one utterance delivered as WAV bytes
    async fn transcribe(&self, wav: Vec<u8>) -> Result<String>;

    /// Tear down and re-establish any streaming session state
    ///
    /// Called by the supervisor's restart recovery; default is a no-op for
    /// stateless request/response services.
    fn reset(&self) {}
}

/// What the scoring worker concluded about one speech segment
struct SegmentOutcome {
    samples: Vec<f32>,
    matched: Option<WakeMatch>,
    verify: Option<VerifyDecision>,
}

/// The assembled voice pipeline
pub struct Pipeline {
    config: Config,
    bus: Arc<EventBus>,
    heartbeats: Arc<Heartbeats>,
    turn: Arc<TurnStateMachine>,
    playback: Arc<AudioPlayback>,
    matcher: Arc<Mutex<WakeWordMatcher>>,
    verifier: Arc<Mutex<SpeakerVerifier>>,
    enroller: Enroller,
    extractor: Arc<FeatureExtractor>,
    synthesizer: Arc<FormantSynthesizer>,
    planner: ProsodyPlanner,
    accent: &'static AccentProfile,
    rng: Mutex<Box<dyn RandomSource>>,
    recognizer: Arc<dyn RecognitionService>,
}

impl Pipeline {
    /// Assemble a pipeline from configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid feature settings or an unknown
    /// accent profile.
    pub fn new(
        config: Config,
        bus: Arc<EventBus>,
        recognizer: Arc<dyn RecognitionService>,
    ) -> Result<Self> {
        let accent = AccentProfile::by_name(&config.accent)
            .ok_or_else(|| Error::Config(format!("unknown accent profile: {}", config.accent)))?;

        let extractor = Arc::new(FeatureExtractor::new(config.features)?);
        let enroller = Enroller::new(FeatureExtractor::new(config.features)?, config.enroll);
        let heartbeats = Arc::new(Heartbeats::new());

        Ok(Self {
            bus,
            turn: Arc::new(TurnStateMachine::new(Arc::clone(&heartbeats))),
            heartbeats,
            playback: Arc::new(AudioPlayback::new()),
            matcher: Arc::new(Mutex::new(WakeWordMatcher::new(config.matcher))),
            verifier: Arc::new(Mutex::new(SpeakerVerifier::new(config.matcher))),
            enroller,
            extractor,
            synthesizer: Arc::new(FormantSynthesizer::new(config.synth)),
            planner: ProsodyPlanner::new(),
            accent,
            rng: Mutex::new(Box::new(ThreadRandom::new())),
            recognizer,
            config,
        })
    }

    /// Replace the random source used by the accent text pass
    pub fn set_random_source(&self, rng: Box<dyn RandomSource>) {
        *self.rng.lock().unwrap_or_else(|e| e.into_inner()) = rng;
    }

    /// Shared event bus
    #[must_use]
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// Shared heartbeat registry
    #[must_use]
    pub fn heartbeats(&self) -> Arc<Heartbeats> {
        Arc::clone(&self.heartbeats)
    }

    /// The duplex guard
    #[must_use]
    pub fn turn(&self) -> Arc<TurnStateMachine> {
        Arc::clone(&self.turn)
    }

    /// Build the supervisor wired to this pipeline's recovery hooks
    #[must_use]
    pub fn supervisor(&self, sink: Arc<dyn DiagnosticsSink>) -> Supervisor {
        let playback = Arc::clone(&self.playback);
        let turn = Arc::clone(&self.turn);
        let bus = Arc::clone(&self.bus);
        let cancel_synthesis = Box::new(move || {
            // Pending audio stops and the state flips under the turn lock;
            // hang detection cannot see a cancelled-but-busy window
            playback.cancel_pending();
            turn.cancel_speaking();
            bus.publish(&PipelineEvent::StateChanged { state: SpeechState::Idle });
        });

        let heartbeats = Arc::clone(&self.heartbeats);
        let recognizer = Arc::clone(&self.recognizer);
        let restart_recognition = Box::new(move || {
            recognizer.reset();
            heartbeats.set_recognition_active(true);
        });

        let probe: Option<Box<dyn ReachabilityProbe>> = self
            .config
            .probe_addr
            .as_deref()
            .and_then(|addr| addr.parse().ok())
            .map(|addr| Box::new(TcpProbe::new(addr, PROBE_TIMEOUT)) as Box<dyn ReachabilityProbe>);

        Supervisor::new(
            self.config.supervisor,
            Arc::clone(&self.heartbeats),
            RecoveryActions {
                cancel_synthesis,
                restart_recognition,
            },
            sink,
            probe,
        )
    }

    /// Enroll the wake keyword from captured audio, replacing any previous
    /// template set atomically
    ///
    /// # Errors
    ///
    /// Propagates enrollment failures (`EnrollmentBusy`,
    /// `InsufficientEnrollmentData`); on any error the previous templates
    /// stay active.
    pub fn enroll_wake(&self, samples: &[f32]) -> Result<usize> {
        let template = self.enroller.enroll_template(samples)?;
        let frames = template.len();

        self.matcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(&self.config.wake_keyword, vec![template])?;
        Ok(frames)
    }

    /// Enroll the speaker voiceprint from captured audio
    ///
    /// # Errors
    ///
    /// Propagates enrollment failures; the previous voiceprint stays active
    /// on any error.
    pub fn enroll_speaker(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let voiceprint = self.enroller.enroll_voiceprint(samples)?;
        self.verifier
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .enroll(voiceprint.clone())?;
        Ok(voiceprint)
    }

    /// Load a previously saved voiceprint into the verifier
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] for an empty coefficient vector.
    pub fn load_voiceprint(&self, coefficients: Vec<f32>) -> Result<()> {
        self.verifier
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .enroll(coefficients)
    }

    /// Speak a reply: accent text pass, prosody, accent phoneme pass,
    /// synthesis, playback
    ///
    /// The duplex guard is `Speaking` for the whole call; the phoneme
    /// timeline is published before audio starts for visualization layers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] when no output device can be
    /// acquired; the turn state still returns to idle.
    pub async fn say(&self, text: &str) -> Result<()> {
        let accented = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            apply_text_accent(text, self.accent, self.config.accent_intensity, rng.as_mut())
        };

        let mut units = self.planner.plan(&accented);
        accentize(&mut units, self.accent);
        self.bus
            .publish(&PipelineEvent::PhonemeTimeline { units: units.clone() });

        self.turn.begin_speaking(text);
        self.bus
            .publish(&PipelineEvent::StateChanged { state: SpeechState::Speaking });

        let result = self
            .synthesizer
            .speak(&units, &self.config.voice, &self.playback)
            .await;

        self.turn.end_speaking();
        self.bus
            .publish(&PipelineEvent::StateChanged { state: SpeechState::Idle });

        result
    }

    /// Decide whether recognized text may be acted on, publishing the
    /// decision either way
    pub fn handle_transcript(&self, text: &str) -> bool {
        let accepted = self.turn.guard_incoming(text);
        let event = if accepted {
            PipelineEvent::TranscriptAccepted { text: text.to_string() }
        } else {
            PipelineEvent::TranscriptRejected { text: text.to_string() }
        };
        self.bus.publish(&event);
        accepted
    }

    /// Run the capture → VAD → wake → recognition loop until `shutdown`
    /// flips true
    ///
    /// The returned future is not `Send` (it owns the capture stream) and is
    /// meant to be awaited on the caller's task; segment scoring and
    /// recognition run on their own tasks so capture never stalls behind
    /// them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] if the capture device cannot be
    /// acquired; per the recovery design this is *not* retried here.
    pub async fn run(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut capture = AudioCapture::new()?;
        capture.start()?;

        let sample_rate = capture.sample_rate();
        let fft_size = self.config.features.fft_size;
        let max_segment = MAX_SEGMENT_SECS * sample_rate as usize;

        // Scoring worker: MFCC + DTW off the capture loop, results back over
        // a single-producer/single-consumer pair
        let (segment_tx, mut segment_rx) = mpsc::channel::<Vec<f32>>(4);
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<SegmentOutcome>(4);

        let extractor = Arc::clone(&self.extractor);
        let matcher = Arc::clone(&self.matcher);
        let verifier = Arc::clone(&self.verifier);
        let verify_speaker = self.config.verify_speaker;
        tokio::spawn(async move {
            while let Some(samples) = segment_rx.recv().await {
                let outcome =
                    score_segment(&extractor, &matcher, &verifier, verify_speaker, samples);
                if outcome_tx.send(outcome).await.is_err() {
                    break;
                }
            }
        });

        let mut vad = VoiceActivityDetector::new(self.config.vad, sample_rate);
        let mut pending: Vec<f32> = Vec::new();
        let mut segment: Vec<f32> = Vec::new();
        let mut ticker = tokio::time::interval(CHUNK_INTERVAL);

        tracing::info!(
            keyword = %self.config.wake_keyword,
            sample_rate,
            "pipeline listening"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    pending.extend(capture.take_buffer());

                    while pending.len() >= fft_size {
                        let frame: Vec<f32> = pending.drain(..fft_size).collect();

                        match vad.process(&frame) {
                            Some(VadEvent::SpeechStarted { at, score }) => {
                                self.bus.publish(&PipelineEvent::SpeechStarted { at, score });
                                segment.clear();
                                segment.extend_from_slice(&frame);
                            }
                            Some(VadEvent::SpeechStopped { at, score }) => {
                                self.bus.publish(&PipelineEvent::SpeechStopped { at, score });
                                if !segment.is_empty() {
                                    let closed = std::mem::take(&mut segment);
                                    if segment_tx.try_send(closed).is_err() {
                                        tracing::warn!("scoring worker backlogged, segment dropped");
                                    }
                                }
                            }
                            None => {
                                if vad.is_speech_active() {
                                    segment.extend_from_slice(&frame);
                                    if segment.len() > max_segment {
                                        tracing::warn!("segment exceeded cap, force-closing");
                                        let closed = std::mem::take(&mut segment);
                                        let _ = segment_tx.try_send(closed);
                                        vad.reset();
                                    }
                                }
                            }
                        }
                    }
                }
                Some(outcome) = outcome_rx.recv() => {
                    let pipeline = Arc::clone(self);
                    tokio::spawn(async move {
                        pipeline.handle_segment_outcome(outcome, sample_rate).await;
                    });
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        capture.stop();
                        tracing::info!("pipeline stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_segment_outcome(&self, outcome: SegmentOutcome, sample_rate: u32) {
        let Some(matched) = outcome.matched else {
            return;
        };

        self.bus.publish(&PipelineEvent::WakeDetected {
            keyword: matched.keyword.clone(),
            similarity: matched.similarity,
        });

        if let Some(decision) = outcome.verify {
            self.bus.publish(&PipelineEvent::SpeakerVerified {
                score: decision.score,
                accepted: decision.accepted,
            });
            if !decision.accepted {
                tracing::info!(score = decision.score, "speaker rejected, ignoring wake");
                return;
            }
        }

        // Hand the utterance to the external recognizer, under a deadline
        self.heartbeats.set_recognition_active(true);
        let wav = match samples_to_wav(&outcome.samples, sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                tracing::error!(error = %e, "wav encoding failed");
                return;
            }
        };

        let transcript =
            tokio::time::timeout(RECOGNITION_TIMEOUT, self.recognizer.transcribe(wav)).await;
        self.heartbeats.recognition_heard();
        self.heartbeats.set_recognition_active(false);

        match transcript {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                if self.handle_transcript(&text) {
                    tracing::info!(%text, "command accepted");
                }
            }
            Ok(Ok(_)) => tracing::debug!("empty transcript"),
            Ok(Err(e)) => tracing::warn!(error = %e, "recognition failed"),
            Err(_) => tracing::warn!("recognition timed out"),
        }
    }
}

/// Score one closed segment: features, wake match, optional speaker check
fn score_segment(
    extractor: &FeatureExtractor,
    matcher: &Mutex<WakeWordMatcher>,
    verifier: &Mutex<SpeakerVerifier>,
    verify_speaker: bool,
    samples: Vec<f32>,
) -> SegmentOutcome {
    let frames = slice_frames(&samples, extractor.config().fft_size);

    let mut features = Vec::with_capacity(frames.len());
    for frame in &frames {
        match extractor.extract(frame) {
            Ok(v) => features.push(v),
            Err(e) => {
                tracing::error!(error = %e, "feature extraction failed");
                return SegmentOutcome { samples, matched: None, verify: None };
            }
        }
    }

    if features.is_empty() {
        return SegmentOutcome { samples, matched: None, verify: None };
    }

    let matched = match matcher
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .best_match(&features)
    {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!(error = %e, "wake matching unavailable");
            None
        }
    };

    let verify = if matched.is_some() && verify_speaker {
        extractor
            .voiceprint(&frames)
            .ok()
            .and_then(|live| {
                verifier
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .verify(&live)
                    .ok()
            })
    } else {
        None
    };

    SegmentOutcome { samples, matched, verify }
}
