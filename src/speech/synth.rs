//! Formant speech synthesis
//!
//! A parametric renderer, not a learned model: vowels are a sawtooth voicing
//! source passed through three parallel band-pass resonators tuned to the
//! vowel's formants (plus a fixed nasal band and a high-passed aspiration
//! component); consonants are band-passed noise with a short envelope,
//! voiced ones carrying a low tone underneath. Consecutive units overlap by
//! 8% of the previous unit's length so the output coarticulates instead of
//! ticking along word by word.
//!
//! [`FormantSynthesizer::render`] produces the raw waveform for tests and
//! file export; [`FormantSynthesizer::speak`] renders and plays through an
//! output device, resolving once the scheduled audio has played out.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::prosody::{PhonemeClass, PhonemeUnit};
use crate::audio::playback::AudioPlayback;
use crate::{Error, Result};

/// Fraction of a unit's duration after which the next unit starts
const OVERLAP_START: f32 = 0.92;

/// Fundamental frequency before pitch scaling (Hz)
const BASE_F0: f32 = 120.0;

/// Jitter LFO rate in Hz, the slow wobble of the voicing source
const JITTER_RATE: f32 = 5.0;

/// Jitter depth as a fraction of the fundamental
const JITTER_DEPTH: f32 = 0.012;

/// Center of the fixed nasal resonance band (Hz)
const NASAL_CENTER: f32 = 250.0;

/// Aspiration noise high-pass corner (Hz)
const ASPIRATION_CORNER: f32 = 3000.0;

/// Fixed seed so renders are reproducible frame for frame
const RENDER_SEED: u64 = 0x00c4_de4c_e0_1c;

/// First three formant frequencies per vowel (Hz)
const VOWEL_FORMANTS: &[(&str, [f32; 3])] = &[
    ("aa", [730.0, 1090.0, 2440.0]),
    ("ae", [660.0, 1720.0, 2410.0]),
    ("ah", [640.0, 1190.0, 2390.0]),
    ("ao", [570.0, 840.0, 2410.0]),
    ("aw", [700.0, 1200.0, 2400.0]),
    ("ay", [660.0, 1400.0, 2400.0]),
    ("eh", [530.0, 1840.0, 2480.0]),
    ("er", [490.0, 1350.0, 1690.0]),
    ("ey", [480.0, 1900.0, 2500.0]),
    ("ih", [390.0, 1990.0, 2550.0]),
    ("iy", [270.0, 2290.0, 3010.0]),
    ("ow", [490.0, 910.0, 2450.0]),
    ("oy", [520.0, 1100.0, 2500.0]),
    ("uh", [440.0, 1020.0, 2240.0]),
    ("uw", [300.0, 870.0, 2240.0]),
];

/// Noise band center per consonant (Hz)
const CONSONANT_CENTERS: &[(&str, f32)] = &[
    ("b", 1200.0),
    ("ch", 4200.0),
    ("d", 3000.0),
    ("dh", 4800.0),
    ("f", 4000.0),
    ("g", 1800.0),
    ("hh", 2000.0),
    ("jh", 3800.0),
    ("k", 2200.0),
    ("l", 400.0),
    ("m", 300.0),
    ("n", 350.0),
    ("ng", 320.0),
    ("p", 1500.0),
    ("r", 420.0),
    ("s", 6500.0),
    ("sh", 4500.0),
    ("t", 4000.0),
    ("th", 5500.0),
    ("v", 3500.0),
    ("w", 350.0),
    ("y", 300.0),
    ("z", 6000.0),
    ("zh", 4200.0),
];

/// Consonants that carry a voicing tone under the noise band
const VOICED_CONSONANTS: &[&str] = &[
    "m", "n", "l", "r", "v", "z", "w", "y", "ch", "jh", "ng",
];

/// Playback-time controls for one utterance
#[derive(Debug, Clone, Copy)]
pub struct SynthOptions {
    /// Speaking rate; unit durations divide by this
    pub rate: f32,
    /// Pitch multiplier applied to F0 and formants
    pub pitch: f32,
    /// Output volume in `[0, 1]`
    pub volume: f32,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 0.8,
        }
    }
}

/// Configuration for the synthesizer
#[derive(Debug, Clone, Copy)]
pub struct SynthConfig {
    /// Output sample rate (Hz)
    pub sample_rate: u32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self { sample_rate: 22050 }
    }
}

/// Simple biquad filter (RBJ cookbook coefficients)
struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// Constant-peak band-pass centered at `center` Hz
    fn bandpass(sample_rate: f32, center: f32, q: f32) -> Self {
        let omega = 2.0 * std::f32::consts::PI * (center / sample_rate).min(0.49);
        let alpha = omega.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: alpha / a0,
            b1: 0.0,
            b2: -alpha / a0,
            a1: -2.0 * omega.cos() / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// High-pass with the given corner frequency
    fn highpass(sample_rate: f32, corner: f32, q: f32) -> Self {
        let omega = 2.0 * std::f32::consts::PI * (corner / sample_rate).min(0.49);
        let (sin_w, cos_w) = omega.sin_cos();
        let alpha = sin_w / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 + cos_w) / 2.0 / a0,
            b1: -(1.0 + cos_w) / a0,
            b2: (1.0 + cos_w) / 2.0 / a0,
            a1: -2.0 * cos_w / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = self.b0.mul_add(
            x,
            self.b1.mul_add(self.x1, self.b2.mul_add(self.x2, -self.a1.mul_add(self.y1, self.a2 * self.y2))),
        );
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// Attack–sustain–release gain at `t` seconds into a unit of `dur` seconds
fn envelope(t: f32, dur: f32, attack: f32, release: f32) -> f32 {
    let attack = attack.min(dur * 0.4);
    let release = release.min(dur * 0.4);

    if t < attack {
        t / attack.max(1e-6)
    } else if t > dur - release {
        ((dur - t) / release.max(1e-6)).max(0.0)
    } else {
        1.0
    }
}

fn vowel_formants(symbol: &str) -> [f32; 3] {
    VOWEL_FORMANTS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map_or([640.0, 1190.0, 2390.0], |(_, f)| *f)
}

fn consonant_center(symbol: &str) -> f32 {
    CONSONANT_CENTERS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map_or(2500.0, |(_, c)| *c)
}

/// Renders phoneme timelines into audio
pub struct FormantSynthesizer {
    config: SynthConfig,
}

impl FormantSynthesizer {
    /// Create a synthesizer
    #[must_use]
    pub const fn new(config: SynthConfig) -> Self {
        Self { config }
    }

    /// Output sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Render a timeline to a waveform
    ///
    /// Pause units advance the clock without producing audio. The result is
    /// clamped to `[-1, 1]` after volume scaling.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn render(&self, timeline: &[PhonemeUnit], options: &SynthOptions) -> Vec<f32> {
        let sr = self.config.sample_rate as f32;
        let rate = options.rate.max(0.1);
        let mut rng = StdRng::seed_from_u64(RENDER_SEED);

        // Schedule pass: where does each unit start, how long is the output
        let mut starts = Vec::with_capacity(timeline.len());
        let mut clock = 0.0_f32;
        let mut total = 0.0_f32;
        for unit in timeline {
            let dur = unit.duration / rate;
            starts.push(clock);
            total = total.max(clock + dur);
            clock += dur * OVERLAP_START;
        }

        let mut out = vec![0.0_f32; (total * sr).ceil() as usize + 1];

        for (unit, start) in timeline.iter().zip(&starts) {
            let dur = unit.duration / rate;
            let offset = (start * sr) as usize;

            match unit.class() {
                PhonemeClass::Pause => {}
                PhonemeClass::Vowel => {
                    self.render_vowel(unit, dur, options, &mut rng, &mut out[offset..]);
                }
                _ => {
                    self.render_consonant(unit, dur, options, &mut rng, &mut out[offset..]);
                }
            }
        }

        for s in &mut out {
            *s = (*s * options.volume).clamp(-1.0, 1.0);
        }

        tracing::debug!(
            units = timeline.len(),
            samples = out.len(),
            "timeline rendered"
        );
        out
    }

    /// Render and play a timeline, resolving when playback completes
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] when the output device cannot be
    /// acquired. Audio already scheduled before a cancellation is not
    /// retracted.
    pub async fn speak(
        &self,
        timeline: &[PhonemeUnit],
        options: &SynthOptions,
        playback: &AudioPlayback,
    ) -> Result<()> {
        if timeline.is_empty() {
            return Err(Error::EmptyInput("timeline has no units"));
        }

        let samples = self.render(timeline, options);
        playback.play(samples, self.config.sample_rate).await
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn render_vowel(
        &self,
        unit: &PhonemeUnit,
        dur: f32,
        options: &SynthOptions,
        rng: &mut StdRng,
        out: &mut [f32],
    ) {
        let sr = self.config.sample_rate as f32;
        let samples = ((dur * sr) as usize).min(out.len());
        let f0 = BASE_F0 * options.pitch;
        let formants = vowel_formants(&unit.symbol);

        let mut resonators: Vec<Biquad> = formants
            .iter()
            .map(|f| Biquad::bandpass(sr, f * options.pitch, 8.0))
            .collect();
        let mut nasal = Biquad::bandpass(sr, NASAL_CENTER, 4.0);
        let mut aspiration = Biquad::highpass(sr, ASPIRATION_CORNER, 0.707);

        // Formant weights fall off toward the higher resonances
        let weights = [1.0_f32, 0.63, 0.35];
        let mut phase = 0.0_f32;

        for (i, slot) in out.iter_mut().enumerate().take(samples) {
            let t = i as f32 / sr;

            // Voicing source: sawtooth with a slow jitter wobble
            let jitter =
                JITTER_DEPTH.mul_add((2.0 * std::f32::consts::PI * JITTER_RATE * t).sin(), 1.0);
            phase += f0 * jitter / sr;
            phase -= phase.floor();
            let source = 2.0_f32.mul_add(phase, -1.0);

            let mut voiced = 0.0_f32;
            for (resonator, weight) in resonators.iter_mut().zip(weights) {
                voiced += resonator.process(source) * weight;
            }
            voiced += nasal.process(source) * 0.2;

            let breath = aspiration.process(rng.gen_range(-1.0..1.0)) * 0.05;

            let env = envelope(t, dur, 0.015, 0.040);
            *slot += (voiced + breath) * env * unit.gain * 0.5;
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn render_consonant(
        &self,
        unit: &PhonemeUnit,
        dur: f32,
        options: &SynthOptions,
        rng: &mut StdRng,
        out: &mut [f32],
    ) {
        let sr = self.config.sample_rate as f32;
        let samples = ((dur * sr) as usize).min(out.len());
        let center = consonant_center(&unit.symbol);
        let voiced = VOICED_CONSONANTS.contains(&unit.symbol.as_str());

        let mut band = Biquad::bandpass(sr, center, 2.0);
        let tone_freq = BASE_F0 * options.pitch;

        for (i, slot) in out.iter_mut().enumerate().take(samples) {
            let t = i as f32 / sr;
            let mut sample = band.process(rng.gen_range(-1.0..1.0)) * 0.6;

            if voiced {
                sample += (2.0 * std::f32::consts::PI * tone_freq * t).sin() * 0.15;
            }

            let env = envelope(t, dur, 0.005, 0.010);
            *slot += sample * env * unit.gain * 0.5;
        }
    }
}
