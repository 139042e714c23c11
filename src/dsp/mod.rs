//! MFCC feature extraction
//!
//! Turns fixed-size audio frames into compact spectral fingerprints used by
//! the wake-word matcher and speaker verifier. The chain is the classic one:
//! Hann window → FFT magnitude spectrum → triangular mel filterbank → log
//! band energies → DCT-II, truncated to a small coefficient count.
//!
//! Extraction is pure and deterministic. The only shared state is the mel
//! filterbank cache, keyed by (sample rate, FFT size, band count) so that
//! extractors running at different rates never collide.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::{Error, Result};

/// Lowest frequency covered by the mel filterbank (Hz)
const MEL_LOW_HZ: f32 = 20.0;

/// Floor applied to band energies before the log, to avoid -inf
const LOG_FLOOR: f32 = 1e-8;

/// Denominator guard for cosine similarity
const COSINE_EPSILON: f32 = 1e-10;

/// Configuration for MFCC extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureConfig {
    /// Sample rate of incoming frames (Hz)
    pub sample_rate: u32,
    /// Frame length in samples; must be a power of two (radix-2 FFT)
    pub fft_size: usize,
    /// Number of triangular mel bands
    pub mel_bands: usize,
    /// Number of cepstral coefficients kept after the DCT
    pub coefficients: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            fft_size: 1024,
            mel_bands: 24,
            coefficients: 13,
        }
    }
}

/// Cached mel filterbanks, shared across all extractors in the process
///
/// Multiple extractors may run concurrently at different sample rates; the
/// cache key carries everything the bank geometry depends on.
static FILTERBANK_CACHE: OnceLock<Mutex<HashMap<(u32, usize, usize), Arc<Vec<Vec<f32>>>>>> =
    OnceLock::new();

fn cached_filterbank(sample_rate: u32, fft_size: usize, bands: usize) -> Arc<Vec<Vec<f32>>> {
    let cache = FILTERBANK_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = cache.lock().unwrap_or_else(|e| e.into_inner());

    Arc::clone(
        map.entry((sample_rate, fft_size, bands))
            .or_insert_with(|| Arc::new(build_filterbank(sample_rate, fft_size, bands))),
    )
}

/// Convert frequency in Hz to the mel scale
fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Convert mel scale back to Hz
fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

/// Build a triangular mel filterbank spanning 20 Hz to Nyquist
///
/// Returns one weight row per band over the `fft_size / 2 + 1` magnitude bins.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn build_filterbank(sample_rate: u32, fft_size: usize, bands: usize) -> Vec<Vec<f32>> {
    let n_bins = fft_size / 2 + 1;
    let nyquist = sample_rate as f32 / 2.0;

    let mel_low = hz_to_mel(MEL_LOW_HZ);
    let mel_high = hz_to_mel(nyquist);
    let step = (mel_high - mel_low) / (bands + 1) as f32;

    // Band edge frequencies mapped onto FFT bin indices
    let edges: Vec<usize> = (0..bands + 2)
        .map(|i| {
            let hz = mel_to_hz(mel_low + i as f32 * step);
            let bin = (hz / nyquist * (n_bins - 1) as f32).round() as usize;
            bin.min(n_bins - 1)
        })
        .collect();

    let mut bank = Vec::with_capacity(bands);
    for b in 0..bands {
        let (lo, center, hi) = (edges[b], edges[b + 1], edges[b + 2]);
        let mut row = vec![0.0_f32; n_bins];

        for (bin, weight) in row.iter_mut().enumerate().take(hi.max(center + 1)).skip(lo) {
            if bin < center {
                let span = (center - lo).max(1);
                *weight = (bin - lo) as f32 / span as f32;
            } else {
                let span = (hi - center).max(1);
                *weight = 1.0 - (bin - center) as f32 / span as f32;
            }
        }

        bank.push(row);
    }

    bank
}

/// Extracts MFCC feature vectors from fixed-size audio frames
pub struct FeatureExtractor {
    config: FeatureConfig,
    hann: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    filterbank: Arc<Vec<Vec<f32>>>,
}

impl FeatureExtractor {
    /// Create an extractor for the given configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `fft_size` is not a power of two or any
    /// dimension is zero.
    pub fn new(config: FeatureConfig) -> Result<Self> {
        if config.fft_size == 0 || !config.fft_size.is_power_of_two() {
            return Err(Error::Config(format!(
                "fft size must be a power of two, got {}",
                config.fft_size
            )));
        }
        if config.mel_bands == 0 || config.coefficients == 0 {
            return Err(Error::Config(
                "mel bands and coefficient count must be nonzero".to_string(),
            ));
        }
        if config.coefficients > config.mel_bands {
            return Err(Error::Config(format!(
                "coefficient count {} exceeds mel band count {}",
                config.coefficients, config.mel_bands
            )));
        }

        let fft = FftPlanner::new().plan_fft_forward(config.fft_size);
        let hann = build_hann(config.fft_size);
        let filterbank = cached_filterbank(config.sample_rate, config.fft_size, config.mel_bands);

        tracing::debug!(
            sample_rate = config.sample_rate,
            fft_size = config.fft_size,
            mel_bands = config.mel_bands,
            coefficients = config.coefficients,
            "feature extractor initialized"
        );

        Ok(Self {
            config,
            hann,
            fft,
            filterbank,
        })
    }

    /// The configuration this extractor was built with
    #[must_use]
    pub const fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Extract one MFCC vector from a frame
    ///
    /// The frame must be exactly `fft_size` samples; shorter frames are the
    /// caller's problem to pad.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrameLength`] on any other length.
    pub fn extract(&self, frame: &[f32]) -> Result<Vec<f32>> {
        if frame.len() != self.config.fft_size {
            return Err(Error::InvalidFrameLength {
                expected: self.config.fft_size,
                got: frame.len(),
            });
        }

        // Windowed frame into the complex FFT buffer
        let mut buf: Vec<Complex<f32>> = frame
            .iter()
            .zip(&self.hann)
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut buf);

        // Magnitude spectrum over the non-redundant half
        let n_bins = self.config.fft_size / 2 + 1;
        let magnitude: Vec<f32> = buf[..n_bins].iter().map(|c| c.norm()).collect();

        // Log mel band energies
        let energies: Vec<f32> = self
            .filterbank
            .iter()
            .map(|row| {
                let e: f32 = row.iter().zip(&magnitude).map(|(w, m)| w * m).sum();
                e.max(LOG_FLOOR).ln()
            })
            .collect();

        Ok(dct_ii(&energies, self.config.coefficients))
    }

    /// Mean feature vector over a sequence of frames
    ///
    /// This is the enrollment-side voiceprint primitive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] when no frames are given, and propagates
    /// extraction errors from any frame.
    #[allow(clippy::cast_precision_loss)]
    pub fn voiceprint(&self, frames: &[Vec<f32>]) -> Result<Vec<f32>> {
        if frames.is_empty() {
            return Err(Error::EmptyInput("voiceprint needs at least one frame"));
        }

        let mut mean = vec![0.0_f32; self.config.coefficients];
        for frame in frames {
            let v = self.extract(frame)?;
            for (m, c) in mean.iter_mut().zip(&v) {
                *m += c;
            }
        }

        let n = frames.len() as f32;
        for m in &mut mean {
            *m /= n;
        }

        Ok(mean)
    }
}

/// Precompute a Hann window of the given length
#[allow(clippy::cast_precision_loss)]
fn build_hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / (len - 1) as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Orthonormal DCT-II truncated to `count` coefficients
///
/// Scaling is √(2/N), with the first coefficient further scaled by 1/√2 so
/// the transform is orthonormal.
#[allow(clippy::cast_precision_loss)]
fn dct_ii(input: &[f32], count: usize) -> Vec<f32> {
    let n = input.len();
    let scale = (2.0 / n as f32).sqrt();

    (0..count.min(n))
        .map(|k| {
            let sum: f32 = input
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    x * (std::f32::consts::PI / n as f32 * (i as f32 + 0.5) * k as f32).cos()
                })
                .sum();
            let ortho = if k == 0 { std::f32::consts::FRAC_1_SQRT_2 } else { 1.0 };
            scale * ortho * sum
        })
        .collect()
}

/// Cosine similarity between two feature vectors, in `[-1, 1]`
///
/// Mismatched lengths or a (near-)zero vector score 0.0 rather than dividing
/// by zero.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= COSINE_EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Linearly resample a coefficient vector to a target count
///
/// Voiceprints enrolled at different coefficient counts must be brought to a
/// common length before scoring; this is that bridge.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn resample_coefficients(v: &[f32], count: usize) -> Vec<f32> {
    if v.is_empty() || count == 0 {
        return Vec::new();
    }
    if v.len() == count {
        return v.to_vec();
    }

    (0..count)
        .map(|i| {
            let pos = i as f32 * (v.len() - 1) as f32 / (count - 1).max(1) as f32;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(v.len() - 1);
            let frac = pos - lo as f32;
            v[lo].mul_add(1.0 - frac, v[hi] * frac)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_frame(freq: f32, len: usize, rate: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate).sin())
            .collect()
    }

    // -- extract --------------------------------------------------------------

    #[test]
    fn extract_is_deterministic() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let frame = sine_frame(440.0, 1024, 16000.0);

        let a = extractor.extract(&frame).unwrap();
        let b = extractor.extract(&frame).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 13);
    }

    #[test]
    fn extract_rejects_wrong_length() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let short = vec![0.0_f32; 512];

        let err = extractor.extract(&short).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidFrameLength { expected: 1024, got: 512 }
        ));
    }

    #[test]
    fn extract_distinguishes_frequencies() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let low = extractor.extract(&sine_frame(200.0, 1024, 16000.0)).unwrap();
        let high = extractor.extract(&sine_frame(3000.0, 1024, 16000.0)).unwrap();

        assert!(cosine(&low, &high) < 0.999);
    }

    #[test]
    fn non_power_of_two_fft_size_rejected() {
        let config = FeatureConfig { fft_size: 1000, ..FeatureConfig::default() };
        assert!(matches!(FeatureExtractor::new(config), Err(Error::Config(_))));
    }

    // -- voiceprint -----------------------------------------------------------

    #[test]
    fn voiceprint_is_mean_of_extractions() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let frame = sine_frame(440.0, 1024, 16000.0);

        let single = extractor.extract(&frame).unwrap();
        let mean = extractor.voiceprint(&[frame.clone(), frame]).unwrap();

        for (a, b) in single.iter().zip(&mean) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn voiceprint_rejects_empty_input() {
        let extractor = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        assert!(matches!(extractor.voiceprint(&[]), Err(Error::EmptyInput(_))));
    }

    // -- cosine ---------------------------------------------------------------

    #[test]
    fn cosine_identity() {
        let v = vec![0.3, -1.2, 4.5, 0.01];
        assert!((cosine(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_symmetry() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-0.5, 0.25, 4.0];
        assert!((cosine(&a, &b) - cosine(&b, &a)).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_zero_vector_scores_zero() {
        let z = vec![0.0; 4];
        let v = vec![1.0, 2.0, 3.0, 4.0];
        assert!(cosine(&z, &v).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_length_mismatch_scores_zero() {
        assert!(cosine(&[1.0, 2.0], &[1.0, 2.0, 3.0]).abs() < f32::EPSILON);
    }

    // -- resampling -----------------------------------------------------------

    #[test]
    fn resample_same_length_is_identity() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(resample_coefficients(&v, 3), v);
    }

    #[test]
    fn resample_preserves_endpoints() {
        let v = vec![1.0, 5.0, 2.0, 8.0];
        let r = resample_coefficients(&v, 7);

        assert_eq!(r.len(), 7);
        assert!((r[0] - 1.0).abs() < 1e-6);
        assert!((r[6] - 8.0).abs() < 1e-6);
    }

    // -- filterbank -----------------------------------------------------------

    #[test]
    fn filterbank_is_shared_between_identical_extractors() {
        let a = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        let b = FeatureExtractor::new(FeatureConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&a.filterbank, &b.filterbank));
    }

    #[test]
    fn filterbank_rows_cover_spectrum() {
        let bank = build_filterbank(16000, 1024, 24);
        assert_eq!(bank.len(), 24);

        for row in &bank {
            assert_eq!(row.len(), 513);
            assert!(row.iter().any(|w| *w > 0.0));
        }
    }
}
