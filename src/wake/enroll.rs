//! Enrollment of wake-word templates and speaker voiceprints
//!
//! Enrollment slices a bounded capture into overlapping frames (hop = half
//! the FFT size), extracts a feature vector per frame, and hands the caller
//! a complete template or mean voiceprint. The caller swaps the result into
//! the matcher/verifier atomically; a failed enrollment leaves the previous
//! enrollment untouched.
//!
//! Only one enrollment of each kind may run at a time; a second request
//! fails with `EnrollmentBusy` instead of queuing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::dsp::FeatureExtractor;
use crate::{Error, Result};

/// Shortest accepted enrollment capture
const MIN_CAPTURE: Duration = Duration::from_millis(1200);

/// Longest accepted enrollment capture
const MAX_CAPTURE: Duration = Duration::from_secs(3);

/// Configuration for enrollment captures
#[derive(Debug, Clone, Copy)]
pub struct EnrollConfig {
    /// How long to capture audio for one enrollment utterance
    pub capture: Duration,
    /// Minimum frame count below which enrollment is rejected
    pub min_frames: usize,
}

impl Default for EnrollConfig {
    fn default() -> Self {
        Self {
            capture: Duration::from_secs(2),
            min_frames: 10,
        }
    }
}

impl EnrollConfig {
    /// Capture duration clamped to the supported 1.2–3 s window
    #[must_use]
    pub fn clamped_capture(&self) -> Duration {
        self.capture.clamp(MIN_CAPTURE, MAX_CAPTURE)
    }
}

/// Slice captured audio into overlapping frames of `fft_size` samples
///
/// Hop is half the frame size; a trailing partial frame is dropped rather
/// than zero-padded here (the extractor requires exact-length frames).
#[must_use]
pub fn slice_frames(samples: &[f32], fft_size: usize) -> Vec<Vec<f32>> {
    if fft_size == 0 || samples.len() < fft_size {
        return Vec::new();
    }

    let hop = fft_size / 2;
    (0..=samples.len() - fft_size)
        .step_by(hop.max(1))
        .map(|start| samples[start..start + fft_size].to_vec())
        .collect()
}

/// Runs template and voiceprint enrollments over captured audio
pub struct Enroller {
    extractor: FeatureExtractor,
    config: EnrollConfig,
    template_busy: AtomicBool,
    voiceprint_busy: AtomicBool,
}

/// Releases an enrollment slot on drop, so early returns cannot leak a
/// permanently-busy enroller
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::EnrollmentBusy)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Enroller {
    /// Create an enroller over the given extractor
    #[must_use]
    pub const fn new(extractor: FeatureExtractor, config: EnrollConfig) -> Self {
        Self {
            extractor,
            config,
            template_busy: AtomicBool::new(false),
            voiceprint_busy: AtomicBool::new(false),
        }
    }

    /// The enrollment configuration
    #[must_use]
    pub const fn config(&self) -> &EnrollConfig {
        &self.config
    }

    /// Build a wake-word template (per-frame feature vectors) from captured
    /// audio
    ///
    /// # Errors
    ///
    /// Returns [`Error::EnrollmentBusy`] if a template enrollment is already
    /// running, [`Error::InsufficientEnrollmentData`] if the capture yields
    /// fewer than the configured minimum frame count.
    pub fn enroll_template(&self, samples: &[f32]) -> Result<Vec<Vec<f32>>> {
        let _guard = BusyGuard::acquire(&self.template_busy)?;

        let frames = self.usable_frames(samples)?;
        let mut template = Vec::with_capacity(frames.len());
        for frame in &frames {
            template.push(self.extractor.extract(frame)?);
        }

        tracing::info!(frames = template.len(), "wake template enrolled");
        Ok(template)
    }

    /// Build a mean voiceprint from captured audio
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::enroll_template`], for the voiceprint
    /// slot.
    pub fn enroll_voiceprint(&self, samples: &[f32]) -> Result<Vec<f32>> {
        let _guard = BusyGuard::acquire(&self.voiceprint_busy)?;

        let frames = self.usable_frames(samples)?;
        let voiceprint = self.extractor.voiceprint(&frames)?;

        tracing::info!(
            frames = frames.len(),
            coefficients = voiceprint.len(),
            "voiceprint enrolled"
        );
        Ok(voiceprint)
    }

    fn usable_frames(&self, samples: &[f32]) -> Result<Vec<Vec<f32>>> {
        let frames = slice_frames(samples, self.extractor.config().fft_size);
        if frames.len() < self.config.min_frames {
            return Err(Error::InsufficientEnrollmentData {
                got: frames.len(),
                min: self.config.min_frames,
            });
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::FeatureConfig;

    fn enroller() -> Enroller {
        Enroller::new(
            FeatureExtractor::new(FeatureConfig::default()).unwrap(),
            EnrollConfig::default(),
        )
    }

    fn tone(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = i as f32 / 16000.0;
                (2.0 * std::f32::consts::PI * 300.0 * t).sin() * 0.5
            })
            .collect()
    }

    // -- frame slicing --------------------------------------------------------

    #[test]
    fn slicing_uses_half_frame_hop() {
        let samples = vec![0.0_f32; 4096];
        let frames = slice_frames(&samples, 1024);

        // (4096 - 1024) / 512 + 1
        assert_eq!(frames.len(), 7);
        assert!(frames.iter().all(|f| f.len() == 1024));
    }

    #[test]
    fn short_capture_yields_no_frames() {
        assert!(slice_frames(&vec![0.0_f32; 512], 1024).is_empty());
    }

    // -- enrollment -----------------------------------------------------------

    #[test]
    fn template_enrollment_produces_one_vector_per_frame() {
        let e = enroller();
        // 2s at 16kHz: 61 overlapping frames
        let template = e.enroll_template(&tone(32000)).unwrap();

        assert_eq!(template.len(), 61);
        assert!(template.iter().all(|v| v.len() == 13));
    }

    #[test]
    fn too_short_capture_is_insufficient() {
        let e = enroller();
        // 5 frames worth of audio, below the minimum of 10
        let err = e.enroll_template(&tone(3072)).unwrap_err();

        assert!(matches!(
            err,
            Error::InsufficientEnrollmentData { got: 5, min: 10 }
        ));
    }

    #[test]
    fn voiceprint_matches_manual_mean() {
        let e = enroller();
        let audio = tone(16384);

        let voiceprint = e.enroll_voiceprint(&audio).unwrap();
        let frames = slice_frames(&audio, 1024);
        let manual = e.extractor.voiceprint(&frames).unwrap();

        assert_eq!(voiceprint, manual);
    }

    #[test]
    fn capture_duration_is_clamped() {
        let long = EnrollConfig {
            capture: Duration::from_secs(30),
            ..EnrollConfig::default()
        };
        assert_eq!(long.clamped_capture(), Duration::from_secs(3));

        let short = EnrollConfig {
            capture: Duration::from_millis(100),
            ..EnrollConfig::default()
        };
        assert_eq!(short.clamped_capture(), Duration::from_millis(1200));
    }

    #[test]
    fn concurrent_template_enrollment_is_rejected() {
        // The busy flag flips for the duration of one call; simulate overlap
        // by holding the guard directly.
        let e = enroller();
        let guard = BusyGuard::acquire(&e.template_busy).unwrap();

        assert!(matches!(
            e.enroll_template(&tone(32000)),
            Err(Error::EnrollmentBusy)
        ));

        // Voiceprint slot is independent
        assert!(e.enroll_voiceprint(&tone(32000)).is_ok());

        drop(guard);
        assert!(e.enroll_template(&tone(32000)).is_ok());
    }
}
