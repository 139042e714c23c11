//! Shared test utilities

use cadence_voice::audio::SAMPLE_RATE;

/// Generate sine wave audio samples
#[must_use]
pub fn sine(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
#[must_use]
pub fn silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// A fixed synthetic feature-vector sequence
///
/// Deterministic pattern so enrolling and replaying the same sequence is an
/// exact match.
#[must_use]
pub fn feature_pattern(frames: usize, coefficients: usize) -> Vec<Vec<f32>> {
    (0..frames)
        .map(|f| {
            (0..coefficients)
                .map(|c| ((f * 7 + c * 3) % 11) as f32 * 0.25 - 1.0)
                .collect()
        })
        .collect()
}
