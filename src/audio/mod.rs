//! Audio device layer
//!
//! Capture from the microphone and playback to the speakers. Everything
//! above this module works on plain `f32` sample buffers; device handling
//! and its failure modes stay in here.

pub mod capture;
pub mod playback;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use playback::AudioPlayback;
