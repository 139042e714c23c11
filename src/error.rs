//! Error types for the Cadence voice pipeline

use thiserror::Error;

/// Result type alias for Cadence operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Frame handed to the feature extractor has the wrong length
    #[error("invalid frame length: expected {expected} samples, got {got}")]
    InvalidFrameLength {
        /// Configured FFT size
        expected: usize,
        /// Actual sample count
        got: usize,
    },

    /// An operation that needs data received none
    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    /// Input failed validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Capture or output device is missing or access was denied
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// An enrollment of the same kind is already in progress
    #[error("enrollment already in progress")]
    EnrollmentBusy,

    /// Enrollment produced too few frames to build a usable template
    #[error("insufficient enrollment data: got {got} frames, need at least {min}")]
    InsufficientEnrollmentData {
        /// Frames actually captured
        got: usize,
        /// Minimum frames required
        min: usize,
    },

    /// A bounded operation exceeded its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// Audio processing error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Voice profile store error
    #[error("profile error: {0}")]
    Profile(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
