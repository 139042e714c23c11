//! Audio playback to speakers
//!
//! Plays rendered waveforms and supports cancelling pending audio: the
//! supervisor's hang recovery and explicit user interruption both go through
//! [`AudioPlayback::cancel_pending`]. Samples already delivered to the
//! device are not retracted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Poll cadence while waiting for scheduled audio to drain
const DRAIN_POLL: std::time::Duration = std::time::Duration::from_millis(20);

/// Plays audio to the default output device
pub struct AudioPlayback {
    cancel: Arc<AtomicBool>,
}

impl Default for AudioPlayback {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// Device lookup happens per play call; construction cannot fail.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel pending playback
    ///
    /// The current [`Self::play`] call returns early; samples not yet
    /// delivered to the device are dropped.
    pub fn cancel_pending(&self) {
        self.cancel.store(true, Ordering::Release);
        tracing::debug!("playback cancel requested");
    }

    /// Find an output config for the requested rate, mono preferred
    fn output_config(sample_rate: u32) -> Result<(cpal::Device, StreamConfig)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceUnavailable("no output device".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable(format!("no output config at {sample_rate} Hz"))
            })?;

        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();
        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback configured"
        );

        Ok((device, config))
    }

    /// Play audio samples (f32 format), resolving when playback finishes or
    /// is cancelled
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] when the output device cannot be
    /// acquired, [`Error::Audio`] on stream failures.
    #[allow(clippy::unused_async)]
    pub async fn play(&self, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        self.cancel.store(false, Ordering::Release);

        let (device, config) = Self::output_config(sample_rate)?;
        let channels = config.channels as usize;

        let samples = Arc::new(samples);
        let position = Arc::new(Mutex::new(0_usize));
        let finished = Arc::new(AtomicBool::new(false));

        let samples_cb = Arc::clone(&samples);
        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position_cb.lock().unwrap_or_else(|e| e.into_inner());

                    for frame in data.chunks_mut(channels) {
                        let sample = if *pos < samples_cb.len() {
                            samples_cb[*pos]
                        } else {
                            finished_cb.store(true, Ordering::Release);
                            0.0
                        };

                        for out in frame.iter_mut() {
                            *out = sample;
                        }

                        if *pos < samples_cb.len() {
                            *pos += 1;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Wait for drain, cancellation, or a stuck-device timeout
        let duration_ms = samples.len() as u64 * 1000 / u64::from(sample_rate);
        let timeout = std::time::Duration::from_millis(duration_ms + 500);
        let start = std::time::Instant::now();

        while !finished.load(Ordering::Acquire) {
            if self.cancel.load(Ordering::Acquire) {
                tracing::debug!("playback cancelled");
                break;
            }
            if start.elapsed() > timeout {
                tracing::warn!("playback drain timed out");
                break;
            }
            std::thread::sleep(DRAIN_POLL);
        }

        drop(stream);
        tracing::debug!(samples = samples.len(), "playback done");
        Ok(())
    }
}
