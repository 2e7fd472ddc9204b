use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use crate::constants::MAX_PREROLL_SECS;

/// Configuration for a recording session.
///
/// Validated once when the session is constructed and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfiguration {
    /// Specific microphone device ID, or None for system default.
    pub mic_device_id: Option<String>,

    /// Specific desktop (loopback) device ID, or None for the default output.
    pub desktop_device_id: Option<String>,

    /// Capture desktop audio alongside the microphone (default: true).
    pub enable_desktop_capture: bool,

    /// Output sample rate in Hz (default: 48000).
    pub target_sample_rate: u32,

    /// Output channel count, 1 or 2 (default: 2).
    pub target_channels: u16,

    /// Requested frames per callback buffer (default: 4096).
    pub chunk_size_frames: u32,

    /// Seconds of audio discarded after stream start for device warm-up.
    /// Zero disables preroll.
    pub preroll_secs: f64,

    pub mic_volume: f32,
    pub desktop_volume: f32,

    /// Extra linear gain applied to the mic when mixing (2.0 ≈ +6 dB).
    pub mic_boost_linear: f32,

    pub watchdog_interval_ms: u64,

    /// Warn once if neither source delivers a callback for this long.
    pub stall_threshold_ms: u64,

    /// Interval of level/duration updates pushed to the delegate.
    pub level_update_interval_ms: u64,

    /// How long `stop()` waits for a native stream to close.
    pub stream_stop_timeout_ms: u64,

    /// Capacity of each callback → collector frame queue.
    pub frame_queue_capacity: usize,
}

impl CaptureConfiguration {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.target_sample_rate == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "sample rate must be positive".into(),
            ));
        }
        if ![1, 2].contains(&self.target_channels) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "unsupported channel count: {}",
                self.target_channels
            )));
        }
        if self.chunk_size_frames == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "chunk size must be positive".into(),
            ));
        }
        if !(0.0..=MAX_PREROLL_SECS).contains(&self.preroll_secs) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "invalid preroll: {}",
                self.preroll_secs
            )));
        }
        for (name, volume) in [("mic", self.mic_volume), ("desktop", self.desktop_volume)] {
            if !volume.is_finite() || volume < 0.0 {
                return Err(CaptureError::ConfigurationFailed(format!(
                    "invalid {} volume: {}",
                    name, volume
                )));
            }
        }
        if !self.mic_boost_linear.is_finite() || self.mic_boost_linear <= 0.0 {
            return Err(CaptureError::ConfigurationFailed(format!(
                "invalid mic boost: {}",
                self.mic_boost_linear
            )));
        }
        let intervals = [
            ("watchdog interval", self.watchdog_interval_ms),
            ("stall threshold", self.stall_threshold_ms),
            ("level update interval", self.level_update_interval_ms),
            ("stream stop timeout", self.stream_stop_timeout_ms),
        ];
        for (name, ms) in intervals {
            if ms == 0 {
                return Err(CaptureError::ConfigurationFailed(format!(
                    "{} must be positive",
                    name
                )));
            }
        }
        if self.frame_queue_capacity == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "frame queue capacity must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Zero for a preroll `validate` would reject.
    pub fn preroll(&self) -> Duration {
        Duration::try_from_secs_f64(self.preroll_secs).unwrap_or_default()
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }

    pub fn level_update_interval(&self) -> Duration {
        Duration::from_millis(self.level_update_interval_ms)
    }

    pub fn stream_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_stop_timeout_ms)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            mic_device_id: None,
            desktop_device_id: None,
            enable_desktop_capture: true,
            target_sample_rate: 48000,
            target_channels: 2,
            chunk_size_frames: 4096,
            preroll_secs: 1.5,
            mic_volume: 1.0,
            desktop_volume: 1.0,
            mic_boost_linear: 2.0,
            watchdog_interval_ms: 5000,
            stall_threshold_ms: 10_000,
            level_update_interval_ms: 200,
            stream_stop_timeout_ms: 2000,
            frame_queue_capacity: 1024,
        }
    }
}
