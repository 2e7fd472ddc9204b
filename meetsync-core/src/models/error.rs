use thiserror::Error;

/// Errors and advisory conditions raised by a recording session.
///
/// Fatal variants abort the operation that produced them. `StreamStallDetected`,
/// `SampleRateFallback` and desktop-side `DeviceUnavailable` are only ever
/// surfaced as warnings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("no supported sample rate for {device} (tried {tried:?})")]
    UnsupportedSampleRate { device: String, tried: Vec<u32> },

    #[error("{device}: {requested} Hz unavailable, recording at {actual} Hz")]
    SampleRateFallback {
        device: String,
        requested: u32,
        actual: u32,
    },

    #[error("no audio callback for {silent_for_secs:.1}s, capture may be stalled")]
    StreamStallDetected { silent_for_secs: f64 },

    #[error("no audio captured from microphone")]
    NoAudioCaptured,

    #[error("both audio tracks are empty after resampling")]
    AlignmentFailure,

    #[error("encoder failed: {0}")]
    EncoderFailure(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("resampling failed: {0}")]
    ResampleFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("stream error: {0}")]
    StreamError(String),
}

impl CaptureError {
    /// Whether this condition makes a correct recording impossible.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::StreamStallDetected { .. } | Self::SampleRateFallback { .. }
        )
    }
}
