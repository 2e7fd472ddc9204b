use std::path::{Path, PathBuf};

use crate::models::error::CaptureError;
use crate::models::recording_result::MixedAudioBuffer;

/// External lossy encoder that receives the finished mix.
///
/// Implementations should return `CaptureError::EncoderFailure` when the
/// encoder is missing or exits unsuccessfully; the caller then falls back to
/// a raw PCM WAV file.
pub trait PcmEncoder: Send + Sync {
    /// Short identifier used in logs (e.g. "ffmpeg-opus").
    fn name(&self) -> &str;

    /// Encode `buffer` and return the path of the written file.
    fn encode(&self, buffer: &MixedAudioBuffer, output_path: &Path)
        -> Result<PathBuf, CaptureError>;
}
