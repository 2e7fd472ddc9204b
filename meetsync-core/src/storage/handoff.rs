use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::error::CaptureError;
use crate::models::recording_result::MixedAudioBuffer;
use crate::storage::wav_writer::write_wav;
use crate::traits::encoder::PcmEncoder;

/// Where the finished recording ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffOutcome {
    pub path: PathBuf,
    /// False when the raw WAV fallback was written instead.
    pub encoded: bool,
    pub fallback_reason: Option<String>,
}

/// Pass the mix to `encoder`, falling back to a raw PCM WAV on any failure.
///
/// The fallback file sits next to `output_path` with a `.wav` extension.
/// Only a failure of the fallback write itself is returned as an error.
pub fn hand_off(
    buffer: &MixedAudioBuffer,
    encoder: Option<&dyn PcmEncoder>,
    output_path: &Path,
) -> Result<HandoffOutcome, CaptureError> {
    let fallback_reason = match encoder {
        Some(encoder) => match encoder.encode(buffer, output_path) {
            Ok(path) => {
                log::info!("{} encoded {}", encoder.name(), path.display());
                return Ok(HandoffOutcome {
                    path,
                    encoded: true,
                    fallback_reason: None,
                });
            }
            Err(e) => {
                log::warn!("{} failed, writing WAV instead: {}", encoder.name(), e);
                e.to_string()
            }
        },
        None => "no encoder available".to_string(),
    };

    let wav_path = output_path.with_extension("wav");
    write_wav(&wav_path, buffer)?;

    Ok(HandoffOutcome {
        path: wav_path,
        encoded: false,
        fallback_reason: Some(fallback_reason),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    struct CopyEncoder;

    impl PcmEncoder for CopyEncoder {
        fn name(&self) -> &str {
            "copy"
        }

        fn encode(
            &self,
            buffer: &MixedAudioBuffer,
            output_path: &Path,
        ) -> Result<PathBuf, CaptureError> {
            fs::write(output_path, buffer.to_le_bytes())
                .map_err(|e| CaptureError::EncoderFailure(e.to_string()))?;
            Ok(output_path.to_path_buf())
        }
    }

    struct MissingEncoder;

    impl PcmEncoder for MissingEncoder {
        fn name(&self) -> &str {
            "missing"
        }

        fn encode(&self, _: &MixedAudioBuffer, _: &Path) -> Result<PathBuf, CaptureError> {
            Err(CaptureError::EncoderFailure("ffmpeg not found".into()))
        }
    }

    fn buffer() -> MixedAudioBuffer {
        MixedAudioBuffer::new(vec![0, 1, 2, 3], 48000, 2)
    }

    #[test]
    fn encoder_success_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("meeting.opus");
        let outcome = hand_off(&buffer(), Some(&CopyEncoder as &dyn PcmEncoder), &target).unwrap();
        assert!(outcome.encoded);
        assert_eq!(outcome.path, target);
        assert!(outcome.fallback_reason.is_none());
        assert!(!dir.path().join("meeting.wav").exists());
    }

    #[test]
    fn encoder_failure_falls_back_to_wav() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("meeting.opus");
        let outcome = hand_off(&buffer(), Some(&MissingEncoder as &dyn PcmEncoder), &target).unwrap();
        assert!(!outcome.encoded);
        assert_eq!(outcome.path, dir.path().join("meeting.wav"));
        assert!(outcome.fallback_reason.unwrap().contains("ffmpeg not found"));
        assert_eq!(fs::read(&outcome.path).unwrap().len(), 44 + 8);
    }

    #[test]
    fn no_encoder_writes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = hand_off(&buffer(), None, &dir.path().join("meeting.opus")).unwrap();
        assert!(!outcome.encoded);
        assert!(outcome.path.exists());
    }
}
