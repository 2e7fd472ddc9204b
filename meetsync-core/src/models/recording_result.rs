use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::audio_models::CaptureDiagnostics;
use crate::processing::timeline::TimelineReport;

/// Final interleaved 16-bit PCM at the configured output format.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedAudioBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl MixedAudioBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        let per_sec = self.sample_rate as f64 * self.channels.max(1) as f64;
        if per_sec == 0.0 {
            return 0.0;
        }
        self.samples.len() as f64 / per_sec
    }

    /// Little-endian PCM bytes, as written to a WAV data chunk.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.samples.len() * 2);
        for sample in &self.samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        data
    }

    /// SHA-256 hex digest of the PCM payload.
    pub fn checksum(&self) -> String {
        let digest = Sha256::digest(self.to_le_bytes());
        hex_encode(&digest)
    }
}

/// Whether the output contains both sources or the microphone alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixMode {
    Dual,
    MicOnly,
}

/// Completion payload exposed to the hosting application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub output_duration_secs: f64,
    pub sample_count: usize,
    pub sample_rate: u32,
    pub channels: u16,
}

impl From<&MixedAudioBuffer> for RecordingSummary {
    fn from(buffer: &MixedAudioBuffer) -> Self {
        Self {
            output_duration_secs: buffer.duration_secs(),
            sample_count: buffer.sample_count(),
            sample_rate: buffer.sample_rate,
            channels: buffer.channels,
        }
    }
}

/// Result returned when a session stops and mixes successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub id: String,
    pub created_at: String,
    pub buffer: MixedAudioBuffer,
    pub duration_secs: f64,
    pub checksum: String,
    pub mode: MixMode,
    pub timeline: TimelineReport,
    pub diagnostics: CaptureDiagnostics,
}

impl RecordingResult {
    pub fn new(
        buffer: MixedAudioBuffer,
        mode: MixMode,
        timeline: TimelineReport,
        diagnostics: CaptureDiagnostics,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            duration_secs: buffer.duration_secs(),
            checksum: buffer.checksum(),
            buffer,
            mode,
            timeline,
            diagnostics,
        }
    }

    pub fn summary(&self) -> RecordingSummary {
        RecordingSummary::from(&self.buffer)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_and_counts() {
        let buffer = MixedAudioBuffer::new(vec![0; 96000], 48000, 2);
        assert_eq!(buffer.sample_count(), 96000);
        assert_eq!(buffer.frame_count(), 48000);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn le_bytes_layout() {
        let buffer = MixedAudioBuffer::new(vec![1, -1], 48000, 1);
        assert_eq!(buffer.to_le_bytes(), vec![0x01, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn checksum_is_stable_hex() {
        let a = MixedAudioBuffer::new(vec![1, 2, 3], 48000, 1);
        let b = MixedAudioBuffer::new(vec![1, 2, 3], 48000, 1);
        let c = MixedAudioBuffer::new(vec![1, 2, 4], 48000, 1);
        assert_eq!(a.checksum().len(), 64);
        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn result_summary_matches_buffer() {
        let buffer = MixedAudioBuffer::new(vec![0; 480], 48000, 2);
        let result = RecordingResult::new(
            buffer,
            MixMode::MicOnly,
            TimelineReport::default(),
            CaptureDiagnostics::default(),
        );
        let summary = result.summary();
        assert_eq!(summary.sample_count, 480);
        assert!((summary.output_duration_secs - 0.005).abs() < 1e-9);
        assert_eq!(result.id.len(), 36);
    }
}
