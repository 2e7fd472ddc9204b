use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Which of the two capture paths a source feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Mic,
    Desktop,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mic => "mic",
            Self::Desktop => "desktop",
        }
    }
}

/// An audio device available for capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSource {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub is_default: bool,
    pub default_sample_rate: u32,
    pub max_input_channels: u16,
}

/// Native format a stream was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Interleaved samples per second.
    pub fn samples_per_sec(&self) -> u64 {
        self.sample_rate as u64 * self.channels.max(1) as u64
    }

    /// Seconds covered by `sample_count` interleaved samples.
    pub fn duration_secs(&self, sample_count: usize) -> f64 {
        let per_sec = self.samples_per_sec();
        if per_sec == 0 {
            return 0.0;
        }
        sample_count as f64 / per_sec as f64
    }
}

/// Interleaved 16-bit samples delivered by one capture callback.
///
/// Every frame is stamped on arrival. Only desktop timestamps drive timeline
/// placement; mic frames are treated as contiguous and only the first
/// timestamp is used, as the reconstruction reference.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub captured_at: Instant,
    pub samples: Vec<i16>,
}

impl AudioFrame {
    pub fn new(captured_at: Instant, samples: Vec<i16>) -> Self {
        Self {
            captured_at,
            samples,
        }
    }
}

/// Append-only sequence of frames for one source.
///
/// Owned by that source's collector thread while recording and handed back
/// by value at stop, after which nothing mutates it.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    frames: Vec<AudioFrame>,
    total_samples: usize,
}

impl CaptureBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: AudioFrame) {
        self.total_samples += frame.samples.len();
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Total interleaved samples across every frame.
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn first_captured_at(&self) -> Option<Instant> {
        self.frames.first().map(|f| f.captured_at)
    }

    /// Concatenate every frame into one contiguous sample buffer.
    pub fn to_samples(&self) -> Vec<i16> {
        let mut samples = Vec::with_capacity(self.total_samples);
        for frame in &self.frames {
            samples.extend_from_slice(&frame.samples);
        }
        samples
    }
}

/// Live peak levels for visualization (0.0–1.0).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioLevels {
    pub mic_level: f32,
    pub desktop_level: f32,
}

/// Per-source capture counters and timing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDiagnostics {
    pub native_format: Option<StreamFormat>,
    pub callback_count: u64,
    pub frames_captured: u64,
    pub samples_captured: u64,
    pub preroll_frames_discarded: u64,
    pub overflow_frames_dropped: u64,
    /// Seconds from the session start to the first callback.
    pub first_callback_offset_secs: Option<f64>,
    /// Seconds from the session start to the first frame kept after preroll.
    pub first_capture_offset_secs: Option<f64>,
}

/// Diagnostics for debugging capture sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureDiagnostics {
    pub preroll_secs: f64,
    pub mic: SourceDiagnostics,
    pub desktop: SourceDiagnostics,
}

impl CaptureDiagnostics {
    /// Desktop first capture minus mic first capture, when both exist.
    pub fn capture_start_delta_secs(&self) -> Option<f64> {
        match (
            self.mic.first_capture_offset_secs,
            self.desktop.first_capture_offset_secs,
        ) {
            (Some(mic), Some(desktop)) => Some(desktop - mic),
            _ => None,
        }
    }
}
