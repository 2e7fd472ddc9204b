use super::error::CaptureError;
use super::recording_result::RecordingSummary;

/// Recording session state machine.
///
/// State transitions:
/// ```text
/// idle → recording → stopping → mixed / failed
/// ```
/// `start()` failures move straight from idle to failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingState {
    Idle,
    Recording { duration_secs: f64 },
    Stopping,
    Mixed(RecordingSummary),
    Failed(CaptureError),
}

impl RecordingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Mixed(_) | Self::Failed(_))
    }

    /// Short lowercase name for status output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording { .. } => "recording",
            Self::Stopping => "stopping",
            Self::Mixed(_) => "mixed",
            Self::Failed(_) => "failed",
        }
    }

    /// Returns the current duration if in a state that tracks it.
    pub fn duration(&self) -> Option<f64> {
        match self {
            Self::Recording { duration_secs } => Some(*duration_secs),
            Self::Mixed(summary) => Some(summary.output_duration_secs),
            _ => None,
        }
    }
}
