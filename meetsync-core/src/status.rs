//! Status events for a hosting application, one JSON object per line.
//!
//! ```text
//! {"type":"levels","mic":0.412,"desktop":0.03}
//! {"type":"state","state":"recording","duration_secs":12.4}
//! {"type":"saved","audio_path":"/tmp/meeting.opus","duration":63.2,"encoded":true}
//! ```

use std::io::Write;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::models::audio_models::AudioLevels;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingSummary;
use crate::models::state::RecordingState;
use crate::storage::handoff::HandoffOutcome;
use crate::traits::capture_delegate::CaptureDelegate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    Levels {
        mic: f32,
        desktop: f32,
    },
    State {
        state: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        duration_secs: Option<f64>,
    },
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
    Finished(RecordingSummary),
    Saved {
        audio_path: String,
        duration: f64,
        encoded: bool,
    },
}

impl StatusEvent {
    /// Levels rounded to three decimals.
    pub fn levels(levels: &AudioLevels) -> Self {
        Self::Levels {
            mic: round3(levels.mic_level),
            desktop: round3(levels.desktop_level),
        }
    }

    pub fn state(state: &RecordingState) -> Self {
        Self::State {
            state: state.name().to_string(),
            duration_secs: state.duration(),
        }
    }

    pub fn saved(outcome: &HandoffOutcome, duration_secs: f64) -> Self {
        Self::Saved {
            audio_path: outcome.path.to_string_lossy().into_owned(),
            duration: duration_secs,
            encoded: outcome.encoded,
        }
    }
}

fn round3(value: f32) -> f32 {
    (value * 1000.0).round() / 1000.0
}

/// [`CaptureDelegate`] that writes every notification as a JSON line to `W`.
pub struct JsonLinesDelegate<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesDelegate<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Serialize `event` and write it followed by a newline, then flush.
    pub fn emit(&self, event: &StatusEvent) -> Result<(), CaptureError> {
        let line = serde_json::to_string(event)
            .map_err(|e| CaptureError::StorageError(format!("failed to serialize status: {}", e)))?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| CaptureError::StorageError(format!("failed to write status: {}", e)))
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn emit_or_log(&self, event: StatusEvent) {
        if let Err(e) = self.emit(&event) {
            log::warn!("Dropping status event: {}", e);
        }
    }
}

impl<W: Write + Send> CaptureDelegate for JsonLinesDelegate<W> {
    fn on_state_changed(&self, state: &RecordingState) {
        self.emit_or_log(StatusEvent::state(state));
    }

    fn on_levels_updated(&self, levels: &AudioLevels) {
        self.emit_or_log(StatusEvent::levels(levels));
    }

    fn on_warning(&self, warning: &CaptureError) {
        self.emit_or_log(StatusEvent::Warning {
            message: warning.to_string(),
        });
    }

    fn on_error(&self, error: &CaptureError) {
        self.emit_or_log(StatusEvent::Error {
            message: error.to_string(),
        });
    }

    fn on_recording_finished(&self, summary: &RecordingSummary) {
        self.emit_or_log(StatusEvent::Finished(summary.clone()));
    }
}
