use crate::models::audio_models::AudioLevels;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingSummary;
use crate::models::state::RecordingState;

/// Event delegate for recording session notifications.
///
/// Methods are called from whichever thread observes the event: the status
/// ticker for levels, the watchdog for stall warnings, and the controlling
/// thread for state changes and completion. Implementations must not block.
pub trait CaptureDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &RecordingState);

    /// Called at the level update interval while recording.
    fn on_levels_updated(&self, levels: &AudioLevels);

    /// Called for non-fatal conditions: desktop unavailable, stall, fallback.
    fn on_warning(&self, warning: &CaptureError);

    /// Called when the session moves to failed.
    fn on_error(&self, error: &CaptureError);

    /// Called once the mixed buffer is ready.
    fn on_recording_finished(&self, summary: &RecordingSummary);
}
