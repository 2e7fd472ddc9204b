//! # meetsync-core
//!
//! Platform-agnostic capture, synchronization and mixing engine for recording
//! a microphone together with desktop (system output) audio.
//!
//! Platform backends implement the `CaptureSource` trait and plug into the
//! generic `RecordingSession`. Audio is buffered while recording and mixed
//! once, at stop, into a single loudness-safe PCM buffer.
//!
//! ## Architecture
//!
//! ```text
//! meetsync-core (this crate)
//! ├── traits/       ← CaptureSource, CaptureDelegate, PcmEncoder
//! ├── models/       ← CaptureError, RecordingState, CaptureConfiguration, frames, results
//! ├── processing/   ← TimelineReconstructor, Resampler, ChannelEnhancer, Mixer, WAV header
//! ├── session/      ← RecordingSession, FrameSink, collectors, watchdog, mix-down pipeline
//! ├── storage/      ← WAV writer, encoder handoff with raw PCM fallback
//! └── status        ← StatusEvent, JSON-lines delegate
//! ```

pub mod constants;
pub mod models;
pub mod processing;
pub mod session;
pub mod status;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    AudioFrame, AudioLevels, AudioSource, CaptureBuffer, CaptureDiagnostics, SourceDiagnostics,
    SourceKind, StreamFormat,
};
pub use models::config::CaptureConfiguration;
pub use models::error::CaptureError;
pub use models::recording_result::{MixMode, MixedAudioBuffer, RecordingResult, RecordingSummary};
pub use models::state::RecordingState;
pub use processing::enhancer::ChannelEnhancer;
pub use processing::mixer::Mixer;
pub use processing::resampler::Resampler;
pub use processing::timeline::{TimelineGap, TimelineReconstructor, TimelineReport};
pub use session::frame_sink::FrameSink;
pub use session::pipeline::{mix_down, CapturedStream, MixDown};
pub use session::recording::RecordingSession;
pub use status::{JsonLinesDelegate, StatusEvent};
pub use storage::handoff::{hand_off, HandoffOutcome};
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_source::{
    candidate_sample_rates, negotiate_sample_rate, rate_fallback_notice, CaptureSource,
};
pub use traits::encoder::PcmEncoder;
