//! # meetsync-cpal
//!
//! cpal backend for meetsync.
//!
//! Provides:
//! - `CpalCapture` for microphone capture and desktop loopback capture
//! - `DeviceEnumerator` for listing and resolving devices
//!
//! ## Platform Notes
//! - Windows: desktop audio is a WASAPI loopback stream on a render endpoint
//! - Linux: desktop audio needs a PulseAudio/PipeWire monitor source
//! - macOS: desktop audio needs a virtual loopback driver such as BlackHole
//!
//! ## Usage
//! ```ignore
//! use meetsync_core::{CaptureConfiguration, RecordingSession};
//! use meetsync_cpal::CpalCapture;
//!
//! let config = CaptureConfiguration::default();
//! let mut session = RecordingSession::new(
//!     config,
//!     CpalCapture::microphone(),
//!     Some(CpalCapture::desktop()),
//! )?;
//! session.start()?;
//! // ...
//! let result = session.stop()?;
//! ```

pub mod cpal_source;
pub mod device_enumerator;
mod stream_thread;

pub use cpal_source::CpalCapture;
pub use device_enumerator::{find_device, is_loopback_name, DeviceEnumerator, ResolvedDevice};
