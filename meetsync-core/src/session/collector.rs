use std::thread;

use crossbeam::channel::{Receiver, Sender};

use crate::models::audio_models::{CaptureBuffer, SourceKind};
use crate::models::error::CaptureError;
use crate::session::frame_sink::{FrameMessage, FrameSink};

/// Thread that exclusively owns one source's [`CaptureBuffer`] while recording.
///
/// Frames arrive in callback order through the sink's queue. `finish()`
/// queues a marker behind every frame already sent, so nothing accepted
/// before the stop is lost.
pub struct Collector {
    kind: SourceKind,
    control: Sender<FrameMessage>,
    handle: Option<thread::JoinHandle<CaptureBuffer>>,
}

impl Collector {
    pub(crate) fn spawn(
        sink: &FrameSink,
        receiver: Receiver<FrameMessage>,
    ) -> Result<Self, CaptureError> {
        let kind = sink.kind();
        let handle = thread::Builder::new()
            .name(format!("meetsync-{}-collector", kind.label()))
            .spawn(move || {
                let mut buffer = CaptureBuffer::new();
                for message in receiver.iter() {
                    match message {
                        FrameMessage::Frame(frame) => buffer.push(frame),
                        FrameMessage::Finish => break,
                    }
                }
                buffer
            })
            .map_err(|e| {
                CaptureError::StreamError(format!(
                    "failed to spawn {} collector: {}",
                    kind.label(),
                    e
                ))
            })?;

        Ok(Self {
            kind,
            control: sink.control_sender(),
            handle: Some(handle),
        })
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Stop collecting and take the buffer. Blocks until queued frames drain.
    pub fn finish(mut self) -> Result<CaptureBuffer, CaptureError> {
        // A send error means the collector already exited; joining still
        // returns whatever it gathered.
        let _ = self.control.send(FrameMessage::Finish);
        let handle = self.handle.take().ok_or_else(|| {
            CaptureError::InvalidState(format!("{} collector already finished", self.kind.label()))
        })?;
        let buffer = handle.join().map_err(|_| {
            CaptureError::StreamError(format!("{} collector thread panicked", self.kind.label()))
        })?;

        log::debug!(
            "{} collector finished: {} frames, {} samples",
            self.kind.label(),
            buffer.frame_count(),
            buffer.total_samples()
        );
        Ok(buffer)
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.control.send(FrameMessage::Finish);
        }
    }
}
