//! Owner thread for a native stream handle.
//!
//! `cpal::Stream` is not `Send`, so it is built, played and dropped on one
//! dedicated thread. The thread parks on a shutdown channel until `stop`;
//! dropping the `StreamThread` without calling `stop` also releases it.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};

use meetsync_core::CaptureError;

pub(crate) struct StreamThread {
    name: String,
    shutdown_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Run `build` on a new thread named `name` and keep its result alive
    /// there. Returns once the handle exists, or with the error `build` gave.
    pub(crate) fn spawn<T, F>(name: String, build: F) -> Result<Self, CaptureError>
    where
        T: 'static,
        F: FnOnce() -> Result<T, CaptureError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let held = match build() {
                    Ok(held) => {
                        let _ = ready_tx.send(Ok(()));
                        held
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Returns on a shutdown message or when the sender is dropped.
                let _ = shutdown_rx.recv();
                drop(held);
                let _ = done_tx.send(());
            })
            .map_err(|e| CaptureError::StreamError(format!("failed to spawn {}: {}", name, e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                name,
                shutdown_tx,
                done_rx,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::StreamError(format!(
                    "{} exited before the stream started",
                    name
                )))
            }
        }
    }

    /// Release the stream and wait up to `timeout` for the thread to finish.
    ///
    /// A thread that does not finish in time is detached with a warning.
    pub(crate) fn stop(mut self, timeout: Duration) {
        let _ = self.shutdown_tx.send(());

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        log::error!("{} panicked while closing its stream", self.name);
                    }
                }
                log::debug!("{} stopped", self.name);
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "{} did not close its stream within {:?}, detaching",
                    self.name,
                    timeout
                );
                drop(self.handle.take());
            }
        }
    }
}
