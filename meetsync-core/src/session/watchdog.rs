use std::time::Duration;

use crate::models::error::CaptureError;
use crate::session::ticker::Ticker;

/// Decides when a silent capture counts as stalled. Fires at most once.
#[derive(Debug, Clone)]
pub struct StallDetector {
    threshold: Duration,
    warned: bool,
}

impl StallDetector {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            warned: false,
        }
    }

    /// Returns the warning the first time `silent_for` exceeds the threshold.
    pub fn check(&mut self, silent_for: Duration) -> Option<CaptureError> {
        if self.warned || silent_for <= self.threshold {
            return None;
        }
        self.warned = true;
        Some(CaptureError::StreamStallDetected {
            silent_for_secs: silent_for.as_secs_f64(),
        })
    }

    pub fn has_warned(&self) -> bool {
        self.warned
    }
}

/// Spawn the watchdog thread.
///
/// Every `interval`, `silent_for` reports how long it has been since any
/// source last delivered a callback. The first time that exceeds `threshold`,
/// `on_stall` receives a `StreamStallDetected`. Recording is never stopped.
pub fn spawn_watchdog<S, W>(
    interval: Duration,
    threshold: Duration,
    silent_for: S,
    on_stall: W,
) -> Result<Ticker, CaptureError>
where
    S: Fn() -> Duration + Send + 'static,
    W: Fn(CaptureError) + Send + 'static,
{
    let mut detector = StallDetector::new(threshold);
    Ticker::spawn("meetsync-watchdog", interval, move || {
        if let Some(warning) = detector.check(silent_for()) {
            on_stall(warning);
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use parking_lot::Mutex;

    use super::*;

    #[test]
    fn warns_only_once() {
        let mut detector = StallDetector::new(Duration::from_secs(10));
        assert!(detector.check(Duration::from_secs(3)).is_none());
        assert!(detector.check(Duration::from_secs(10)).is_none());

        let warning = detector.check(Duration::from_secs(12)).unwrap();
        assert_eq!(
            warning,
            CaptureError::StreamStallDetected {
                silent_for_secs: 12.0
            }
        );
        assert!(!warning.is_fatal());
        assert!(detector.has_warned());
        assert!(detector.check(Duration::from_secs(30)).is_none());
    }

    #[test]
    fn watchdog_thread_reports_a_stall_once() {
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let watchdog = {
            let warnings = Arc::clone(&warnings);
            spawn_watchdog(
                Duration::from_millis(5),
                Duration::from_millis(100),
                || Duration::from_secs(1),
                move |w| warnings.lock().push(w),
            )
            .unwrap()
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while warnings.lock().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(30));
        watchdog.stop();

        assert_eq!(warnings.lock().len(), 1);
    }
}
