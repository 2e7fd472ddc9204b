use crate::constants::COMMON_SAMPLE_RATES;
use crate::models::audio_models::{AudioSource, SourceKind, StreamFormat};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::session::frame_sink::FrameSink;

/// One live capture stream: a microphone or a desktop loopback.
///
/// Implemented by:
/// - `CpalCapture` (meetsync-cpal), for both microphone and loopback
/// - in-process fakes in the session tests
///
/// The session calls `open` once, then `start` with the sink every callback
/// must push into, then `stop`. Callbacks run on the platform's audio thread
/// and must only call [`FrameSink::push`].
pub trait CaptureSource: Send {
    fn kind(&self) -> SourceKind;

    /// Information about the device backing this source.
    fn device_info(&self) -> AudioSource;

    /// Resolve the device and negotiate a native format.
    ///
    /// Fails with `DeviceUnavailable` or `UnsupportedSampleRate`.
    fn open(&mut self, config: &CaptureConfiguration) -> Result<StreamFormat, CaptureError>;

    /// Begin delivering frames to `sink`.
    fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError>;

    /// Close the native stream. Calling it when not started is a no-op.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Advisory from the last `open`, such as a sample-rate fallback.
    fn open_notice(&self) -> Option<CaptureError> {
        None
    }
}

/// The `SampleRateFallback` notice for a negotiated rate, if it differs
/// from the one requested.
pub fn rate_fallback_notice(device: &str, requested: u32, actual: u32) -> Option<CaptureError> {
    (requested != actual).then(|| CaptureError::SampleRateFallback {
        device: device.to_string(),
        requested,
        actual,
    })
}

/// Rates to try, in order: the requested rate, the device default, then the
/// common fallbacks. Duplicates and zero are removed.
pub fn candidate_sample_rates(target: u32, device_default: Option<u32>) -> Vec<u32> {
    let mut candidates = Vec::with_capacity(COMMON_SAMPLE_RATES.len() + 2);
    let ordered = std::iter::once(target)
        .chain(device_default)
        .chain(COMMON_SAMPLE_RATES.iter().copied());
    for rate in ordered {
        if rate > 0 && !candidates.contains(&rate) {
            candidates.push(rate);
        }
    }
    candidates
}

/// Pick the first candidate rate for which `probe` succeeds.
///
/// `probe` typically opens and immediately closes a trial stream.
pub fn negotiate_sample_rate<F>(
    device: &str,
    target: u32,
    device_default: Option<u32>,
    mut probe: F,
) -> Result<u32, CaptureError>
where
    F: FnMut(u32) -> bool,
{
    let candidates = candidate_sample_rates(target, device_default);
    for &rate in &candidates {
        if probe(rate) {
            if rate != target {
                log::warn!(
                    "{}: {} Hz unavailable, using {} Hz instead",
                    device,
                    target,
                    rate
                );
            } else {
                log::info!("{}: opened at {} Hz", device, rate);
            }
            return Ok(rate);
        }
        log::debug!("{}: {} Hz rejected", device, rate);
    }

    Err(CaptureError::UnsupportedSampleRate {
        device: device.to_string(),
        tried: candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_ordered_and_deduplicated() {
        assert_eq!(
            candidate_sample_rates(48000, Some(44100)),
            vec![48000, 44100, 32000, 16000, 8000]
        );
        assert_eq!(
            candidate_sample_rates(96000, Some(22050)),
            vec![96000, 22050, 48000, 44100, 32000, 16000, 8000]
        );
        assert_eq!(
            candidate_sample_rates(16000, None),
            vec![16000, 48000, 44100, 32000, 8000]
        );
    }

    #[test]
    fn fallback_notice_only_when_rate_changed() {
        assert_eq!(rate_fallback_notice("mic", 48000, 48000), None);
        let notice = rate_fallback_notice("USB Mic", 48000, 44100).unwrap();
        assert!(!notice.is_fatal());
        assert_eq!(
            notice.to_string(),
            "USB Mic: 48000 Hz unavailable, recording at 44100 Hz"
        );
    }

    #[test]
    fn target_rate_wins_when_it_opens() {
        let rate = negotiate_sample_rate("mic", 48000, Some(44100), |_| true).unwrap();
        assert_eq!(rate, 48000);
    }

    #[test]
    fn device_default_is_tried_before_common_rates() {
        let mut tried = Vec::new();
        let rate = negotiate_sample_rate("mic", 96000, Some(22050), |r| {
            tried.push(r);
            r == 22050 || r == 48000
        })
        .unwrap();
        assert_eq!(rate, 22050);
        assert_eq!(tried, vec![96000, 22050]);
    }

    #[test]
    fn every_rate_failing_is_unsupported() {
        let err = negotiate_sample_rate("loopback", 48000, None, |_| false).unwrap_err();
        match err {
            CaptureError::UnsupportedSampleRate { device, tried } => {
                assert_eq!(device, "loopback");
                assert_eq!(tried, vec![48000, 44100, 32000, 16000, 8000]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
