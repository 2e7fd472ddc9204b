//! The hot path between a platform audio callback and its collector thread.
//!
//! A callback never takes a lock: it stamps the frame, updates a few atomics,
//! and `try_send`s an owned [`AudioFrame`] into a bounded queue. A full queue
//! drops the frame and counts it. Mic audio is laid out by sample count, so a
//! dropped mic frame comes back as silence at the front of the next one.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::models::audio_models::{AudioFrame, SourceDiagnostics, SourceKind, StreamFormat};
use crate::processing::mixer::subsampled_peak;

const UNSET: u64 = u64::MAX;

pub(crate) enum FrameMessage {
    Frame(AudioFrame),
    Finish,
}

/// Lock-free counters and level meter for one source.
#[derive(Debug)]
pub struct SourceMeters {
    level_bits: AtomicU32,
    callbacks: AtomicU64,
    frames: AtomicU64,
    samples: AtomicU64,
    preroll_discarded: AtomicU64,
    overflow_dropped: AtomicU64,
    // Mic samples dropped on overflow and not yet replaced with silence.
    pending_silence: AtomicU64,
    // Nanoseconds since the session origin; UNSET until the first event.
    first_callback_nanos: AtomicU64,
    first_capture_nanos: AtomicU64,
    last_callback_nanos: AtomicU64,
}

impl SourceMeters {
    pub fn new() -> Self {
        Self {
            level_bits: AtomicU32::new(0f32.to_bits()),
            callbacks: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            samples: AtomicU64::new(0),
            preroll_discarded: AtomicU64::new(0),
            overflow_dropped: AtomicU64::new(0),
            pending_silence: AtomicU64::new(0),
            first_callback_nanos: AtomicU64::new(UNSET),
            first_capture_nanos: AtomicU64::new(UNSET),
            last_callback_nanos: AtomicU64::new(UNSET),
        }
    }

    /// Latest subsampled peak, 0.0–1.0.
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level_bits.load(Ordering::Relaxed))
    }

    pub fn reset_level(&self) {
        self.level_bits.store(0f32.to_bits(), Ordering::Relaxed);
    }

    pub fn callback_count(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }

    /// Offset of the most recent callback from the session origin.
    pub fn last_callback_offset(&self) -> Option<Duration> {
        read_offset(&self.last_callback_nanos)
    }

    pub fn snapshot(&self, native_format: Option<StreamFormat>) -> SourceDiagnostics {
        SourceDiagnostics {
            native_format,
            callback_count: self.callbacks.load(Ordering::Relaxed),
            frames_captured: self.frames.load(Ordering::Relaxed),
            samples_captured: self.samples.load(Ordering::Relaxed),
            preroll_frames_discarded: self.preroll_discarded.load(Ordering::Relaxed),
            overflow_frames_dropped: self.overflow_dropped.load(Ordering::Relaxed),
            first_callback_offset_secs: read_offset(&self.first_callback_nanos)
                .map(|d| d.as_secs_f64()),
            first_capture_offset_secs: read_offset(&self.first_capture_nanos)
                .map(|d| d.as_secs_f64()),
        }
    }
}

impl Default for SourceMeters {
    fn default() -> Self {
        Self::new()
    }
}

fn read_offset(cell: &AtomicU64) -> Option<Duration> {
    match cell.load(Ordering::Acquire) {
        UNSET => None,
        nanos => Some(Duration::from_nanos(nanos)),
    }
}

fn to_nanos(offset: Duration) -> u64 {
    offset.as_nanos().min((UNSET - 1) as u128) as u64
}

/// Handle given to a [`CaptureSource`](crate::traits::capture_source::CaptureSource)
/// for delivering captured audio.
///
/// Cloneable and cheap to move into a platform callback. Preroll is measured
/// against the session origin shared by every source, never against the
/// source's own first callback.
#[derive(Clone)]
pub struct FrameSink {
    kind: SourceKind,
    origin: Instant,
    preroll: Duration,
    sender: Sender<FrameMessage>,
    meters: Arc<SourceMeters>,
    accepting: Arc<AtomicBool>,
}

impl FrameSink {
    /// Create a sink and the receiving end its collector drains.
    pub(crate) fn new(
        kind: SourceKind,
        origin: Instant,
        preroll: Duration,
        capacity: usize,
        accepting: Arc<AtomicBool>,
        meters: Arc<SourceMeters>,
    ) -> (Self, Receiver<FrameMessage>) {
        let (sender, receiver) = channel::bounded(capacity.max(1));
        let sink = Self {
            kind,
            origin,
            preroll,
            sender,
            meters,
            accepting,
        };
        (sink, receiver)
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Deliver interleaved samples captured now.
    pub fn push(&self, samples: &[i16]) {
        self.push_at(samples, Instant::now());
    }

    /// Deliver interleaved samples captured at `captured_at`.
    pub fn push_at(&self, samples: &[i16], captured_at: Instant) {
        let offset = captured_at.saturating_duration_since(self.origin);
        let nanos = to_nanos(offset);
        self.meters.last_callback_nanos.store(nanos, Ordering::Release);

        if !self.is_accepting() {
            return;
        }

        self.meters.callbacks.fetch_add(1, Ordering::Relaxed);
        let _ = self.meters.first_callback_nanos.compare_exchange(
            UNSET,
            nanos,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );

        if samples.is_empty() {
            return;
        }

        self.meters
            .level_bits
            .store(subsampled_peak(samples).to_bits(), Ordering::Relaxed);

        if offset < self.preroll {
            self.meters.preroll_discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let padding = match self.kind {
            SourceKind::Mic => self.meters.pending_silence.swap(0, Ordering::AcqRel) as usize,
            SourceKind::Desktop => 0,
        };
        let mut owned = Vec::with_capacity(padding + samples.len());
        owned.resize(padding, 0);
        owned.extend_from_slice(samples);

        let frame = AudioFrame::new(captured_at, owned);
        match self.sender.try_send(FrameMessage::Frame(frame)) {
            Ok(()) => {
                let _ = self.meters.first_capture_nanos.compare_exchange(
                    UNSET,
                    nanos,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
                self.meters.frames.fetch_add(1, Ordering::Relaxed);
                self.meters
                    .samples
                    .fetch_add(samples.len() as u64, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                self.meters.overflow_dropped.fetch_add(1, Ordering::Relaxed);
                if self.kind == SourceKind::Mic {
                    self.meters
                        .pending_silence
                        .fetch_add((padding + samples.len()) as u64, Ordering::AcqRel);
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    pub(crate) fn control_sender(&self) -> Sender<FrameMessage> {
        self.sender.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(
        kind: SourceKind,
        origin: Instant,
        preroll_ms: u64,
        capacity: usize,
    ) -> (FrameSink, Receiver<FrameMessage>, Arc<SourceMeters>) {
        let meters = Arc::new(SourceMeters::new());
        let (sink, rx) = FrameSink::new(
            kind,
            origin,
            Duration::from_millis(preroll_ms),
            capacity,
            Arc::new(AtomicBool::new(true)),
            Arc::clone(&meters),
        );
        (sink, rx, meters)
    }

    fn received(rx: &Receiver<FrameMessage>) -> Vec<AudioFrame> {
        rx.try_iter()
            .filter_map(|m| match m {
                FrameMessage::Frame(f) => Some(f),
                FrameMessage::Finish => None,
            })
            .collect()
    }

    #[test]
    fn preroll_cuts_the_same_wall_clock_window_for_both_sources() {
        let origin = Instant::now();
        let (mic, mic_rx, mic_meters) = sink(SourceKind::Mic, origin, 1000, 1024);
        let (desktop, desk_rx, desk_meters) = sink(SourceKind::Desktop, origin, 1000, 1024);

        // Mic every 85 ms, desktop every 20 ms, both for two seconds.
        for i in 0..24 {
            mic.push_at(&[1; 8], origin + Duration::from_millis(85 * i));
        }
        for i in 0..100 {
            desktop.push_at(&[1; 8], origin + Duration::from_millis(20 * i));
        }

        let preroll_end = origin + Duration::from_secs(1);
        let mic_frames = received(&mic_rx);
        let desk_frames = received(&desk_rx);
        assert!(mic_frames.iter().all(|f| f.captured_at >= preroll_end));
        assert!(desk_frames.iter().all(|f| f.captured_at >= preroll_end));

        // 0..=935 ms for the mic, 0..=980 ms for the desktop.
        let mic_diag = mic_meters.snapshot(None);
        let desk_diag = desk_meters.snapshot(None);
        assert_eq!(mic_diag.preroll_frames_discarded, 12);
        assert_eq!(desk_diag.preroll_frames_discarded, 50);
        assert_ne!(mic_diag.callback_count, desk_diag.callback_count);
    }

    #[test]
    fn zero_preroll_keeps_everything() {
        let origin = Instant::now();
        let (mic, rx, meters) = sink(SourceKind::Mic, origin, 0, 16);
        mic.push_at(&[3, 4], origin);
        assert_eq!(received(&rx).len(), 1);
        assert_eq!(meters.snapshot(None).first_capture_offset_secs, Some(0.0));
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let origin = Instant::now();
        let (mic, rx, meters) = sink(SourceKind::Mic, origin, 0, 2);
        for _ in 0..5 {
            mic.push_at(&[1, 2], origin);
        }
        let diag = meters.snapshot(None);
        assert_eq!(diag.frames_captured, 2);
        assert_eq!(diag.overflow_frames_dropped, 3);
        assert_eq!(received(&rx).len(), 2);
    }

    #[test]
    fn dropped_mic_audio_returns_as_silence() {
        let origin = Instant::now();
        let (mic, rx, meters) = sink(SourceKind::Mic, origin, 0, 1);
        mic.push_at(&[1, 2], origin);
        mic.push_at(&[3, 4], origin + Duration::from_millis(10));
        mic.push_at(&[5, 6, 7], origin + Duration::from_millis(20));
        assert_eq!(received(&rx).len(), 1);

        mic.push_at(&[8, 9], origin + Duration::from_millis(30));
        let frames = received(&rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, vec![0, 0, 0, 0, 0, 8, 9]);

        let diag = meters.snapshot(None);
        assert_eq!(diag.overflow_frames_dropped, 2);
        assert_eq!(diag.samples_captured, 4);
    }

    #[test]
    fn dropped_desktop_audio_is_not_padded() {
        let origin = Instant::now();
        let (desktop, rx, _meters) = sink(SourceKind::Desktop, origin, 0, 1);
        desktop.push_at(&[1, 2], origin);
        desktop.push_at(&[3, 4], origin + Duration::from_millis(10));
        assert_eq!(received(&rx).len(), 1);

        desktop.push_at(&[5, 6], origin + Duration::from_millis(20));
        assert_eq!(received(&rx)[0].samples, vec![5, 6]);
    }

    #[test]
    fn nothing_is_queued_once_accepting_is_cleared() {
        let origin = Instant::now();
        let meters = Arc::new(SourceMeters::new());
        let accepting = Arc::new(AtomicBool::new(true));
        let (mic, rx) = FrameSink::new(
            SourceKind::Mic,
            origin,
            Duration::ZERO,
            16,
            Arc::clone(&accepting),
            Arc::clone(&meters),
        );

        mic.push(&[1]);
        accepting.store(false, Ordering::Release);
        mic.push(&[2]);

        let frames = received(&rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, vec![1]);
        assert_eq!(meters.callback_count(), 1);
        // The heartbeat still moves.
        assert!(meters.last_callback_offset().is_some());
    }

    #[test]
    fn level_and_timing_are_recorded() {
        let origin = Instant::now();
        let (desktop, _rx, meters) = sink(SourceKind::Desktop, origin, 100, 16);
        assert_eq!(meters.level(), 0.0);
        assert_eq!(meters.last_callback_offset(), None);

        desktop.push_at(&[16384; 16], origin + Duration::from_millis(50));
        desktop.push_at(&[0; 16], origin + Duration::from_millis(150));

        assert_eq!(meters.level(), 0.0);
        let diag = meters.snapshot(Some(StreamFormat::new(48000, 2)));
        assert_eq!(diag.native_format, Some(StreamFormat::new(48000, 2)));
        assert_eq!(diag.first_callback_offset_secs, Some(0.05));
        assert_eq!(diag.first_capture_offset_secs, Some(0.15));
        assert_eq!(diag.samples_captured, 16);
        assert_eq!(
            meters.last_callback_offset(),
            Some(Duration::from_millis(150))
        );
    }

    #[test]
    fn level_reflects_latest_callback() {
        let origin = Instant::now();
        let (mic, _rx, meters) = sink(SourceKind::Mic, origin, 0, 16);
        mic.push_at(&[16384; 16], origin);
        assert!((meters.level() - 0.5).abs() < 1e-6);
        meters.reset_level();
        assert_eq!(meters.level(), 0.0);
    }
}
