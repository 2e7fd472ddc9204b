use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::constants::CAPTURE_DELTA_WARN_SECS;
use crate::models::audio_models::{AudioLevels, CaptureDiagnostics, SourceKind, StreamFormat};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::RecordingState;
use crate::session::collector::Collector;
use crate::session::frame_sink::{FrameSink, SourceMeters};
use crate::session::pipeline::{self, CapturedStream};
use crate::session::ticker::Ticker;
use crate::session::watchdog::spawn_watchdog;
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_source::CaptureSource;

/// Mutable session state shared with the watchdog and status threads.
struct SessionState {
    state: RecordingState,
    levels: AudioLevels,
    last_warning: Option<String>,
    mic_format: Option<StreamFormat>,
    desktop_format: Option<StreamFormat>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            state: RecordingState::Idle,
            levels: AudioLevels::default(),
            last_warning: None,
            mic_format: None,
            desktop_format: None,
        }
    }
}

/// State updates plus delegate notification, usable from any thread.
#[derive(Clone)]
struct Reporter {
    session_state: Arc<Mutex<SessionState>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
}

impl Reporter {
    fn set_state(&self, new_state: RecordingState) {
        self.session_state.lock().state = new_state.clone();
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&new_state);
        }
    }

    fn warn(&self, warning: CaptureError) {
        log::warn!("{}", warning);
        self.session_state.lock().last_warning = Some(warning.to_string());
        if let Some(ref delegate) = self.delegate {
            delegate.on_warning(&warning);
        }
    }

    fn fail(&self, error: CaptureError) {
        log::error!("Recording failed: {}", error);
        self.set_state(RecordingState::Failed(error.clone()));
        if let Some(ref delegate) = self.delegate {
            delegate.on_error(&error);
        }
    }
}

/// Everything that exists only between `start()` and `stop()`.
struct ActiveCapture {
    recording_start: Instant,
    mic: Collector,
    desktop: Option<Collector>,
    watchdog: Ticker,
    status: Ticker,
}

/// Records a microphone and an optional desktop loopback, then mixes them.
///
/// ```text
/// [mic source]     → FrameSink → queue → [collector] ─┐
///                                                     ├→ stop() → pipeline::mix_down → RecordingResult
/// [desktop source] → FrameSink → queue → [collector] ─┘
/// ```
///
/// Both sinks share one `recording_start` origin, fixed before either
/// stream starts, so preroll removes the same wall-clock window from each.
/// State transitions: `idle → recording → stopping → mixed / failed`.
pub struct RecordingSession<M: CaptureSource, D: CaptureSource> {
    config: CaptureConfiguration,
    mic: M,
    desktop: Option<D>,
    session_state: Arc<Mutex<SessionState>>,
    delegate: Option<Arc<dyn CaptureDelegate>>,
    accepting: Arc<AtomicBool>,
    mic_meters: Arc<SourceMeters>,
    desktop_meters: Arc<SourceMeters>,
    active: Option<ActiveCapture>,
}

impl<M: CaptureSource, D: CaptureSource> RecordingSession<M, D> {
    /// Validate `config` and build an idle session.
    pub fn new(
        config: CaptureConfiguration,
        mic: M,
        desktop: Option<D>,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            config,
            mic,
            desktop,
            session_state: Arc::new(Mutex::new(SessionState::new())),
            delegate: None,
            accepting: Arc::new(AtomicBool::new(false)),
            mic_meters: Arc::new(SourceMeters::new()),
            desktop_meters: Arc::new(SourceMeters::new()),
            active: None,
        })
    }

    /// Register the delegate. Takes effect for threads spawned by the next `start()`.
    pub fn set_delegate(&mut self, delegate: Arc<dyn CaptureDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn state(&self) -> RecordingState {
        self.session_state.lock().state.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.session_state.lock().state.is_recording()
    }

    /// Levels as last sampled by the status thread.
    pub fn current_levels(&self) -> AudioLevels {
        self.session_state.lock().levels
    }

    /// Text of the most recent stall or fallback notice.
    pub fn last_non_fatal_warning(&self) -> Option<String> {
        self.session_state.lock().last_warning.clone()
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        let s = self.session_state.lock();
        CaptureDiagnostics {
            preroll_secs: self.config.preroll_secs,
            mic: self.mic_meters.snapshot(s.mic_format),
            desktop: self.desktop_meters.snapshot(s.desktop_format),
        }
    }

    /// Open the sources and begin recording. Transitions: idle → recording.
    ///
    /// A microphone failure moves the session to failed. A desktop failure is
    /// a warning and the session records the microphone alone.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        {
            let s = self.session_state.lock();
            if !s.state.is_idle() {
                return Err(CaptureError::InvalidState(format!(
                    "cannot start from {}",
                    s.state.name()
                )));
            }
        }

        let reporter = self.reporter();

        let mic_format = match self.mic.open(&self.config) {
            Ok(format) => format,
            Err(e) => {
                reporter.fail(e.clone());
                return Err(e);
            }
        };
        log::info!(
            "Microphone '{}' opened at {} Hz, {} ch",
            self.mic.device_info().name,
            mic_format.sample_rate,
            mic_format.channels
        );
        if let Some(notice) = self.mic.open_notice() {
            reporter.warn(notice);
        }

        let desktop_format = self.open_desktop(&reporter);

        match self.start_streams(&reporter, mic_format, desktop_format) {
            Ok(active) => {
                self.active = Some(active);
                Ok(())
            }
            Err(e) => {
                self.accepting.store(false, Ordering::Release);
                self.stop_sources();
                reporter.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Stop recording and mix. Transitions: recording → stopping → mixed / failed.
    ///
    /// Returns `InvalidState` without side effects unless recording.
    pub fn stop(&mut self) -> Result<RecordingResult, CaptureError> {
        {
            let s = self.session_state.lock();
            if !s.state.is_recording() {
                return Err(CaptureError::InvalidState(format!(
                    "cannot stop from {}",
                    s.state.name()
                )));
            }
        }

        let reporter = self.reporter();
        self.accepting.store(false, Ordering::Release);
        reporter.set_state(RecordingState::Stopping);

        let Some(active) = self.active.take() else {
            let error = CaptureError::InvalidState("no active capture".into());
            reporter.fail(error.clone());
            return Err(error);
        };
        let ActiveCapture {
            recording_start,
            mic,
            desktop,
            watchdog,
            status,
        } = active;

        status.stop();
        watchdog.stop();
        self.stop_sources();
        self.mic_meters.reset_level();
        self.desktop_meters.reset_level();
        self.session_state.lock().levels = AudioLevels::default();

        log::info!(
            "Recording stopped after {:.2}s, mixing",
            recording_start.elapsed().as_secs_f64()
        );

        match self.finish_capture(&reporter, mic, desktop) {
            Ok(result) => {
                let summary = result.summary();
                reporter.set_state(RecordingState::Mixed(summary.clone()));
                if let Some(ref delegate) = self.delegate {
                    delegate.on_recording_finished(&summary);
                }
                Ok(result)
            }
            Err(e) => {
                reporter.fail(e.clone());
                Err(e)
            }
        }
    }

    // --- Internal helpers ---

    fn reporter(&self) -> Reporter {
        Reporter {
            session_state: Arc::clone(&self.session_state),
            delegate: self.delegate.clone(),
        }
    }

    fn open_desktop(&mut self, reporter: &Reporter) -> Option<StreamFormat> {
        if !self.config.enable_desktop_capture {
            log::info!("Desktop capture disabled, recording microphone only");
            return None;
        }
        let Some(desktop) = self.desktop.as_mut() else {
            reporter.warn(CaptureError::DeviceUnavailable(
                "no desktop source, recording microphone only".into(),
            ));
            return None;
        };
        match desktop.open(&self.config) {
            Ok(format) => {
                log::info!(
                    "Desktop '{}' opened at {} Hz, {} ch",
                    desktop.device_info().name,
                    format.sample_rate,
                    format.channels
                );
                if let Some(notice) = desktop.open_notice() {
                    reporter.warn(notice);
                }
                Some(format)
            }
            Err(e) => {
                reporter.warn(e);
                None
            }
        }
    }

    fn start_streams(
        &mut self,
        reporter: &Reporter,
        mic_format: StreamFormat,
        desktop_format: Option<StreamFormat>,
    ) -> Result<ActiveCapture, CaptureError> {
        // The shared origin is fixed before any stream starts.
        let recording_start = Instant::now();
        let preroll = self.config.preroll();
        let capacity = self.config.frame_queue_capacity;
        {
            let mut s = self.session_state.lock();
            s.mic_format = Some(mic_format);
            s.desktop_format = desktop_format;
        }

        let (mic_sink, mic_rx) = FrameSink::new(
            SourceKind::Mic,
            recording_start,
            preroll,
            capacity,
            Arc::clone(&self.accepting),
            Arc::clone(&self.mic_meters),
        );
        let mic_collector = Collector::spawn(&mic_sink, mic_rx)?;

        let desktop_pipe = match desktop_format {
            Some(_) => {
                let (sink, rx) = FrameSink::new(
                    SourceKind::Desktop,
                    recording_start,
                    preroll,
                    capacity,
                    Arc::clone(&self.accepting),
                    Arc::clone(&self.desktop_meters),
                );
                let collector = Collector::spawn(&sink, rx)?;
                Some((sink, collector))
            }
            None => None,
        };

        self.accepting.store(true, Ordering::Release);
        self.mic.start(mic_sink)?;

        let desktop_collector = match (desktop_pipe, self.desktop.as_mut()) {
            (Some((sink, collector)), Some(desktop)) => match desktop.start(sink) {
                Ok(()) => Some(collector),
                Err(e) => {
                    let _ = desktop.stop();
                    self.session_state.lock().desktop_format = None;
                    reporter.warn(e);
                    None
                }
            },
            _ => None,
        };

        reporter.set_state(RecordingState::Recording { duration_secs: 0.0 });
        log::info!(
            "Recording started ({}, preroll {:.1}s)",
            if desktop_collector.is_some() {
                "microphone + desktop"
            } else {
                "microphone only"
            },
            preroll.as_secs_f64()
        );

        let watchdog = {
            let mic_meters = Arc::clone(&self.mic_meters);
            let desktop_meters = Arc::clone(&self.desktop_meters);
            let reporter = reporter.clone();
            spawn_watchdog(
                self.config.watchdog_interval(),
                self.config.stall_threshold(),
                move || {
                    let latest = [
                        mic_meters.last_callback_offset(),
                        desktop_meters.last_callback_offset(),
                    ]
                    .into_iter()
                    .flatten()
                    .max()
                    .unwrap_or(Duration::ZERO);
                    recording_start.elapsed().saturating_sub(latest)
                },
                move |warning| reporter.warn(warning),
            )?
        };

        let status = self.spawn_status_ticker(recording_start)?;

        Ok(ActiveCapture {
            recording_start,
            mic: mic_collector,
            desktop: desktop_collector,
            watchdog,
            status,
        })
    }

    /// Samples levels and duration at the level update interval.
    fn spawn_status_ticker(&self, recording_start: Instant) -> Result<Ticker, CaptureError> {
        let session_state = Arc::clone(&self.session_state);
        let mic_meters = Arc::clone(&self.mic_meters);
        let desktop_meters = Arc::clone(&self.desktop_meters);
        let delegate = self.delegate.clone();

        Ticker::spawn(
            "meetsync-status",
            self.config.level_update_interval(),
            move || {
                let levels = AudioLevels {
                    mic_level: mic_meters.level(),
                    desktop_level: desktop_meters.level(),
                };
                {
                    let mut s = session_state.lock();
                    if !s.state.is_recording() {
                        return;
                    }
                    s.levels = levels;
                    s.state = RecordingState::Recording {
                        duration_secs: recording_start.elapsed().as_secs_f64(),
                    };
                }
                if let Some(ref d) = delegate {
                    d.on_levels_updated(&levels);
                }
            },
        )
    }

    fn stop_sources(&mut self) {
        if let Err(e) = self.mic.stop() {
            log::warn!("Microphone did not stop cleanly: {}", e);
        }
        if let Some(desktop) = self.desktop.as_mut() {
            if let Err(e) = desktop.stop() {
                log::warn!("Desktop did not stop cleanly: {}", e);
            }
        }
    }

    fn finish_capture(
        &mut self,
        reporter: &Reporter,
        mic: Collector,
        desktop: Option<Collector>,
    ) -> Result<RecordingResult, CaptureError> {
        let mic_buffer = mic.finish()?;
        let desktop_buffer = match desktop.map(Collector::finish) {
            Some(Ok(buffer)) => Some(buffer),
            Some(Err(e)) => {
                reporter.warn(e);
                None
            }
            None => None,
        };

        let diagnostics = self.diagnostics();
        log_diagnostics(&diagnostics);

        let (mic_format, desktop_format) = {
            let s = self.session_state.lock();
            (s.mic_format, s.desktop_format)
        };
        let mic_format = mic_format
            .ok_or_else(|| CaptureError::InvalidState("microphone format unknown".into()))?;
        let desktop_stream = desktop_buffer
            .zip(desktop_format)
            .map(|(buffer, format)| CapturedStream::new(format, buffer));

        let mix = pipeline::mix_down(
            &self.config,
            CapturedStream::new(mic_format, mic_buffer),
            desktop_stream,
        )?;

        Ok(RecordingResult::new(
            mix.buffer,
            mix.mode,
            mix.timeline,
            diagnostics,
        ))
    }
}

impl<M: CaptureSource, D: CaptureSource> Drop for RecordingSession<M, D> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            log::warn!("Recording session dropped while recording, discarding audio");
            self.accepting.store(false, Ordering::Release);
            active.status.stop();
            active.watchdog.stop();
            self.stop_sources();
        }
    }
}

fn log_diagnostics(diagnostics: &CaptureDiagnostics) {
    for (label, source) in [("Mic", &diagnostics.mic), ("Desktop", &diagnostics.desktop)] {
        if source.callback_count == 0 {
            continue;
        }
        log::info!(
            "{}: {} callbacks, {} frames kept, {} preroll, first callback {:?}s, first capture {:?}s",
            label,
            source.callback_count,
            source.frames_captured,
            source.preroll_frames_discarded,
            source.first_callback_offset_secs,
            source.first_capture_offset_secs
        );
        if source.overflow_frames_dropped > 0 {
            log::warn!(
                "{}: {} frames dropped because the collector fell behind",
                label,
                source.overflow_frames_dropped
            );
        }
    }

    if let Some(delta) = diagnostics.capture_start_delta_secs() {
        if delta.abs() > CAPTURE_DELTA_WARN_SECS {
            log::warn!(
                "Capture start delta between desktop and mic is {:.3}s",
                delta
            );
        } else {
            log::info!("Capture start delta: {:.3}s", delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::models::audio_models::AudioSource;
    use crate::models::recording_result::{MixMode, RecordingSummary};

    /// Frames a fake pushes as soon as it is started, at explicit offsets
    /// from the session origin.
    type Script = Vec<(Duration, Vec<i16>)>;

    struct FakeSource {
        kind: SourceKind,
        format: StreamFormat,
        open_error: Option<CaptureError>,
        script: Script,
        opened: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
        sink: Option<FrameSink>,
        notice: Option<CaptureError>,
    }

    impl FakeSource {
        fn new(kind: SourceKind, format: StreamFormat, script: Script) -> Self {
            Self {
                kind,
                format,
                open_error: None,
                script,
                opened: Arc::new(AtomicBool::new(false)),
                stopped: Arc::new(AtomicBool::new(false)),
                sink: None,
                notice: None,
            }
        }

        fn failing(kind: SourceKind, error: CaptureError) -> Self {
            let mut source = Self::new(kind, StreamFormat::new(48000, 2), Vec::new());
            source.open_error = Some(error);
            source
        }
    }

    impl CaptureSource for FakeSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn device_info(&self) -> AudioSource {
            AudioSource {
                id: format!("fake-{}", self.kind.label()),
                name: format!("Fake {}", self.kind.label()),
                kind: self.kind,
                is_default: true,
                default_sample_rate: self.format.sample_rate,
                max_input_channels: self.format.channels,
            }
        }

        fn open(&mut self, _config: &CaptureConfiguration) -> Result<StreamFormat, CaptureError> {
            self.opened.store(true, Ordering::SeqCst);
            match self.open_error.clone() {
                Some(e) => Err(e),
                None => Ok(self.format),
            }
        }

        fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
            for (offset, samples) in &self.script {
                sink.push_at(samples, sink.origin() + *offset);
            }
            self.sink = Some(sink);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), CaptureError> {
            self.sink = None;
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn open_notice(&self) -> Option<CaptureError> {
            self.notice.clone()
        }
    }

    #[derive(Default)]
    struct EventLog {
        events: parking_lot::Mutex<Vec<String>>,
    }

    impl EventLog {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl CaptureDelegate for EventLog {
        fn on_state_changed(&self, state: &RecordingState) {
            self.events.lock().push(format!("state:{}", state.name()));
        }
        fn on_levels_updated(&self, _levels: &AudioLevels) {}
        fn on_warning(&self, _warning: &CaptureError) {
            self.events.lock().push("warning".into());
        }
        fn on_error(&self, error: &CaptureError) {
            self.events.lock().push(format!("error:{}", error));
        }
        fn on_recording_finished(&self, summary: &RecordingSummary) {
            self.events
                .lock()
                .push(format!("finished:{}", summary.sample_count));
        }
    }

    fn every_10ms(range: std::ops::Range<u64>, skip: std::ops::Range<u64>, len: usize, value: i16) -> Script {
        range
            .filter(|i| !skip.contains(i))
            .map(|i| (Duration::from_millis(10 * i), vec![value; len]))
            .collect()
    }

    fn config() -> CaptureConfiguration {
        CaptureConfiguration {
            preroll_secs: 0.5,
            ..CaptureConfiguration::default()
        }
    }

    #[test]
    fn records_and_mixes_both_sources() {
        // 2.5 s of 16 kHz mono mic; the first 0.5 s is preroll.
        let mic = FakeSource::new(
            SourceKind::Mic,
            StreamFormat::new(16000, 1),
            every_10ms(0..250, 0..0, 160, 0),
        );
        // Desktop from 0.4 s, silent (no callbacks) between 1.3 s and 1.8 s.
        let desktop = FakeSource::new(
            SourceKind::Desktop,
            StreamFormat::new(48000, 2),
            every_10ms(40..250, 130..180, 960, 3000),
        );

        let log = Arc::new(EventLog::default());
        let mut session = RecordingSession::new(config(), mic, Some(desktop)).unwrap();
        session.set_delegate(log.clone());
        session.start().unwrap();
        assert!(session.is_recording());

        let result = session.stop().unwrap();
        assert_eq!(result.mode, MixMode::Dual);
        assert_eq!(result.buffer.sample_rate, 48000);
        assert_eq!(result.buffer.channels, 2);
        assert_eq!(result.buffer.sample_count(), 2 * 48000 * 2);
        assert!((result.duration_secs - 2.0).abs() < 1e-9);
        assert_eq!(result.checksum, result.buffer.checksum());

        assert_eq!(result.timeline.gaps.len(), 1);
        assert!((result.timeline.gaps[0].offset_secs - 0.8).abs() < 1e-6);
        assert!((result.timeline.gaps[0].duration_secs - 0.5).abs() < 1e-6);

        let diag = &result.diagnostics;
        assert_eq!(diag.mic.preroll_frames_discarded, 50);
        assert_eq!(diag.mic.frames_captured, 200);
        assert_eq!(diag.desktop.preroll_frames_discarded, 10);
        assert_eq!(diag.mic.first_capture_offset_secs, Some(0.5));
        assert_eq!(diag.capture_start_delta_secs(), Some(0.0));

        assert!(matches!(session.state(), RecordingState::Mixed(_)));
        assert_eq!(
            log.events(),
            vec![
                "state:recording".to_string(),
                "state:stopping".to_string(),
                "state:mixed".to_string(),
                format!("finished:{}", 2 * 48000 * 2),
            ]
        );
    }

    #[test]
    fn unrepresentable_preroll_is_rejected_at_construction() {
        let mic = FakeSource::new(SourceKind::Mic, StreamFormat::new(48000, 1), Vec::new());
        let config = CaptureConfiguration {
            preroll_secs: 1e20,
            ..config()
        };
        let result = RecordingSession::<FakeSource, FakeSource>::new(config, mic, None);
        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
    }

    #[test]
    fn mic_open_failure_fails_start() {
        let mic = FakeSource::failing(
            SourceKind::Mic,
            CaptureError::DeviceUnavailable("no microphone".into()),
        );
        let mut session =
            RecordingSession::<FakeSource, FakeSource>::new(config(), mic, None).unwrap();

        let err = session.start().unwrap_err();
        assert!(matches!(err, CaptureError::DeviceUnavailable(_)));
        assert_eq!(session.state(), RecordingState::Failed(err));
        assert!(matches!(
            session.stop(),
            Err(CaptureError::InvalidState(_))
        ));
        assert!(matches!(
            session.start(),
            Err(CaptureError::InvalidState(_))
        ));
    }

    #[test]
    fn desktop_failure_falls_back_to_mic_only() {
        let mic = FakeSource::new(
            SourceKind::Mic,
            StreamFormat::new(48000, 1),
            every_10ms(50..150, 0..0, 480, 0),
        );
        let desktop = FakeSource::failing(
            SourceKind::Desktop,
            CaptureError::DeviceUnavailable("loopback not supported".into()),
        );
        let mut session = RecordingSession::new(config(), mic, Some(desktop)).unwrap();
        session.start().unwrap();

        let warning = session.last_non_fatal_warning().unwrap();
        assert!(warning.contains("loopback not supported"));

        let result = session.stop().unwrap();
        assert_eq!(result.mode, MixMode::MicOnly);
        assert_eq!(result.buffer.sample_count(), 48000 * 2);
    }

    #[test]
    fn rate_fallback_is_a_warning() {
        let mut mic = FakeSource::new(
            SourceKind::Mic,
            StreamFormat::new(44100, 1),
            every_10ms(50..150, 0..0, 441, 0),
        );
        mic.notice = Some(CaptureError::SampleRateFallback {
            device: "Fake mic".into(),
            requested: 48000,
            actual: 44100,
        });
        let config = CaptureConfiguration {
            enable_desktop_capture: false,
            ..config()
        };

        let log = Arc::new(EventLog::default());
        let mut session = RecordingSession::<FakeSource, FakeSource>::new(config, mic, None).unwrap();
        session.set_delegate(log.clone());
        session.start().unwrap();

        let warning = session.last_non_fatal_warning().unwrap();
        assert!(warning.contains("recording at 44100 Hz"));
        assert_eq!(log.events()[0], "warning");

        let result = session.stop().unwrap();
        assert_eq!(result.mode, MixMode::MicOnly);
        assert_eq!(result.buffer.sample_count(), 48000 * 2);
    }

    #[test]
    fn disabled_desktop_is_never_opened() {
        let mic = FakeSource::new(
            SourceKind::Mic,
            StreamFormat::new(48000, 2),
            every_10ms(50..60, 0..0, 960, 0),
        );
        let desktop = FakeSource::new(SourceKind::Desktop, StreamFormat::new(48000, 2), Vec::new());
        let opened = Arc::clone(&desktop.opened);

        let config = CaptureConfiguration {
            enable_desktop_capture: false,
            ..config()
        };
        let mut session = RecordingSession::new(config, mic, Some(desktop)).unwrap();
        session.start().unwrap();
        let result = session.stop().unwrap();

        assert!(!opened.load(Ordering::SeqCst));
        assert_eq!(result.mode, MixMode::MicOnly);
        assert!(session.last_non_fatal_warning().is_none());
    }

    #[test]
    fn empty_mic_fails_with_no_audio_captured() {
        // Every mic frame falls inside the preroll window.
        let mic = FakeSource::new(
            SourceKind::Mic,
            StreamFormat::new(48000, 1),
            every_10ms(0..40, 0..0, 480, 100),
        );
        let log = Arc::new(EventLog::default());
        let mut session =
            RecordingSession::<FakeSource, FakeSource>::new(config(), mic, None).unwrap();
        session.set_delegate(log.clone());
        session.start().unwrap();

        let err = session.stop().unwrap_err();
        assert_eq!(err, CaptureError::NoAudioCaptured);
        assert_eq!(session.state(), RecordingState::Failed(CaptureError::NoAudioCaptured));
        assert!(log
            .events()
            .contains(&format!("error:{}", CaptureError::NoAudioCaptured)));
    }

    #[test]
    fn stop_outside_recording_changes_nothing() {
        let mic = FakeSource::new(SourceKind::Mic, StreamFormat::new(48000, 1), Vec::new());
        let mut session =
            RecordingSession::<FakeSource, FakeSource>::new(config(), mic, None).unwrap();
        assert!(matches!(
            session.stop(),
            Err(CaptureError::InvalidState(_))
        ));
        assert_eq!(session.state(), RecordingState::Idle);

        session.start().unwrap();
        assert!(matches!(
            session.start(),
            Err(CaptureError::InvalidState(_))
        ));
        assert!(session.is_recording());
    }

    #[test]
    fn invalid_configuration_is_rejected_up_front() {
        let mic = FakeSource::new(SourceKind::Mic, StreamFormat::new(48000, 1), Vec::new());
        let config = CaptureConfiguration {
            target_channels: 0,
            ..CaptureConfiguration::default()
        };
        let result = RecordingSession::<FakeSource, FakeSource>::new(config, mic, None);
        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
    }

    #[test]
    fn stall_is_reported_once_without_stopping() {
        let mic = FakeSource::new(SourceKind::Mic, StreamFormat::new(48000, 1), Vec::new());
        let config = CaptureConfiguration {
            watchdog_interval_ms: 10,
            stall_threshold_ms: 50,
            enable_desktop_capture: false,
            ..config()
        };
        let log = Arc::new(EventLog::default());
        let mut session =
            RecordingSession::<FakeSource, FakeSource>::new(config, mic, None).unwrap();
        session.set_delegate(log.clone());
        session.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while session.last_non_fatal_warning().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(100));

        assert!(session.last_non_fatal_warning().unwrap().contains("stalled"));
        assert!(session.is_recording());
        let warnings = log.events().iter().filter(|e| *e == "warning").count();
        assert_eq!(warnings, 1);
    }

    #[test]
    fn levels_are_sampled_while_recording() {
        let mic = FakeSource::new(
            SourceKind::Mic,
            StreamFormat::new(48000, 1),
            every_10ms(60..61, 0..0, 480, 16384),
        );
        let config = CaptureConfiguration {
            level_update_interval_ms: 10,
            ..config()
        };
        let mut session =
            RecordingSession::<FakeSource, FakeSource>::new(config, mic, None).unwrap();
        session.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while session.current_levels().mic_level == 0.0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!((session.current_levels().mic_level - 0.5).abs() < 1e-6);
        assert_eq!(session.current_levels().desktop_level, 0.0);
        assert!(session.state().duration().unwrap() > 0.0);

        session.stop().unwrap();
        assert_eq!(session.current_levels(), AudioLevels::default());
    }

    #[test]
    fn dropping_a_recording_session_stops_sources() {
        let mic = FakeSource::new(SourceKind::Mic, StreamFormat::new(48000, 1), Vec::new());
        let stopped = Arc::clone(&mic.stopped);
        let mut session =
            RecordingSession::<FakeSource, FakeSource>::new(config(), mic, None).unwrap();
        session.start().unwrap();
        drop(session);
        assert!(stopped.load(Ordering::SeqCst));
    }
}
