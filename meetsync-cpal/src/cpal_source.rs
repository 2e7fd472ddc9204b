//! Microphone and desktop loopback capture over cpal.
//!
//! Captures at the device's native channel count, at the configured target
//! rate when the device accepts it and otherwise at the first rate a trial
//! stream opens with. Every sample format is converted to i16 in the
//! callback before it reaches the [`FrameSink`].

use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};

use meetsync_core::{
    negotiate_sample_rate, rate_fallback_notice, AudioSource, CaptureConfiguration, CaptureError, CaptureSource,
    FrameSink, SourceKind, StreamFormat,
};

use crate::device_enumerator::DeviceEnumerator;
use crate::stream_thread::StreamThread;

/// Parameters fixed by `open` and reused when the stream is built for real.
#[derive(Debug, Clone)]
struct OpenedFormat {
    device_name: String,
    sample_rate: u32,
    channels: u16,
    fixed_buffer: Option<u32>,
    sample_format: SampleFormat,
}

impl OpenedFormat {
    fn stream_config(&self) -> cpal::StreamConfig {
        stream_config(self.channels, self.sample_rate, self.fixed_buffer)
    }
}

/// A cpal input stream feeding one side of a recording session.
pub struct CpalCapture {
    kind: SourceKind,
    device_id: Option<String>,
    info: Option<AudioSource>,
    opened: Option<OpenedFormat>,
    owner: Option<StreamThread>,
    stop_timeout: Duration,
    notice: Option<CaptureError>,
}

impl CpalCapture {
    /// Microphone capture. The device comes from `mic_device_id` at open
    /// time, or the default input.
    pub fn microphone() -> Self {
        Self::new(SourceKind::Mic)
    }

    /// Desktop loopback capture. The device comes from `desktop_device_id`
    /// at open time, or the default output.
    pub fn desktop() -> Self {
        Self::new(SourceKind::Desktop)
    }

    /// Pin the device by name, overriding the configuration.
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            device_id: None,
            info: None,
            opened: None,
            owner: None,
            stop_timeout: CaptureConfiguration::default().stream_stop_timeout(),
            notice: None,
        }
    }

    fn requested_device(&self, config: &CaptureConfiguration) -> Option<String> {
        self.device_id.clone().or_else(|| match self.kind {
            SourceKind::Mic => config.mic_device_id.clone(),
            SourceKind::Desktop => config.desktop_device_id.clone(),
        })
    }
}

impl CaptureSource for CpalCapture {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn device_info(&self) -> AudioSource {
        self.info.clone().unwrap_or_else(|| AudioSource {
            id: self.device_id.clone().unwrap_or_default(),
            name: self
                .device_id
                .clone()
                .unwrap_or_else(|| format!("default {}", self.kind.label())),
            kind: self.kind,
            is_default: self.device_id.is_none(),
            default_sample_rate: 0,
            max_input_channels: 0,
        })
    }

    fn open(&mut self, config: &CaptureConfiguration) -> Result<StreamFormat, CaptureError> {
        if self.owner.is_some() {
            return Err(CaptureError::InvalidState(format!(
                "{} stream is already running",
                self.kind.label()
            )));
        }

        let requested = self.requested_device(config);
        let resolved = DeviceEnumerator::new().resolve(self.kind, requested.as_deref())?;
        let name = resolved.info.name.clone();
        let channels = resolved.default_config.channels();
        let sample_format = resolved.default_config.sample_format();
        let fixed_buffer =
            fixed_buffer_size(config.chunk_size_frames, resolved.default_config.buffer_size());

        let sample_rate = negotiate_sample_rate(
            &name,
            config.target_sample_rate,
            Some(resolved.info.default_sample_rate),
            |rate| {
                let trial = stream_config(channels, rate, fixed_buffer);
                match build_stream(&resolved.device, &trial, sample_format, &name, |_| {}) {
                    Ok(_stream) => true,
                    Err(e) => {
                        log::debug!("{}: trial stream at {} Hz failed: {}", name, rate, e);
                        false
                    }
                }
            },
        )?;

        log::info!(
            "{} device '{}': {} Hz, {} ch, {:?}, buffer {:?}",
            self.kind.label(),
            name,
            sample_rate,
            channels,
            sample_format,
            fixed_buffer
        );

        self.notice = rate_fallback_notice(&name, config.target_sample_rate, sample_rate);
        self.info = Some(resolved.info);
        self.stop_timeout = config.stream_stop_timeout();
        self.opened = Some(OpenedFormat {
            device_name: name,
            sample_rate,
            channels,
            fixed_buffer,
            sample_format,
        });

        Ok(StreamFormat::new(sample_rate, channels))
    }

    fn start(&mut self, sink: FrameSink) -> Result<(), CaptureError> {
        if self.owner.is_some() {
            return Err(CaptureError::InvalidState(format!(
                "{} stream is already running",
                self.kind.label()
            )));
        }
        let opened = self.opened.clone().ok_or_else(|| {
            CaptureError::InvalidState(format!("{} stream started before open", self.kind.label()))
        })?;

        let kind = self.kind;
        let thread_name = format!("meetsync-{}-stream", kind.label());
        let owner = StreamThread::spawn(thread_name, move || {
            let resolved = DeviceEnumerator::new().resolve(kind, Some(&opened.device_name))?;
            let stream = build_stream(
                &resolved.device,
                &opened.stream_config(),
                opened.sample_format,
                kind.label(),
                {
                    let (rate, channels) = (opened.sample_rate, opened.channels);
                    move |samples: &[i16]| {
                        let start =
                            first_sample_instant(Instant::now(), samples.len(), channels, rate);
                        sink.push_at(samples, start);
                    }
                },
            )?;
            stream.play().map_err(|e| {
                CaptureError::StreamError(format!("{}: failed to start stream: {}", kind.label(), e))
            })?;
            log::info!("{} stream started on '{}'", kind.label(), opened.device_name);
            Ok(stream)
        })?;

        self.owner = Some(owner);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(owner) = self.owner.take() {
            owner.stop(self.stop_timeout);
            log::info!("{} stream stopped", self.kind.label());
        }
        Ok(())
    }

    fn open_notice(&self) -> Option<CaptureError> {
        self.notice.clone()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if self.owner.is_some() {
            let _ = self.stop();
        }
    }
}

fn stream_config(channels: u16, sample_rate: u32, fixed_buffer: Option<u32>) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: match fixed_buffer {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        },
    }
}

/// When the first sample of a callback buffer was captured, given that the
/// callback arrived at `arrived` with the buffer just filled.
fn first_sample_instant(
    arrived: Instant,
    sample_count: usize,
    channels: u16,
    rate: u32,
) -> Instant {
    if channels == 0 || rate == 0 {
        return arrived;
    }
    let frames = (sample_count / channels as usize) as u64;
    let span = Duration::from_nanos(frames * 1_000_000_000 / rate as u64);
    arrived.checked_sub(span).unwrap_or(arrived)
}

/// The requested callback size when the device reports a range containing
/// it, otherwise `None` (let the host choose).
fn fixed_buffer_size(requested: u32, supported: &cpal::SupportedBufferSize) -> Option<u32> {
    match supported {
        cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&requested) => {
            Some(requested)
        }
        _ => None,
    }
}

fn build_stream<D>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: SampleFormat,
    label: &str,
    deliver: D,
) -> Result<cpal::Stream, CaptureError>
where
    D: FnMut(&[i16]) + Send + 'static,
{
    match format {
        SampleFormat::I16 => build_typed::<i16, D>(device, config, label, deliver),
        SampleFormat::U16 => build_typed::<u16, D>(device, config, label, deliver),
        SampleFormat::I32 => build_typed::<i32, D>(device, config, label, deliver),
        SampleFormat::F32 => build_typed::<f32, D>(device, config, label, deliver),
        other => Err(CaptureError::ConfigurationFailed(format!(
            "{}: unsupported sample format {:?}",
            label, other
        ))),
    }
}

fn build_typed<T, D>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    label: &str,
    mut deliver: D,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    i16: FromSample<T>,
    D: FnMut(&[i16]) + Send + 'static,
{
    let mut converted = Vec::new();
    let err_label = label.to_string();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                convert_samples(data, &mut converted);
                deliver(&converted);
            },
            move |err| log::error!("{} stream error: {}", err_label, err),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                CaptureError::DeviceUnavailable(format!("{}: device not available", label))
            }
            cpal::BuildStreamError::StreamConfigNotSupported => CaptureError::ConfigurationFailed(
                format!("{}: stream config not supported", label),
            ),
            other => CaptureError::StreamError(format!("{}: {}", label, other)),
        })
}

/// Convert one callback's samples to i16 into `out`, reusing its allocation.
fn convert_samples<T>(data: &[T], out: &mut Vec<i16>)
where
    T: Sample,
    i16: FromSample<T>,
{
    out.clear();
    out.extend(data.iter().map(|&s| i16::from_sample(s)));
}
