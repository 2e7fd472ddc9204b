//! Post-processing run once at stop: timeline reconstruction, resampling,
//! channel conversion, mic enhancement and the final mix.
//!
//! ```text
//! desktop frames → [TimelineReconstructor] → [Resampler] → [conform] ─────────────┐
//!                                                                                 ├→ [align] → [Mixer]
//! mic frames ────────────────────────────→ [Resampler] → [Enhancer] → [conform] ──┘
//! ```

use crate::models::audio_models::{CaptureBuffer, StreamFormat};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::{MixMode, MixedAudioBuffer};
use crate::processing::channel_layout::conform_channels;
use crate::processing::enhancer::ChannelEnhancer;
use crate::processing::mixer::{align_lengths, Mixer};
use crate::processing::resampler::Resampler;
use crate::processing::timeline::{TimelineReconstructor, TimelineReport};

/// A frozen capture buffer with the format it was recorded in.
#[derive(Debug, Clone)]
pub struct CapturedStream {
    pub format: StreamFormat,
    pub buffer: CaptureBuffer,
}

impl CapturedStream {
    pub fn new(format: StreamFormat, buffer: CaptureBuffer) -> Self {
        Self { format, buffer }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MixDown {
    pub buffer: MixedAudioBuffer,
    pub mode: MixMode,
    pub timeline: TimelineReport,
}

/// Produce the final buffer at the configured output format.
///
/// Fails with `NoAudioCaptured` when the mic buffer is empty and with
/// `AlignmentFailure` when both tracks are empty after resampling. A missing
/// or empty desktop stream yields the enhanced mic alone.
pub fn mix_down(
    config: &CaptureConfiguration,
    mic: CapturedStream,
    desktop: Option<CapturedStream>,
) -> Result<MixDown, CaptureError> {
    if mic.buffer.total_samples() == 0 {
        log::error!("Microphone buffer is empty");
        return Err(CaptureError::NoAudioCaptured);
    }

    let target_rate = config.target_sample_rate;
    let target_channels = config.target_channels;

    let mic_raw = mic.buffer.to_samples();
    let mic_duration = mic.format.duration_secs(mic_raw.len());
    log::info!(
        "Mic: {} samples, {:.2}s at {} Hz / {} ch",
        mic_raw.len(),
        mic_duration,
        mic.format.sample_rate,
        mic.format.channels
    );

    let mut timeline = TimelineReport::default();
    let desktop_track = match desktop {
        Some(desktop) if !desktop.buffer.is_empty() => {
            let reconstruction = TimelineReconstructor::new(desktop.format).reconstruct(
                desktop.buffer.frames(),
                mic.buffer.first_captured_at(),
                mic_duration,
            );
            timeline = reconstruction.report;
            Some(prepare_track(
                reconstruction.samples,
                desktop.format,
                target_rate,
                target_channels,
            )?)
        }
        Some(_) => {
            log::warn!("Desktop captured no frames, using microphone only");
            None
        }
        None => None,
    };

    let mic_resampled = Resampler::new(mic.format.sample_rate, target_rate)
        .resample_interleaved(&mic_raw, mic.format.channels)?;
    let mic_enhanced = ChannelEnhancer::new().enhance(&mic_resampled, mic.format.channels);
    let mic_track = conform_channels(mic_enhanced, mic.format.channels, target_channels);

    let Some(desktop_track) = desktop_track else {
        if mic_track.is_empty() {
            return Err(CaptureError::AlignmentFailure);
        }
        let buffer = MixedAudioBuffer::new(mic_track, target_rate, target_channels);
        log::info!("Mic-only output: {:.2}s", buffer.duration_secs());
        return Ok(MixDown {
            buffer,
            mode: MixMode::MicOnly,
            timeline,
        });
    };

    if mic_track.is_empty() && desktop_track.is_empty() {
        log::error!("Both tracks are empty after resampling");
        return Err(CaptureError::AlignmentFailure);
    }

    let (mic_track, desktop_track) = align_lengths(mic_track, desktop_track);
    let mixed = Mixer::from_config(config).mix(&mic_track, &desktop_track);
    let buffer = MixedAudioBuffer::new(mixed, target_rate, target_channels);
    log::info!(
        "Mixed output: {:.2}s, {} samples, {} gaps filled",
        buffer.duration_secs(),
        buffer.sample_count(),
        timeline.gaps.len()
    );

    Ok(MixDown {
        buffer,
        mode: MixMode::Dual,
        timeline,
    })
}

fn prepare_track(
    samples: Vec<i16>,
    format: StreamFormat,
    target_rate: u32,
    target_channels: u16,
) -> Result<Vec<i16>, CaptureError> {
    let resampled =
        Resampler::new(format.sample_rate, target_rate).resample_interleaved(&samples, format.channels)?;
    Ok(conform_channels(resampled, format.channels, target_channels))
}
