//! Band-limited sample-rate conversion via `rubato`'s windowed-sinc resampler.
//!
//! Audio is fed in fixed-size chunks, the final partial chunk through
//! `process_partial`, and the filter is flushed with silence until the
//! delayed tail is out. The filter's delay is measured with an impulse and
//! removed, so the output lines up with the input to within one frame and
//! holds `round(frames * ratio)` frames.

use rubato::{
    Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
    WindowFunction,
};

use crate::models::error::CaptureError;
use crate::processing::channel_layout::{deinterleave, interleave};
use crate::processing::mixer::{from_normalized, to_normalized};

const CHUNK_FRAMES: usize = 1024;

/// Upper bound on flush iterations; the filter tail is far shorter.
const MAX_FLUSH_CHUNKS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resampler {
    pub from_rate: u32,
    pub to_rate: u32,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self { from_rate, to_rate }
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    pub fn ratio(&self) -> f64 {
        self.to_rate as f64 / self.from_rate as f64
    }

    /// Number of output frames produced for `input_frames` input frames.
    pub fn output_frames(&self, input_frames: usize) -> usize {
        (input_frames as f64 * self.ratio()).round() as usize
    }

    /// Resample interleaved 16-bit audio with `channels` channels.
    pub fn resample_interleaved(
        &self,
        samples: &[i16],
        channels: u16,
    ) -> Result<Vec<i16>, CaptureError> {
        if self.is_passthrough() || samples.is_empty() {
            return Ok(samples.to_vec());
        }

        let normalized: Vec<f32> = samples.iter().copied().map(to_normalized).collect();
        let planar = deinterleave(&normalized, channels.max(1) as usize);
        let resampled = self.resample_planar(&planar)?;
        Ok(interleave(&resampled)
            .into_iter()
            .map(|s| from_normalized(s.clamp(-1.0, 1.0)))
            .collect())
    }

    /// Resample per-channel normalized audio. All channels must be the same length.
    pub fn resample_planar(&self, planar: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, CaptureError> {
        if self.from_rate == 0 || self.to_rate == 0 {
            return Err(CaptureError::ResampleFailed(format!(
                "invalid rates {} → {}",
                self.from_rate, self.to_rate
            )));
        }
        let frame_count = planar.first().map(Vec::len).unwrap_or(0);
        if self.is_passthrough() || planar.is_empty() || frame_count == 0 {
            return Ok(planar.to_vec());
        }
        if planar.iter().any(|channel| channel.len() != frame_count) {
            return Err(CaptureError::ResampleFailed(
                "channels have different lengths".into(),
            ));
        }

        let channels = planar.len();
        let expected = self.output_frames(frame_count);
        let lead = self.measured_delay()?;

        let mut resampler = self.build(channels)?;
        let mut output = feed(&mut resampler, planar, expected + lead.max(0) as usize)?;

        for channel in output.iter_mut() {
            if lead > 0 {
                channel.drain(..(lead as usize).min(channel.len()));
            } else if lead < 0 {
                channel.splice(0..0, std::iter::repeat(0.0).take(lead.unsigned_abs()));
            }
            channel.resize(expected, 0.0);
        }

        log::debug!(
            "Resampled {} frames → {} frames ({} Hz → {} Hz, {} ch)",
            frame_count,
            expected,
            self.from_rate,
            self.to_rate,
            channels
        );

        Ok(output)
    }

    fn build(&self, channels: usize) -> Result<SincFixedIn<f32>, CaptureError> {
        SincFixedIn::<f32>::new(
            self.ratio(),
            1.0,
            self.interpolation_parameters(),
            CHUNK_FRAMES,
            channels,
        )
        .map_err(|e| CaptureError::ResampleFailed(format!("resampler init failed: {}", e)))
    }

    /// Frames by which an impulse comes out later than `position * ratio`,
    /// measured on a fresh filter with the same parameters.
    fn measured_delay(&self) -> Result<isize, CaptureError> {
        let impulse_at = CHUNK_FRAMES / 2;
        let mut input = vec![0.0f32; CHUNK_FRAMES];
        input[impulse_at] = 1.0;

        let mut resampler = self.build(1)?;
        let nominal = resampler.output_delay();
        let response = feed(
            &mut resampler,
            &[input],
            self.output_frames(CHUNK_FRAMES) + 2 * nominal,
        )?;

        let peak = response[0]
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |(best, max), (i, &s)| {
                if s.abs() > max {
                    (i, s.abs())
                } else {
                    (best, max)
                }
            })
            .0;
        let target = (impulse_at as f64 * self.ratio()).round() as isize;
        Ok(peak as isize - target)
    }

    /// Longer filters for larger conversion ratios, where aliasing and
    /// imaging are most audible.
    fn interpolation_parameters(&self) -> SincInterpolationParameters {
        let ratio = self.ratio();
        let (sinc_len, interpolation, oversampling_factor) = if ratio >= 2.0 || ratio <= 0.5 {
            (256, SincInterpolationType::Cubic, 256)
        } else if ratio >= 1.5 {
            (192, SincInterpolationType::Cubic, 192)
        } else {
            (128, SincInterpolationType::Linear, 128)
        };

        SincInterpolationParameters {
            sinc_len,
            f_cutoff: 0.95,
            interpolation,
            oversampling_factor,
            window: WindowFunction::BlackmanHarris2,
        }
    }
}

/// Run all of `planar` through `resampler`, then flush with silence until
/// at least `min_output` frames per channel are out.
fn feed(
    resampler: &mut SincFixedIn<f32>,
    planar: &[Vec<f32>],
    min_output: usize,
) -> Result<Vec<Vec<f32>>, CaptureError> {
    let frame_count = planar.first().map(Vec::len).unwrap_or(0);
    let mut output: Vec<Vec<f32>> = planar
        .iter()
        .map(|_| Vec::with_capacity(min_output + CHUNK_FRAMES))
        .collect();

    let mut position = 0;
    while frame_count - position >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar
            .iter()
            .map(|channel| &channel[position..position + needed])
            .collect();
        let processed = resampler
            .process(&chunk[..], None)
            .map_err(|e| CaptureError::ResampleFailed(e.to_string()))?;
        append(&mut output, processed);
        position += needed;
    }

    if position < frame_count {
        let chunk: Vec<&[f32]> = planar.iter().map(|channel| &channel[position..]).collect();
        let processed = resampler
            .process_partial(Some(&chunk[..]), None)
            .map_err(|e| CaptureError::ResampleFailed(e.to_string()))?;
        append(&mut output, processed);
    }

    let mut flushes = 0;
    while output[0].len() < min_output && flushes < MAX_FLUSH_CHUNKS {
        let processed = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| CaptureError::ResampleFailed(e.to_string()))?;
        append(&mut output, processed);
        flushes += 1;
    }

    Ok(output)
}

fn append(output: &mut [Vec<f32>], processed: Vec<Vec<f32>>) {
    for (channel, samples) in output.iter_mut().zip(processed) {
        channel.extend_from_slice(&samples);
    }
}
