//! Rebuilds a continuous desktop track from gap-only loopback callbacks.
//!
//! Loopback capture delivers nothing while the system output is silent, so the
//! raw frame list has holes wherever nothing was playing. Each frame is placed
//! at the sample position implied by its arrival time relative to the
//! reference, with silence inserted in between, and the result is forced to
//! the length of the microphone recording.
//!
//! Positions are computed frame-aligned from integer nanoseconds:
//! `floor(offset_ns * rate / 1e9) * channels`. Interleaved channels never
//! swap and the same input always yields the same output.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::constants::{GAP_THRESHOLD_SECS, MAX_SILENCE_CHUNK_SECS};
use crate::models::audio_models::{AudioFrame, StreamFormat};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// A silent interval long enough to be more than callback jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineGap {
    /// Interleaved sample offset where the silence starts.
    pub offset_samples: usize,
    pub duration_samples: usize,
    pub offset_secs: f64,
    pub duration_secs: f64,
}

/// What reconstruction did to the desktop frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineReport {
    pub gaps: Vec<TimelineGap>,
    pub total_gap_secs: f64,
    /// Frames stamped before the reference time.
    pub skipped_before_reference: usize,
    /// Frames entirely covered by audio already placed.
    pub dropped_overlapping: usize,
    /// Samples cut from the head of partially overlapping frames.
    pub trimmed_overlap_samples: usize,
    /// Frames (or frame tails) past the target length.
    pub truncated_samples: usize,
    pub silence_chunks: usize,
    pub target_samples: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction {
    pub samples: Vec<i16>,
    pub report: TimelineReport,
}

impl Reconstruction {
    fn empty() -> Self {
        Self {
            samples: Vec::new(),
            report: TimelineReport::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimelineReconstructor {
    format: StreamFormat,
    gap_threshold: Duration,
    max_silence_chunk_samples: usize,
}

impl TimelineReconstructor {
    pub fn new(format: StreamFormat) -> Self {
        let channels = format.channels.max(1) as usize;
        Self {
            format,
            gap_threshold: Duration::from_secs_f64(GAP_THRESHOLD_SECS),
            max_silence_chunk_samples: MAX_SILENCE_CHUNK_SECS as usize
                * format.sample_rate as usize
                * channels,
        }
    }

    pub fn with_gap_threshold(mut self, threshold: Duration) -> Self {
        self.gap_threshold = threshold;
        self
    }

    pub fn with_max_silence_chunk_samples(mut self, samples: usize) -> Self {
        let channels = self.channels();
        // Keep chunks whole frames so channel order survives.
        self.max_silence_chunk_samples = (samples / channels).max(1) * channels;
        self
    }

    fn channels(&self) -> usize {
        self.format.channels.max(1) as usize
    }

    /// Interleaved sample count covering `duration_secs` at this format.
    pub fn target_samples(&self, duration_secs: f64) -> usize {
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return 0;
        }
        (duration_secs * self.format.sample_rate as f64).round() as usize * self.channels()
    }

    /// Interleaved sample position of a frame arriving `offset` after the reference.
    pub fn position_of(&self, offset: Duration) -> usize {
        let frames = offset.as_nanos() * self.format.sample_rate as u128 / NANOS_PER_SEC;
        frames as usize * self.channels()
    }

    /// Rebuild the timeline of `frames`.
    ///
    /// `reference` is the mic's first post-preroll capture time; when absent,
    /// the first frame's timestamp is used. The output holds exactly
    /// `target_samples(target_duration_secs)` samples unless `frames` is empty,
    /// in which case it is empty.
    pub fn reconstruct(
        &self,
        frames: &[AudioFrame],
        reference: Option<Instant>,
        target_duration_secs: f64,
    ) -> Reconstruction {
        let Some(first) = frames.first() else {
            return Reconstruction::empty();
        };
        let reference = reference.unwrap_or(first.captured_at);
        let target = self.target_samples(target_duration_secs);
        let channels = self.channels();
        let samples_per_sec = self.format.samples_per_sec() as f64;

        let mut report = TimelineReport {
            target_samples: target,
            ..TimelineReport::default()
        };
        let mut output: Vec<i16> = Vec::with_capacity(target);

        for frame in frames {
            let Some(offset) = frame.captured_at.checked_duration_since(reference) else {
                report.skipped_before_reference += 1;
                continue;
            };

            let whole = frame.samples.len() / channels * channels;
            let mut samples = &frame.samples[..whole];
            if samples.is_empty() {
                continue;
            }

            if output.len() >= target {
                report.truncated_samples += samples.len();
                continue;
            }

            let current = output.len();
            let position = self.position_of(offset);

            if position < current {
                let overlap = current - position;
                if overlap >= samples.len() {
                    report.dropped_overlapping += 1;
                    continue;
                }
                samples = &samples[overlap..];
                report.trimmed_overlap_samples += overlap;
            } else if position > current {
                let gap = position.min(target) - current;
                report.silence_chunks += self.append_silence(&mut output, gap);

                let gap_secs = gap as f64 / samples_per_sec;
                if Duration::from_secs_f64(gap_secs) > self.gap_threshold {
                    log::debug!(
                        "Desktop gap of {:.3}s at {:.3}s",
                        gap_secs,
                        current as f64 / samples_per_sec
                    );
                    report.gaps.push(TimelineGap {
                        offset_samples: current,
                        duration_samples: gap,
                        offset_secs: current as f64 / samples_per_sec,
                        duration_secs: gap_secs,
                    });
                    report.total_gap_secs += gap_secs;
                }
            }

            let room = target - output.len();
            let take = samples.len().min(room);
            output.extend_from_slice(&samples[..take]);
            report.truncated_samples += samples.len() - take;
        }

        if output.len() < target {
            let remaining = target - output.len();
            log::debug!(
                "Padding reconstructed desktop with {:.3}s of trailing silence",
                remaining as f64 / samples_per_sec
            );
            report.silence_chunks += self.append_silence(&mut output, remaining);
        }

        if report.skipped_before_reference > 0 || report.dropped_overlapping > 0 {
            log::warn!(
                "Timeline dropped {} frames before reference and {} overlapping frames",
                report.skipped_before_reference,
                report.dropped_overlapping
            );
        }
        log::info!(
            "Reconstructed desktop timeline: {} samples, {} gaps ({:.3}s silence)",
            output.len(),
            report.gaps.len(),
            report.total_gap_secs
        );

        Reconstruction {
            samples: output,
            report,
        }
    }

    /// Append `count` zero samples in bounded chunks. Returns the chunk count.
    fn append_silence(&self, output: &mut Vec<i16>, count: usize) -> usize {
        let mut remaining = count;
        let mut chunks = 0;
        while remaining > 0 {
            let chunk = remaining.min(self.max_silence_chunk_samples);
            output.resize(output.len() + chunk, 0);
            remaining -= chunk;
            chunks += 1;
        }
        chunks
    }
}
