//! Minimal microphone enhancement.
//!
//! DC removal, gentle peak normalization and a tanh soft limiter, applied per
//! channel. No filtering, gating or compression, so speech keeps its natural
//! timbre for transcription.

use crate::constants::{
    NORMALIZATION_BOOST_TARGET, NORMALIZATION_HIGH_THRESHOLD, NORMALIZATION_LOW_THRESHOLD,
    SOFT_LIMIT_THRESHOLD,
};
use crate::processing::channel_layout::{deinterleave, interleave};
use crate::processing::mixer::{from_normalized, peak_level, to_normalized};

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelEnhancer;

impl ChannelEnhancer {
    pub fn new() -> Self {
        Self
    }

    /// Enhance interleaved 16-bit audio with `channels` channels.
    pub fn enhance(&self, samples: &[i16], channels: u16) -> Vec<i16> {
        if samples.is_empty() {
            return Vec::new();
        }

        let normalized: Vec<f32> = samples.iter().copied().map(to_normalized).collect();
        let processed = if channels > 1 {
            let planar: Vec<Vec<f32>> = deinterleave(&normalized, channels as usize)
                .into_iter()
                .map(|mut channel| {
                    self.process_channel(&mut channel);
                    channel
                })
                .collect();
            interleave(&planar)
        } else {
            let mut mono = normalized;
            self.process_channel(&mut mono);
            mono
        };

        processed.into_iter().map(from_normalized).collect()
    }

    /// Process one normalized channel in place.
    pub fn process_channel(&self, channel: &mut [f32]) {
        if channel.is_empty() {
            return;
        }

        let mean = channel.iter().map(|&s| s as f64).sum::<f64>() / channel.len() as f64;
        let mean = mean as f32;
        for sample in channel.iter_mut() {
            *sample -= mean;
        }

        let peak = peak_level(channel);
        let gain = if peak > NORMALIZATION_HIGH_THRESHOLD {
            NORMALIZATION_HIGH_THRESHOLD / peak
        } else if peak > 0.0 && peak < NORMALIZATION_LOW_THRESHOLD {
            NORMALIZATION_BOOST_TARGET / peak
        } else {
            1.0
        };
        if gain != 1.0 {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }

        if peak_level(channel) > SOFT_LIMIT_THRESHOLD {
            for sample in channel.iter_mut() {
                *sample = (*sample * 0.9).tanh() * 0.85;
            }
        }
    }
}
