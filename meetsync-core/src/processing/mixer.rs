use crate::constants::LEVEL_SUBSAMPLE_FACTOR;
use crate::models::config::CaptureConfiguration;

/// Convert a 16-bit sample to the normalized `[-1.0, 1.0)` range.
#[inline]
pub fn to_normalized(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Convert a normalized sample back to 16-bit. Out-of-range values saturate.
#[inline]
pub fn from_normalized(sample: f32) -> i16 {
    (sample * i16::MAX as f32) as i16
}

/// Pad the shorter buffer with trailing silence so both have equal length.
///
/// Never truncates: the longer buffer is returned unchanged.
pub fn align_lengths(mut a: Vec<i16>, mut b: Vec<i16>) -> (Vec<i16>, Vec<i16>) {
    let max_length = a.len().max(b.len());
    if a.len() < max_length {
        log::debug!("Padding first buffer with {} samples of silence", max_length - a.len());
        a.resize(max_length, 0);
    }
    if b.len() < max_length {
        log::debug!("Padding second buffer with {} samples of silence", max_length - b.len());
        b.resize(max_length, 0);
    }
    (a, b)
}

/// `tanh(x * 0.85)`: smooth, monotonic, bounded by 1.0 in magnitude.
#[inline]
pub fn soft_limit(sample: f32) -> f32 {
    (sample * 0.85).tanh()
}

/// Peak absolute level of normalized samples.
pub fn peak_level(samples: &[f32]) -> f32 {
    samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
}

/// Peak of every 8th sample, normalized to 0.0–1.0, for live metering.
pub fn subsampled_peak(samples: &[i16]) -> f32 {
    let peak = samples
        .iter()
        .step_by(LEVEL_SUBSAMPLE_FACTOR)
        .map(|s| (*s as i32).unsigned_abs())
        .max()
        .unwrap_or(0);
    (peak as f32 / 32768.0).min(1.0)
}

/// Sums the microphone and desktop tracks with per-source gain and a
/// soft limiter on the combined signal.
///
/// Both inputs must share sample rate and channel layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mixer {
    pub mic_volume: f32,
    pub desktop_volume: f32,
    pub mic_boost_linear: f32,
}

impl Mixer {
    pub fn new(mic_volume: f32, desktop_volume: f32, mic_boost_linear: f32) -> Self {
        Self {
            mic_volume,
            desktop_volume,
            mic_boost_linear,
        }
    }

    pub fn from_config(config: &CaptureConfiguration) -> Self {
        Self::new(
            config.mic_volume,
            config.desktop_volume,
            config.mic_boost_linear,
        )
    }

    /// Mix two interleaved tracks.
    ///
    /// The shorter track is treated as trailing silence, so the output length
    /// is the longer of the two. If the summed peak exceeds full scale, the
    /// whole buffer goes through [`soft_limit`].
    pub fn mix(&self, mic: &[i16], desktop: &[i16]) -> Vec<i16> {
        let length = mic.len().max(desktop.len());
        if length == 0 {
            return Vec::new();
        }

        let mic_gain = self.mic_volume * self.mic_boost_linear;
        let mut mixed = Vec::with_capacity(length);
        for i in 0..length {
            let m = mic.get(i).copied().map(to_normalized).unwrap_or(0.0) * mic_gain;
            let d = desktop.get(i).copied().map(to_normalized).unwrap_or(0.0) * self.desktop_volume;
            mixed.push(m + d);
        }

        let peak = peak_level(&mixed);
        if peak > 1.0 {
            log::debug!("Mixed peak {:.3} exceeds full scale, soft limiting", peak);
            for sample in mixed.iter_mut() {
                *sample = soft_limit(*sample);
            }
        }

        mixed.into_iter().map(from_normalized).collect()
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(1.0, 1.0, 2.0)
    }
}
