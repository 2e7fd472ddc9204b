//! Interleaving and channel-count conversion.
//!
//! Surround sources are folded to stereo with fixed coefficients: channels 0
//! and 1 are front left/right, channel 2 is center (-3 dB into both sides),
//! and every further channel, LFE included, goes in at -6 dB on both sides.

use crate::constants::{CENTER_MIX_GAIN, SURROUND_MIX_GAIN};
use crate::processing::mixer::{from_normalized, to_normalized};

/// Split interleaved samples into one buffer per channel.
///
/// A trailing partial frame is dropped.
pub fn deinterleave<T: Copy>(samples: &[T], channels: usize) -> Vec<Vec<T>> {
    let channels = channels.max(1);
    let frame_count = samples.len() / channels;
    let mut planar: Vec<Vec<T>> = (0..channels)
        .map(|_| Vec::with_capacity(frame_count))
        .collect();
    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }
    planar
}

/// Interleave per-channel buffers `[L0, R0, L1, R1, ...]`.
///
/// Shorter channels are zero-padded to the longest.
pub fn interleave<T: Copy + Default>(planar: &[Vec<T>]) -> Vec<T> {
    let channels = planar.len();
    let frame_count = planar.iter().map(Vec::len).max().unwrap_or(0);
    if channels == 0 || frame_count == 0 {
        return Vec::new();
    }

    let mut interleaved = Vec::with_capacity(frame_count * channels);
    for i in 0..frame_count {
        for channel in planar {
            interleaved.push(channel.get(i).copied().unwrap_or_default());
        }
    }
    interleaved
}

/// Duplicate a mono signal into both stereo channels.
pub fn mono_to_stereo(samples: &[i16]) -> Vec<i16> {
    let mut stereo = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        stereo.push(sample);
        stereo.push(sample);
    }
    stereo
}

/// Average each stereo frame into one mono sample.
pub fn stereo_to_mono(samples: &[i16]) -> Vec<i16> {
    samples
        .chunks_exact(2)
        .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
        .collect()
}

/// Fold a source with more than two channels down to stereo.
pub fn downmix_to_stereo(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 2 {
        return samples.to_vec();
    }

    log::debug!("Downmixing {} channels to stereo", channels);

    let frame_count = samples.len() / channels;
    let mut stereo = Vec::with_capacity(frame_count * 2);
    for frame in samples.chunks_exact(channels) {
        let mut left = to_normalized(frame[0]);
        let mut right = to_normalized(frame[1]);
        for (ch, &sample) in frame.iter().enumerate().skip(2) {
            let gain = if ch == 2 {
                CENTER_MIX_GAIN
            } else {
                SURROUND_MIX_GAIN
            };
            let contribution = to_normalized(sample) * gain;
            left += contribution;
            right += contribution;
        }
        stereo.push(from_normalized(left.clamp(-1.0, 1.0)));
        stereo.push(from_normalized(right.clamp(-1.0, 1.0)));
    }
    stereo
}

/// Convert interleaved audio from `from` channels to `to` channels (1 or 2).
pub fn conform_channels(samples: Vec<i16>, from: u16, to: u16) -> Vec<i16> {
    let stereo_or_mono = if from > 2 {
        downmix_to_stereo(&samples, from as usize)
    } else {
        samples
    };
    let current = from.min(2);

    match (current, to) {
        (1, 2) => mono_to_stereo(&stereo_or_mono),
        (2, 1) => stereo_to_mono(&stereo_or_mono),
        _ => stereo_or_mono,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleave_and_interleave_stereo() {
        let samples = [1, 10, 2, 20, 3, 30];
        let planar = deinterleave(&samples, 2);
        assert_eq!(planar, vec![vec![1, 2, 3], vec![10, 20, 30]]);
        assert_eq!(interleave(&planar), samples.to_vec());
    }

    #[test]
    fn deinterleave_drops_partial_frame() {
        let planar = deinterleave(&[1, 2, 3], 2);
        assert_eq!(planar, vec![vec![1], vec![2]]);
    }

    #[test]
    fn interleave_unequal_lengths() {
        let planar = vec![vec![1.0f32, 2.0], vec![4.0, 5.0, 6.0]];
        let result = interleave(&planar);
        assert_eq!(result, vec![1.0, 4.0, 2.0, 5.0, 0.0, 6.0]);
    }

    #[test]
    fn mono_duplicates_to_both_channels() {
        assert_eq!(mono_to_stereo(&[5, -7]), vec![5, 5, -7, -7]);
    }

    #[test]
    fn stereo_averages_to_mono() {
        assert_eq!(stereo_to_mono(&[100, 200, -100, 300]), vec![150, 100]);
    }

    #[test]
    fn downmix_applies_center_and_surround_gains() {
        // FL, FR, C, LFE, SL, SR
        let quarter = 8192i16; // 0.25 full scale
        let frame = [0, 0, quarter, 0, quarter, 0];
        let stereo = downmix_to_stereo(&frame, 6);
        assert_eq!(stereo.len(), 2);

        let expected = 0.25 * CENTER_MIX_GAIN + 0.25 * SURROUND_MIX_GAIN;
        let left = to_normalized(stereo[0]);
        let right = to_normalized(stereo[1]);
        assert!((left - expected).abs() < 1e-3, "left = {}", left);
        assert!((right - expected).abs() < 1e-3, "right = {}", right);
    }

    #[test]
    fn downmix_clamps_to_full_scale() {
        let frame = [i16::MAX, i16::MIN, i16::MAX, i16::MAX];
        let stereo = downmix_to_stereo(&frame, 4);
        assert_eq!(stereo[0], i16::MAX);
        // -1.0 + 0.707 + 0.5 stays in range
        assert!(stereo[1] > i16::MIN);
    }

    #[test]
    fn conform_handles_every_direction() {
        assert_eq!(conform_channels(vec![1, 2], 1, 2), vec![1, 1, 2, 2]);
        assert_eq!(conform_channels(vec![2, 4], 2, 1), vec![3]);
        assert_eq!(conform_channels(vec![1, 2, 3, 4], 2, 2), vec![1, 2, 3, 4]);
        assert_eq!(conform_channels(vec![0; 12], 6, 2).len(), 4);
        assert_eq!(conform_channels(vec![0; 12], 6, 1).len(), 2);
    }
}
