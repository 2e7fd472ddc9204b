//! Fixed processing constants.

/// Rates probed, after the device default, when the requested rate fails to open.
pub const COMMON_SAMPLE_RATES: [u32; 5] = [48000, 44100, 32000, 16000, 8000];

/// Longest accepted preroll.
pub const MAX_PREROLL_SECS: f64 = 60.0;

/// Gaps shorter than this are callback jitter and are not reported.
pub const GAP_THRESHOLD_SECS: f64 = 0.1;

/// Upper bound on a single silence allocation during timeline reconstruction.
pub const MAX_SILENCE_CHUNK_SECS: u32 = 10;

/// Capture start delta between sources above which a warning is logged.
pub const CAPTURE_DELTA_WARN_SECS: f64 = 0.1;

pub const NORMALIZATION_HIGH_THRESHOLD: f32 = 0.7;
pub const NORMALIZATION_LOW_THRESHOLD: f32 = 0.1;
pub const NORMALIZATION_BOOST_TARGET: f32 = 0.3;
pub const SOFT_LIMIT_THRESHOLD: f32 = 0.95;

/// Only every Nth sample is inspected when computing live levels.
pub const LEVEL_SUBSAMPLE_FACTOR: usize = 8;

/// Downmix gain for the center channel (-3 dB).
pub const CENTER_MIX_GAIN: f32 = 0.707;

/// Downmix gain for surround and LFE channels (-6 dB).
pub const SURROUND_MIX_GAIN: f32 = 0.5;
