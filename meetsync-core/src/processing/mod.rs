pub mod channel_layout;
pub mod enhancer;
pub mod mixer;
pub mod resampler;
pub mod timeline;
pub mod wav_format;
