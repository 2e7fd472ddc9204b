pub mod collector;
pub mod frame_sink;
pub mod pipeline;
pub mod recording;
pub mod ticker;
pub mod watchdog;
