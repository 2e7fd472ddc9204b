pub mod handoff;
pub mod wav_writer;
