//! 16-bit PCM RIFF/WAVE header generation and parsing.

use crate::models::error::CaptureError;

/// Size of the canonical PCM WAV header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

const PCM_FORMAT_CODE: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Format fields of a 16-bit PCM WAV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

impl WavSpec {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn block_align(&self) -> u16 {
        self.channels * BITS_PER_SAMPLE / 8
    }

    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }

    /// Build the 44-byte header for a data chunk of `data_size` bytes.
    ///
    /// ```text
    /// [0-3]    "RIFF"
    /// [4-7]    36 + data_size
    /// [8-11]   "WAVE"
    /// [12-15]  "fmt "
    /// [16-19]  16
    /// [20-21]  1 (PCM)
    /// [22-23]  channels
    /// [24-27]  sample_rate
    /// [28-31]  byte_rate
    /// [32-33]  block_align
    /// [34-35]  16
    /// [36-39]  "data"
    /// [40-43]  data_size
    /// ```
    pub fn header(&self, data_size: usize) -> Result<[u8; WAV_HEADER_SIZE], CaptureError> {
        let data_size = u32::try_from(data_size)
            .ok()
            .filter(|size| *size <= u32::MAX - 36)
            .ok_or_else(|| {
                CaptureError::StorageError(format!(
                    "{} bytes of PCM exceeds the WAV size limit",
                    data_size
                ))
            })?;

        let mut header = [0u8; WAV_HEADER_SIZE];
        header[0..4].copy_from_slice(b"RIFF");
        header[4..8].copy_from_slice(&(36 + data_size).to_le_bytes());
        header[8..12].copy_from_slice(b"WAVE");

        header[12..16].copy_from_slice(b"fmt ");
        header[16..20].copy_from_slice(&16u32.to_le_bytes());
        header[20..22].copy_from_slice(&PCM_FORMAT_CODE.to_le_bytes());
        header[22..24].copy_from_slice(&self.channels.to_le_bytes());
        header[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        header[28..32].copy_from_slice(&self.byte_rate().to_le_bytes());
        header[32..34].copy_from_slice(&self.block_align().to_le_bytes());
        header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

        header[36..40].copy_from_slice(b"data");
        header[40..44].copy_from_slice(&data_size.to_le_bytes());

        Ok(header)
    }
}

/// Parse a canonical 44-byte header. Returns the format and data chunk size.
pub fn parse_header(bytes: &[u8]) -> Result<(WavSpec, u32), CaptureError> {
    if bytes.len() < WAV_HEADER_SIZE {
        return Err(CaptureError::StorageError("WAV header truncated".into()));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" || &bytes[12..16] != b"fmt " {
        return Err(CaptureError::StorageError("not a RIFF/WAVE file".into()));
    }
    if &bytes[36..40] != b"data" {
        return Err(CaptureError::StorageError("unexpected chunk layout".into()));
    }

    let read_u16 = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
    let read_u32 =
        |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);

    if read_u16(20) != PCM_FORMAT_CODE || read_u16(34) != BITS_PER_SAMPLE {
        return Err(CaptureError::StorageError(
            "only 16-bit PCM is supported".into(),
        ));
    }

    Ok((WavSpec::new(read_u32(24), read_u16(22)), read_u32(40)))
}
