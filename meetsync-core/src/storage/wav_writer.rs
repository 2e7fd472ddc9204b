use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::models::error::CaptureError;
use crate::models::recording_result::MixedAudioBuffer;
use crate::processing::wav_format::{WavSpec, WAV_HEADER_SIZE};

/// Write `buffer` as a 16-bit PCM WAV file, creating parent directories.
///
/// Returns the total file size in bytes.
pub fn write_wav(path: &Path, buffer: &MixedAudioBuffer) -> Result<u64, CaptureError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                CaptureError::StorageError(format!("failed to create directory: {}", e))
            })?;
        }
    }

    let data = buffer.to_le_bytes();
    let header = WavSpec::new(buffer.sample_rate, buffer.channels).header(data.len())?;

    let file = File::create(path)
        .map_err(|e| CaptureError::StorageError(format!("failed to create file: {}", e)))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(&header)
        .and_then(|_| writer.write_all(&data))
        .and_then(|_| writer.flush())
        .map_err(|e| CaptureError::StorageError(format!("write failed: {}", e)))?;

    let size = (WAV_HEADER_SIZE + data.len()) as u64;
    log::info!(
        "Wrote {} ({} bytes, {:.2}s)",
        path.display(),
        size,
        buffer.duration_secs()
    );
    Ok(size)
}
