use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::audio_models::AudioFormat;
use crate::models::error::CaptureError;
use crate::processing::wav_format;
use crate::traits::persistence_writer::{ClosedFile, PersistenceWriter, WriterFactory};

/// Streaming WAV file writer.
///
/// ## File Format
///
/// ```text
/// [44-byte WAV header]
/// [raw PCM data...]
/// ```
///
/// The header is written with a zero data size on create and rewritten with
/// the final sizes on close.
pub struct WavFileWriter {
    file_path: PathBuf,
    format: AudioFormat,
    file: BufWriter<File>,
    audio_bytes: u64,
}

impl WavFileWriter {
    /// Create the file (and its directory) and write the initial header.
    pub fn create(file_path: PathBuf, format: AudioFormat) -> Result<Self, CaptureError> {
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::Storage(format!("failed to create directory: {}", e)))?;
        }

        let file = File::create(&file_path).map_err(|e| {
            CaptureError::Storage(format!("failed to create {}: {}", file_path.display(), e))
        })?;

        let mut writer = Self {
            file_path,
            format,
            file: BufWriter::new(file),
            audio_bytes: 0,
        };
        let header = wav_format::generate_wav_header(&format, 0);
        writer.write_raw(&header)?;
        Ok(writer)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        self.file
            .write_all(data)
            .map_err(|e| CaptureError::Storage(format!("write failed: {}", e)))
    }

    fn finish(&mut self) -> io::Result<()> {
        let header = wav_format::generate_wav_header(&self.format, self.audio_bytes);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.flush()?;
        self.file.get_ref().sync_all()
    }
}

impl PersistenceWriter for WavFileWriter {
    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        self.write_raw(data)?;
        self.audio_bytes += data.len() as u64;
        Ok(())
    }

    fn audio_bytes(&self) -> u64 {
        self.audio_bytes
    }

    fn close(mut self: Box<Self>) -> Result<ClosedFile, CaptureError> {
        self.finish()
            .map_err(|e| CaptureError::Storage(format!("failed to finalize WAV file: {}", e)))?;
        let checksum = sha256_file(&self.file_path)?;
        Ok(ClosedFile {
            audio_bytes: self.audio_bytes,
            checksum,
        })
    }
}

/// Creates [`WavFileWriter`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WavWriterFactory;

impl WriterFactory for WavWriterFactory {
    fn create(
        &self,
        path: &Path,
        format: &AudioFormat,
    ) -> Result<Box<dyn PersistenceWriter>, CaptureError> {
        Ok(Box::new(WavFileWriter::create(path.to_path_buf(), *format)?))
    }
}

/// Compute SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::Storage(format!("failed to read file for checksum: {}", e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| CaptureError::Storage(format!("failed to read file for checksum: {}", e)))?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
