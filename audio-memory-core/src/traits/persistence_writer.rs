use std::path::Path;

use crate::models::audio_models::AudioFormat;
use crate::models::error::CaptureError;

/// What a writer reports once its file is finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedFile {
    /// PCM bytes written, excluding the container header.
    pub audio_bytes: u64,
    /// Hex SHA-256 of the finished file, or empty.
    pub checksum: String,
}

/// Durable sink for one recording or snapshot.
pub trait PersistenceWriter: Send {
    /// Append PCM data.
    fn write(&mut self, data: &[u8]) -> Result<(), CaptureError>;

    /// PCM bytes written so far.
    fn audio_bytes(&self) -> u64;

    /// Finalize the file.
    fn close(self: Box<Self>) -> Result<ClosedFile, CaptureError>;
}

/// Creates writers for new files.
pub trait WriterFactory: Send {
    fn create(
        &self,
        path: &Path,
        format: &AudioFormat,
    ) -> Result<Box<dyn PersistenceWriter>, CaptureError>;
}
