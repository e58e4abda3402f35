use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

/// A finished recording or snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingResult {
    pub file_path: PathBuf,
    /// Duration of the audio in the file, from its byte count.
    pub duration_secs: f64,
    /// PCM bytes written, excluding any container header.
    pub audio_bytes: u64,
    /// SHA-256 of the finished file, hex encoded. Empty when the writer
    /// does not produce one.
    pub checksum: String,
    /// Estimated wall-clock time of the first sample in the file.
    pub started_at: DateTime<Local>,
}

/// Callback receiving a finished file, or the error that prevented it.
pub type FileReadyCallback = Box<dyn FnOnce(Result<RecordingResult, crate::CaptureError>) + Send>;
