//! Reconstructing a file from the tail of the audio memory.

use chrono::{DateTime, Local, TimeDelta};

use crate::models::audio_models::AudioFormat;
use crate::models::error::CaptureError;
use crate::processing::ring_buffer::RingBuffer;
use crate::traits::persistence_writer::PersistenceWriter;

/// Which part of the memory a prepend or snapshot takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extraction {
    /// Oldest bytes left out.
    pub skip_bytes: usize,
    /// Newest bytes taken.
    pub use_bytes: usize,
}

impl Extraction {
    /// Take the most recent `requested_secs` of the `bytes_available`
    /// buffered bytes, or all of them when the memory holds less.
    pub fn plan(bytes_available: usize, requested_secs: f64, format: &AudioFormat) -> Self {
        let wanted = usize::try_from(format.seconds_to_bytes(requested_secs)).unwrap_or(usize::MAX);
        let skip_bytes = bytes_available.saturating_sub(wanted);
        Self {
            skip_bytes,
            use_bytes: bytes_available - skip_bytes,
        }
    }

    /// Wall-clock time of the first extracted byte, assuming the newest byte
    /// was captured at `now`.
    pub fn started_at(&self, format: &AudioFormat, now: DateTime<Local>) -> DateTime<Local> {
        let secs = format.bytes_to_seconds(self.use_bytes as u64);
        now - TimeDelta::milliseconds((secs * 1000.0) as i64)
    }

    /// Stream the selected tail of `memory` into `writer`, oldest first.
    pub fn write_to(
        &self,
        memory: &RingBuffer,
        writer: &mut dyn PersistenceWriter,
    ) -> Result<usize, CaptureError> {
        memory.read(self.skip_bytes, |chunk| writer.write(chunk))
    }
}
