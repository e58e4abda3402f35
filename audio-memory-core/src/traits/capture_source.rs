use crate::models::audio_models::AudioFormat;
use crate::models::error::CaptureError;

/// A live audio input read with non-blocking pulls.
///
/// Implemented by:
/// - `WasapiMicSource` (Windows)
/// - scripted sources in tests
///
/// A source is opened on the audio worker and never leaves it, so it does
/// not need to be `Send`.
pub trait CaptureSource {
    /// Copy up to `buffer.len()` bytes of captured PCM into `buffer`.
    ///
    /// Must not block: returns `Ok(0)` when nothing is available. Errors are
    /// capture faults (`BadParameter`, `InvalidOperation`, `Device`).
    fn pull(&mut self, buffer: &mut [u8]) -> Result<usize, CaptureError>;

    /// How many seconds of audio the source can hold before it overflows.
    fn buffer_headroom_secs(&self) -> f64;
}

/// Opens capture sources on the audio worker.
pub trait CaptureSourceFactory: Send {
    /// Open a source delivering PCM in `format`.
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn CaptureSource>, CaptureError>;
}

impl<F> CaptureSourceFactory for F
where
    F: Fn(&AudioFormat) -> Result<Box<dyn CaptureSource>, CaptureError> + Send,
{
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn CaptureSource>, CaptureError> {
        self(format)
    }
}
