//! WASAPI microphone capture source.
//!
//! Opens a capture endpoint in shared mode and lets the engine convert to
//! 16-bit integer PCM at the requested rate. Reading is a non-blocking drain
//! of the endpoint buffer: no capture thread, no events.

use windows::core::{Error as WinError, HRESULT, PCWSTR};
use windows::Win32::Foundation::{E_INVALIDARG, E_POINTER};
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use audio_memory_core::models::audio_models::AudioFormat;
use audio_memory_core::models::error::CaptureError;
use audio_memory_core::traits::capture_source::{CaptureSource, CaptureSourceFactory};

/// Endpoint buffer requested from the engine, in 100-nanosecond units (2 s).
/// This is the headroom the scheduler sleeps against.
const BUFFER_DURATION_HNS: i64 = 20_000_000;

/// Opens [`WasapiMicSource`]s on the calling thread.
#[derive(Debug, Clone, Default)]
pub struct WasapiMicFactory {
    device_id: Option<String>,
}

impl WasapiMicFactory {
    /// Capture from the system default microphone.
    pub fn default_device() -> Self {
        Self::default()
    }

    /// Capture from a specific endpoint by device ID.
    pub fn with_device(id: impl Into<String>) -> Self {
        Self {
            device_id: Some(id.into()),
        }
    }
}

impl CaptureSourceFactory for WasapiMicFactory {
    fn open(&self, format: &AudioFormat) -> Result<Box<dyn CaptureSource>, CaptureError> {
        let source = WasapiMicSource::open(self.device_id.as_deref(), format)?;
        Ok(Box::new(source))
    }
}

/// A started shared-mode capture stream.
///
/// COM objects are apartment-bound, so the source stays on the thread that
/// opened it.
pub struct WasapiMicSource {
    audio_client: IAudioClient,
    capture_client: IAudioCaptureClient,
    block_align: usize,
    headroom_secs: f64,
    /// Tail of the last packet that did not fit the caller's buffer.
    carry: Vec<u8>,
    // Dropped last: COM stays initialized while the clients above live.
    _com: ComGuard,
}

impl WasapiMicSource {
    /// Sequence:
    /// 1. CoInitializeEx (MTA)
    /// 2. Get capture device (default or by ID)
    /// 3. Activate IAudioClient
    /// 4. Initialize in shared mode with PCM auto-conversion
    /// 5. Get IAudioCaptureClient service
    /// 6. Start
    pub fn open(device_id: Option<&str>, format: &AudioFormat) -> Result<Self, CaptureError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| CaptureError::Device(format!("CoInitializeEx failed: {}", e)))?;
            let com = ComGuard;

            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                    .map_err(|_| CaptureError::DeviceNotAvailable)?;

            let device = match device_id {
                Some(id) => {
                    let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
                    enumerator
                        .GetDevice(PCWSTR(wide_id.as_ptr()))
                        .map_err(|_| CaptureError::DeviceNotAvailable)?
                }
                None => enumerator
                    .GetDefaultAudioEndpoint(eCapture, eConsole)
                    .map_err(|_| CaptureError::DeviceNotAvailable)?,
            };

            let audio_client: IAudioClient = device
                .Activate(CLSCTX_ALL, None)
                .map_err(|e| CaptureError::Device(format!("Activate failed: {}", e)))?;

            let block_align = format.block_align();
            let wave_format = WAVEFORMATEX {
                wFormatTag: WAVE_FORMAT_PCM as u16,
                nChannels: format.channels,
                nSamplesPerSec: format.sample_rate,
                nAvgBytesPerSec: format.bytes_per_second(),
                nBlockAlign: block_align,
                wBitsPerSample: format.bit_depth,
                cbSize: 0,
            };

            audio_client
                .Initialize(
                    AUDCLNT_SHAREMODE_SHARED,
                    AUDCLNT_STREAMFLAGS_AUTOCONVERTPCM | AUDCLNT_STREAMFLAGS_SRC_DEFAULT_QUALITY,
                    BUFFER_DURATION_HNS,
                    0,
                    &wave_format,
                    None,
                )
                .map_err(|e| {
                    CaptureError::Device(format!("IAudioClient::Initialize failed: {}", e))
                })?;

            let buffer_frames = audio_client
                .GetBufferSize()
                .map_err(|e| CaptureError::Device(format!("GetBufferSize failed: {}", e)))?;

            let capture_client: IAudioCaptureClient = audio_client
                .GetService()
                .map_err(|e| CaptureError::Device(format!("GetService failed: {}", e)))?;

            audio_client
                .Start()
                .map_err(|e| CaptureError::Device(format!("IAudioClient::Start failed: {}", e)))?;

            log::debug!(
                "WASAPI mic opened: {} Hz, {} ch, {} frame buffer",
                format.sample_rate,
                format.channels,
                buffer_frames
            );

            Ok(Self {
                audio_client,
                capture_client,
                block_align: block_align as usize,
                headroom_secs: buffer_frames as f64 / format.sample_rate as f64,
                carry: Vec::new(),
                _com: com,
            })
        }
    }

    /// Copy as much of the carried-over packet tail as fits.
    fn drain_carry(&mut self, buffer: &mut [u8]) -> usize {
        let n = buffer.len().min(self.carry.len());
        buffer[..n].copy_from_slice(&self.carry[..n]);
        self.carry.drain(..n);
        n
    }
}

impl CaptureSource for WasapiMicSource {
    fn pull(&mut self, buffer: &mut [u8]) -> Result<usize, CaptureError> {
        let mut written = self.drain_carry(buffer);

        while written < buffer.len() {
            let packet_frames = unsafe { self.capture_client.GetNextPacketSize() }
                .map_err(classify)?;
            if packet_frames == 0 {
                break;
            }

            let mut data: *mut u8 = std::ptr::null_mut();
            let mut frames: u32 = 0;
            let mut flags: u32 = 0;
            unsafe {
                self.capture_client
                    .GetBuffer(&mut data, &mut frames, &mut flags, None, None)
                    .map_err(classify)?;
            }

            let len = frames as usize * self.block_align;
            let silent = flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 || data.is_null();
            let packet: &[u8] = if silent || len == 0 {
                &[]
            } else {
                // SAFETY: GetBuffer hands out `frames` frames at `data`, valid
                // until ReleaseBuffer below.
                unsafe { std::slice::from_raw_parts(data, len) }
            };

            let room = buffer.len() - written;
            let take = len.min(room);
            if silent {
                buffer[written..written + take].fill(0);
                self.carry.resize(len - take, 0);
            } else {
                buffer[written..written + take].copy_from_slice(&packet[..take]);
                self.carry.extend_from_slice(&packet[take..]);
            }
            written += take;

            unsafe { self.capture_client.ReleaseBuffer(frames) }.map_err(classify)?;
        }

        Ok(written)
    }

    fn buffer_headroom_secs(&self) -> f64 {
        self.headroom_secs
    }
}

impl Drop for WasapiMicSource {
    fn drop(&mut self) {
        unsafe {
            let _ = self.audio_client.Stop();
        }
    }
}

/// Map a WASAPI failure onto the capture fault kinds.
fn classify(error: WinError) -> CaptureError {
    const BAD_PARAMETER: [HRESULT; 2] = [E_INVALIDARG, E_POINTER];
    const INVALID_OPERATION: [HRESULT; 3] = [
        AUDCLNT_E_NOT_INITIALIZED,
        AUDCLNT_E_NOT_STOPPED,
        AUDCLNT_E_OUT_OF_ORDER,
    ];

    let code = error.code();
    if BAD_PARAMETER.contains(&code) {
        CaptureError::BadParameter
    } else if INVALID_OPERATION.contains(&code) {
        CaptureError::InvalidOperation
    } else {
        CaptureError::Device(error.message())
    }
}

/// RAII guard to call CoUninitialize when dropped.
struct ComGuard;

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
