//! # audio-memory-core
//!
//! Platform-agnostic core of an always-on audio recorder.
//!
//! Audio is captured continuously into a fixed-size ring buffer (the audio
//! memory). A recording can start with audio from *before* it was requested,
//! and snapshots of the recent past can be saved without recording at all.
//! Platform backends (Windows WASAPI) implement the `CaptureSource` trait and
//! plug into the generic `RecordingController`.
//!
//! ## Architecture
//!
//! ```text
//! audio-memory-core (this crate)
//! ├── traits/       ← CaptureSource, PersistenceWriter, MemoryDelegate
//! ├── models/       ← CaptureError, ServiceState, MemoryConfiguration, AudioFormat, etc.
//! ├── processing/   ← RingBuffer, WAV header generation
//! ├── session/      ← RecordingController, CaptureScheduler, extraction, worker
//! └── storage/      ← WavFileWriter, file naming
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{AudioFormat, CaptureStats, StateReport};
pub use models::config::MemoryConfiguration;
pub use models::error::CaptureError;
pub use models::recording_result::{FileReadyCallback, RecordingResult};
pub use models::state::ServiceState;
pub use processing::ring_buffer::{FillOutcome, RingBuffer};
pub use session::controller::{RecordingController, RecordingControllerBuilder};
pub use session::extraction::Extraction;
pub use session::scheduler::CaptureScheduler;
pub use storage::wav_writer::{WavFileWriter, WavWriterFactory};
pub use traits::capture_source::{CaptureSource, CaptureSourceFactory};
pub use traits::memory_delegate::MemoryDelegate;
pub use traits::persistence_writer::{ClosedFile, PersistenceWriter, WriterFactory};
