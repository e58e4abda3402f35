//! # audio-memory-windows
//!
//! Windows WASAPI backend for audio-memory.
//!
//! Provides:
//! - `WasapiMicFactory`: opens the default (or a chosen) microphone
//! - `WasapiMicSource`: non-blocking shared-mode capture source
//!
//! ## Usage
//! ```ignore
//! use audio_memory_core::{MemoryConfiguration, RecordingController};
//! use audio_memory_windows::WasapiMicFactory;
//!
//! let controller = RecordingController::builder(MemoryConfiguration::default())
//!     .source_factory(WasapiMicFactory::default_device())
//!     .build()?;
//! controller.start_recording(30.0)?;
//! ```

#[cfg(target_os = "windows")]
pub mod wasapi_mic;

#[cfg(target_os = "windows")]
pub use wasapi_mic::{WasapiMicFactory, WasapiMicSource};
