use std::path::PathBuf;

use super::audio_models::AudioFormat;

/// Default amount of audio memory: five minutes of 48 kHz mono 16-bit PCM.
pub const DEFAULT_MEMORY_SIZE_BYTES: u64 = 5 * 60 * 48_000 * 2;

/// Highest accepted capture rate in Hz.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Largest audio memory; bigger requests are clamped to it (2 GiB).
pub const MAX_MEMORY_SIZE_BYTES: u64 = 1 << 31;

/// Configuration for a [`RecordingController`](crate::RecordingController).
///
/// Held in memory only; hosts that want to remember settings across runs
/// store them themselves.
#[derive(Debug, Clone)]
pub struct MemoryConfiguration {
    /// Capture sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Bit depth of captured PCM (default: 16). Valid values: 8, 16, 24, 32.
    pub bit_depth: u16,

    /// Number of captured channels (default: 1).
    pub channels: u16,

    /// Size of the audio memory in bytes. Clamped to
    /// [`MAX_MEMORY_SIZE_BYTES`].
    pub memory_size_bytes: u64,

    /// Directory where recordings and snapshots are written.
    pub output_directory: PathBuf,

    /// Prefix of generated file names (default: "Echo").
    pub file_prefix: String,

    /// Start listening as soon as the controller is created (default: true).
    pub listen_on_start: bool,
}

impl MemoryConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        check_sample_rate(self.sample_rate)?;
        if ![8, 16, 24, 32].contains(&self.bit_depth) {
            return Err(format!("unsupported bit depth: {}", self.bit_depth));
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.file_prefix.trim().is_empty() {
            return Err("file prefix must not be empty".into());
        }
        Ok(())
    }

    /// The PCM format described by this configuration.
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            bit_depth: self.bit_depth,
            channels: self.channels,
        }
    }
}

/// Accepts rates in `1..=MAX_SAMPLE_RATE`.
pub fn check_sample_rate(sample_rate: u32) -> Result<(), String> {
    if sample_rate == 0 {
        return Err("sample rate must be positive".into());
    }
    if sample_rate > MAX_SAMPLE_RATE {
        return Err(format!(
            "sample rate {} Hz exceeds the {} Hz maximum",
            sample_rate, MAX_SAMPLE_RATE
        ));
    }
    Ok(())
}

/// Clamp a requested memory size into `0..=MAX_MEMORY_SIZE_BYTES`.
pub fn clamp_memory_size(bytes: i64) -> u64 {
    u64::try_from(bytes).unwrap_or(0).min(MAX_MEMORY_SIZE_BYTES)
}

impl Default for MemoryConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            bit_depth: 16,
            channels: 1,
            memory_size_bytes: DEFAULT_MEMORY_SIZE_BYTES,
            output_directory: PathBuf::from("."),
            file_prefix: "Echo".into(),
            listen_on_start: true,
        }
    }
}
