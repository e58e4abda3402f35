use serde::Serialize;

/// PCM format of the captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
}

impl AudioFormat {
    /// Bytes per frame (one sample for every channel).
    pub fn block_align(&self) -> u16 {
        self.channels * self.bit_depth / 8
    }

    /// Fill rate of the capture stream in bytes per second, saturating at
    /// `u32::MAX` for formats no device produces.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate
            .checked_mul(self.block_align() as u32)
            .unwrap_or(u32::MAX)
    }

    pub fn bytes_to_seconds(&self, bytes: u64) -> f64 {
        bytes as f64 / self.bytes_per_second() as f64
    }

    /// Whole frames' worth of bytes covering at most `secs` seconds.
    ///
    /// Negative and non-finite durations map to zero.
    pub fn seconds_to_bytes(&self, secs: f64) -> u64 {
        if !secs.is_finite() || secs <= 0.0 {
            return 0;
        }
        let bytes = (secs * self.bytes_per_second() as f64).floor() as u64;
        self.align_down(bytes)
    }

    /// Round `bytes` down to a frame boundary.
    pub fn align_down(&self, bytes: u64) -> u64 {
        let align = self.block_align().max(1) as u64;
        bytes - bytes % align
    }
}

/// Point-in-time view of the audio memory, as of the last completed fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureStats {
    /// Allocated capacity in bytes.
    pub total: usize,
    /// Bytes currently holding valid audio.
    pub filled: usize,
    /// True once the memory is full and new audio overwrites the oldest.
    pub overwriting: bool,
    /// Heuristic: bytes the capture source has probably accumulated since
    /// the last fill that drained it. Zero when the last fill stopped
    /// because the memory lap was used up.
    pub estimation: usize,
}

/// Answer to a state query, derived from one consistent [`CaptureStats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReport {
    /// Whether listening is switched on, independent of an active recording.
    pub listening: bool,
    pub recording: bool,
    /// Seconds of audio memory currently holding valid audio.
    pub memorized_secs: f64,
    /// Total audio memory capacity in seconds.
    pub capacity_secs: f64,
    /// Seconds recorded so far in the active session (0 when not recording).
    pub recorded_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MONO_16K: AudioFormat = AudioFormat {
        sample_rate: 16_000,
        bit_depth: 16,
        channels: 1,
    };

    #[test]
    fn fill_rate_of_mono_16bit() {
        assert_eq!(MONO_16K.block_align(), 2);
        assert_eq!(MONO_16K.bytes_per_second(), 32_000);
        assert_relative_eq!(MONO_16K.bytes_to_seconds(128_000), 4.0);
    }

    #[test]
    fn absurd_rates_saturate_instead_of_overflowing() {
        let format = AudioFormat {
            sample_rate: u32::MAX,
            ..MONO_16K
        };
        assert_eq!(format.bytes_per_second(), u32::MAX);
    }

    #[test]
    fn seconds_to_bytes_floors_to_whole_frames() {
        assert_eq!(MONO_16K.seconds_to_bytes(2.0), 64_000);
        // 0.00003 s * 32000 B/s = 0.96 B -> 0
        assert_eq!(MONO_16K.seconds_to_bytes(0.00003), 0);
        // 1/3 s = 10666.67 B -> 10666 (already even)
        assert_eq!(MONO_16K.seconds_to_bytes(1.0 / 3.0), 10_666);
        // 0.0001 s = 3.2 B -> 3 -> aligned down to 2
        assert_eq!(MONO_16K.seconds_to_bytes(0.0001), 2);
    }

    #[test]
    fn seconds_to_bytes_clamps_negative() {
        assert_eq!(MONO_16K.seconds_to_bytes(-1.0), 0);
        assert_eq!(MONO_16K.seconds_to_bytes(f64::NAN), 0);
    }

    #[test]
    fn stereo_alignment() {
        let stereo = AudioFormat {
            sample_rate: 48_000,
            bit_depth: 16,
            channels: 2,
        };
        assert_eq!(stereo.block_align(), 4);
        assert_eq!(stereo.align_down(10), 8);
    }
}
