use std::time::Instant;

use crate::models::audio_models::CaptureStats;
use crate::models::error::CaptureError;

/// Result of one [`RingBuffer::fill`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOutcome {
    /// Bytes written into the buffer during the pass.
    pub bytes_written: usize,
    /// The producer came up short: nothing more is available right now.
    /// `false` means the pass stopped after a full lap and more data may be
    /// waiting.
    pub drained: bool,
    /// Producer errors swallowed during the pass.
    pub faults: usize,
}

/// Fixed-capacity circular byte store holding the most recent audio.
///
/// The audio memory of the recorder. Owned by a single
/// worker, so there is no interior locking; wrap in a mutex if it ever
/// needs to cross threads.
///
/// Overflow behavior: once full, every new byte overwrites the oldest one.
#[derive(Debug, Default)]
pub struct RingBuffer {
    buffer: Vec<u8>,
    write_index: usize,
    filled: usize,
    overwriting: bool,
    last_drained_at: Option<Instant>,
}

impl RingBuffer {
    /// An empty buffer with no storage. Call [`set_capacity`](Self::set_capacity)
    /// before filling it.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, CaptureError> {
        let mut buffer = Self::new();
        buffer.set_capacity(capacity)?;
        Ok(buffer)
    }

    /// Reallocate the store, keeping the newest `min(filled, new_capacity)`
    /// bytes in order. Growing keeps everything and adds free space ahead of
    /// the write cursor. A capacity of zero releases the storage.
    ///
    /// If the new store cannot be allocated the buffer is left untouched.
    pub fn set_capacity(&mut self, new_capacity: usize) -> Result<(), CaptureError> {
        if new_capacity == self.buffer.len() {
            return Ok(());
        }

        let mut next = Vec::new();
        next.try_reserve_exact(new_capacity).map_err(|e| {
            CaptureError::ConfigurationFailed(format!(
                "cannot allocate {} bytes of audio memory: {}",
                new_capacity, e
            ))
        })?;
        next.resize(new_capacity, 0u8);

        let keep = self.filled.min(new_capacity);
        let mut offset = 0;
        let copied = self.read(self.filled - keep, |chunk| {
            next[offset..offset + chunk.len()].copy_from_slice(chunk);
            offset += chunk.len();
            Ok::<(), std::convert::Infallible>(())
        });
        debug_assert_eq!(copied, Ok(keep));

        self.buffer = next;
        self.filled = keep;
        self.write_index = if new_capacity == 0 { 0 } else { keep % new_capacity };
        self.overwriting = new_capacity > 0 && keep == new_capacity;
        Ok(())
    }

    /// Pull data from `produce` into the buffer at the write cursor.
    ///
    /// `produce` gets the free region up to the physical end of the buffer
    /// and returns how many bytes it supplied; 0 means nothing is available
    /// right now. While it keeps filling whole regions the pass continues
    /// after the wrap, up to one lap of the buffer. Producer errors are
    /// logged and count as an empty read.
    pub fn fill<F>(&mut self, mut produce: F) -> FillOutcome
    where
        F: FnMut(&mut [u8]) -> Result<usize, CaptureError>,
    {
        let capacity = self.buffer.len();
        let mut outcome = FillOutcome {
            bytes_written: 0,
            drained: capacity == 0,
            faults: 0,
        };

        while outcome.bytes_written < capacity {
            let lap_left = capacity - outcome.bytes_written;
            let end = capacity.min(self.write_index + lap_left);
            let region = &mut self.buffer[self.write_index..end];
            let requested = region.len();

            let read = match produce(region) {
                Ok(n) => n.min(requested),
                Err(e) => {
                    if e.is_capture_fault() {
                        log::warn!("Capture fault, treating pull as empty: {}", e);
                    } else {
                        log::error!("Unexpected capture error, treating pull as empty: {}", e);
                    }
                    outcome.faults += 1;
                    0
                }
            };

            self.advance(read);
            outcome.bytes_written += read;

            if read < requested {
                outcome.drained = true;
                break;
            }
        }

        self.last_drained_at = if outcome.drained {
            Some(Instant::now())
        } else {
            None
        };
        outcome
    }

    /// Deliver the buffered audio oldest-first to `consume`, skipping the
    /// first `skip_bytes` of it.
    ///
    /// At most two chunks are delivered: up to the physical end of the
    /// buffer, then from its start up to the write cursor. Does not modify
    /// the buffer. Returns the number of bytes delivered.
    pub fn read<E, F>(&self, skip_bytes: usize, mut consume: F) -> Result<usize, E>
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        let skip = skip_bytes.min(self.filled);
        let len = self.filled - skip;
        if len == 0 {
            return Ok(0);
        }

        let capacity = self.buffer.len();
        let oldest = (self.write_index + capacity - self.filled) % capacity;
        let start = (oldest + skip) % capacity;
        let first = len.min(capacity - start);

        consume(&self.buffer[start..start + first])?;
        if first < len {
            consume(&self.buffer[..len - first])?;
        }
        Ok(len)
    }

    /// Number of bytes holding valid audio.
    pub fn count_filled(&self) -> usize {
        self.filled
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Whether the buffer is full and new audio replaces the oldest.
    pub fn is_overwriting(&self) -> bool {
        self.overwriting
    }

    /// Snapshot as of the last completed fill.
    pub fn stats(&self, bytes_per_second: u32) -> CaptureStats {
        self.stats_at(bytes_per_second, Instant::now())
    }

    fn stats_at(&self, bytes_per_second: u32, now: Instant) -> CaptureStats {
        let estimation = self
            .last_drained_at
            .map(|at| {
                let secs = now.saturating_duration_since(at).as_secs_f64();
                (secs * bytes_per_second as f64) as usize
            })
            .unwrap_or(0)
            .min(self.buffer.len());

        CaptureStats {
            total: self.buffer.len(),
            filled: self.filled,
            overwriting: self.overwriting,
            estimation,
        }
    }

    fn advance(&mut self, written: usize) {
        if written == 0 {
            return;
        }
        let capacity = self.buffer.len();
        self.write_index = (self.write_index + written) % capacity;
        self.filled = (self.filled + written).min(capacity);
        if self.filled == capacity {
            self.overwriting = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Producer over a fixed byte history; hands out at most `chunk` bytes per call.
    struct Feed {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl Feed {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data,
                pos: 0,
                chunk: usize::MAX,
            }
        }

        fn produce(&mut self, region: &mut [u8]) -> Result<usize, CaptureError> {
            let n = region.len().min(self.data.len() - self.pos).min(self.chunk);
            region[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn contents(buf: &RingBuffer, skip: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut chunks = 0;
        buf.read(skip, |chunk| {
            chunks += 1;
            out.extend_from_slice(chunk);
            Ok::<(), ()>(())
        })
        .unwrap();
        assert!(chunks <= 2);
        out
    }

    /// Fill repeatedly until the feed is exhausted.
    fn fill_all(buf: &mut RingBuffer, feed: &mut Feed) {
        while feed.pos < feed.data.len() {
            buf.fill(|region| feed.produce(region));
        }
    }

    #[test]
    fn new_buffer_is_empty() {
        let mut buf = RingBuffer::new();
        assert_eq!(buf.capacity(), 0);
        assert!(buf.is_empty());

        let outcome = buf.fill(|_| panic!("no region to fill"));
        assert_eq!(outcome.bytes_written, 0);
        assert!(outcome.drained);
        assert!(contents(&buf, 0).is_empty());
    }

    #[test]
    fn short_fill_reports_drained() {
        let mut buf = RingBuffer::with_capacity(16).unwrap();
        let mut feed = Feed::new(vec![1, 2, 3, 4, 5]);

        let outcome = buf.fill(|region| feed.produce(region));

        assert_eq!(outcome.bytes_written, 5);
        assert!(outcome.drained);
        assert_eq!(buf.count_filled(), 5);
        assert!(!buf.is_overwriting());
        assert_eq!(contents(&buf, 0), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn full_regions_continue_across_wrap_up_to_one_lap() {
        let mut buf = RingBuffer::with_capacity(10).unwrap();
        let mut feed = Feed::new(pattern(4));
        buf.fill(|region| feed.produce(region));

        // Endless source: the pass must stop after exactly one lap.
        let mut calls = 0;
        let outcome = buf.fill(|region| {
            calls += 1;
            region.fill(0xAB);
            Ok(region.len())
        });

        assert_eq!(outcome.bytes_written, 10);
        assert!(!outcome.drained);
        assert_eq!(calls, 2); // 6 bytes to the end, 4 after the wrap
        assert!(buf.is_overwriting());
        assert_eq!(contents(&buf, 0), vec![0xAB; 10]);
    }

    #[test]
    fn producer_errors_count_as_empty_reads() {
        let mut buf = RingBuffer::with_capacity(8).unwrap();
        let outcome = buf.fill(|_| Err(CaptureError::InvalidOperation));

        assert_eq!(outcome.bytes_written, 0);
        assert_eq!(outcome.faults, 1);
        assert!(outcome.drained);
        assert!(buf.is_empty());

        // Capture carries on with the next pass.
        let mut feed = Feed::new(vec![9, 8, 7]);
        buf.fill(|region| feed.produce(region));
        assert_eq!(contents(&buf, 0), vec![9, 8, 7]);
    }

    #[test]
    fn overlong_producer_counts_are_clamped() {
        let mut buf = RingBuffer::with_capacity(4).unwrap();
        let outcome = buf.fill(|region| Ok(region.len() + 100));
        assert_eq!(outcome.bytes_written, 4);
        assert_eq!(buf.count_filled(), 4);
    }

    #[test]
    fn overwrite_keeps_only_newest_capacity_bytes() {
        let history = pattern(2_500);
        let mut buf = RingBuffer::with_capacity(1_000).unwrap();
        let mut feed = Feed::new(history.clone());
        feed.chunk = 77;

        fill_all(&mut buf, &mut feed);

        assert!(buf.is_overwriting());
        assert_eq!(buf.count_filled(), 1_000);
        assert_eq!(contents(&buf, 0), history[1_500..].to_vec());
    }

    #[test]
    fn read_with_skip_matches_linear_history() {
        let history = pattern(1_337);
        let mut buf = RingBuffer::with_capacity(500).unwrap();
        let mut feed = Feed::new(history.clone());
        feed.chunk = 64;
        fill_all(&mut buf, &mut feed);

        for skip in [0, 1, 137, 250, 499, 500] {
            let got = contents(&buf, skip);
            assert_eq!(got.len(), 500 - skip);
            assert_eq!(got, history[history.len() - 500 + skip..].to_vec());
        }
    }

    #[test]
    fn skip_is_clamped_to_filled() {
        let mut buf = RingBuffer::with_capacity(32).unwrap();
        let mut feed = Feed::new(pattern(10));
        buf.fill(|region| feed.produce(region));

        let delivered = buf.read(1_000, |_| Ok::<(), ()>(())).unwrap();
        assert_eq!(delivered, 0);
    }

    #[test]
    fn read_propagates_sink_errors() {
        let mut buf = RingBuffer::with_capacity(8).unwrap();
        let mut feed = Feed::new(pattern(8));
        buf.fill(|region| feed.produce(region));

        let result = buf.read(0, |_| Err("disk full"));
        assert_eq!(result, Err("disk full"));
        assert_eq!(buf.count_filled(), 8);
    }

    #[test]
    fn shrink_keeps_newest_tail() {
        let history = pattern(900);
        let mut buf = RingBuffer::with_capacity(600).unwrap();
        let mut feed = Feed::new(history.clone());
        feed.chunk = 50;
        fill_all(&mut buf, &mut feed);

        buf.set_capacity(250).unwrap();

        assert_eq!(buf.capacity(), 250);
        assert_eq!(buf.count_filled(), 250);
        assert!(buf.is_overwriting());
        assert_eq!(contents(&buf, 0), history[650..].to_vec());

        // Still a working ring after the resize.
        let mut more = Feed::new(vec![1, 2, 3]);
        buf.fill(|region| more.produce(region));
        let mut expected = history[653..].to_vec();
        expected.extend_from_slice(&[1, 2, 3]);
        assert_eq!(contents(&buf, 0), expected);
    }

    #[test]
    fn shrink_of_partially_filled_buffer_keeps_everything_that_fits() {
        let mut buf = RingBuffer::with_capacity(100).unwrap();
        let mut feed = Feed::new(pattern(30));
        buf.fill(|region| feed.produce(region));

        buf.set_capacity(40).unwrap();

        assert_eq!(buf.count_filled(), 30);
        assert!(!buf.is_overwriting());
        assert_eq!(contents(&buf, 0), pattern(30));
    }

    #[test]
    fn grow_keeps_all_and_adds_free_space() {
        let history = pattern(300);
        let mut buf = RingBuffer::with_capacity(100).unwrap();
        let mut feed = Feed::new(history[..250].to_vec());
        fill_all(&mut buf, &mut feed);
        assert!(buf.is_overwriting());

        buf.set_capacity(200).unwrap();
        assert_eq!(buf.count_filled(), 100);
        assert!(!buf.is_overwriting());
        assert_eq!(contents(&buf, 0), history[150..250].to_vec());

        let mut rest = Feed::new(history[250..].to_vec());
        buf.fill(|region| rest.produce(region));
        assert_eq!(buf.count_filled(), 150);
        assert_eq!(contents(&buf, 0), history[150..].to_vec());
    }

    #[test]
    fn zero_capacity_releases_storage() {
        let mut buf = RingBuffer::with_capacity(64).unwrap();
        let mut feed = Feed::new(pattern(64));
        buf.fill(|region| feed.produce(region));

        buf.set_capacity(0).unwrap();

        assert_eq!(buf.capacity(), 0);
        assert!(buf.is_empty());
        assert!(!buf.is_overwriting());
    }

    #[test]
    fn failed_allocation_keeps_the_old_store() {
        let mut buf = RingBuffer::with_capacity(16).unwrap();
        let mut feed = Feed::new(pattern(10));
        buf.fill(|region| feed.produce(region));

        let result = buf.set_capacity(usize::MAX);

        assert!(matches!(result, Err(CaptureError::ConfigurationFailed(_))));
        assert_eq!(buf.capacity(), 16);
        assert_eq!(contents(&buf, 0), pattern(10));
    }

    #[test]
    fn filled_never_exceeds_capacity_and_content_tracks_history() {
        // Deterministic xorshift so the sequence is reproducible.
        let mut seed: u32 = 0x9E37_79B9;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };

        let mut buf = RingBuffer::with_capacity(64).unwrap();
        let mut history: Vec<u8> = Vec::new();
        let mut counter: u8 = 0;

        for _ in 0..500 {
            if next() % 7 == 0 {
                let cap = (next() % 200) as usize;
                buf.set_capacity(cap).unwrap();
            } else {
                let want = (next() % 150) as usize;
                let mut given = 0;
                buf.fill(|region| {
                    let n = region.len().min(want - given);
                    for byte in &mut region[..n] {
                        *byte = counter;
                        history.push(counter);
                        counter = counter.wrapping_add(1);
                    }
                    given += n;
                    Ok(n)
                });
            }

            assert!(buf.count_filled() <= buf.capacity());
            let got = contents(&buf, 0);
            assert_eq!(got.len(), buf.count_filled());
            // Resizes can only drop the oldest bytes, so the buffer always
            // holds a suffix of the full history.
            assert!(history.ends_with(&got));
        }
    }

    #[test]
    fn stats_estimate_grows_after_a_drained_fill() {
        let mut buf = RingBuffer::with_capacity(100_000).unwrap();
        let mut feed = Feed::new(pattern(1_000));
        buf.fill(|region| feed.produce(region));

        let drained_at = buf.last_drained_at.unwrap();
        let stats = buf.stats_at(32_000, drained_at + Duration::from_millis(500));

        assert_eq!(stats.total, 100_000);
        assert_eq!(stats.filled, 1_000);
        assert!(!stats.overwriting);
        assert_eq!(stats.estimation, 16_000);

        // Estimate never exceeds the buffer itself.
        let far = buf.stats_at(32_000, drained_at + Duration::from_secs(3_600));
        assert_eq!(far.estimation, 100_000);
    }

    #[test]
    fn stats_estimate_is_zero_after_a_full_lap() {
        let mut buf = RingBuffer::with_capacity(10).unwrap();
        buf.fill(|region| Ok(region.len()));

        let stats = buf.stats(32_000);
        assert_eq!(stats.estimation, 0);
        assert!(stats.overwriting);
        assert_eq!(stats.filled, 10);
    }
}
