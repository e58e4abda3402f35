use std::time::{Duration, Instant};

use crate::processing::ring_buffer::{FillOutcome, RingBuffer};
use crate::traits::capture_source::CaptureSource;

/// Wake this long before the capture source would overflow.
const WAKE_MARGIN_SECS: f64 = 1.0;
/// Bounds on the delay after a drained pull, as fractions of the headroom.
const MIN_HEADROOM_FRACTION: f64 = 0.5;
const MAX_HEADROOM_FRACTION: f64 = 0.9;
/// Used when a source cannot say how much it buffers.
const FALLBACK_POLL: Duration = Duration::from_millis(10);
/// Pull size when there is no audio memory to pull into.
const SCRATCH_BYTES: usize = 4096;
/// Most bytes a single pass without audio memory takes from the source.
const UNBUFFERED_LAP_BYTES: usize = 64 * SCRATCH_BYTES;

/// Delay before the pull that follows `outcome`.
///
/// A pass that stopped after a full lap pulls again right away. A pass that
/// drained the source sleeps for the source's headroom minus one second,
/// clamped to 50–90% of the headroom.
pub fn next_pull_delay(outcome: &FillOutcome, headroom_secs: f64) -> Duration {
    if !outcome.drained {
        return Duration::ZERO;
    }
    if !headroom_secs.is_finite() || headroom_secs <= 0.0 {
        return FALLBACK_POLL;
    }

    let delay = (headroom_secs - WAKE_MARGIN_SECS)
        .max(headroom_secs * MIN_HEADROOM_FRACTION)
        .min(headroom_secs * MAX_HEADROOM_FRACTION);
    Duration::from_secs_f64(delay)
}

/// Drives non-blocking pulls from a capture source into the audio memory.
///
/// Holds only the deadline of the next pull; the owner waits for it and
/// calls [`run_pass`](Self::run_pass) when it is due.
#[derive(Debug, Default)]
pub struct CaptureScheduler {
    next_pull: Option<Instant>,
}

impl CaptureScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline of the pending pull, if any.
    pub fn next_pull(&self) -> Option<Instant> {
        self.next_pull
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.next_pull.is_some_and(|at| at <= now)
    }

    /// Drop the pending pull.
    pub fn cancel(&mut self) {
        self.next_pull = None;
    }

    pub fn schedule_now(&mut self) {
        self.next_pull = Some(Instant::now());
    }

    /// Cancel the pending pull and run one fill pass inline.
    ///
    /// Every freshly captured chunk is handed to `on_captured` in capture
    /// order, before the ring can overwrite it. With no audio memory the
    /// source is still drained, so `on_captured` keeps seeing every byte.
    /// The next pull is scheduled from the outcome.
    pub fn run_pass<F>(
        &mut self,
        memory: &mut RingBuffer,
        source: &mut dyn CaptureSource,
        mut on_captured: F,
    ) -> FillOutcome
    where
        F: FnMut(&[u8]),
    {
        self.cancel();

        let outcome = if memory.capacity() == 0 {
            drain_unbuffered(source, &mut on_captured)
        } else {
            memory.fill(|region| {
                let read = source.pull(region)?.min(region.len());
                if read > 0 {
                    on_captured(&region[..read]);
                }
                Ok(read)
            })
        };

        let delay = next_pull_delay(&outcome, source.buffer_headroom_secs());
        self.next_pull = Some(Instant::now() + delay);
        outcome
    }
}

/// Pull through a scratch buffer, up to one lap's worth, when there is no
/// memory to fill. `bytes_written` counts bytes handed to `on_captured`.
fn drain_unbuffered<F>(source: &mut dyn CaptureSource, on_captured: &mut F) -> FillOutcome
where
    F: FnMut(&[u8]),
{
    let mut scratch = [0u8; SCRATCH_BYTES];
    let mut outcome = FillOutcome {
        bytes_written: 0,
        drained: false,
        faults: 0,
    };

    while outcome.bytes_written < UNBUFFERED_LAP_BYTES {
        let read = match source.pull(&mut scratch) {
            Ok(n) => n.min(SCRATCH_BYTES),
            Err(e) => {
                log::warn!("Capture fault, treating pull as empty: {}", e);
                outcome.faults += 1;
                0
            }
        };
        if read > 0 {
            on_captured(&scratch[..read]);
        }
        outcome.bytes_written += read;

        if read < SCRATCH_BYTES {
            outcome.drained = true;
            break;
        }
    }
    outcome
}
