//! # Playback Scheduling (Jitter Buffer)
//!
//! Audio chunks come back from the speech API with irregular timing — network
//! jitter, batching upstream, reconnects. Played naively at arrival time they
//! would overlap or leave gaps. This module keeps a monotonically advancing
//! "next start time" cursor on the playback clock so chunks queue back-to-back:
//! each chunk starts at the later of "now" and "when the previous chunk ends".
//!
//! ## Guarantees:
//! For any arrival pattern, scheduled start times are non-decreasing and
//! chunks never overlap (each start >= the previous chunk's end).

/// Where a chunk was placed on the playback clock, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub start: f64,
    pub end: f64,
}

impl ScheduledChunk {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Schedules incoming audio chunks back-to-back on an audio clock.
#[derive(Debug)]
pub struct PlaybackScheduler {
    sample_rate: u32,
    /// Playback-clock time at which the next chunk may start
    next_start: f64,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            next_start: 0.0,
        }
    }

    /// Place a chunk of `sample_count` samples on the clock.
    ///
    /// ## Parameters:
    /// - **now**: current playback-clock time in seconds (the audio context's
    ///   currentTime equivalent)
    /// - **sample_count**: samples in the chunk at this scheduler's rate
    ///
    /// The cursor only ever moves forward; a chunk arriving "late" (after the
    /// queue drained) starts immediately at `now`, a chunk arriving "early"
    /// (while audio is still queued) starts when the queue ends.
    pub fn schedule(&mut self, now: f64, sample_count: usize) -> ScheduledChunk {
        let duration = sample_count as f64 / self.sample_rate as f64;

        let start = if now > self.next_start { now } else { self.next_start };
        let end = start + duration;
        self.next_start = end;

        ScheduledChunk { start, end }
    }

    /// Seconds of audio queued beyond `now` (0 when the queue has drained).
    pub fn queued_seconds(&self, now: f64) -> f64 {
        if self.next_start > now {
            self.next_start - now
        } else {
            0.0
        }
    }

    /// Drop any queued audio, e.g. when the session is stopped or the
    /// upstream reconnects mid-response.
    pub fn reset(&mut self) {
        self.next_start = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16000;

    #[test]
    fn test_back_to_back_scheduling() {
        let mut scheduler = PlaybackScheduler::new(RATE);

        // Two 4096-sample chunks arriving at the same instant
        let first = scheduler.schedule(0.0, 4096);
        let second = scheduler.schedule(0.0, 4096);

        assert_eq!(first.start, 0.0);
        assert!((first.duration() - 0.256).abs() < 1e-9);
        assert_eq!(second.start, first.end);
    }

    #[test]
    fn test_irregular_arrivals_never_overlap() {
        let mut scheduler = PlaybackScheduler::new(RATE);

        // Arrival times with bursts and gaps: three at once, a pause, a
        // straggler that lands mid-queue, then one after the queue drains
        let arrivals = [0.0, 0.0, 0.0, 0.1, 0.9, 2.0];
        let mut previous_end = 0.0;
        let mut previous_start = -1.0;

        for &now in &arrivals {
            let chunk = scheduler.schedule(now, 4096);
            assert!(
                chunk.start >= previous_start,
                "start times must be non-decreasing"
            );
            assert!(
                chunk.start >= previous_end,
                "chunk at t={} overlaps previous (start {} < end {})",
                now,
                chunk.start,
                previous_end
            );
            previous_start = chunk.start;
            previous_end = chunk.end;
        }
    }

    #[test]
    fn test_late_chunk_starts_immediately() {
        let mut scheduler = PlaybackScheduler::new(RATE);
        scheduler.schedule(0.0, 1600); // queue ends at 0.1

        // Arrives well after the queue drained
        let late = scheduler.schedule(5.0, 1600);
        assert_eq!(late.start, 5.0);
    }

    #[test]
    fn test_queued_seconds() {
        let mut scheduler = PlaybackScheduler::new(RATE);
        scheduler.schedule(0.0, 16000); // one second queued

        assert!((scheduler.queued_seconds(0.25) - 0.75).abs() < 1e-9);
        assert_eq!(scheduler.queued_seconds(2.0), 0.0);
    }

    #[test]
    fn test_reset_clears_queue() {
        let mut scheduler = PlaybackScheduler::new(RATE);
        scheduler.schedule(0.0, 32000);
        scheduler.reset();
        assert_eq!(scheduler.queued_seconds(0.0), 0.0);

        let chunk = scheduler.schedule(0.0, 1600);
        assert_eq!(chunk.start, 0.0);
    }
}
