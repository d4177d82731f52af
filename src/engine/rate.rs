//! Windowed throughput tracking for the deletion run.

use std::time::{Duration, Instant};

/// Sampling window for the peak rate.
pub const SAMPLE_WINDOW: Duration = Duration::from_millis(500);

/// Tracks entries/second in fixed windows and remembers the fastest one.
#[derive(Debug)]
pub struct RateTracker {
    window: Duration,
    window_start: Instant,
    window_count: u64,
    total: u64,
    peak: f64,
}

impl RateTracker {
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self::with_window(now, SAMPLE_WINDOW)
    }

    #[must_use]
    pub fn with_window(now: Instant, window: Duration) -> Self {
        Self {
            window,
            window_start: now,
            window_count: 0,
            total: 0,
            peak: 0.0,
        }
    }

    /// Record one completed entry. Returns the closed window's rate when a
    /// window boundary was crossed, for publishing to live observers.
    pub fn record(&mut self, now: Instant) -> Option<f64> {
        self.total += 1;
        self.window_count += 1;

        let elapsed = now.duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let rate = self.window_count as f64 / elapsed.as_secs_f64();
        if rate > self.peak {
            self.peak = rate;
        }
        self.window_start = now;
        self.window_count = 0;
        Some(rate)
    }

    /// Final (peak, average) pair. Short runs that never closed a window
    /// report the overall average as their peak.
    #[must_use]
    pub fn finish(&self, now: Instant, started: Instant) -> (f64, f64) {
        let elapsed = now.duration_since(started).as_secs_f64();
        #[allow(clippy::cast_precision_loss)]
        let average = if elapsed <= f64::EPSILON {
            0.0
        } else {
            self.total as f64 / elapsed
        };
        // The fastest window can never be slower than the overall average.
        let peak = self.peak.max(average);
        (peak, average)
    }

    /// Entries recorded so far.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }
}
