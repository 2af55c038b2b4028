/*!
 * Rolling sample rate bookkeeping.
 *
 * Each acquisition loop owns one [`RateTracker`]. It records the interval
 * between successive pushes in a bounded FIFO [`RateWindow`] and reports the
 * effective rate, which makes stalls visible in the log.
 */
use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Number of intervals kept by default
pub const DEFAULT_WINDOW: usize = 100;

/// Bounded FIFO of inter-sample intervals
#[derive(Debug, Clone)]
pub struct RateWindow {
    intervals: VecDeque<Duration>,
    capacity: usize,
    count: u64,
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl RateWindow {
    /// Create a window holding at most `capacity` intervals
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            intervals: VecDeque::with_capacity(capacity),
            capacity,
            count: 0,
        }
    }

    /// Record one interval, evicting the oldest when full
    pub fn push(&mut self, interval: Duration) {
        if self.intervals.len() == self.capacity {
            self.intervals.pop_front();
        }
        self.intervals.push_back(interval);
        self.count += 1;
    }

    /// Intervals recorded since creation or the last reset
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Intervals currently held
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether no interval is held
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Held intervals, oldest first
    pub fn intervals(&self) -> impl Iterator<Item = Duration> + '_ {
        self.intervals.iter().copied()
    }

    /// Samples per second over the held intervals.
    ///
    /// `None` while the window is empty or spans no time.
    pub fn effective_rate(&self) -> Option<f64> {
        let total: Duration = self.intervals.iter().sum();
        if total.is_zero() {
            None
        } else {
            Some(self.intervals.len() as f64 / total.as_secs_f64())
        }
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.intervals.clear();
        self.count = 0;
    }
}

/// Rate window plus the time of the previous push
#[derive(Debug, Clone, Default)]
pub struct RateTracker {
    window: RateWindow,
    first_push: Option<Instant>,
    last_push: Option<Instant>,
}

impl RateTracker {
    /// Create a tracker with the given window capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            window: RateWindow::new(capacity),
            first_push: None,
            last_push: None,
        }
    }

    /// Note a push at `now`. The first push only starts the clock.
    pub fn record(&mut self, now: Instant) {
        if let Some(last) = self.last_push {
            self.window.push(now.saturating_duration_since(last));
        } else {
            self.first_push = Some(now);
        }
        self.last_push = Some(now);
    }

    /// The underlying window
    pub fn window(&self) -> &RateWindow {
        &self.window
    }

    /// Current effective rate
    pub fn effective_rate(&self) -> Option<f64> {
        self.window.effective_rate()
    }

    /// Time of the first push since the last reset
    pub fn first_push(&self) -> Option<Instant> {
        self.first_push
    }

    /// Clear the window and the push markers
    pub fn reset(&mut self) {
        self.window.reset();
        self.first_push = None;
        self.last_push = None;
    }
}
