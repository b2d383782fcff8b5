//! Fixed-period pacing for the critical activity

use std::time::{Duration, Instant};

/// Sleep this close to the deadline, then spin the rest of the way
const SPIN_WINDOW: Duration = Duration::from_micros(200);

/// Deadline tracker for a fixed control period.
///
/// Deadlines are laid out on a fixed grid from the start time, so a late
/// cycle does not shift the ones after it.
pub struct CycleTimer {
    start: Instant,
    period: Duration,
    target: Duration,
}

impl CycleTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            start: Instant::now(),
            period,
            target: period,
        }
    }

    /// Wait for the end of the current period.
    ///
    /// Returns the margin that was left before the deadline, negative if
    /// the cycle overran. After an overrun the grid skips ahead to the
    /// next deadline that is still in the future.
    pub fn wait_next(&mut self) -> i64 {
        let elapsed = self.start.elapsed();
        let margin_ns = self.target.as_nanos() as i64 - elapsed.as_nanos() as i64;

        if margin_ns < 0 {
            let behind = elapsed - self.target;
            let skipped = (behind.as_nanos() / self.period.as_nanos()) as u32 + 1;
            self.target += self.period * skipped;
        }

        let remaining = self.target.saturating_sub(self.start.elapsed());
        if remaining > SPIN_WINDOW {
            std::thread::sleep(remaining - SPIN_WINDOW);
        }
        while self.start.elapsed() < self.target {
            std::hint::spin_loop();
        }

        self.target += self.period;
        margin_ns
    }
}
