//! CPU and timer clocks.
use std::{
    thread,
    time::{Duration, Instant},
};

/// Timer to synchronize the thread with the software clock of the virtual CPU.
///
/// It is designed to work with the yielding cooperative pattern
/// of the interpreter loop. When the VM yields control back to the
/// caller, time elapses until it is resumed. Once the interpreter
/// is resumed, the elapsed time is taken into account when determining
/// the next cycle.
pub(crate) struct Throttle {
    start: Instant,
    interval: Duration,
}

impl Throttle {
    /// Creates a new throttle with the current time as internal state.
    ///
    /// A zero interval disables waiting entirely.
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            interval,
        }
    }

    /// Set the clock state back to zero.
    pub(crate) fn reset(&mut self) {
        self.start = Instant::now()
    }

    /// Block the current thread until the next clock cycle.
    #[allow(dead_code)] // only called when the `throttle` feature is enabled
    pub(crate) fn wait(&mut self) {
        if self.interval.is_zero() {
            return;
        }

        loop {
            let elapsed = self.start.elapsed();
            if elapsed < self.interval {
                // Sleep does not have enough resolution, and causes
                // the clock to run at 30 FPS.
                //
                // Spinning a loop causes high CPU usage and fan madness.
                //
                // Yielding in a loop is the best alternative.
                thread::yield_now();
            } else {
                // Reset back to zero, rather than trying to catch up.
                //
                // If the VM was paused for debugging, and a large
                // amount of time has elapsed until it is resumed,
                // it should simply continue at the next cycle running
                // at its usual speed.
                self.reset();
                return;
            }
        }
    }
}

/// Fixed-rate tick counter for the 60 Hz delay and sound timers.
///
/// Unlike [`Throttle`] this never discards elapsed time: it reports
/// the exact number of whole intervals that passed since the previous
/// observation and carries the remainder forward, so timer decrements
/// are neither skipped nor double-applied.
pub(crate) struct TickClock {
    last: Instant,
    interval_nanos: u64,
}

impl TickClock {
    pub(crate) fn new(interval_nanos: u64) -> Self {
        Self {
            last: Instant::now(),
            interval_nanos,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Number of whole intervals elapsed since the last call.
    ///
    /// Advances the internal baseline by exactly the reported ticks.
    pub(crate) fn tick(&mut self) -> u64 {
        let elapsed = self.last.elapsed().as_nanos() as u64;
        let ticks = whole_intervals(elapsed, self.interval_nanos);
        if ticks > 0 {
            self.last += Duration::from_nanos(ticks * self.interval_nanos);
        }
        ticks
    }
}

/// How many whole intervals fit in the elapsed time.
#[inline]
fn whole_intervals(elapsed_nanos: u64, interval_nanos: u64) -> u64 {
    if interval_nanos == 0 {
        0
    } else {
        elapsed_nanos / interval_nanos
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::TIMER_TICK_TIME;

    #[test]
    fn test_whole_intervals() {
        assert_eq!(whole_intervals(0, TIMER_TICK_TIME), 0);
        assert_eq!(whole_intervals(TIMER_TICK_TIME - 1, TIMER_TICK_TIME), 0);
        assert_eq!(whole_intervals(TIMER_TICK_TIME, TIMER_TICK_TIME), 1);
        // A long pause catches up with one decrement per elapsed interval.
        assert_eq!(whole_intervals(TIMER_TICK_TIME * 7 + 3, TIMER_TICK_TIME), 7);
        // Guard against a zero interval rather than dividing by it.
        assert_eq!(whole_intervals(12345, 0), 0);
    }

    #[test]
    fn test_tick_carries_remainder() {
        let mut clock = TickClock::new(TIMER_TICK_TIME);
        // Move the baseline into the past to simulate elapsed time.
        clock.last -= Duration::from_nanos(TIMER_TICK_TIME * 3 + TIMER_TICK_TIME / 2);

        assert_eq!(clock.tick(), 3);

        // The half interval remainder stays banked for the next tick.
        clock.last -= Duration::from_nanos(TIMER_TICK_TIME / 2);
        assert_eq!(clock.tick(), 1);
    }
}
