// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! One-shot and auto-resetting timeouts over a [`Clock`].

use crate::platform::Clock;

/// A timeout as a single comparison against the tick counter. There is no
/// cancellation; "reset" recomputes the target tick.
pub struct SimpleTimer {
    wait_time: u64,
    target_time: u64,
    auto_reset: bool,
    has_elapsed: bool,
}

impl SimpleTimer {
    pub fn start(clock: &impl Clock, wait_time: u64, auto_reset: bool) -> Self {
        SimpleTimer {
            wait_time,
            target_time: clock.ticks() + wait_time,
            auto_reset,
            has_elapsed: false,
        }
    }

    /// Whether the window has elapsed. A one-shot timer reports this once;
    /// an auto-resetting timer re-arms itself, compensating for the drift
    /// between the target and the tick at which it was observed.
    pub fn has_elapsed(&mut self, clock: &impl Clock) -> bool {
        if self.has_elapsed {
            return false;
        }
        let now = clock.ticks();
        let elapsed = now >= self.target_time;
        if elapsed {
            if self.auto_reset {
                let drift = now - self.target_time;
                self.target_time = (now + self.wait_time) - drift;
            } else {
                self.has_elapsed = true;
            }
        }
        elapsed
    }

    /// Re-arm the full window from the current tick.
    pub fn reset(&mut self, clock: &impl Clock) {
        self.target_time = clock.ticks() + self.wait_time;
        self.has_elapsed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct TestClock(Cell<u64>);

    impl Clock for TestClock {
        fn ticks(&self) -> u64 {
            self.0.get()
        }
    }

    #[test]
    fn one_shot_fires_once() {
        let clock = TestClock(Cell::new(0));
        let mut timer = SimpleTimer::start(&clock, 100, false);
        assert!(!timer.has_elapsed(&clock));
        clock.0.set(99);
        assert!(!timer.has_elapsed(&clock));
        clock.0.set(100);
        assert!(timer.has_elapsed(&clock));
        clock.0.set(1000);
        assert!(!timer.has_elapsed(&clock));
    }

    #[test]
    fn reset_rearms_the_window() {
        let clock = TestClock(Cell::new(0));
        let mut timer = SimpleTimer::start(&clock, 100, false);
        clock.0.set(150);
        assert!(timer.has_elapsed(&clock));
        timer.reset(&clock);
        assert!(!timer.has_elapsed(&clock));
        clock.0.set(249);
        assert!(!timer.has_elapsed(&clock));
        clock.0.set(250);
        assert!(timer.has_elapsed(&clock));
    }

    #[test]
    fn auto_reset_compensates_drift() {
        let clock = TestClock(Cell::new(0));
        let mut timer = SimpleTimer::start(&clock, 100, true);
        clock.0.set(105);
        assert!(timer.has_elapsed(&clock));
        // Next window is anchored at the original target, not at 105.
        clock.0.set(199);
        assert!(!timer.has_elapsed(&clock));
        clock.0.set(200);
        assert!(timer.has_elapsed(&clock));
    }
}
