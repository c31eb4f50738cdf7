//! Minimum-interval pacing for remote calls.
//!
//! A [`Pacer`] is an explicit value owned by whoever issues remote calls.
//! Time is read and spent through a [`Clock`] so tests can substitute a
//! fake clock and observe the waits without sleeping.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Source of time and sleeping.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Enforces a minimum delay between the starts of consecutive calls.
///
/// Single-threaded: the pipeline issues at most one call at a time.
#[derive(Debug)]
pub struct Pacer<C> {
    clock: C,
    interval: Duration,
    last_call: Cell<Option<Instant>>,
}

impl<C: Clock> Pacer<C> {
    pub fn new(interval: Duration, clock: C) -> Self {
        Self {
            clock,
            interval,
            last_call: Cell::new(None),
        }
    }

    /// Pacer allowing at most `calls_per_second` call starts per second.
    ///
    /// Non-finite or non-positive rates disable pacing.
    pub fn per_second(calls_per_second: f64, clock: C) -> Self {
        let interval = if calls_per_second.is_finite() && calls_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / calls_per_second)
        } else {
            Duration::ZERO
        };
        Self::new(interval, clock)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until the next call may start, then mark it started.
    ///
    /// Returns how long it waited.
    pub fn pace(&self) -> Duration {
        let mut waited = Duration::ZERO;
        if let Some(last) = self.last_call.get() {
            let elapsed = self.clock.now().saturating_duration_since(last);
            if elapsed < self.interval {
                waited = self.interval - elapsed;
                self.clock.sleep(waited);
            }
        }
        self.last_call.set(Some(self.clock.now()));
        waited
    }

    /// Sleep through the pacer's clock (used for retry backoff).
    pub fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration);
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Clock that only moves when slept on (or advanced explicitly).
    pub struct FakeClock {
        now: Cell<Instant>,
        pub sleeps: RefCell<Vec<Duration>>,
    }

    impl FakeClock {
        pub fn new() -> Self {
            Self {
                now: Cell::new(Instant::now()),
                sleeps: RefCell::new(Vec::new()),
            }
        }

        pub fn advance(&self, d: Duration) {
            self.now.set(self.now.get() + d);
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.now.get()
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
            self.advance(duration);
        }
    }

    #[test]
    fn first_call_does_not_wait() {
        let clock = FakeClock::new();
        let pacer = Pacer::per_second(2.0, &clock);
        assert_eq!(pacer.pace(), Duration::ZERO);
        assert!(clock.sleeps.borrow().is_empty());
    }

    #[test]
    fn back_to_back_calls_wait_full_interval() {
        let clock = FakeClock::new();
        let pacer = Pacer::per_second(4.0, &clock);
        pacer.pace();
        assert_eq!(pacer.pace(), Duration::from_millis(250));
        assert_eq!(pacer.pace(), Duration::from_millis(250));
        assert_eq!(clock.sleeps.borrow().len(), 2);
    }

    #[test]
    fn elapsed_time_is_credited() {
        let clock = FakeClock::new();
        let pacer = Pacer::new(Duration::from_millis(300), &clock);
        pacer.pace();
        clock.advance(Duration::from_millis(100));
        assert_eq!(pacer.pace(), Duration::from_millis(200));
        clock.advance(Duration::from_secs(1));
        assert_eq!(pacer.pace(), Duration::ZERO);
    }

    #[test]
    fn call_starts_never_closer_than_interval() {
        let clock = FakeClock::new();
        let pacer = Pacer::per_second(3.0, &clock);
        let mut starts = Vec::new();
        for i in 0..10 {
            clock.advance(Duration::from_millis(i * 37));
            pacer.pace();
            starts.push(clock.now());
        }
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= pacer.interval());
        }
    }

    #[test]
    fn zero_rate_disables_pacing() {
        let clock = FakeClock::new();
        let pacer = Pacer::per_second(0.0, &clock);
        pacer.pace();
        assert_eq!(pacer.pace(), Duration::ZERO);
    }
}
