//! Capped exponential backoff (spec §4.4, §9): "base 1-10 ms, cap 50 ms,
//! factor 1.25-1.5" for retrying `NotReady`/`DeviceBusy` responses and
//! transient `None` (no-response) reads.

use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    factor: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, factor: f64) -> Self {
        Backoff {
            next: base,
            max,
            factor,
        }
    }

    /// The default policy named in spec §4.4: base 5 ms, cap 50 ms,
    /// factor 1.5.
    pub fn default_policy() -> Self {
        Backoff::new(Duration::from_millis(5), Duration::from_millis(50), 1.5)
    }

    /// Current delay, without advancing.
    pub fn current(&self) -> Duration {
        self.next
    }

    /// Advance to the next, larger delay (capped).
    pub fn step(&mut self) {
        let scaled = self.next.as_secs_f64() * self.factor;
        let capped = scaled.min(self.max.as_secs_f64());
        self.next = Duration::from_secs_f64(capped);
    }

    pub fn sleep_and_step(&mut self) {
        std::thread::sleep(self.next);
        self.step();
    }
}

/// A deadline-aware sleeper: sleeps for the current backoff, but never
/// past `deadline`. Returns `false` if the deadline has already passed
/// (so the caller should give up rather than sleep at all).
pub fn backoff_until(backoff: &mut Backoff, deadline: Instant) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return false;
    }
    let remaining = deadline - now;
    let delay = backoff.current().min(remaining);
    std::thread::sleep(delay);
    backoff.step();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let mut b = Backoff::new(Duration::from_millis(1), Duration::from_millis(10), 2.0);
        assert_eq!(b.current(), Duration::from_millis(1));
        b.step();
        assert_eq!(b.current(), Duration::from_millis(2));
        b.step();
        assert_eq!(b.current(), Duration::from_millis(4));
        b.step();
        assert_eq!(b.current(), Duration::from_millis(8));
        b.step();
        // would be 16ms, capped at 10ms
        assert_eq!(b.current(), Duration::from_millis(10));
        b.step();
        assert_eq!(b.current(), Duration::from_millis(10));
    }
}
