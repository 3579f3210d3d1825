//! Monotonic clock shared by the gate and the sampling loop.

use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
    /// Blocks the calling thread.
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
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

/// Virtual clock for tests: `sleep` advances time instantly.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    epoch: Instant,
    now: std::cell::Cell<Instant>,
    slept: std::cell::RefCell<Vec<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        let epoch = Instant::now();
        Self {
            epoch,
            now: std::cell::Cell::new(epoch),
            slept: std::cell::RefCell::new(Vec::new()),
        }
    }

    pub fn epoch(&self) -> Instant {
        self.epoch
    }

    pub fn elapsed(&self) -> Duration {
        self.now.get() - self.epoch
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.borrow().clone()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
        self.advance(duration);
    }
}
