//! Sleep abstraction for the tailing loop.
//!
//! The stream reader waits through a `Sleeper` so that tests can poll an
//! idle log without real delays.

use std::time::Duration;

/// Trait for waiting between polls of the alert log.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, interval: Duration);
}

/// Sleeper backed by `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealSleeper;

impl Sleeper for RealSleeper {
    fn sleep(&self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

/// Sleeper that returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockSleeper;

impl Sleeper for MockSleeper {
    fn sleep(&self, _interval: Duration) {}
}
