//! Instant-backed time source

use std::thread;
use std::time::{Duration, Instant};

use sensorvote_core::traits::TimeSource;

/// Monotonic clock counting from process start.
#[derive(Clone)]
pub struct HostTime {
    epoch: Instant,
}

impl HostTime {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for HostTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for HostTime {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn sleep_us(&self, us: u64) {
        thread::sleep(Duration::from_micros(us));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_advances() {
        let time = HostTime::new();
        let t0 = time.now_us();
        time.sleep_us(2_000);
        assert!(time.now_us() >= t0 + 2_000);
    }
}
