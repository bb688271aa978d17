//! Per-instance sample stream validator
//!
//! Scores one sensor instance's stream for staleness, timeout, error-count
//! trend and error density, and keeps the running signal statistics used for
//! vibration surveillance.

use bitflags::bitflags;
use libm::{fabsf, sqrtf};

/// Default timeout after which a silent stream has zero confidence.
pub const DEFAULT_TIMEOUT_US: u64 = 20_000;

/// Number of identical timestamps in a row before data counts as stale.
const VALUE_EQUAL_COUNT_MAX: u32 = 100;

/// Absolute driver error count above which the stream is rejected outright.
const ERRCOUNT_LIMIT: u64 = 10_000;

/// Window (in samples) over which the error density is accumulated.
const ERROR_DENSITY_WINDOW: f32 = 100.0;

bitflags! {
    /// Reasons a validator considers its stream degraded.
    ///
    /// An empty set means the stream is healthy; the group captures the
    /// losing validator's flags when an election switches winners.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ErrorFlags: u32 {
        /// Never received a sample.
        const NO_DATA = 1 << 0;
        /// Same timestamp repeated across many ticks.
        const STALE_DATA = 1 << 1;
        /// No update within the timeout interval.
        const TIMEOUT = 1 << 2;
        /// Absolute error count above limit.
        const HIGH_ERRCOUNT = 1 << 3;
        /// Errors accumulating faster than samples.
        const HIGH_ERRDENSITY = 1 << 4;
    }
}

/// Rolling statistics and confidence scoring for one sensor instance.
#[derive(Debug, Clone)]
pub struct DataValidator {
    error_mask: ErrorFlags,
    time_last: u64,
    timeout_interval: u64,
    event_count: u64,
    error_count: u64,
    error_density: f32,
    priority: u8,
    mean: [f32; 3],
    lp: [f32; 3],
    m2: [f32; 3],
    rms: [f32; 3],
    value: [f32; 3],
    vibe: [f32; 3],
    value_equal_count: u32,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataValidator {
    pub const fn new() -> Self {
        Self {
            error_mask: ErrorFlags::empty(),
            time_last: 0,
            timeout_interval: DEFAULT_TIMEOUT_US,
            event_count: 0,
            error_count: 0,
            error_density: 0.0,
            priority: 0,
            mean: [0.0; 3],
            lp: [0.0; 3],
            m2: [0.0; 3],
            rms: [0.0; 3],
            value: [0.0; 3],
            vibe: [0.0; 3],
            value_equal_count: 0,
        }
    }

    /// Overrides the timeout interval in microseconds.
    pub fn set_timeout(&mut self, timeout_interval_us: u64) {
        self.timeout_interval = timeout_interval_us;
    }

    /// Feeds one sample into the running statistics.
    ///
    /// `error_count` is the driver's monotone error counter; an advance
    /// faster than the sample rate raises the error density.
    pub fn put(&mut self, timestamp: u64, value: [f32; 3], error_count: u64, priority: u8) {
        self.event_count += 1;

        if error_count > self.error_count {
            self.error_density += (error_count - self.error_count) as f32;
        } else if self.error_density > 0.0 {
            self.error_density -= 1.0;
        }

        self.error_count = error_count;
        self.priority = priority;

        if self.time_last == timestamp {
            self.value_equal_count += 1;
        } else {
            self.value_equal_count = 0;
        }

        for i in 0..3 {
            // track the DC component and validate the high-frequency residual
            self.lp[i] = self.lp[i] * 0.99 + 0.01 * value[i];

            let lp_val = value[i] - self.lp[i];
            let delta = lp_val - self.mean[i];
            self.mean[i] += delta / self.event_count as f32;
            self.m2[i] += delta * (lp_val - self.mean[i]);

            if self.event_count > 1 {
                self.rms[i] = sqrtf(self.m2[i] / (self.event_count - 1) as f32);
            }

            self.vibe[i] = self.vibe[i] * 0.99 + 0.01 * fabsf(lp_val);
            self.value[i] = value[i];
        }

        self.time_last = timestamp;
    }

    /// Returns the confidence of this stream in `[0, 1]` as of `now`.
    ///
    /// Confidence is zero when the stream never produced data, timed out,
    /// went stale or exceeded the absolute error-count limit; otherwise it
    /// degrades linearly with the recent error density. Failure reasons are
    /// latched into the error mask for the failover reporter.
    pub fn confidence(&mut self, now: u64) -> f32 {
        let mut ret = 1.0;

        if self.time_last == 0 {
            self.error_mask |= ErrorFlags::NO_DATA;
            ret = 0.0;
        } else if now.saturating_sub(self.time_last) > self.timeout_interval {
            self.error_mask |= ErrorFlags::TIMEOUT;
            ret = 0.0;
        } else if self.value_equal_count > VALUE_EQUAL_COUNT_MAX {
            self.error_mask |= ErrorFlags::STALE_DATA;
            ret = 0.0;
        } else if self.error_count > ERRCOUNT_LIMIT {
            self.error_mask |= ErrorFlags::HIGH_ERRCOUNT;
            ret = 0.0;
        } else if self.error_density > ERROR_DENSITY_WINDOW {
            self.error_mask |= ErrorFlags::HIGH_ERRDENSITY;
            self.error_density = ERROR_DENSITY_WINDOW;
        }

        if ret > 0.0 {
            ret = 1.0 - self.error_density / ERROR_DENSITY_WINDOW;

            if ret > 0.0 && self.error_mask == ErrorFlags::HIGH_ERRDENSITY {
                // the density decayed back below the window; only this
                // developing flag may clear, hard failures stay latched
                self.error_mask = ErrorFlags::empty();
            }
        }

        ret
    }

    /// Clears the latched failure reasons and the stale-sample run.
    ///
    /// Used when a hot-plugged higher-priority instance takes over and its
    /// bring-up glitches should not count against it.
    pub fn reset_state(&mut self) {
        self.error_mask = ErrorFlags::empty();
        self.value_equal_count = 0;
        self.error_density = 0.0;
    }

    /// Latched failure reasons.
    pub fn state(&self) -> ErrorFlags {
        self.error_mask
    }

    /// Timestamp of the most recent sample, 0 if none.
    pub fn time_last(&self) -> u64 {
        self.time_last
    }

    /// Most recent sample vector.
    pub fn value(&self) -> [f32; 3] {
        self.value
    }

    /// Per-axis rms of the high-frequency residual.
    pub fn rms(&self) -> [f32; 3] {
        self.rms
    }

    /// Filtered absolute high-frequency residual per axis.
    pub fn vibration_offset(&self) -> [f32; 3] {
        self.vibe
    }

    /// Priority reported with the latest sample.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Driver error count as of the latest sample.
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Number of samples consumed.
    pub fn event_count(&self) -> u64 {
        self.event_count
    }
}
