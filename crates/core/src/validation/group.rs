//! Per-class validator group and best-instance election
//!
//! One group exists per sensor class (gyro, accel, mag, baro). It owns up to
//! [`SENSOR_COUNT_MAX`] validators, elects the best instance each tick and
//! records failover events for the reporter.

use libm::fabsf;

use super::validator::{DataValidator, ErrorFlags, DEFAULT_TIMEOUT_US};

/// Maximum redundant instances per sensor class.
pub const SENSOR_COUNT_MAX: usize = 3;

/// Confidence above which an instance may take over regardless of priority.
const MIN_REGULAR_CONFIDENCE: f32 = 0.9;

/// Confidences closer than this are considered tied and decided by priority.
const CONFIDENCE_TIE_BAND: f32 = 0.01;

/// Voting group over the redundant instances of one sensor class.
#[derive(Debug, Clone)]
pub struct ValidatorGroup {
    validators: [DataValidator; SENSOR_COUNT_MAX],
    used: usize,
    timeout_us: u64,
    curr_best: i32,
    failover_count: u32,
    failover_index: i32,
    failover_state: ErrorFlags,
}

impl Default for ValidatorGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorGroup {
    pub const fn new() -> Self {
        Self {
            validators: [DataValidator::new(), DataValidator::new(), DataValidator::new()],
            used: 0,
            timeout_us: DEFAULT_TIMEOUT_US,
            curr_best: -1,
            failover_count: 0,
            failover_index: -1,
            failover_state: ErrorFlags::empty(),
        }
    }

    /// Sets the timeout for every member of the group.
    ///
    /// Magnetometers run at low rates and use 300 ms; the other classes keep
    /// the validator default.
    pub fn set_timeout(&mut self, timeout_us: u64) {
        self.timeout_us = timeout_us;
        for v in &mut self.validators {
            v.set_timeout(timeout_us);
        }
    }

    /// Makes the instance at `index` a member of the group.
    ///
    /// Idempotent; indices beyond [`SENSOR_COUNT_MAX`] are ignored.
    pub fn register_instance(&mut self, index: usize) {
        if index < SENSOR_COUNT_MAX && index >= self.used {
            self.used = index + 1;
        }
    }

    /// Number of member instances.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Feeds a sample for one member instance.
    pub fn put(&mut self, index: usize, timestamp: u64, value: [f32; 3], error_count: u64, priority: u8) {
        if index >= SENSOR_COUNT_MAX {
            return;
        }
        self.register_instance(index);
        self.validators[index].put(timestamp, value, error_count, priority);
    }

    /// Elects the best member as of `now`, or -1 when no member is viable.
    ///
    /// The viable instance with the highest confidence wins; within a 1%
    /// confidence band the higher priority wins; exact ties keep the lower
    /// index. Any change of winner while an incumbent exists is recorded as
    /// a failover: the count increments and the losing validator's failure
    /// flags are captured. A capture with no flags set means the switch was
    /// soft (typically a higher-priority instance coming online), in which
    /// case the newcomer's latched bring-up glitches are cleared.
    pub fn best(&mut self, now: u64) -> i32 {
        let mut max_confidence = 0.0_f32;
        let mut max_priority = -1_i32;
        let mut max_index = -1_i32;

        for i in 0..self.used {
            let confidence = self.validators[i].confidence(now);
            let priority = self.validators[i].priority() as i32;

            if confidence <= 0.0 {
                continue;
            }

            if (max_confidence < MIN_REGULAR_CONFIDENCE && confidence >= MIN_REGULAR_CONFIDENCE)
                || (confidence > max_confidence && priority >= max_priority)
                || (fabsf(confidence - max_confidence) < CONFIDENCE_TIE_BAND
                    && priority > max_priority)
            {
                max_index = i as i32;
                max_confidence = confidence;
                max_priority = priority;
            }
        }

        if max_index != self.curr_best {
            if self.curr_best >= 0 {
                let loser = self.curr_best as usize;
                self.failover_count += 1;
                self.failover_index = self.curr_best;
                self.failover_state = self.validators[loser].state();

                if self.failover_state.is_empty() && max_index >= 0 {
                    self.validators[max_index as usize].reset_state();
                }
            }
            self.curr_best = max_index;
        }

        max_index
    }

    /// Lifetime count of winner switches. Monotone non-decreasing.
    pub fn failover_count(&self) -> u32 {
        self.failover_count
    }

    /// Index that lost the most recent switch, -1 if none occurred yet.
    pub fn failover_index(&self) -> i32 {
        self.failover_index
    }

    /// Failure flags of the loser, captured at the moment of the switch.
    pub fn failover_state(&self) -> ErrorFlags {
        self.failover_state
    }

    /// Worst per-axis rms among members that are still reporting.
    pub fn vibration_factor(&self, now: u64) -> f32 {
        let mut vibe = 0.0_f32;
        for v in &self.validators[..self.used] {
            if v.time_last() != 0 && now.saturating_sub(v.time_last()) < self.timeout_us {
                for &r in &v.rms() {
                    if r > vibe {
                        vibe = r;
                    }
                }
            }
        }
        vibe
    }

    /// Member validators, for status reporting.
    pub fn validators(&self) -> &[DataValidator] {
        &self.validators[..self.used]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(group: &mut ValidatorGroup, index: usize, from_us: u64, count: u32, priority: u8) -> u64 {
        let mut t = from_us;
        for _ in 0..count {
            t += 1000;
            group.put(index, t, [0.1, 0.2, 0.3], 0, priority);
        }
        t
    }

    #[test]
    fn test_empty_group_votes_none() {
        let mut group = ValidatorGroup::new();
        assert_eq!(group.best(1_000_000), -1);
        assert_eq!(group.failover_count(), 0);
    }

    #[test]
    fn test_single_instance_wins() {
        let mut group = ValidatorGroup::new();
        let t = feed(&mut group, 0, 0, 10, 100);
        assert_eq!(group.best(t + 500), 0);
        // initial election is not a failover
        assert_eq!(group.failover_count(), 0);
    }

    #[test]
    fn test_equal_confidence_lower_index_wins() {
        let mut group = ValidatorGroup::new();
        feed(&mut group, 0, 0, 10, 100);
        let t = feed(&mut group, 1, 0, 10, 100);
        assert_eq!(group.best(t + 500), 0);
    }

    #[test]
    fn test_higher_priority_wins_tie() {
        let mut group = ValidatorGroup::new();
        feed(&mut group, 0, 0, 10, 50);
        let t = feed(&mut group, 1, 0, 10, 200);
        assert_eq!(group.best(t + 500), 1);
    }

    #[test]
    fn test_failover_on_timeout() {
        let mut group = ValidatorGroup::new();
        let t0 = feed(&mut group, 0, 0, 10, 100);
        feed(&mut group, 1, 0, 10, 100);
        assert_eq!(group.best(t0 + 500), 0);

        // instance 0 stops; keep instance 1 alive past the timeout
        let mut t = t0;
        for _ in 0..30 {
            t += 1000;
            group.put(1, t, [0.1, 0.2, 0.3], 0, 100);
        }

        assert_eq!(group.best(t + 500), 1);
        assert_eq!(group.failover_count(), 1);
        assert_eq!(group.failover_index(), 0);
        assert!(group.failover_state().contains(ErrorFlags::TIMEOUT));
    }

    #[test]
    fn test_soft_switch_on_priority_upgrade() {
        let mut group = ValidatorGroup::new();
        let t0 = feed(&mut group, 0, 0, 10, 100);
        assert_eq!(group.best(t0 + 500), 0);

        // a higher-priority instance comes online while 0 stays healthy
        let mut t = t0;
        for _ in 0..10 {
            t += 1000;
            group.put(0, t, [0.1, 0.2, 0.3], 0, 100);
            group.put(1, t, [0.1, 0.2, 0.3], 0, 200);
        }

        assert_eq!(group.best(t + 500), 1);
        assert_eq!(group.failover_count(), 1);
        assert_eq!(group.failover_index(), 0);
        assert_eq!(group.failover_state(), ErrorFlags::empty());
    }

    #[test]
    fn test_all_dead_votes_none_and_counts_failover() {
        let mut group = ValidatorGroup::new();
        let t0 = feed(&mut group, 0, 0, 10, 100);
        assert_eq!(group.best(t0 + 500), 0);

        let late = t0 + DEFAULT_TIMEOUT_US + 1000;
        assert_eq!(group.best(late), -1);
        assert_eq!(group.failover_count(), 1);
        assert!(group.failover_state().contains(ErrorFlags::TIMEOUT));

        // no further switches while everything stays dead
        assert_eq!(group.best(late + 1000), -1);
        assert_eq!(group.failover_count(), 1);
    }

    #[test]
    fn test_failover_count_is_monotone() {
        let mut group = ValidatorGroup::new();
        let mut last = 0;
        let mut t = 0;
        for round in 0..5 {
            // alternate which instance is alive
            let alive = round % 2;
            for _ in 0..30 {
                t += 1000;
                group.put(alive, t, [0.0; 3], 0, 100);
            }
            group.best(t + 500);
            assert!(group.failover_count() >= last);
            last = group.failover_count();
        }
        assert!(last >= 1);
    }

    #[test]
    fn test_vibration_factor_tracks_noisiest_member() {
        let mut group = ValidatorGroup::new();
        let mut t = 0;
        for i in 0..500 {
            t += 1000;
            group.put(0, t, [1.0, 1.0, 1.0], 0, 100);
            let wiggle = if i % 2 == 0 { 0.8 } else { -0.8 };
            group.put(1, t, [1.0 + wiggle, 1.0, 1.0], 0, 100);
        }
        assert!(group.vibration_factor(t + 500) > 0.1);

        // once the noisy member times out it no longer contributes
        let silent = t + DEFAULT_TIMEOUT_US + 1000;
        assert_eq!(group.vibration_factor(silent), 0.0);
    }

    #[test]
    fn test_group_timeout_applies_to_members() {
        let mut group = ValidatorGroup::new();
        group.set_timeout(300_000);
        let t = feed(&mut group, 0, 0, 10, 100);
        // still alive well past the default timeout
        assert_eq!(group.best(t + 200_000), 0);
        assert_eq!(group.best(t + 300_001 + 1000), -1);
    }
}
