//! Per-class sensor instance state
//!
//! Each voted class (gyro, accel, mag, baro) keeps up to
//! [`SENSOR_COUNT_MAX`] instance slots: the bus subscription, the publisher
//! priority, the cached processed sample and the timestamps needed to
//! synthesize integration intervals and relative timestamps.

use sensorvote_core::validation::{ValidatorGroup, SENSOR_COUNT_MAX};

use crate::bus::{Bus, BusMessage, SubHandle};

/// Rotated, unit-converted sample cached per instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachedSample {
    pub value: [f32; 3],
    /// Integration interval in seconds; > 0 once the instance produced data.
    pub integral_dt: f32,
}

/// State of one voted sensor class.
pub struct SensorClassState<M: BusMessage> {
    pub subscriptions: [Option<SubHandle<M>>; SENSOR_COUNT_MAX],
    pub priority: [u8; SENSOR_COUNT_MAX],
    /// Index currently elected by the voter.
    pub last_best_vote: usize,
    pub subscription_count: usize,
    pub voter: ValidatorGroup,
    /// Failover count already reported, for edge detection.
    pub last_failover_count: u32,
    /// Latest processed sample per instance.
    pub data: [CachedSample; SENSOR_COUNT_MAX],
    /// Previous raw timestamp per instance, for dt synthesis. Kept separate
    /// from `last_timestamp` so electing a best never corrupts dt tracking.
    pub prev_timestamp: [u64; SENSOR_COUNT_MAX],
    /// Latest raw timestamp per instance, for relative timestamps.
    pub last_timestamp: [u64; SENSOR_COUNT_MAX],
}

impl<M: BusMessage> Default for SensorClassState<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: BusMessage> SensorClassState<M> {
    pub fn new() -> Self {
        Self {
            subscriptions: [None, None, None],
            priority: [0; SENSOR_COUNT_MAX],
            last_best_vote: 0,
            subscription_count: 0,
            voter: ValidatorGroup::new(),
            last_failover_count: 0,
            data: [CachedSample::default(); SENSOR_COUNT_MAX],
            prev_timestamp: [0; SENSOR_COUNT_MAX],
            last_timestamp: [0; SENSOR_COUNT_MAX],
        }
    }

    /// Adopts every instance currently advertised on the bus.
    ///
    /// Idempotent: slots that are already bound stay untouched, so this can
    /// run periodically to pick up hot-plugged sensors. Instances never
    /// leave until [`Self::deinit`].
    pub fn init_instances<B: Bus>(&mut self, bus: &mut B) {
        let mut group_count = bus.group_count::<M>();
        if group_count > SENSOR_COUNT_MAX {
            group_count = SENSOR_COUNT_MAX;
        }

        for i in 0..group_count {
            if self.subscriptions[i].is_none() {
                if let Some(sub) = bus.subscribe::<M>(i) {
                    self.priority[i] = bus.priority(&sub);
                    self.voter.register_instance(i);
                    self.subscriptions[i] = Some(sub);
                }
            }
        }

        self.subscription_count = group_count;
    }

    /// Subscription of the currently elected instance.
    pub fn best_subscription(&self) -> Option<&SubHandle<M>> {
        self.subscriptions[self.last_best_vote].as_ref()
    }

    /// Releases every subscription.
    pub fn deinit<B: Bus>(&mut self, bus: &mut B) {
        for slot in &mut self.subscriptions {
            if let Some(sub) = slot.take() {
                bus.unsubscribe(sub);
            }
        }
        self.subscription_count = 0;
    }
}
