//! Abstract publish/subscribe transport
//!
//! The engine never talks to drivers directly; every measurement stream and
//! every outbound product goes through this seam. Multi-instance topics
//! (one per physical sensor) are addressed by an instance index; the engine
//! bounds its fan-in to [`SENSOR_COUNT_MAX`] instances per class.
//!
//! The host crate provides the in-memory implementation; tests provide
//! scripted ones.

use core::marker::PhantomData;

use sensorvote_core::msg::{
    AccelSample, ActuatorControls, Airspeed, BaroSample, BatteryStatus, DifferentialPressure,
    GyroSample, MagSample, ParameterUpdate, SensorCombined, VehicleControlMode,
};

pub use sensorvote_core::validation::SENSOR_COUNT_MAX;

/// A payload type bound to a named topic.
pub trait BusMessage: Clone + Send + 'static {
    /// Topic name, unique per payload type.
    const TOPIC: &'static str;
}

macro_rules! bus_message {
    ($ty:ty, $topic:literal) => {
        impl BusMessage for $ty {
            const TOPIC: &'static str = $topic;
        }
    };
}

bus_message!(GyroSample, "sensor_gyro");
bus_message!(AccelSample, "sensor_accel");
bus_message!(MagSample, "sensor_mag");
bus_message!(BaroSample, "sensor_baro");
bus_message!(DifferentialPressure, "differential_pressure");
bus_message!(VehicleControlMode, "vehicle_control_mode");
bus_message!(ParameterUpdate, "parameter_update");
bus_message!(ActuatorControls, "actuator_controls_0");
bus_message!(SensorCombined, "sensor_combined");
bus_message!(Airspeed, "airspeed");
bus_message!(BatteryStatus, "battery_status");

/// Typed handle for one subscription to one topic instance.
#[derive(Debug)]
pub struct SubHandle<M: BusMessage> {
    instance: usize,
    slot: usize,
    _marker: PhantomData<M>,
}

impl<M: BusMessage> SubHandle<M> {
    /// Creates a handle; called by bus implementations only.
    pub fn new(instance: usize, slot: usize) -> Self {
        Self {
            instance,
            slot,
            _marker: PhantomData,
        }
    }

    /// Topic instance this handle is bound to.
    pub fn instance(&self) -> usize {
        self.instance
    }

    /// Implementation-defined subscriber slot.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Outcome of a bounded wait on a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// New data arrived within the timeout.
    Updated,
    /// The timeout elapsed without new data.
    TimedOut,
    /// The handle is not (or no longer) backed by a publisher.
    NoSubscription,
}

/// Publish/subscribe transport the engine runs against.
pub trait Bus {
    /// Number of live instances advertising the topic.
    fn group_count<M: BusMessage>(&self) -> usize;

    /// Subscribes to one topic instance. Returns `None` when the instance
    /// does not exist.
    fn subscribe<M: BusMessage>(&mut self, instance: usize) -> Option<SubHandle<M>>;

    /// Priority advertised by the publisher of this instance.
    fn priority<M: BusMessage>(&self, sub: &SubHandle<M>) -> u8;

    /// Whether the instance published since the last `copy` on this handle.
    fn updated<M: BusMessage>(&self, sub: &SubHandle<M>) -> bool;

    /// Returns the latest payload and clears this handle's updated flag.
    /// `None` when nothing was ever published.
    fn copy<M: BusMessage>(&mut self, sub: &SubHandle<M>) -> Option<M>;

    /// Publishes onto a specific topic instance, advertising it if needed.
    fn publish_instance<M: BusMessage>(&mut self, instance: usize, msg: &M);

    /// Publishes onto instance 0.
    fn publish<M: BusMessage>(&mut self, msg: &M) {
        self.publish_instance(0, msg);
    }

    /// Blocks until the instance publishes or the timeout elapses.
    fn wait<M: BusMessage>(&self, sub: &SubHandle<M>, timeout_us: u64) -> WaitResult;

    /// Releases a subscription.
    fn unsubscribe<M: BusMessage>(&mut self, sub: SubHandle<M>);
}
