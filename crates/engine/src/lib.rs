//! sensorvote_engine - Redundant-sensor aggregation engine
//!
//! The engine consumes raw measurement streams from every live gyroscope,
//! accelerometer, magnetometer and barometer instance on the bus, votes a
//! best instance per class, rotates and calibrates the samples, derives
//! airspeed and battery state, and publishes one combined snapshot per gyro
//! tick.
//!
//! Platform services are injected via traits so the same engine runs against
//! the host runtime or a test harness:
//!
//! - [`bus::Bus`]: publish/subscribe transport
//! - [`device::DeviceRegistry`]: driver capability handles (calibration push,
//!   device identity, external-mag probe)
//! - [`params::ParamStore`]: shared parameter storage
//! - [`rc::RcHook`]: the RC-input collaborator
//! - `TimeSource` (from sensorvote_core): monotonic clock

#![no_std]

pub mod airdata;
pub mod bus;
pub mod device;
pub mod error;
pub mod params;
pub mod power;
pub mod rc;
pub mod task;
pub mod voted;

pub use task::SensorsTask;
