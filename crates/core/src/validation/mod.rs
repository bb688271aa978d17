//! Sensor-stream validation and redundant-instance voting
//!
//! Each live sensor instance is scored by a [`DataValidator`] which tracks
//! staleness, timeouts, error-count trends and signal variance and condenses
//! them into a confidence in `[0, 1]`. A [`ValidatorGroup`] holds one
//! validator per instance of a sensor class and elects the best instance
//! each tick, keeping failover bookkeeping for the reporter.

pub mod group;
pub mod validator;

pub use group::{ValidatorGroup, SENSOR_COUNT_MAX};
pub use validator::{DataValidator, ErrorFlags, DEFAULT_TIMEOUT_US};
