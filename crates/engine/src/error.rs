//! Engine error types
//!
//! Every condition here is recoverable: the loop logs and continues. The
//! variants exist so helpers can report *what* failed to their caller, which
//! decides whether the user needs to hear about it.

use core::fmt;

use sensorvote_core::params::ParamError;

use crate::device::DeviceError;

/// Errors surfaced by engine helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// A required parameter could not be read or written
    Param(ParamError),
    /// A driver rejected a configuration push
    Device(DeviceError),
    /// The ADC read returned no usable channels
    AdcRead,
    /// The barometer reference pressure could not be set
    BaroReference,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Param(e) => write!(f, "parameter access failed: {}", e),
            EngineError::Device(e) => write!(f, "driver rejected request: {}", e),
            EngineError::AdcRead => write!(f, "ADC read failed"),
            EngineError::BaroReference => write!(f, "barometer reference pressure not set"),
        }
    }
}

impl From<ParamError> for EngineError {
    fn from(e: ParamError) -> Self {
        EngineError::Param(e)
    }
}

impl From<DeviceError> for EngineError {
    fn from(e: DeviceError) -> Self {
        EngineError::Device(e)
    }
}
