//! Driver capability seam
//!
//! Calibration is pushed down to the drivers, not applied in the engine, so
//! the engine needs a narrow capability interface per device: identity,
//! scale/offset push, the external-mag probe and the barometer reference
//! pressure. Handles are acquired transiently during a parameter pass and
//! released when they go out of scope.

use core::fmt;

/// The four voted sensor classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Gyro,
    Accel,
    Mag,
    Baro,
}

impl SensorKind {
    /// Human-readable label used in reports ("Gyro sensor switch from #0").
    pub fn label(self) -> &'static str {
        match self {
            SensorKind::Gyro => "Gyro",
            SensorKind::Accel => "Accel",
            SensorKind::Mag => "Mag",
            SensorKind::Baro => "Baro",
        }
    }

    /// Lowercase name used in calibration diagnostics.
    pub fn log_name(self) -> &'static str {
        match self {
            SensorKind::Gyro => "gyro",
            SensorKind::Accel => "accel",
            SensorKind::Mag => "mag",
            SensorKind::Baro => "baro",
        }
    }

    /// Parameter name fragment: `CAL_<prefix><i>_XOFF` etc.
    pub fn cal_prefix(self) -> &'static str {
        match self {
            SensorKind::Gyro => "GYRO",
            SensorKind::Accel => "ACC",
            SensorKind::Mag => "MAG",
            SensorKind::Baro => "BARO",
        }
    }
}

/// Offset/scale calibration pushed to a driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorScale {
    pub x_offset: f32,
    pub y_offset: f32,
    pub z_offset: f32,
    pub x_scale: f32,
    pub y_scale: f32,
    pub z_scale: f32,
}

impl Default for SensorScale {
    fn default() -> Self {
        Self {
            x_offset: 0.0,
            y_offset: 0.0,
            z_offset: 0.0,
            x_scale: 1.0,
            y_scale: 1.0,
            z_scale: 1.0,
        }
    }
}

/// Driver-side failure of a capability call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The driver rejected the pushed configuration
    Rejected,
    /// The device does not implement this capability
    Unsupported,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Rejected => write!(f, "configuration rejected"),
            DeviceError::Unsupported => write!(f, "capability not supported"),
        }
    }
}

/// Capability interface of one open device.
pub trait DeviceHandle {
    /// Opaque device identity assigned by the driver. Calibration records
    /// are matched against this before being applied.
    fn device_id(&self) -> i32;

    /// Pushes offsets and scales down to the driver.
    fn apply_calibration(&mut self, scale: &SensorScale) -> Result<(), DeviceError>;

    /// Whether a magnetometer is mounted off-board. Non-mags return false.
    fn is_external_mag(&self) -> bool {
        false
    }

    /// Sets the barometer sea-level reference pressure (Pa).
    fn set_sea_level_pressure(&mut self, _pressure_pa: f32) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported)
    }

    /// Sets the differential-pressure sensor offset and scale.
    fn set_airspeed_scale(&mut self, _offset_pa: f32, _scale: f32) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported)
    }
}

/// One raw ADC conversion result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdcSample {
    pub channel: u8,
    pub raw: u16,
}

/// Maximum channels read in one ADC sweep.
pub const ADC_MAX_CHANNELS: usize = 12;

/// One-shot multi-channel ADC reader.
pub trait AdcDriver {
    /// Reads all available channels into `buf`, returning how many were
    /// filled in.
    fn read(&mut self, buf: &mut [AdcSample; ADC_MAX_CHANNELS]) -> Result<usize, DeviceError>;

    /// Channel carrying the scaled battery voltage.
    fn battery_voltage_channel(&self) -> u8;

    /// Channel carrying the battery current shunt.
    fn battery_current_channel(&self) -> u8;

    /// Channel carrying the analog airspeed sensor, when wired.
    fn airspeed_channel(&self) -> Option<u8> {
        None
    }
}

/// Factory for transient device handles and the long-lived ADC.
pub trait DeviceRegistry {
    type Handle<'a>: DeviceHandle
    where
        Self: 'a;
    type Adc: AdcDriver;

    /// Opens the `slot`-th device of a class; `None` when that driver is not
    /// running.
    fn open(&mut self, kind: SensorKind, slot: usize) -> Option<Self::Handle<'_>>;

    /// Opens the ADC once at bring-up. `None` disables power monitoring and
    /// analog airspeed.
    fn open_adc(&mut self) -> Option<Self::Adc>;

    /// Opens the (optional) differential-pressure driver.
    fn open_airspeed(&mut self) -> Option<Self::Handle<'_>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_and_prefixes() {
        assert_eq!(SensorKind::Gyro.label(), "Gyro");
        assert_eq!(SensorKind::Accel.cal_prefix(), "ACC");
        assert_eq!(SensorKind::Mag.cal_prefix(), "MAG");
    }

    #[test]
    fn test_default_scale_is_identity() {
        let scale = SensorScale::default();
        assert_eq!(scale.x_offset, 0.0);
        assert_eq!(scale.z_scale, 1.0);
    }
}
