//! Bus message payloads
//!
//! Plain-data structs exchanged over the bus. Inbound samples mirror what
//! the drivers publish per instance; [`SensorCombined`] is the voted,
//! rotated, calibrated snapshot the engine publishes each gyro tick.

/// One gyroscope sample (rad/s), optionally with the driver-side integral.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroSample {
    /// Monotonic timestamp in microseconds; 0 marks an invalid sample.
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Integral of the rate over `integral_dt`, when the driver provides it.
    pub integral: Option<SampleIntegral>,
    /// Driver error counter, monotone within a session.
    pub error_count: u64,
}

/// One accelerometer sample (m/s^2), optionally with the driver-side integral.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AccelSample {
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub integral: Option<SampleIntegral>,
    pub error_count: u64,
}

/// Driver-integrated signal over a known interval.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleIntegral {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Integration interval in microseconds. 0 invalidates the integral.
    pub dt_us: u32,
}

/// One magnetometer sample (gauss). Magnetometers have no integrated form.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MagSample {
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub error_count: u64,
}

/// One barometer sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BaroSample {
    pub timestamp: u64,
    /// Barometric altitude above the QNH reference (m).
    pub altitude: f32,
    /// Sensor die temperature (degC).
    pub temperature: f32,
    /// Static pressure (hPa).
    pub pressure: f32,
    pub error_count: u64,
}

/// Differential pressure from a pitot sensor (or synthesized from an analog
/// channel, in which case `temperature` carries the -1000 sentinel).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DifferentialPressure {
    pub timestamp: u64,
    pub differential_pressure_raw_pa: f32,
    pub differential_pressure_filtered_pa: f32,
    pub temperature: f32,
    pub error_count: u64,
}

/// Vehicle control-mode flags the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VehicleControlMode {
    pub timestamp: u64,
    pub flag_system_hil_enabled: bool,
    pub flag_armed: bool,
}

/// Parameter-change notification. The payload only clears the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterUpdate {
    pub timestamp: u64,
}

/// Actuator controls group 0; only the throttle index is consumed here.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActuatorControls {
    pub timestamp: u64,
    pub control: [f32; 8],
}

impl ActuatorControls {
    pub const INDEX_THROTTLE: usize = 3;
}

/// The voted, rotated and calibrated combined snapshot.
///
/// `timestamp` is the best gyro's sample time; the other classes carry
/// signed microsecond offsets relative to it, which may be negative when
/// their best sample predates the gyro's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorCombined {
    pub timestamp: u64,
    /// Angular rate in body frame (rad/s).
    pub gyro_rad: [f32; 3],
    /// Gyro integration interval (s). > 0 whenever `gyro_rad` is written.
    pub gyro_integral_dt: f32,
    pub accelerometer_timestamp_relative: i32,
    /// Acceleration in body frame (m/s^2).
    pub accelerometer_m_s2: [f32; 3],
    /// Accel integration interval (s). > 0 whenever the field is written.
    pub accelerometer_integral_dt: f32,
    pub magnetometer_timestamp_relative: i32,
    /// Magnetic field in body frame (gauss).
    pub magnetometer_ga: [f32; 3],
    pub baro_timestamp_relative: i32,
    pub baro_alt_meter: f32,
    pub baro_temp_celsius: f32,
}

impl SensorCombined {
    /// Sentinel for a relative timestamp that was never filled in.
    pub const RELATIVE_TIMESTAMP_INVALID: i32 = i32::MIN;
}

impl Default for SensorCombined {
    fn default() -> Self {
        Self {
            timestamp: 0,
            gyro_rad: [0.0; 3],
            gyro_integral_dt: 0.0,
            accelerometer_timestamp_relative: Self::RELATIVE_TIMESTAMP_INVALID,
            accelerometer_m_s2: [0.0; 3],
            accelerometer_integral_dt: 0.0,
            magnetometer_timestamp_relative: Self::RELATIVE_TIMESTAMP_INVALID,
            magnetometer_ga: [0.0; 3],
            baro_timestamp_relative: Self::RELATIVE_TIMESTAMP_INVALID,
            baro_alt_meter: 0.0,
            baro_temp_celsius: 0.0,
        }
    }
}

/// Derived airspeed measurements.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Airspeed {
    pub timestamp: u64,
    pub indicated_airspeed_m_s: f32,
    pub true_airspeed_m_s: f32,
    pub true_airspeed_unfiltered_m_s: f32,
    /// Confidence of the differential-pressure stream in [0, 1].
    pub confidence: f32,
    pub air_temperature_celsius: f32,
}

/// Battery warning levels, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryWarning {
    #[default]
    None,
    Low,
    Critical,
}

/// Battery state as estimated from ADC voltage/current readings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatteryStatus {
    pub timestamp: u64,
    pub voltage_v: f32,
    pub voltage_filtered_v: f32,
    pub current_a: f32,
    pub current_filtered_a: f32,
    pub discharged_mah: f32,
    /// Remaining charge fraction in [0, 1].
    pub remaining: f32,
    pub warning: BatteryWarning,
    pub connected: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_default_has_invalid_relatives() {
        let raw = SensorCombined::default();
        assert_eq!(raw.timestamp, 0);
        assert_eq!(
            raw.accelerometer_timestamp_relative,
            SensorCombined::RELATIVE_TIMESTAMP_INVALID
        );
        assert_eq!(
            raw.magnetometer_timestamp_relative,
            SensorCombined::RELATIVE_TIMESTAMP_INVALID
        );
        assert_eq!(
            raw.baro_timestamp_relative,
            SensorCombined::RELATIVE_TIMESTAMP_INVALID
        );
    }

    #[test]
    fn test_throttle_index() {
        let mut ctrl = ActuatorControls::default();
        ctrl.control[ActuatorControls::INDEX_THROTTLE] = 0.7;
        assert_eq!(ctrl.control[3], 0.7);
    }
}
