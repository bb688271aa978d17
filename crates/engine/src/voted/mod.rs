//! Voted sensor aggregation
//!
//! Owns the four class states, pulls fresh samples from every live instance,
//! rotates them into body frame, feeds the voters and copies each class's
//! elected best into the combined snapshot. Also hosts the failover reporter
//! and the vibration monitor, which observe the voters.

pub mod calibration;
pub mod class;

use log::{error, info};
use nalgebra::{Matrix3, Vector3};

use sensorvote_core::msg::{
    AccelSample, BaroSample, GyroSample, MagSample, SensorCombined,
};
use sensorvote_core::validation::{ErrorFlags, SENSOR_COUNT_MAX};

use crate::bus::{Bus, BusMessage, SubHandle};
use crate::device::SensorKind;

use self::class::SensorClassState;

/// Debounce window before a sustained vibration level latches the warning.
const VIBRATION_WARNING_DELAY_US: u64 = 10_000_000;

/// Bootstrap delta for the very first sample of an instance, when no
/// previous timestamp exists to synthesize dt from.
const FIRST_SAMPLE_DT_US: u64 = 1000;

/// The voted-sensor aggregation block.
pub struct VotedSensors {
    pub gyro: SensorClassState<GyroSample>,
    pub accel: SensorClassState<AccelSample>,
    pub mag: SensorClassState<MagSample>,
    pub baro: SensorClassState<BaroSample>,

    /// Board mounting orientation (including the fine-tuning offset).
    board_rotation: Matrix3<f32>,
    /// Per-magnetometer orientation; equals `board_rotation` for internal
    /// mags.
    mag_rotation: [Matrix3<f32>; SENSOR_COUNT_MAX],

    baro_temperature: [f32; SENSOR_COUNT_MAX],
    baro_pressure: [f32; SENSOR_COUNT_MAX],
    /// Static pressure (hPa) of the elected barometer, for airspeed.
    last_best_baro_pressure: f32,

    vibration_warning_timestamp: u64,
    vibration_warning: bool,

    /// Slots where calibration was fully applied, per class.
    gyro_calibration_count: usize,
    accel_calibration_count: usize,
    mag_calibration_count: usize,
}

impl Default for VotedSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl VotedSensors {
    pub fn new() -> Self {
        let mut this = Self {
            gyro: SensorClassState::new(),
            accel: SensorClassState::new(),
            mag: SensorClassState::new(),
            baro: SensorClassState::new(),
            board_rotation: Matrix3::identity(),
            mag_rotation: [Matrix3::identity(); SENSOR_COUNT_MAX],
            baro_temperature: [0.0; SENSOR_COUNT_MAX],
            baro_pressure: [0.0; SENSOR_COUNT_MAX],
            last_best_baro_pressure: 0.0,
            vibration_warning_timestamp: 0,
            vibration_warning: false,
            gyro_calibration_count: 0,
            accel_calibration_count: 0,
            mag_calibration_count: 0,
        };
        // magnetometers publish at low rates
        this.mag.voter.set_timeout(300_000);
        this
    }

    /// Adopts all currently advertised instances of every class.
    pub fn initialize_sensors<B: Bus>(&mut self, bus: &mut B) {
        self.gyro.init_instances(bus);
        self.accel.init_instances(bus);
        self.mag.init_instances(bus);
        self.baro.init_instances(bus);
    }

    /// Releases every class subscription.
    pub fn deinit<B: Bus>(&mut self, bus: &mut B) {
        self.gyro.deinit(bus);
        self.accel.deinit(bus);
        self.mag.deinit(bus);
        self.baro.deinit(bus);
    }

    /// Static pressure (hPa) of the latest elected barometer.
    pub fn baro_pressure(&self) -> f32 {
        self.last_best_baro_pressure
    }

    /// Number of adopted gyro instances.
    pub fn num_gyros(&self) -> usize {
        self.gyro.subscription_count
    }

    /// Polls every class in the contractual order.
    pub fn sensors_poll<B: Bus>(&mut self, bus: &mut B, now: u64, raw: &mut SensorCombined) {
        self.gyro_poll(bus, now, raw);
        self.accel_poll(bus, now, raw);
        self.mag_poll(bus, now, raw);
        self.baro_poll(bus, now, raw);
    }

    /// Polls the gyroscopes. The elected gyro also paces the snapshot: its
    /// raw timestamp becomes the snapshot timestamp.
    pub fn gyro_poll<B: Bus>(&mut self, bus: &mut B, now: u64, raw: &mut SensorCombined) {
        let mut got_update = false;

        for i in 0..self.gyro.subscription_count {
            let Some(sub) = self.gyro.subscriptions[i].as_ref() else {
                continue;
            };
            if !bus.updated(sub) {
                continue;
            }
            let Some(report) = bus.copy(sub) else {
                continue;
            };
            if report.timestamp == 0 {
                continue; // ignore invalid data
            }

            got_update = true;

            match report.integral {
                Some(integral) if integral.dt_us != 0 => {
                    let rotated =
                        self.board_rotation * Vector3::new(integral.x, integral.y, integral.z);
                    let dt = integral.dt_us as f32 / 1e6;
                    self.gyro.data[i].integral_dt = dt;
                    self.gyro.data[i].value = [rotated.x / dt, rotated.y / dt, rotated.z / dt];
                }
                _ => {
                    // the integral is the preferred choice; fall back to the
                    // instantaneous value and synthesize dt from timestamps
                    let rotated = self.board_rotation * Vector3::new(report.x, report.y, report.z);
                    if self.gyro.prev_timestamp[i] == 0 {
                        self.gyro.prev_timestamp[i] =
                            report.timestamp.saturating_sub(FIRST_SAMPLE_DT_US);
                    }
                    self.gyro.data[i].integral_dt =
                        (report.timestamp - self.gyro.prev_timestamp[i]) as f32 / 1e6;
                    self.gyro.data[i].value = [rotated.x, rotated.y, rotated.z];
                }
            }

            self.gyro.prev_timestamp[i] = report.timestamp;
            self.gyro.last_timestamp[i] = report.timestamp;
            self.gyro.voter.put(
                i,
                report.timestamp,
                self.gyro.data[i].value,
                report.error_count,
                self.gyro.priority[i],
            );
        }

        if got_update {
            let best = self.gyro.voter.best(now);
            if best >= 0 {
                let best = best as usize;
                raw.gyro_rad = self.gyro.data[best].value;
                raw.gyro_integral_dt = self.gyro.data[best].integral_dt;
                raw.timestamp = self.gyro.last_timestamp[best];
                self.gyro.last_best_vote = best;
            }
        }
    }

    /// Polls the accelerometers.
    pub fn accel_poll<B: Bus>(&mut self, bus: &mut B, now: u64, raw: &mut SensorCombined) {
        let mut got_update = false;

        for i in 0..self.accel.subscription_count {
            let Some(sub) = self.accel.subscriptions[i].as_ref() else {
                continue;
            };
            if !bus.updated(sub) {
                continue;
            }
            let Some(report) = bus.copy(sub) else {
                continue;
            };
            if report.timestamp == 0 {
                continue; // ignore invalid data
            }

            got_update = true;

            match report.integral {
                Some(integral) if integral.dt_us != 0 => {
                    let rotated =
                        self.board_rotation * Vector3::new(integral.x, integral.y, integral.z);
                    let dt = integral.dt_us as f32 / 1e6;
                    self.accel.data[i].integral_dt = dt;
                    self.accel.data[i].value = [rotated.x / dt, rotated.y / dt, rotated.z / dt];
                }
                _ => {
                    let rotated = self.board_rotation * Vector3::new(report.x, report.y, report.z);
                    if self.accel.prev_timestamp[i] == 0 {
                        self.accel.prev_timestamp[i] =
                            report.timestamp.saturating_sub(FIRST_SAMPLE_DT_US);
                    }
                    self.accel.data[i].integral_dt =
                        (report.timestamp - self.accel.prev_timestamp[i]) as f32 / 1e6;
                    self.accel.data[i].value = [rotated.x, rotated.y, rotated.z];
                }
            }

            self.accel.prev_timestamp[i] = report.timestamp;
            self.accel.last_timestamp[i] = report.timestamp;
            self.accel.voter.put(
                i,
                report.timestamp,
                self.accel.data[i].value,
                report.error_count,
                self.accel.priority[i],
            );
        }

        if got_update {
            let best = self.accel.voter.best(now);
            if best >= 0 {
                let best = best as usize;
                raw.accelerometer_m_s2 = self.accel.data[best].value;
                raw.accelerometer_integral_dt = self.accel.data[best].integral_dt;
                self.accel.last_best_vote = best;
            }
        }
    }

    /// Polls the magnetometers. Each instance carries its own mounting
    /// rotation; there is no integrated form.
    pub fn mag_poll<B: Bus>(&mut self, bus: &mut B, now: u64, raw: &mut SensorCombined) {
        let mut got_update = false;

        for i in 0..self.mag.subscription_count {
            let Some(sub) = self.mag.subscriptions[i].as_ref() else {
                continue;
            };
            if !bus.updated(sub) {
                continue;
            }
            let Some(report) = bus.copy(sub) else {
                continue;
            };
            if report.timestamp == 0 {
                continue; // ignore invalid data
            }

            got_update = true;

            let rotated = self.mag_rotation[i] * Vector3::new(report.x, report.y, report.z);
            self.mag.data[i].value = [rotated.x, rotated.y, rotated.z];

            self.mag.last_timestamp[i] = report.timestamp;
            self.mag.voter.put(
                i,
                report.timestamp,
                self.mag.data[i].value,
                report.error_count,
                self.mag.priority[i],
            );
        }

        if got_update {
            let best = self.mag.voter.best(now);
            if best >= 0 {
                let best = best as usize;
                raw.magnetometer_ga = self.mag.data[best].value;
                self.mag.last_best_vote = best;
            }
        }
    }

    /// Polls the barometers. Altitude is the signal under vote; pressure of
    /// the elected instance feeds the airspeed block downstream.
    pub fn baro_poll<B: Bus>(&mut self, bus: &mut B, now: u64, raw: &mut SensorCombined) {
        let mut got_update = false;

        for i in 0..self.baro.subscription_count {
            let Some(sub) = self.baro.subscriptions[i].as_ref() else {
                continue;
            };
            if !bus.updated(sub) {
                continue;
            }
            let Some(report) = bus.copy(sub) else {
                continue;
            };
            if report.timestamp == 0 {
                continue; // ignore invalid data
            }

            got_update = true;

            self.baro.data[i].value = [report.altitude, 0.0, 0.0];
            self.baro_temperature[i] = report.temperature;
            self.baro_pressure[i] = report.pressure;

            self.baro.last_timestamp[i] = report.timestamp;
            self.baro.voter.put(
                i,
                report.timestamp,
                self.baro.data[i].value,
                report.error_count,
                self.baro.priority[i],
            );
        }

        if got_update {
            let best = self.baro.voter.best(now);
            if best >= 0 {
                let best = best as usize;
                raw.baro_alt_meter = self.baro.data[best].value[0];
                raw.baro_temp_celsius = self.baro_temperature[best];
                self.last_best_baro_pressure = self.baro_pressure[best];
                self.baro.last_best_vote = best;
            }
        }
    }

    /// Fills in the signed relative timestamps of the non-pacing classes.
    ///
    /// Offsets are relative to the gyro timestamp and may be negative when a
    /// class's best sample predates the gyro's.
    pub fn set_relative_timestamps(&self, raw: &mut SensorCombined) {
        let accel_ts = self.accel.last_timestamp[self.accel.last_best_vote];
        if accel_ts != 0 {
            raw.accelerometer_timestamp_relative = (accel_ts as i64 - raw.timestamp as i64) as i32;
        }
        let mag_ts = self.mag.last_timestamp[self.mag.last_best_vote];
        if mag_ts != 0 {
            raw.magnetometer_timestamp_relative = (mag_ts as i64 - raw.timestamp as i64) as i32;
        }
        let baro_ts = self.baro.last_timestamp[self.baro.last_best_vote];
        if baro_ts != 0 {
            raw.baro_timestamp_relative = (baro_ts as i64 - raw.timestamp as i64) as i32;
        }
    }

    /// Reports a failover of one class, if its voter recorded one since the
    /// last check. Returns whether a switch occurred.
    pub fn check_failover_class<M: BusMessage>(
        state: &mut SensorClassState<M>,
        label: &'static str,
    ) -> bool {
        if state.last_failover_count == state.voter.failover_count() {
            return false;
        }

        let flags = state.voter.failover_state();

        if flags.is_empty() {
            // switched for a non-critical reason, no need to panic
            info!("{} sensor switch from #{}", label, state.voter.failover_index());
        } else {
            error!(
                "{} #{} failover:{}{}{}{}{}!",
                label,
                state.voter.failover_index(),
                if flags.contains(ErrorFlags::NO_DATA) { " No data" } else { "" },
                if flags.contains(ErrorFlags::STALE_DATA) { " Stale data" } else { "" },
                if flags.contains(ErrorFlags::TIMEOUT) { " Data timeout" } else { "" },
                if flags.contains(ErrorFlags::HIGH_ERRCOUNT) { " High error count" } else { "" },
                if flags.contains(ErrorFlags::HIGH_ERRDENSITY) { " High error density" } else { "" },
            );
        }

        state.last_failover_count = state.voter.failover_count();
        true
    }

    /// Runs the failover reporter over all four classes.
    pub fn check_failover(&mut self) {
        Self::check_failover_class(&mut self.accel, SensorKind::Accel.label());
        Self::check_failover_class(&mut self.gyro, SensorKind::Gyro.label());
        Self::check_failover_class(&mut self.mag, SensorKind::Mag.label());
        Self::check_failover_class(&mut self.baro, SensorKind::Baro.label());
    }

    /// Checks vibration levels and warns once they stay above `threshold`
    /// for the debounce window. Returns true when the warning latches.
    pub fn check_vibration(&mut self, now: u64, threshold: f32) -> bool {
        let gyro_factor = self.gyro.voter.vibration_factor(now);
        let accel_factor = self.accel.voter.vibration_factor(now);
        let mag_factor = self.mag.voter.vibration_factor(now);

        let over = gyro_factor > threshold || accel_factor > threshold || mag_factor > threshold;

        if !self.vibration_warning && over {
            if self.vibration_warning_timestamp == 0 {
                self.vibration_warning_timestamp = now;
            } else if now.saturating_sub(self.vibration_warning_timestamp)
                > VIBRATION_WARNING_DELAY_US
            {
                self.vibration_warning = true;
                error!(
                    "HIGH VIBRATION! g: {} a: {} m: {}",
                    (100.0 * gyro_factor) as i32,
                    (100.0 * accel_factor) as i32,
                    (100.0 * mag_factor) as i32
                );
                return true;
            }
        } else if !over {
            self.vibration_warning_timestamp = 0;
        }

        false
    }

    /// Calibration counters: slots where application fully succeeded.
    pub fn calibration_counts(&self) -> (usize, usize, usize) {
        (
            self.gyro_calibration_count,
            self.accel_calibration_count,
            self.mag_calibration_count,
        )
    }

    /// Logs the per-class voter state.
    pub fn print_status(&self) {
        Self::print_class_status(&self.gyro, SensorKind::Gyro.label());
        Self::print_class_status(&self.accel, SensorKind::Accel.label());
        Self::print_class_status(&self.mag, SensorKind::Mag.label());
        Self::print_class_status(&self.baro, SensorKind::Baro.label());
    }

    fn print_class_status<M: BusMessage>(state: &SensorClassState<M>, label: &'static str) {
        info!(
            "{}: {} instances, best #{}, {} failovers",
            label,
            state.subscription_count,
            state.last_best_vote,
            state.voter.failover_count()
        );
        for (i, validator) in state.voter.validators().iter().enumerate() {
            info!(
                "  #{}: last {} us, events {}, errors {}, prio {}, flags {:?}",
                i,
                validator.time_last(),
                validator.event_count(),
                validator.error_count(),
                validator.priority(),
                validator.state()
            );
        }
    }

    pub(crate) fn board_rotation(&self) -> &Matrix3<f32> {
        &self.board_rotation
    }

    pub(crate) fn set_board_rotation(&mut self, rotation: Matrix3<f32>) {
        self.board_rotation = rotation;
    }

    pub(crate) fn set_mag_rotation(&mut self, slot: usize, rotation: Matrix3<f32>) {
        self.mag_rotation[slot] = rotation;
    }

    /// Body-frame rotation applied to magnetometer `slot`.
    pub fn mag_rotation(&self, slot: usize) -> &Matrix3<f32> {
        &self.mag_rotation[slot]
    }

    pub(crate) fn set_calibration_counts(&mut self, gyro: usize, accel: usize, mag: usize) {
        self.gyro_calibration_count = gyro;
        self.accel_calibration_count = accel;
        self.mag_calibration_count = mag;
    }

    /// Subscription handle of the elected gyro, used to pace the loop.
    pub fn best_gyro_subscription(&self) -> Option<&SubHandle<GyroSample>> {
        self.gyro.best_subscription()
    }
}
