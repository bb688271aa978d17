//! Battery state estimation
//!
//! Turns raw ADC-derived voltage/current readings into a filtered
//! [`BatteryStatus`]: voltage and current smoothing, discharged-charge
//! integration and a remaining-fraction estimate compensated for the load
//! the current throttle setting puts on the pack.

use crate::msg::{BatteryStatus, BatteryWarning};

/// Pack properties and thresholds for the estimator.
#[derive(Debug, Clone, Copy)]
pub struct BatteryConfig {
    /// Number of series cells.
    pub n_cells: u32,
    /// Cell voltage considered empty under no load (V).
    pub v_empty: f32,
    /// Cell voltage when fully charged (V).
    pub v_charged: f32,
    /// Voltage drop per cell at full throttle, for load compensation (V).
    pub v_load_drop: f32,
    /// Pack capacity (mAh); <= 0 disables the coulomb-counting estimate.
    pub capacity_mah: f32,
    /// Remaining fraction below which the low warning raises.
    pub low_threshold: f32,
    /// Remaining fraction below which the critical warning raises.
    pub critical_threshold: f32,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            n_cells: 3,
            v_empty: 3.4,
            v_charged: 4.2,
            v_load_drop: 0.06,
            capacity_mah: -1.0,
            low_threshold: 0.18,
            critical_threshold: 0.09,
        }
    }
}

/// Minimum filtered voltage for the pack to count as connected (V).
const CONNECTED_THRESHOLD_V: f32 = 2.1;

/// Battery state estimator fed once per ADC sweep.
#[derive(Debug, Clone)]
pub struct BatteryEstimator {
    config: BatteryConfig,
    voltage_filtered_v: f32,
    current_filtered_a: f32,
    discharged_mah: f32,
    last_timestamp: u64,
    warning: BatteryWarning,
}

impl BatteryEstimator {
    pub fn new(config: BatteryConfig) -> Self {
        Self {
            config,
            voltage_filtered_v: -1.0,
            current_filtered_a: -1.0,
            discharged_mah: 0.0,
            last_timestamp: 0,
            warning: BatteryWarning::None,
        }
    }

    /// Replaces the configuration, e.g. after a parameter update.
    pub fn set_config(&mut self, config: BatteryConfig) {
        self.config = config;
    }

    /// Resets the filters and the discharge integral.
    pub fn reset(&mut self) {
        self.voltage_filtered_v = -1.0;
        self.current_filtered_a = -1.0;
        self.discharged_mah = 0.0;
        self.last_timestamp = 0;
        self.warning = BatteryWarning::None;
    }

    /// Consumes one reading and produces the published status.
    ///
    /// `throttle` is the normalized throttle setpoint used for load
    /// compensation of the voltage-based estimate; `armed` gates the
    /// discharge integration.
    pub fn update(
        &mut self,
        timestamp: u64,
        voltage_v: f32,
        current_a: f32,
        throttle: f32,
        armed: bool,
    ) -> BatteryStatus {
        self.filter_voltage(voltage_v);
        self.sum_discharged(timestamp, current_a, armed);
        let remaining = self.estimate_remaining(throttle);
        self.determine_warning(remaining);

        let connected = self.voltage_filtered_v > CONNECTED_THRESHOLD_V;

        BatteryStatus {
            timestamp,
            voltage_v,
            voltage_filtered_v: self.voltage_filtered_v,
            current_a,
            current_filtered_a: self.current_filtered_a,
            discharged_mah: self.discharged_mah,
            remaining,
            warning: self.warning,
            connected,
        }
    }

    fn filter_voltage(&mut self, voltage_v: f32) {
        if self.voltage_filtered_v < 0.0 {
            self.voltage_filtered_v = voltage_v;
        } else {
            self.voltage_filtered_v = self.voltage_filtered_v * 0.99 + voltage_v * 0.01;
        }
    }

    fn sum_discharged(&mut self, timestamp: u64, current_a: f32, armed: bool) {
        if current_a < 0.0 || !armed {
            // ignore discharge measurement while the sensor reads garbage
            // or the vehicle is on the bench
            self.last_timestamp = 0;
            return;
        }

        if self.current_filtered_a < 0.0 {
            self.current_filtered_a = current_a;
        } else {
            self.current_filtered_a = self.current_filtered_a * 0.99 + current_a * 0.01;
        }

        if self.last_timestamp != 0 {
            let dt_us = timestamp.saturating_sub(self.last_timestamp);
            // mAh = A * dt_us / 3.6e6
            self.discharged_mah += current_a * dt_us as f32 / 3.6e6;
        }

        self.last_timestamp = timestamp;
    }

    fn estimate_remaining(&self, throttle: f32) -> f32 {
        let cfg = &self.config;
        let cells = cfg.n_cells as f32;

        // compensate the measured voltage for the load the throttle implies
        let load_compensated_v =
            self.voltage_filtered_v + throttle.clamp(0.0, 1.0) * cfg.v_load_drop * cells;

        let range = cells * (cfg.v_charged - cfg.v_empty);
        let mut remaining_voltage = if range > 0.0 {
            (load_compensated_v - cells * cfg.v_empty) / range
        } else {
            0.0
        };
        remaining_voltage = remaining_voltage.clamp(0.0, 1.0);

        if cfg.capacity_mah > 0.0 {
            let remaining_capacity = (1.0 - self.discharged_mah / cfg.capacity_mah).clamp(0.0, 1.0);
            remaining_voltage.min(remaining_capacity)
        } else {
            remaining_voltage
        }
    }

    fn determine_warning(&mut self, remaining: f32) {
        // warnings latch: they only escalate until reset
        if remaining < self.config.critical_threshold {
            self.warning = BatteryWarning::Critical;
        } else if remaining < self.config.low_threshold && self.warning == BatteryWarning::None {
            self.warning = BatteryWarning::Low;
        }
    }

    /// Total charge drawn since the last reset (mAh).
    pub fn discharged_mah(&self) -> f32 {
        self.discharged_mah
    }
}
