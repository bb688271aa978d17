//! Power monitoring over the ADC
//!
//! One rate-limited sweep reads every ADC channel at once. Recognized
//! channels become battery voltage/current (fed to the estimator and
//! published as battery status) and, when wired, a synthesized differential
//! pressure for analog airspeed sensors.

use sensorvote_core::battery::{BatteryConfig, BatteryEstimator};
use sensorvote_core::msg::{ActuatorControls, DifferentialPressure};
use sensorvote_core::traits::TimeSource;

use crate::bus::{Bus, SubHandle};
use crate::device::{AdcDriver, AdcSample, ADC_MAX_CHANNELS};
use crate::params::SensorParams;

/// Minimum interval between ADC sweeps (100 Hz).
const ADC_INTERVAL_US: u64 = 10_000;

/// ADC reference voltage over full scale, times the board's divider.
const ADC_VOLTS_PER_COUNT: f32 = 3.3 / 4096.0;
const AIRSPEED_DIVIDER_FACTOR: f32 = 2.0;

/// An analog airspeed sensor pulls the line above this when connected.
const AIRSPEED_MIN_VALID_VOLTAGE: f32 = 0.4;

/// Temperature sentinel published with ADC-synthesized differential
/// pressure (no thermometer on an analog sensor).
const ANALOG_DIFF_PRES_TEMPERATURE: f32 = -1000.0;

/// Battery voltage below this means the rail is not connected.
const BATTERY_MIN_VALID_VOLTAGE: f32 = 0.5;

/// Rate-limited ADC reader producing battery state and analog airspeed.
pub struct PowerMonitor<A: AdcDriver> {
    adc: Option<A>,
    last_adc_us: u64,
    battery: BatteryEstimator,
    diff_pres: DifferentialPressure,
}

impl<A: AdcDriver> PowerMonitor<A> {
    pub fn new() -> Self {
        Self {
            adc: None,
            last_adc_us: 0,
            battery: BatteryEstimator::new(BatteryConfig::default()),
            diff_pres: DifferentialPressure::default(),
        }
    }

    /// Installs the ADC opened at bring-up. Without one, every poll is a
    /// no-op and the system runs without power monitoring.
    pub fn set_adc(&mut self, adc: A) {
        self.adc = Some(adc);
    }

    pub fn has_adc(&self) -> bool {
        self.adc.is_some()
    }

    /// Applies a new battery configuration after a parameter update.
    pub fn set_battery_config(&mut self, config: BatteryConfig) {
        self.battery.set_config(config);
    }

    /// Resets the battery estimator (bring-up).
    pub fn reset_battery(&mut self) {
        self.battery.reset();
    }

    /// Reads the ADC at most once per 10 ms and processes the recognized
    /// channels.
    pub fn adc_poll<B: Bus, T: TimeSource>(
        &mut self,
        bus: &mut B,
        time: &T,
        params: &SensorParams,
        actuator_sub: Option<&SubHandle<ActuatorControls>>,
        armed: bool,
        publishing: bool,
    ) {
        // only read if publishing
        if !publishing {
            return;
        }
        let Some(adc) = self.adc.as_mut() else {
            return;
        };

        let t = time.now_us();
        if t.saturating_sub(self.last_adc_us) < ADC_INTERVAL_US {
            return;
        }

        let mut buf = [AdcSample::default(); ADC_MAX_CHANNELS];
        let count = match adc.read(&mut buf) {
            Ok(count) if count > 0 => count,
            _ => return,
        };

        let mut bat_voltage_v = 0.0;
        let mut bat_current_a = 0.0;
        let mut updated_battery = false;

        for sample in &buf[..count] {
            if sample.channel == adc.battery_voltage_channel() {
                bat_voltage_v =
                    sample.raw as f32 * params.battery_voltage_scaling * params.battery_v_div;

                if bat_voltage_v > BATTERY_MIN_VALID_VOLTAGE {
                    updated_battery = true;
                }
            } else if sample.channel == adc.battery_current_channel() {
                bat_current_a = (sample.raw as f32 * params.battery_current_scaling
                    - params.battery_current_offset)
                    * params.battery_a_per_v;
            } else if Some(sample.channel) == adc.airspeed_channel() {
                let voltage = sample.raw as f32 * ADC_VOLTS_PER_COUNT * AIRSPEED_DIVIDER_FACTOR;

                // the divider pulls the line down; only a connected sensor
                // produces a plausible voltage, and it needs a transfer scale
                if voltage > AIRSPEED_MIN_VALID_VOLTAGE && params.diff_pres_analog_scale > 0.0 {
                    let diff_pres_pa_raw =
                        voltage * params.diff_pres_analog_scale - params.diff_pres_offset_pa;

                    self.diff_pres.timestamp = t;
                    self.diff_pres.differential_pressure_raw_pa = diff_pres_pa_raw;
                    self.diff_pres.differential_pressure_filtered_pa =
                        self.diff_pres.differential_pressure_filtered_pa * 0.9
                            + diff_pres_pa_raw * 0.1;
                    self.diff_pres.temperature = ANALOG_DIFF_PRES_TEMPERATURE;

                    bus.publish(&self.diff_pres);
                }
            }
        }

        if params.battery_source == 0 && updated_battery {
            let throttle = actuator_sub
                .and_then(|sub| bus.copy(sub))
                .map(|ctrl| ctrl.control[ActuatorControls::INDEX_THROTTLE])
                .unwrap_or(0.0);

            let status = self.battery.update(t, bat_voltage_v, bat_current_a, throttle, armed);
            bus.publish(&status);
        }

        self.last_adc_us = t;
    }
}

impl<A: AdcDriver> Default for PowerMonitor<A> {
    fn default() -> Self {
        Self::new()
    }
}
