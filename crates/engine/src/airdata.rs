//! Differential-pressure consumption and airspeed derivation
//!
//! Every update of the differential-pressure topic produces one airspeed
//! publication: indicated airspeed from the filtered reading, true airspeed
//! from filtered and raw readings against the elected barometer's static
//! pressure, plus a confidence from a dedicated single-instance validator.

use sensorvote_core::airdata;
use sensorvote_core::msg::{Airspeed, DifferentialPressure, SensorCombined};
use sensorvote_core::validation::DataValidator;

use crate::bus::{Bus, SubHandle};

/// The indicated baro temperature runs hot; subtract this to approximate
/// true air temperature when the pitot sensor has no thermometer.
const PCB_TEMP_ESTIMATE_DEG: f32 = 5.0;

/// Below this the pitot temperature reading is a sentinel, not a measurement.
const TEMPERATURE_VALID_MIN_C: f32 = -300.0;

/// Priority fed to the airspeed validator (single instance, no election).
const AIRSPEED_PRIORITY: u8 = 100;

/// Derives airspeed from the differential-pressure stream.
pub struct AirspeedUpdater {
    validator: DataValidator,
    airspeed: Airspeed,
    /// Simulation builds force confidence to 1.0: replayed streams have no
    /// live timing to validate.
    force_full_confidence: bool,
}

impl AirspeedUpdater {
    pub fn new() -> Self {
        Self {
            validator: DataValidator::new(),
            airspeed: Airspeed::default(),
            force_full_confidence: false,
        }
    }

    /// Forces the published confidence to 1.0 (host-simulation runs).
    pub fn set_force_full_confidence(&mut self, force: bool) {
        self.force_full_confidence = force;
    }

    /// Consumes a differential-pressure update, if any, and publishes the
    /// derived airspeed.
    ///
    /// `baro_pressure_hpa` is the static pressure of the elected barometer.
    pub fn diff_pres_poll<B: Bus>(
        &mut self,
        bus: &mut B,
        sub: &SubHandle<DifferentialPressure>,
        now: u64,
        raw: &SensorCombined,
        baro_pressure_hpa: f32,
    ) {
        if !bus.updated(sub) {
            return;
        }
        let Some(diff_pres) = bus.copy(sub) else {
            return;
        };

        let air_temperature_celsius = if diff_pres.temperature > TEMPERATURE_VALID_MIN_C {
            diff_pres.temperature
        } else {
            raw.baro_temp_celsius - PCB_TEMP_ESTIMATE_DEG
        };

        self.airspeed.timestamp = diff_pres.timestamp;

        self.validator.put(
            diff_pres.timestamp,
            [diff_pres.differential_pressure_raw_pa, 0.0, 0.0],
            diff_pres.error_count,
            AIRSPEED_PRIORITY,
        );

        self.airspeed.confidence = if self.force_full_confidence {
            1.0
        } else {
            self.validator.confidence(now)
        };

        let static_pa = baro_pressure_hpa * 1e2;

        // don't risk feeding negative airspeed into the system
        self.airspeed.indicated_airspeed_m_s =
            airdata::indicated_airspeed(diff_pres.differential_pressure_filtered_pa).max(0.0);
        self.airspeed.true_airspeed_m_s = airdata::true_airspeed(
            diff_pres.differential_pressure_filtered_pa + static_pa,
            static_pa,
            air_temperature_celsius,
        )
        .max(0.0);
        self.airspeed.true_airspeed_unfiltered_m_s = airdata::true_airspeed(
            diff_pres.differential_pressure_raw_pa + static_pa,
            static_pa,
            air_temperature_celsius,
        )
        .max(0.0);

        self.airspeed.air_temperature_celsius = air_temperature_celsius;

        bus.publish(&self.airspeed);
    }
}

impl Default for AirspeedUpdater {
    fn default() -> Self {
        Self::new()
    }
}
