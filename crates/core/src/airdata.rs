//! Airspeed computation from pressure and temperature
//!
//! Indicated airspeed assumes sea-level standard density; true airspeed
//! corrects for the actual air density derived from static pressure and
//! outside air temperature via the ideal gas law.

use libm::{fabsf, sqrtf};

/// Air density at sea level and 15 degC (kg/m^3).
pub const AIR_DENSITY_SEA_LEVEL_15C: f32 = 1.225;

/// Specific gas constant of dry air (J/(kg*K)).
pub const AIR_GAS_CONSTANT: f32 = 287.1;

/// Absolute zero in degC.
pub const ABSOLUTE_NULL_CELSIUS: f32 = -273.15;

/// Computes indicated airspeed (m/s) from differential pressure (Pa).
///
/// A negative differential pressure yields a negative airspeed so that
/// sensor offset errors stay visible to the caller instead of being folded
/// into zero; the publisher clamps to >= 0.
pub fn indicated_airspeed(differential_pressure_pa: f32) -> f32 {
    if differential_pressure_pa > 0.0 {
        sqrtf(2.0 * differential_pressure_pa / AIR_DENSITY_SEA_LEVEL_15C)
    } else {
        -sqrtf(2.0 * fabsf(differential_pressure_pa) / AIR_DENSITY_SEA_LEVEL_15C)
    }
}

/// Computes true airspeed (m/s) from total pressure, static pressure (Pa)
/// and outside air temperature (degC).
pub fn true_airspeed(
    total_pressure_pa: f32,
    static_pressure_pa: f32,
    temperature_celsius: f32,
) -> f32 {
    let mut density =
        static_pressure_pa / (AIR_GAS_CONSTANT * (temperature_celsius - ABSOLUTE_NULL_CELSIUS));

    if density < 0.0001 || !density.is_finite() {
        density = AIR_DENSITY_SEA_LEVEL_15C;
    }

    let pressure_difference = total_pressure_pa - static_pressure_pa;

    if pressure_difference > 0.0 {
        sqrtf(2.0 * pressure_difference / density)
    } else {
        -sqrtf(2.0 * fabsf(pressure_difference) / density)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-3;

    #[test]
    fn test_indicated_airspeed_zero_pressure() {
        assert_eq!(indicated_airspeed(0.0), 0.0);
    }

    #[test]
    fn test_indicated_airspeed_typical_cruise() {
        // 500 Pa of dynamic pressure at standard density ~ 28.6 m/s
        let ias = indicated_airspeed(500.0);
        assert!((ias - sqrtf(2.0 * 500.0 / AIR_DENSITY_SEA_LEVEL_15C)).abs() < EPSILON);
        assert!(ias > 28.0 && ias < 29.0);
    }

    #[test]
    fn test_indicated_airspeed_negative_pressure() {
        assert!(indicated_airspeed(-100.0) < 0.0);
        assert!((indicated_airspeed(-100.0) + indicated_airspeed(100.0)).abs() < EPSILON);
    }

    #[test]
    fn test_true_airspeed_matches_indicated_at_standard_conditions() {
        // at sea-level standard density the two speeds coincide
        let static_pa = 101_325.0;
        let temp_c = static_pa / (AIR_GAS_CONSTANT * AIR_DENSITY_SEA_LEVEL_15C) + ABSOLUTE_NULL_CELSIUS;
        let tas = true_airspeed(static_pa + 500.0, static_pa, temp_c);
        let ias = indicated_airspeed(500.0);
        assert!((tas - ias).abs() < 0.01);
    }

    #[test]
    fn test_true_airspeed_rises_with_altitude() {
        // same dynamic pressure in thinner air means flying faster
        let tas_low = true_airspeed(101_325.0 + 500.0, 101_325.0, 15.0);
        let tas_high = true_airspeed(70_000.0 + 500.0, 70_000.0, 0.0);
        assert!(tas_high > tas_low);
    }

    #[test]
    fn test_true_airspeed_degenerate_density_falls_back() {
        // nonsensical static pressure must not produce NaN
        let tas = true_airspeed(500.0, 0.0, 15.0);
        assert!(tas.is_finite());
    }
}
