//! Parameter access and the engine's cached parameter block
//!
//! The parameter store itself lives with the platform (it must be safe for
//! concurrent readers with the engine as the serialized writer), so the
//! engine sees it through the [`ParamStore`] trait. [`SensorParams`] is the
//! engine's local cache of the scalar parameters it consumes every tick,
//! refreshed on each parameter-update event.

use core::fmt::Write;

use heapless::String;
use sensorvote_core::battery::BatteryConfig;
use sensorvote_core::params::{ParamError, ParamValue, ParameterStore};
use sensorvote_core::validation::SENSOR_COUNT_MAX;

use crate::device::SensorKind;

/// Shared parameter storage as seen from the engine.
///
/// Readers may run concurrently; the engine is the only writer and only ever
/// writes through the unnotified variant (rotation-slot migrations must not
/// retrigger the engine's own parameter handling).
pub trait ParamStore {
    fn get_i32(&self, name: &str) -> Option<i32>;
    fn get_f32(&self, name: &str) -> Option<f32>;
    fn set_i32_no_notification(&self, name: &str, value: i32) -> Result<(), ParamError>;
    fn contains(&self, name: &str) -> bool;
}

/// Formats `CAL_<CLASS><instance>_<field>`, e.g. `CAL_GYRO0_XSCALE`.
pub fn cal_param_name(kind: SensorKind, instance: usize, field: &str) -> String<16> {
    let mut name = String::new();
    // cannot overflow: the longest name is CAL_GYRO0_XSCALE (16 chars)
    let _ = write!(name, "CAL_{}{}_{}", kind.cal_prefix(), instance, field);
    name
}

/// Scalar parameters the engine consumes each tick.
#[derive(Debug, Clone, Copy)]
pub struct SensorParams {
    /// Enumerated board orientation code (`SENS_BOARD_ROT`).
    pub board_rotation: i32,
    /// Fine-tuning board offset, roll/pitch/yaw degrees.
    pub board_offset_deg: [f32; 3],
    /// Sea-level reference pressure in hPa (`SENS_BARO_QNH`).
    pub baro_qnh: f32,
    /// ADC counts to volts at the battery voltage pin.
    pub battery_voltage_scaling: f32,
    /// Voltage divider ratio between pack and pin.
    pub battery_v_div: f32,
    /// ADC counts to volts at the current shunt pin.
    pub battery_current_scaling: f32,
    /// Zero-current offset of the shunt amplifier (V).
    pub battery_current_offset: f32,
    /// Shunt amps per volt.
    pub battery_a_per_v: f32,
    /// 0 selects the ADC as the battery source.
    pub battery_source: i32,
    /// Differential-pressure zero offset (Pa).
    pub diff_pres_offset_pa: f32,
    /// Analog airspeed transfer scale (Pa/V); <= 0 disables the channel.
    pub diff_pres_analog_scale: f32,
    /// Vibration factor above which the warning debounce starts.
    pub vibration_warning_threshold: f32,
}

impl Default for SensorParams {
    fn default() -> Self {
        Self {
            board_rotation: 0,
            board_offset_deg: [0.0; 3],
            baro_qnh: 1013.25,
            battery_voltage_scaling: 0.000_805_664,
            battery_v_div: 10.1,
            battery_current_scaling: 0.000_805_664,
            battery_current_offset: 0.0,
            battery_a_per_v: 15.4,
            battery_source: 0,
            diff_pres_offset_pa: 0.0,
            diff_pres_analog_scale: 0.0,
            vibration_warning_threshold: 0.2,
        }
    }
}

impl SensorParams {
    /// Registers every contractual parameter with its default value.
    ///
    /// Called once by the platform before the engine starts; re-running is
    /// harmless (existing values are kept).
    pub fn register_defaults(store: &mut ParameterStore) -> Result<(), ParamError> {
        let d = SensorParams::default();

        store.register("SENS_BOARD_ROT", ParamValue::Int(d.board_rotation))?;
        store.register("SENS_BOARD_X_OFF", ParamValue::Float(0.0))?;
        store.register("SENS_BOARD_Y_OFF", ParamValue::Float(0.0))?;
        store.register("SENS_BOARD_Z_OFF", ParamValue::Float(0.0))?;
        store.register("SENS_BARO_QNH", ParamValue::Float(d.baro_qnh))?;
        store.register("SENS_DPRES_OFF", ParamValue::Float(d.diff_pres_offset_pa))?;
        store.register("SENS_DPRES_ANSC", ParamValue::Float(d.diff_pres_analog_scale))?;
        store.register("SENS_VIBE_THRESH", ParamValue::Float(d.vibration_warning_threshold))?;
        store.register("SENS_EXT_MAG_ROT", ParamValue::Int(0))?;

        store.register("BAT_CNT_V_VOLT", ParamValue::Float(d.battery_voltage_scaling))?;
        store.register("BAT_CNT_V_CURR", ParamValue::Float(d.battery_current_scaling))?;
        store.register("BAT_V_OFFS_CURR", ParamValue::Float(d.battery_current_offset))?;
        store.register("BAT_V_DIV", ParamValue::Float(d.battery_v_div))?;
        store.register("BAT_A_PER_V", ParamValue::Float(d.battery_a_per_v))?;
        store.register("BAT_SOURCE", ParamValue::Int(d.battery_source))?;

        let b = BatteryConfig::default();
        store.register("BAT_N_CELLS", ParamValue::Int(b.n_cells as i32))?;
        store.register("BAT_V_EMPTY", ParamValue::Float(b.v_empty))?;
        store.register("BAT_V_CHARGED", ParamValue::Float(b.v_charged))?;
        store.register("BAT_V_LOAD_DROP", ParamValue::Float(b.v_load_drop))?;
        store.register("BAT_CAPACITY", ParamValue::Float(b.capacity_mah))?;
        store.register("BAT_LOW_THR", ParamValue::Float(b.low_threshold))?;
        store.register("BAT_CRIT_THR", ParamValue::Float(b.critical_threshold))?;

        for kind in [SensorKind::Gyro, SensorKind::Accel, SensorKind::Mag] {
            for i in 0..SENSOR_COUNT_MAX {
                store.register(&cal_param_name(kind, i, "ID"), ParamValue::Int(0))?;
                store.register(&cal_param_name(kind, i, "XOFF"), ParamValue::Float(0.0))?;
                store.register(&cal_param_name(kind, i, "YOFF"), ParamValue::Float(0.0))?;
                store.register(&cal_param_name(kind, i, "ZOFF"), ParamValue::Float(0.0))?;
                store.register(&cal_param_name(kind, i, "XSCALE"), ParamValue::Float(1.0))?;
                store.register(&cal_param_name(kind, i, "YSCALE"), ParamValue::Float(1.0))?;
                store.register(&cal_param_name(kind, i, "ZSCALE"), ParamValue::Float(1.0))?;
                if kind == SensorKind::Mag {
                    // -1 marks the slot as belonging to an internal mag
                    store.register(&cal_param_name(kind, i, "ROT"), ParamValue::Int(-1))?;
                }
            }
        }

        Ok(())
    }

    /// Loads the cached block from the store, falling back to defaults for
    /// anything missing.
    pub fn from_store<P: ParamStore>(store: &P) -> Self {
        let d = SensorParams::default();
        Self {
            board_rotation: store.get_i32("SENS_BOARD_ROT").unwrap_or(d.board_rotation),
            board_offset_deg: [
                store.get_f32("SENS_BOARD_X_OFF").unwrap_or(0.0),
                store.get_f32("SENS_BOARD_Y_OFF").unwrap_or(0.0),
                store.get_f32("SENS_BOARD_Z_OFF").unwrap_or(0.0),
            ],
            baro_qnh: store.get_f32("SENS_BARO_QNH").unwrap_or(d.baro_qnh),
            battery_voltage_scaling: store
                .get_f32("BAT_CNT_V_VOLT")
                .unwrap_or(d.battery_voltage_scaling),
            battery_v_div: store.get_f32("BAT_V_DIV").unwrap_or(d.battery_v_div),
            battery_current_scaling: store
                .get_f32("BAT_CNT_V_CURR")
                .unwrap_or(d.battery_current_scaling),
            battery_current_offset: store
                .get_f32("BAT_V_OFFS_CURR")
                .unwrap_or(d.battery_current_offset),
            battery_a_per_v: store.get_f32("BAT_A_PER_V").unwrap_or(d.battery_a_per_v),
            battery_source: store.get_i32("BAT_SOURCE").unwrap_or(d.battery_source),
            diff_pres_offset_pa: store
                .get_f32("SENS_DPRES_OFF")
                .unwrap_or(d.diff_pres_offset_pa),
            diff_pres_analog_scale: store
                .get_f32("SENS_DPRES_ANSC")
                .unwrap_or(d.diff_pres_analog_scale),
            vibration_warning_threshold: store
                .get_f32("SENS_VIBE_THRESH")
                .unwrap_or(d.vibration_warning_threshold),
        }
    }
}

/// Loads the battery estimator configuration from the store.
pub fn battery_config_from_store<P: ParamStore>(store: &P) -> BatteryConfig {
    let d = BatteryConfig::default();
    BatteryConfig {
        n_cells: store.get_i32("BAT_N_CELLS").map(|v| v.max(1) as u32).unwrap_or(d.n_cells),
        v_empty: store.get_f32("BAT_V_EMPTY").unwrap_or(d.v_empty),
        v_charged: store.get_f32("BAT_V_CHARGED").unwrap_or(d.v_charged),
        v_load_drop: store.get_f32("BAT_V_LOAD_DROP").unwrap_or(d.v_load_drop),
        capacity_mah: store.get_f32("BAT_CAPACITY").unwrap_or(d.capacity_mah),
        low_threshold: store.get_f32("BAT_LOW_THR").unwrap_or(d.low_threshold),
        critical_threshold: store.get_f32("BAT_CRIT_THR").unwrap_or(d.critical_threshold),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;

    // minimal store-on-a-RefCell so the trait can be exercised without the
    // host crate
    struct TestStore(RefCell<ParameterStore>);

    impl ParamStore for TestStore {
        fn get_i32(&self, name: &str) -> Option<i32> {
            self.0.borrow().get_i32(name)
        }
        fn get_f32(&self, name: &str) -> Option<f32> {
            self.0.borrow().get_f32(name)
        }
        fn set_i32_no_notification(&self, name: &str, value: i32) -> Result<(), ParamError> {
            self.0.borrow_mut().set_no_notification(name, ParamValue::Int(value))
        }
        fn contains(&self, name: &str) -> bool {
            self.0.borrow().contains(name)
        }
    }

    #[test]
    fn test_cal_param_names() {
        assert_eq!(cal_param_name(SensorKind::Gyro, 0, "ID").as_str(), "CAL_GYRO0_ID");
        assert_eq!(
            cal_param_name(SensorKind::Gyro, 2, "XSCALE").as_str(),
            "CAL_GYRO2_XSCALE"
        );
        assert_eq!(
            cal_param_name(SensorKind::Accel, 1, "YOFF").as_str(),
            "CAL_ACC1_YOFF"
        );
    }

    #[test]
    fn test_register_defaults_covers_contract() {
        let mut store = ParameterStore::new();
        SensorParams::register_defaults(&mut store).unwrap();

        assert!(store.contains("SENS_BOARD_ROT"));
        assert!(store.contains("SENS_EXT_MAG_ROT"));
        assert!(store.contains("CAL_GYRO0_ID"));
        assert!(store.contains("CAL_ACC2_ZSCALE"));
        assert!(store.contains("CAL_MAG1_ROT"));
        assert!(!store.contains("CAL_GYRO0_ROT"));
        assert_eq!(store.get_i32("CAL_MAG0_ROT"), Some(-1));
    }

    #[test]
    fn test_from_store_roundtrip() {
        let mut inner = ParameterStore::new();
        SensorParams::register_defaults(&mut inner).unwrap();
        inner.set("SENS_BOARD_ROT", ParamValue::Int(4)).unwrap();
        inner.set("SENS_BARO_QNH", ParamValue::Float(1020.0)).unwrap();
        let store = TestStore(RefCell::new(inner));

        let params = SensorParams::from_store(&store);
        assert_eq!(params.board_rotation, 4);
        assert_eq!(params.baro_qnh, 1020.0);
        assert_eq!(params.battery_source, 0);
    }

    #[test]
    fn test_register_defaults_is_idempotent() {
        let mut store = ParameterStore::new();
        SensorParams::register_defaults(&mut store).unwrap();
        store.set("CAL_GYRO1_XOFF", ParamValue::Float(0.5)).unwrap();
        SensorParams::register_defaults(&mut store).unwrap();
        assert_eq!(store.get_f32("CAL_GYRO1_XOFF"), Some(0.5));
    }
}
