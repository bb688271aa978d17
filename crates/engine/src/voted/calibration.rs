//! Calibration application on parameter-update events
//!
//! Stored calibration records are bound to devices by identity, never by
//! slot: for every live device the stored records are scanned and only a
//! record whose `CAL_<CLASS><i>_ID` matches the device's own id is pushed
//! down. A mismatching record is skipped rather than misapplied.
//!
//! Magnetometer slots additionally carry a mounting rotation with a
//! migration path from the legacy single `SENS_EXT_MAG_ROT` parameter.

use log::{error, warn};

use sensorvote_core::rotation::{matrix_from_euler_deg, rotation_matrix, Rotation};
use sensorvote_core::validation::SENSOR_COUNT_MAX;

use crate::device::{DeviceHandle, DeviceRegistry, SensorKind, SensorScale};
use crate::error::EngineError;
use crate::params::{cal_param_name, ParamStore, SensorParams};

use super::VotedSensors;

/// Sentinel in `CAL_MAG<i>_ROT` marking the slot as an internal mag.
pub const MAG_ROT_VAL_INTERNAL: i32 = -1;

/// Reads the six calibration scalars of one stored record.
fn read_scale<P: ParamStore>(store: &P, kind: SensorKind, i: usize) -> Option<SensorScale> {
    Some(SensorScale {
        x_offset: store.get_f32(&cal_param_name(kind, i, "XOFF"))?,
        y_offset: store.get_f32(&cal_param_name(kind, i, "YOFF"))?,
        z_offset: store.get_f32(&cal_param_name(kind, i, "ZOFF"))?,
        x_scale: store.get_f32(&cal_param_name(kind, i, "XSCALE"))?,
        y_scale: store.get_f32(&cal_param_name(kind, i, "YSCALE"))?,
        z_scale: store.get_f32(&cal_param_name(kind, i, "ZSCALE"))?,
    })
}

/// Matches stored records against every live device of one class and pushes
/// the calibration down. Returns the number of devices fully configured.
fn apply_class_calibration<P: ParamStore, D: DeviceRegistry>(
    store: &P,
    registry: &mut D,
    kind: SensorKind,
) -> usize {
    let mut applied = 0;

    for s in 0..SENSOR_COUNT_MAX {
        let Some(mut handle) = registry.open(kind, s) else {
            // the driver is not running, slot is absent
            continue;
        };

        let mut config_ok = false;

        for i in 0..SENSOR_COUNT_MAX {
            let Some(device_id) = store.get_i32(&cal_param_name(kind, i, "ID")) else {
                continue;
            };

            // only apply a record that is for this very device
            if device_id != handle.device_id() {
                continue;
            }

            match read_scale(store, kind, i) {
                Some(scale) => {
                    config_ok = handle.apply_calibration(&scale).is_ok();
                    if !config_ok {
                        error!("FAILED APPLYING {} CAL #{}", kind.log_name(), i);
                    }
                }
                None => error!("FAILED APPLYING {} CAL #{}", kind.log_name(), i),
            }

            break;
        }

        if config_ok {
            applied += 1;
        }
    }

    applied
}

impl VotedSensors {
    /// Re-evaluates rotations and calibration bindings.
    ///
    /// Called on every parameter-update event (and forced on first entry).
    /// All failures are local: a failed record keeps the previous driver
    /// calibration and the other classes proceed. Only a missing or
    /// rejecting barometer surfaces as an error, and even then the loop
    /// carries on.
    pub fn parameters_update<P: ParamStore, D: DeviceRegistry>(
        &mut self,
        store: &P,
        registry: &mut D,
        params: &SensorParams,
    ) -> Result<(), EngineError> {
        // board orientation plus the fine-tuning offset
        let base = match Rotation::try_from_i32(params.board_rotation) {
            Some(rotation) => rotation_matrix(rotation),
            None => {
                warn!("invalid board rotation code {}", params.board_rotation);
                rotation_matrix(Rotation::None)
            }
        };
        let offset = matrix_from_euler_deg(
            params.board_offset_deg[0],
            params.board_offset_deg[1],
            params.board_offset_deg[2],
        );
        self.set_board_rotation(offset * base);

        let gyro_count = apply_class_calibration(store, registry, SensorKind::Gyro);
        let accel_count = apply_class_calibration(store, registry, SensorKind::Accel);
        let mag_count = self.apply_mag_calibration(store, registry);
        self.set_calibration_counts(gyro_count, accel_count, mag_count);

        let mut result = Ok(());

        // barometer sea-level reference, pushed to the driver in Pa
        match registry.open(SensorKind::Baro, 0) {
            Some(mut handle) => {
                if handle.set_sea_level_pressure(params.baro_qnh * 100.0).is_err() {
                    error!("qnh for baro could not be set");
                    result = Err(EngineError::BaroReference);
                }
            }
            None => {
                error!("no barometer found");
                result = Err(EngineError::BaroReference);
            }
        }

        // this sensor is optional, abort without error
        if let Some(mut handle) = registry.open_airspeed() {
            if handle
                .set_airspeed_scale(params.diff_pres_offset_pa, 1.0)
                .is_err()
            {
                warn!("failed to set scale / offsets for airspeed sensor");
            }
        }

        result
    }

    /// Mag calibration plus the per-slot rotation policy.
    fn apply_mag_calibration<P: ParamStore, D: DeviceRegistry>(
        &mut self,
        store: &P,
        registry: &mut D,
    ) -> usize {
        let mut applied = 0;

        for s in 0..SENSOR_COUNT_MAX {
            // a valid default: align with the board. Replaced below if this
            // slot is a configured external mag.
            self.set_mag_rotation(s, *self.board_rotation());

            let Some(mut handle) = registry.open(SensorKind::Mag, s) else {
                continue;
            };

            let mut config_ok = false;

            for i in 0..SENSOR_COUNT_MAX {
                let Some(device_id) = store.get_i32(&cal_param_name(SensorKind::Mag, i, "ID"))
                else {
                    continue;
                };

                if device_id != handle.device_id() {
                    continue;
                }

                let rot_name = cal_param_name(SensorKind::Mag, i, "ROT");

                if !handle.is_external_mag() {
                    // internal mag rotates with the board; force the slot's
                    // stored rotation to the internal sentinel
                    self.set_mag_rotation(s, *self.board_rotation());
                    if store.get_i32(&rot_name) != Some(MAG_ROT_VAL_INTERNAL) {
                        let _ = store.set_i32_no_notification(&rot_name, MAG_ROT_VAL_INTERNAL);
                    }
                } else {
                    let mut mag_rot = store.get_i32(&rot_name).unwrap_or(0);

                    // was marked internal before: external with no rotation
                    if mag_rot < 0 {
                        mag_rot = 0;
                        let _ = store.set_i32_no_notification(&rot_name, mag_rot);
                    }

                    // migrate the legacy single-parameter external rotation
                    // into this slot, then retire it
                    let legacy = store.get_i32("SENS_EXT_MAG_ROT").unwrap_or(0);
                    if legacy != 0 && mag_rot <= 0 {
                        mag_rot = legacy;
                        let _ = store.set_i32_no_notification(&rot_name, mag_rot);
                        let _ = store.set_i32_no_notification("SENS_EXT_MAG_ROT", 0);
                    }

                    if mag_rot < 0 {
                        mag_rot = 0;
                    }

                    match Rotation::try_from_i32(mag_rot) {
                        Some(rotation) => self.set_mag_rotation(s, rotation_matrix(rotation)),
                        None => {
                            warn!("invalid mag rotation code {}", mag_rot);
                            self.set_mag_rotation(s, rotation_matrix(Rotation::None));
                        }
                    }
                }

                match read_scale(store, SensorKind::Mag, i) {
                    Some(scale) => {
                        config_ok = handle.apply_calibration(&scale).is_ok();
                        if !config_ok {
                            error!("FAILED APPLYING {} CAL #{}", SensorKind::Mag.log_name(), i);
                        }
                    }
                    None => error!("FAILED APPLYING {} CAL #{}", SensorKind::Mag.log_name(), i),
                }

                break;
            }

            if config_ok {
                applied += 1;
            }
        }

        applied
    }
}
