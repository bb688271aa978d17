//! The sensor aggregation loop
//!
//! A single long-running worker owns all engine state. Each tick blocks on
//! the currently-best gyro (bounded to 50 ms, which also bounds the
//! failover time when that gyro dies), polls every class plus the ADC and
//! differential pressure, and publishes the combined snapshot.
//!
//! In HIL mode local sensor publications are suppressed; an external replay
//! owns the snapshot topic until HIL clears.

use core::sync::atomic::{AtomicBool, Ordering};

use log::{error, info};

use sensorvote_core::msg::{
    ActuatorControls, DifferentialPressure, ParameterUpdate, SensorCombined, VehicleControlMode,
};
use sensorvote_core::traits::TimeSource;

use crate::airdata::AirspeedUpdater;
use crate::bus::{Bus, SubHandle, WaitResult};
use crate::device::DeviceRegistry;
use crate::params::{battery_config_from_store, ParamStore, SensorParams};
use crate::power::PowerMonitor;
use crate::rc::RcHook;
use crate::voted::VotedSensors;

/// Bounded wait on the pacing gyro. Doubles as the worst-case failover
/// latency when the elected gyro stops publishing.
const GYRO_WAIT_TIMEOUT_US: u64 = 50_000;

/// Yield when no gyro instance exists yet.
const NO_GYRO_SLEEP_US: u64 = 1000;

/// Hot-plug re-adoption cadence while disarmed.
const CONFIG_UPDATE_INTERVAL_US: u64 = 500_000;

/// The sensor aggregation engine and its main loop.
pub struct SensorsTask<B, D, P, T, R>
where
    B: Bus,
    D: DeviceRegistry,
    P: ParamStore,
    T: TimeSource,
    R: RcHook,
{
    bus: B,
    registry: D,
    params: P,
    time: T,
    rc: R,

    voted: VotedSensors,
    power: PowerMonitor<D::Adc>,
    airspeed: AirspeedUpdater,
    sensor_params: SensorParams,

    diff_pres_sub: Option<SubHandle<DifferentialPressure>>,
    vcontrol_mode_sub: Option<SubHandle<VehicleControlMode>>,
    params_sub: Option<SubHandle<ParameterUpdate>>,
    actuator_ctrl_0_sub: Option<SubHandle<ActuatorControls>>,

    hil_enabled: bool,
    publishing: bool,
    armed: bool,
    vibration_check_enabled: bool,
}

impl<B, D, P, T, R> SensorsTask<B, D, P, T, R>
where
    B: Bus,
    D: DeviceRegistry,
    P: ParamStore,
    T: TimeSource,
    R: RcHook,
{
    pub fn new(bus: B, registry: D, params: P, time: T, rc: R) -> Self {
        Self {
            bus,
            registry,
            params,
            time,
            rc,
            voted: VotedSensors::new(),
            power: PowerMonitor::new(),
            airspeed: AirspeedUpdater::new(),
            sensor_params: SensorParams::default(),
            diff_pres_sub: None,
            vcontrol_mode_sub: None,
            params_sub: None,
            actuator_ctrl_0_sub: None,
            hil_enabled: false,
            publishing: true,
            armed: false,
            vibration_check_enabled: false,
        }
    }

    /// Enables the vibration surveillance alert (off by default).
    pub fn set_vibration_check(&mut self, enabled: bool) {
        self.vibration_check_enabled = enabled;
    }

    /// Forces airspeed confidence to 1.0 (host-simulation runs).
    pub fn set_force_airspeed_confidence(&mut self, force: bool) {
        self.airspeed.set_force_full_confidence(force);
    }

    /// Runs bring-up, the main loop until `should_exit`, then teardown.
    ///
    /// `status_request` is a level-triggered ask to print voter state from
    /// inside the loop; the worker is the only owner of that state.
    pub fn run(&mut self, should_exit: &AtomicBool, status_request: &AtomicBool) {
        let mut raw = SensorCombined::default();
        self.bring_up(&mut raw);

        let mut last_config_update = self.time.now_us();

        while !should_exit.load(Ordering::Relaxed) {
            if status_request.swap(false, Ordering::Relaxed) {
                self.voted.print_status();
            }

            // pace on the best-voted gyro; the bound keeps exit checks and
            // hot-plug adoption responsive even with a dead gyro
            let wait_result = match self.voted.best_gyro_subscription() {
                Some(sub) => self.bus.wait(sub, GYRO_WAIT_TIMEOUT_US),
                None => WaitResult::NoSubscription,
            };

            if wait_result == WaitResult::NoSubscription {
                if self.voted.num_gyros() == 0 {
                    self.voted.gyro.init_instances(&mut self.bus);
                }
                self.time.sleep_us(NO_GYRO_SLEEP_US);
                continue;
            }

            self.vehicle_control_mode_poll();

            let now = self.time.now_us();
            // the gyro stamps the snapshot, so it goes first
            self.voted.gyro_poll(&mut self.bus, now, &mut raw);
            self.voted.accel_poll(&mut self.bus, now, &mut raw);
            self.voted.mag_poll(&mut self.bus, now, &mut raw);
            self.voted.baro_poll(&mut self.bus, now, &mut raw);

            self.power.adc_poll(
                &mut self.bus,
                &self.time,
                &self.sensor_params,
                self.actuator_ctrl_0_sub.as_ref(),
                self.armed,
                self.publishing,
            );

            self.diff_pres_poll(&raw);

            if self.publishing && raw.timestamp > 0 {
                self.voted.set_relative_timestamps(&mut raw);
                self.bus.publish(&raw);
                self.voted.check_failover();

                if self.vibration_check_enabled {
                    self.voted
                        .check_vibration(now, self.sensor_params.vibration_warning_threshold);
                }
            }

            // keep adopting sensors as long as we are not armed; when not
            // adding sensors, poll for parameter updates
            if !self.armed && self.time.elapsed_since(last_config_update) > CONFIG_UPDATE_INTERVAL_US
            {
                self.voted.initialize_sensors(&mut self.bus);
                last_config_update = self.time.now_us();
            } else {
                self.parameter_update_poll(false);
                self.rc.rc_parameter_map_poll(false);
            }

            self.rc.rc_poll();
        }

        self.tear_down();
    }

    fn bring_up(&mut self, raw: &mut SensorCombined) {
        match self.registry.open_adc() {
            Some(adc) => self.power.set_adc(adc),
            None => error!("no ADC found, continuing without power monitoring"),
        }

        self.rc.init();

        self.voted.initialize_sensors(&mut self.bus);

        self.diff_pres_sub = self.bus.subscribe::<DifferentialPressure>(0);
        self.vcontrol_mode_sub = self.bus.subscribe::<VehicleControlMode>(0);
        self.params_sub = self.bus.subscribe::<ParameterUpdate>(0);
        self.actuator_ctrl_0_sub = self.bus.subscribe::<ActuatorControls>(0);

        // reload calibration params
        self.parameter_update_poll(true);

        raw.timestamp = 0;
        self.power.reset_battery();

        // one initial sample of each class
        let now = self.time.now_us();
        self.voted.gyro_poll(&mut self.bus, now, raw);
        self.voted.accel_poll(&mut self.bus, now, raw);
        self.voted.mag_poll(&mut self.bus, now, raw);
        self.voted.baro_poll(&mut self.bus, now, raw);
        self.diff_pres_poll(raw);

        self.rc.rc_parameter_map_poll(true);

        // advertise the combined snapshot with an initial publication
        self.bus.publish(&*raw);

        info!(
            "sensors up: {} gyro(s), {} accel(s), {} mag(s), {} baro(s)",
            self.voted.gyro.subscription_count,
            self.voted.accel.subscription_count,
            self.voted.mag.subscription_count,
            self.voted.baro.subscription_count
        );
    }

    fn tear_down(&mut self) {
        self.voted.deinit(&mut self.bus);

        if let Some(sub) = self.diff_pres_sub.take() {
            self.bus.unsubscribe(sub);
        }
        if let Some(sub) = self.vcontrol_mode_sub.take() {
            self.bus.unsubscribe(sub);
        }
        if let Some(sub) = self.params_sub.take() {
            self.bus.unsubscribe(sub);
        }
        if let Some(sub) = self.actuator_ctrl_0_sub.take() {
            self.bus.unsubscribe(sub);
        }

        self.rc.deinit();
    }

    /// Tracks HIL and arming state.
    ///
    /// Entering HIL mutes local snapshot publication (an external replay
    /// takes over); leaving HIL resumes it. The final branch is a safeguard:
    /// outside HIL the engine must never stay muted.
    fn vehicle_control_mode_poll(&mut self) {
        let Some(sub) = self.vcontrol_mode_sub.as_ref() else {
            return;
        };
        if !self.bus.updated(sub) {
            return;
        }
        let Some(mode) = self.bus.copy(sub) else {
            return;
        };

        if mode.flag_system_hil_enabled && !self.hil_enabled {
            self.hil_enabled = true;
            self.publishing = false;
        } else if !mode.flag_system_hil_enabled && self.hil_enabled {
            self.hil_enabled = false;
            self.publishing = true;
        } else if !self.publishing && !self.hil_enabled {
            self.publishing = true;
        }

        self.armed = mode.flag_armed;
    }

    /// Re-reads parameters and re-binds calibration when the store changed
    /// (or unconditionally when `forced`).
    fn parameter_update_poll(&mut self, forced: bool) {
        let updated = self
            .params_sub
            .as_ref()
            .map(|sub| self.bus.updated(sub))
            .unwrap_or(false);

        if !(updated || forced) {
            return;
        }

        // read the notification to clear the updated flag
        if let Some(sub) = self.params_sub.as_ref() {
            let _ = self.bus.copy(sub);
        }

        self.sensor_params = SensorParams::from_store(&self.params);

        // failures inside are logged and recovered; the loop never stops
        // over a parameter pass
        let _ = self
            .voted
            .parameters_update(&self.params, &mut self.registry, &self.sensor_params);

        self.power
            .set_battery_config(battery_config_from_store(&self.params));
    }

    fn diff_pres_poll(&mut self, raw: &SensorCombined) {
        let Some(sub) = self.diff_pres_sub.as_ref() else {
            return;
        };
        self.airspeed.diff_pres_poll(
            &mut self.bus,
            sub,
            self.time.now_us(),
            raw,
            self.voted.baro_pressure(),
        );
    }
}
