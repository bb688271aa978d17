//! Full-stack integration tests: engine against the in-memory bus, shared
//! parameter store and simulated devices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sensorvote_core::msg::{
    AccelSample, Airspeed, BaroSample, BatteryStatus, DifferentialPressure, GyroSample,
    SensorCombined, VehicleControlMode,
};
use sensorvote_core::params::ParamValue;
use sensorvote_core::rotation::{rotation_matrix, Rotation};
use sensorvote_core::traits::{MockTime, TimeSource};
use sensorvote_core::validation::ErrorFlags;

use sensorvote_engine::airdata::AirspeedUpdater;
use sensorvote_engine::bus::Bus;
use sensorvote_engine::device::{DeviceRegistry, SensorKind};
use sensorvote_engine::params::{ParamStore, SensorParams};
use sensorvote_engine::power::PowerMonitor;
use sensorvote_engine::rc::NoopRc;
use sensorvote_engine::voted::VotedSensors;
use sensorvote_engine::SensorsTask;

use sensorvote_host::device::{
    SimAdcState, ADC_AIRSPEED_VOLTAGE_CHANNEL, ADC_BATTERY_CURRENT_CHANNEL,
    ADC_BATTERY_VOLTAGE_CHANNEL,
};
use sensorvote_host::{HostTime, MemoryBus, SharedParams, SimDevice, SimRegistry};

fn gyro_sample(timestamp: u64, x: f32, y: f32, z: f32) -> GyroSample {
    GyroSample {
        timestamp,
        x,
        y,
        z,
        integral: None,
        error_count: 0,
    }
}

fn accel_sample(timestamp: u64) -> AccelSample {
    AccelSample {
        timestamp,
        x: 0.0,
        y: 0.0,
        z: -9.81,
        integral: None,
        error_count: 0,
    }
}

/// Scenario: a single gyro with identity board rotation. Two samples
/// 1000 us apart land verbatim in the snapshot with a synthesized dt.
#[test]
fn single_gyro_identity_rotation() {
    let mut bus = MemoryBus::new();
    let mut voted = VotedSensors::new();
    let mut raw = SensorCombined::default();

    bus.publish_instance(0, &gyro_sample(1_000_000, 0.1, -0.2, 0.3));
    voted.initialize_sensors(&mut bus);
    assert_eq!(voted.num_gyros(), 1);

    voted.gyro_poll(&mut bus, 1_000_100, &mut raw);
    bus.publish_instance(0, &gyro_sample(1_001_000, 0.1, -0.2, 0.3));
    voted.gyro_poll(&mut bus, 1_001_100, &mut raw);

    for (out, expected) in raw.gyro_rad.iter().zip([0.1, -0.2, 0.3]) {
        assert!((out - expected).abs() < 1e-6);
    }
    assert!((raw.gyro_integral_dt - 0.001).abs() < 1e-7);
    // the gyro paces the snapshot
    assert_eq!(raw.timestamp, 1_001_000);
}

/// Scenario: two equal-priority accels; instance 0 stops updating. Past the
/// timeout the vote switches to instance 1, one failover is recorded with
/// the TIMEOUT flag, and the reporter fires exactly once.
#[test]
fn failover_on_timeout() {
    let mut bus = MemoryBus::new();
    let mut voted = VotedSensors::new();
    let mut raw = SensorCombined::default();

    bus.publish_instance(0, &accel_sample(1_000_000));
    bus.publish_instance(1, &accel_sample(1_000_000));
    voted.initialize_sensors(&mut bus);

    let mut t = 1_000_000;
    for _ in 0..10 {
        t += 1000;
        bus.publish_instance(0, &accel_sample(t));
        bus.publish_instance(1, &accel_sample(t));
        voted.accel_poll(&mut bus, t + 100, &mut raw);
    }
    assert_eq!(voted.accel.last_best_vote, 0);
    assert_eq!(voted.accel.voter.failover_count(), 0);

    // instance 0 goes silent; keep instance 1 alive past the timeout
    for _ in 0..30 {
        t += 1000;
        bus.publish_instance(1, &accel_sample(t));
        voted.accel_poll(&mut bus, t + 100, &mut raw);
    }

    assert_eq!(voted.accel.last_best_vote, 1);
    assert_eq!(voted.accel.voter.failover_count(), 1);
    assert_eq!(voted.accel.voter.failover_index(), 0);
    assert!(voted.accel.voter.failover_state().contains(ErrorFlags::TIMEOUT));

    // exactly one report for the one failover
    assert!(VotedSensors::check_failover_class(&mut voted.accel, "Accel"));
    assert!(!VotedSensors::check_failover_class(&mut voted.accel, "Accel"));
}

/// Scenario: `CAL_MAG0_ROT = -1` while the driver reports the mag as
/// external and the legacy `SENS_EXT_MAG_ROT` is 4. The parameter pass
/// migrates the legacy value into the slot and zeroes the legacy parameter.
#[test]
fn mag_rotation_migration() {
    let bus = MemoryBus::new();
    let params = SharedParams::new(bus.clone(), HostTime::new());
    let mut registry = SimRegistry::new();
    registry.add_device(SensorKind::Mag, 0, SimDevice::external(77));
    registry.add_device(SensorKind::Baro, 0, SimDevice::new(900));

    params.set("CAL_MAG0_ID", ParamValue::Int(77)).unwrap();
    params.set("SENS_EXT_MAG_ROT", ParamValue::Int(4)).unwrap();
    assert_eq!(params.get_i32("CAL_MAG0_ROT"), Some(-1));

    let mut voted = VotedSensors::new();
    voted
        .parameters_update(&params, &mut registry, &SensorParams::default())
        .unwrap();

    assert_eq!(params.get_i32("CAL_MAG0_ROT"), Some(4));
    assert_eq!(params.get_i32("SENS_EXT_MAG_ROT"), Some(0));
    assert_eq!(voted.mag_rotation(0), &rotation_matrix(Rotation::Yaw180));
}

/// Scenario: stored gyro calibration record 0 names another device; record
/// 1 matches. The applier skips record 0, pushes record 1, and counts one
/// calibrated gyro.
#[test]
fn calibration_device_id_mismatch() {
    let bus = MemoryBus::new();
    let params = SharedParams::new(bus.clone(), HostTime::new());
    let mut registry = SimRegistry::new();
    registry.add_device(SensorKind::Gyro, 0, SimDevice::new(123));
    registry.add_device(SensorKind::Baro, 0, SimDevice::new(900));

    params.set("CAL_GYRO0_ID", ParamValue::Int(456)).unwrap();
    params.set("CAL_GYRO0_XOFF", ParamValue::Float(9.9)).unwrap();
    params.set("CAL_GYRO1_ID", ParamValue::Int(123)).unwrap();
    params.set("CAL_GYRO1_XOFF", ParamValue::Float(0.25)).unwrap();
    params.set("CAL_GYRO1_YSCALE", ParamValue::Float(1.05)).unwrap();

    let mut voted = VotedSensors::new();
    voted
        .parameters_update(&params, &mut registry, &SensorParams::default())
        .unwrap();

    let device = registry.device(SensorKind::Gyro, 0).unwrap();
    let applied = device.applied.expect("calibration must be applied");
    assert_eq!(applied.x_offset, 0.25);
    assert_eq!(applied.y_scale, 1.05);
    assert_eq!(voted.calibration_counts().0, 1);
}

/// Scenario: the pitot reports an invalid temperature (-500). The airspeed
/// block falls back to baro temperature minus the 5 degC PCB self-heating
/// estimate.
#[test]
fn airspeed_pcb_temperature_fallback() {
    let mut bus = MemoryBus::new();
    let mut voted = VotedSensors::new();
    let mut raw = SensorCombined::default();

    bus.publish_instance(
        0,
        &BaroSample {
            timestamp: 1_000_000,
            altitude: 500.0,
            temperature: 25.0,
            pressure: 955.0,
            error_count: 0,
        },
    );
    voted.initialize_sensors(&mut bus);
    voted.baro_poll(&mut bus, 1_000_100, &mut raw);
    assert_eq!(raw.baro_temp_celsius, 25.0);
    assert_eq!(voted.baro_pressure(), 955.0);

    let diff_sub = bus.subscribe::<DifferentialPressure>(0).unwrap();
    let air_sub = bus.subscribe::<Airspeed>(0).unwrap();

    bus.publish(&DifferentialPressure {
        timestamp: 1_001_000,
        differential_pressure_raw_pa: 50.0,
        differential_pressure_filtered_pa: 48.0,
        temperature: -500.0,
        error_count: 0,
    });

    let mut updater = AirspeedUpdater::new();
    updater.diff_pres_poll(&mut bus, &diff_sub, 1_001_100, &raw, voted.baro_pressure());

    let airspeed = bus.copy(&air_sub).expect("airspeed must publish");
    assert_eq!(airspeed.air_temperature_celsius, 20.0);
    assert!(airspeed.indicated_airspeed_m_s >= 0.0);
    assert!(airspeed.true_airspeed_m_s >= 0.0);
    assert!(airspeed.true_airspeed_unfiltered_m_s >= 0.0);
}

/// Scenario: ADC polls 5 ms apart are rate limited; 10 ms apart they read.
#[test]
fn adc_rate_limit() {
    let mut bus = MemoryBus::new();
    let time = MockTime::with_initial(1_000_000);

    let state = SimAdcState::new();
    state.set_channel(ADC_BATTERY_VOLTAGE_CHANNEL, 1500);
    state.set_channel(ADC_BATTERY_CURRENT_CHANNEL, 120);

    let mut registry = SimRegistry::new();
    registry.add_adc(state, false);

    let mut power: PowerMonitor<_> = PowerMonitor::new();
    power.set_adc(registry.open_adc().unwrap());

    let bat_sub = bus.subscribe::<BatteryStatus>(0).unwrap();
    let params = SensorParams::default();

    power.adc_poll(&mut bus, &time, &params, None, false, true);
    assert!(bus.updated(&bat_sub), "first poll must read and publish");
    let status = bus.copy(&bat_sub).unwrap();
    assert!(status.voltage_v > 10.0);

    time.advance(5_000);
    power.adc_poll(&mut bus, &time, &params, None, false, true);
    assert!(!bus.updated(&bat_sub), "5 ms later the poll is a no-op");

    time.advance(5_000);
    power.adc_poll(&mut bus, &time, &params, None, false, true);
    assert!(bus.updated(&bat_sub), "10 ms later the poll reads again");
}

/// An analog airspeed channel above 0.4 V with a configured scale produces
/// a synthesized differential-pressure publication with the EMA filter and
/// the -1000 temperature sentinel.
#[test]
fn adc_synthesized_differential_pressure() {
    let mut bus = MemoryBus::new();
    let time = MockTime::with_initial(1_000_000);

    let state = SimAdcState::new();
    // ~0.8 V at the pin after the divider factor
    state.set_channel(ADC_AIRSPEED_VOLTAGE_CHANNEL, 500);

    let mut registry = SimRegistry::new();
    registry.add_adc(state, true);

    let mut power: PowerMonitor<_> = PowerMonitor::new();
    power.set_adc(registry.open_adc().unwrap());

    let dp_sub = bus.subscribe::<DifferentialPressure>(0).unwrap();

    let mut params = SensorParams::default();
    params.diff_pres_analog_scale = 100.0;
    params.diff_pres_offset_pa = 5.0;

    power.adc_poll(&mut bus, &time, &params, None, false, true);

    let dp = bus.copy(&dp_sub).expect("synthesized diff-pres must publish");
    let voltage = 500.0 * 3.3 / 4096.0 * 2.0;
    let expected_raw = voltage * 100.0 - 5.0;
    assert!((dp.differential_pressure_raw_pa - expected_raw).abs() < 1e-3);
    // EMA from zero: 0.9 * 0 + 0.1 * raw
    assert!((dp.differential_pressure_filtered_pa - 0.1 * expected_raw).abs() < 1e-3);
    assert_eq!(dp.temperature, -1000.0);
    assert_eq!(dp.timestamp, 1_000_000);

    // with the scale unset the channel is ignored
    let mut params_off = SensorParams::default();
    params_off.diff_pres_analog_scale = 0.0;
    time.advance(10_000);
    power.adc_poll(&mut bus, &time, &params_off, None, false, true);
    assert!(!bus.updated(&dp_sub));
}

/// Boots the full loop against the in-memory bus and verifies snapshot
/// publication, relative timestamps, HIL suppression and resume.
#[test]
fn full_loop_publishes_and_hil_suppresses() {
    let bus = MemoryBus::new();
    let time = HostTime::new();
    let params = SharedParams::new(bus.clone(), time.clone());
    let registry = SimRegistry::new();

    let should_exit = Arc::new(AtomicBool::new(false));
    let status_request = Arc::new(AtomicBool::new(false));

    let worker = {
        let bus = bus.clone();
        let params = params.clone();
        let time = time.clone();
        let registry = registry.clone();
        let should_exit = Arc::clone(&should_exit);
        let status_request = Arc::clone(&status_request);
        thread::spawn(move || {
            let mut task = SensorsTask::new(bus, registry, params, time, NoopRc);
            task.run(&should_exit, &status_request);
        })
    };

    let mut feeder_bus = bus.clone();
    let mut snap_bus = bus.clone();
    let snap_sub = snap_bus.subscribe::<SensorCombined>(0).unwrap();

    let feed = |bus: &mut MemoryBus, time: &HostTime| {
        let t = time.now_us().max(1);
        bus.publish_instance(0, &gyro_sample(t, 0.01, 0.02, 0.03));
        bus.publish_instance(0, &accel_sample(t));
    };

    // feed until the loop publishes a paced snapshot
    let mut snapshot = None;
    for _ in 0..500 {
        feed(&mut feeder_bus, &time);
        thread::sleep(Duration::from_millis(2));
        if snap_bus.updated(&snap_sub) {
            let raw = snap_bus.copy(&snap_sub).unwrap();
            if raw.timestamp > 0 {
                snapshot = Some(raw);
                break;
            }
        }
    }
    let snapshot = snapshot.expect("loop must publish a paced snapshot");

    // accel rides along with a valid relative timestamp; no mag was ever
    // adopted, so its fields stay invalid
    assert_ne!(
        snapshot.accelerometer_timestamp_relative,
        SensorCombined::RELATIVE_TIMESTAMP_INVALID
    );
    assert!(snapshot.accelerometer_timestamp_relative.unsigned_abs() < 1_000_000);
    assert_eq!(
        snapshot.magnetometer_timestamp_relative,
        SensorCombined::RELATIVE_TIMESTAMP_INVALID
    );
    assert!((snapshot.accelerometer_m_s2[2] + 9.81).abs() < 0.1);

    // enter HIL: local snapshot publication must stop
    feeder_bus.publish(&VehicleControlMode {
        timestamp: time.now_us(),
        flag_system_hil_enabled: true,
        flag_armed: false,
    });
    // let in-flight ticks drain, then swallow anything already published
    thread::sleep(Duration::from_millis(50));
    let _ = snap_bus.copy(&snap_sub);

    for _ in 0..25 {
        feed(&mut feeder_bus, &time);
        thread::sleep(Duration::from_millis(2));
    }
    assert!(
        !snap_bus.updated(&snap_sub),
        "no sensor_combined publication in HIL mode"
    );

    // leave HIL: publication resumes
    feeder_bus.publish(&VehicleControlMode {
        timestamp: time.now_us(),
        flag_system_hil_enabled: false,
        flag_armed: false,
    });
    let mut resumed = false;
    for _ in 0..500 {
        feed(&mut feeder_bus, &time);
        thread::sleep(Duration::from_millis(2));
        if snap_bus.updated(&snap_sub) {
            resumed = true;
            break;
        }
    }
    assert!(resumed, "publication must resume after HIL clears");

    should_exit.store(true, Ordering::Relaxed);
    worker.join().unwrap();
}

/// The loop keeps running without any gyro and adopts one that appears
/// later (hot-plug while disarmed).
#[test]
fn hotplug_gyro_adoption() {
    let bus = MemoryBus::new();
    let time = HostTime::new();
    let params = SharedParams::new(bus.clone(), time.clone());
    let registry = SimRegistry::new();

    let should_exit = Arc::new(AtomicBool::new(false));
    let status_request = Arc::new(AtomicBool::new(false));

    let worker = {
        let bus = bus.clone();
        let params = params.clone();
        let time = time.clone();
        let registry = registry.clone();
        let should_exit = Arc::clone(&should_exit);
        let status_request = Arc::clone(&status_request);
        thread::spawn(move || {
            let mut task = SensorsTask::new(bus, registry, params, time, NoopRc);
            task.run(&should_exit, &status_request);
        })
    };

    // no sensors at all for a while
    thread::sleep(Duration::from_millis(30));

    let mut feeder_bus = bus.clone();
    let mut snap_bus = bus.clone();
    let snap_sub = snap_bus.subscribe::<SensorCombined>(0).unwrap();
    let _ = snap_bus.copy(&snap_sub); // swallow the advertisement

    let mut published = false;
    for _ in 0..500 {
        feeder_bus.publish_instance(0, &gyro_sample(time.now_us().max(1), 0.1, 0.0, 0.0));
        thread::sleep(Duration::from_millis(2));
        if snap_bus.updated(&snap_sub) {
            let raw = snap_bus.copy(&snap_sub).unwrap();
            if raw.timestamp > 0 {
                published = true;
                break;
            }
        }
    }
    assert!(published, "a late gyro must be adopted and paced on");

    should_exit.store(true, Ordering::Relaxed);
    worker.join().unwrap();
}
