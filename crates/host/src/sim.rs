//! Synthetic sensor feeders
//!
//! Background threads that publish plausible gyro/accel/mag/baro and
//! differential-pressure streams so the engine produces a live snapshot
//! stream on a bare host. Rates and signal shapes are class-typical; values
//! are steady with a small wobble, enough to exercise voting and filtering
//! without modeling a vehicle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sensorvote_core::msg::{
    AccelSample, BaroSample, DifferentialPressure, GyroSample, MagSample,
};
use sensorvote_core::traits::TimeSource;
use sensorvote_engine::bus::Bus;

use crate::bus::MemoryBus;
use crate::time::HostTime;

const GYRO_PERIOD: Duration = Duration::from_millis(4); // 250 Hz
const ACCEL_PERIOD: Duration = Duration::from_millis(4); // 250 Hz
const MAG_PERIOD: Duration = Duration::from_millis(20); // 50 Hz
const BARO_PERIOD: Duration = Duration::from_millis(20); // 50 Hz
const DIFF_PRES_PERIOD: Duration = Duration::from_millis(20); // 50 Hz

/// Spawns one feeder thread per sensor stream.
///
/// All threads stop when `stop` goes true; join the returned handles to
/// wait them out.
pub fn spawn_feeders(
    bus: &MemoryBus,
    time: &HostTime,
    stop: &Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    {
        let mut bus = bus.clone();
        let time = time.clone();
        let stop = Arc::clone(stop);
        handles.push(thread::spawn(move || {
            let mut phase = 0.0_f32;
            while !stop.load(Ordering::Relaxed) {
                phase += 0.01;
                bus.publish_instance(
                    0,
                    &GyroSample {
                        timestamp: time.now_us(),
                        x: 0.002 * phase.sin(),
                        y: -0.001 * phase.cos(),
                        z: 0.0005,
                        integral: None,
                        error_count: 0,
                    },
                );
                thread::sleep(GYRO_PERIOD);
            }
        }));
    }

    {
        let mut bus = bus.clone();
        let time = time.clone();
        let stop = Arc::clone(stop);
        handles.push(thread::spawn(move || {
            let mut phase = 0.0_f32;
            while !stop.load(Ordering::Relaxed) {
                phase += 0.01;
                bus.publish_instance(
                    0,
                    &AccelSample {
                        timestamp: time.now_us(),
                        x: 0.05 * phase.sin(),
                        y: 0.02 * phase.cos(),
                        z: -9.81,
                        integral: None,
                        error_count: 0,
                    },
                );
                thread::sleep(ACCEL_PERIOD);
            }
        }));
    }

    {
        let mut bus = bus.clone();
        let time = time.clone();
        let stop = Arc::clone(stop);
        handles.push(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                bus.publish_instance(
                    0,
                    &MagSample {
                        timestamp: time.now_us(),
                        x: 0.21,
                        y: 0.01,
                        z: 0.43,
                        error_count: 0,
                    },
                );
                thread::sleep(MAG_PERIOD);
            }
        }));
    }

    {
        let mut bus = bus.clone();
        let time = time.clone();
        let stop = Arc::clone(stop);
        handles.push(thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                bus.publish_instance(
                    0,
                    &BaroSample {
                        timestamp: time.now_us(),
                        altitude: 488.2,
                        temperature: 24.5,
                        pressure: 955.6,
                        error_count: 0,
                    },
                );
                thread::sleep(BARO_PERIOD);
            }
        }));
    }

    {
        let mut bus = bus.clone();
        let time = time.clone();
        let stop = Arc::clone(stop);
        handles.push(thread::spawn(move || {
            let mut filtered = 0.0_f32;
            while !stop.load(Ordering::Relaxed) {
                let raw = 12.5;
                filtered = filtered * 0.9 + raw * 0.1;
                bus.publish_instance(
                    0,
                    &DifferentialPressure {
                        timestamp: time.now_us(),
                        differential_pressure_raw_pa: raw,
                        differential_pressure_filtered_pa: filtered,
                        temperature: 23.0,
                        error_count: 0,
                    },
                );
                thread::sleep(DIFF_PRES_PERIOD);
            }
        }));
    }

    handles
}
