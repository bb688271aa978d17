//! sensorvote CLI
//!
//! `start` boots the aggregation engine in the foreground and serves
//! `status` / `stop` on stdin against the running instance. Without a
//! running instance, `stop` and `status` report "not running" and exit
//! nonzero (there is no cross-process control surface).

use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use sensorvote_engine::device::SensorKind;
use sensorvote_engine::rc::NoopRc;
use sensorvote_engine::SensorsTask;
use sensorvote_host::device::{
    SimAdcState, ADC_BATTERY_CURRENT_CHANNEL, ADC_BATTERY_VOLTAGE_CHANNEL,
};
use sensorvote_host::{sim, HostTime, MemoryBus, SharedParams, SimDevice, SimRegistry};

/// Probe cadence and count while waiting for the worker to exit.
const SHUTDOWN_PROBE: Duration = Duration::from_millis(20);
const SHUTDOWN_PROBES: u32 = 50;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("sensors worker did not stop within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("sensors worker panicked")]
    WorkerPanic,
}

#[derive(Parser)]
#[command(name = "sensorvote")]
#[command(about = "Redundant-sensor voting and fusion engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the engine in the foreground (stdin commands: status | stop)
    Start {
        /// Attach simulated sensors and feeders
        #[arg(long)]
        sim: bool,
        /// Enable the high-vibration alert
        #[arg(long)]
        vibration_check: bool,
    },
    /// Stop a running engine
    Stop,
    /// Print per-class voter state of a running engine
    Status,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start {
            sim,
            vibration_check,
        } => start(sim, vibration_check),
        Command::Stop | Command::Status => {
            eprintln!("not running");
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn start(sim: bool, vibration_check: bool) -> anyhow::Result<()> {
    let bus = MemoryBus::new();
    let time = HostTime::new();
    let params = SharedParams::new(bus.clone(), time.clone());
    let mut registry = SimRegistry::new();

    if sim {
        registry.add_device(SensorKind::Gyro, 0, SimDevice::new(0x2290));
        registry.add_device(SensorKind::Accel, 0, SimDevice::new(0x1376));
        registry.add_device(SensorKind::Mag, 0, SimDevice::new(0x0446));
        registry.add_device(SensorKind::Baro, 0, SimDevice::new(0x6ba6));

        let adc = SimAdcState::new();
        adc.set_channel(ADC_BATTERY_VOLTAGE_CHANNEL, 1420);
        adc.set_channel(ADC_BATTERY_CURRENT_CHANNEL, 80);
        registry.add_adc(adc, false);
    }

    let should_exit = Arc::new(AtomicBool::new(false));
    let status_request = Arc::new(AtomicBool::new(false));

    let worker = {
        let bus = bus.clone();
        let params = params.clone();
        let time = time.clone();
        let registry = registry.clone();
        let should_exit = Arc::clone(&should_exit);
        let status_request = Arc::clone(&status_request);

        thread::Builder::new()
            .name("sensors".into())
            .spawn(move || {
                let mut task = SensorsTask::new(bus, registry, params, time, NoopRc);
                task.set_force_airspeed_confidence(sim);
                task.set_vibration_check(vibration_check);
                task.run(&should_exit, &status_request);
            })
            .context("failed to spawn the sensors worker")?
    };

    let feeders = if sim {
        sim::spawn_feeders(&bus, &time, &should_exit)
    } else {
        Vec::new()
    };

    info!("sensors running; commands: status | stop");

    for line in io::stdin().lock().lines() {
        let line = line.unwrap_or_default();
        match line.trim() {
            "status" => status_request.store(true, Ordering::Relaxed),
            "stop" => break,
            "" => {}
            other => warn!("unrecognized command '{other}'"),
        }
    }

    should_exit.store(true, Ordering::Relaxed);

    // the worker wakes from its gyro wait at least every 50 ms; give it a
    // second before declaring it stuck
    let mut stopped = false;
    for _ in 0..SHUTDOWN_PROBES {
        if worker.is_finished() {
            stopped = true;
            break;
        }
        thread::sleep(SHUTDOWN_PROBE);
    }

    for feeder in feeders {
        let _ = feeder.join();
    }

    if !stopped {
        // a std thread cannot be force-terminated; abandon it and fail
        return Err(CliError::ShutdownTimeout(SHUTDOWN_PROBE * SHUTDOWN_PROBES).into());
    }

    worker.join().map_err(|_| CliError::WorkerPanic)?;
    info!("sensors stopped");
    Ok(())
}
