//! Simulated device registry and ADC
//!
//! Stand-ins for the driver layer: devices carry a settable identity and
//! external-mag flag and capture whatever the engine pushes at them, so
//! tests and the simulation CLI can assert on applied calibration. The ADC
//! serves raw channel values settable from another thread.

use std::sync::{Arc, Mutex, MutexGuard};

use sensorvote_engine::device::{
    AdcDriver, AdcSample, DeviceError, DeviceHandle, DeviceRegistry, SensorKind, SensorScale,
    ADC_MAX_CHANNELS,
};

use sensorvote_core::validation::SENSOR_COUNT_MAX;

/// Analog channel layout of the simulated board.
pub const ADC_BATTERY_VOLTAGE_CHANNEL: u8 = 2;
pub const ADC_BATTERY_CURRENT_CHANNEL: u8 = 3;
pub const ADC_AIRSPEED_VOLTAGE_CHANNEL: u8 = 15;

/// One simulated device.
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    pub device_id: i32,
    pub external_mag: bool,
    /// Last calibration the engine pushed, if any.
    pub applied: Option<SensorScale>,
    /// Last sea-level reference the engine pushed (Pa).
    pub sea_level_pa: Option<f32>,
    /// Last airspeed offset/scale the engine pushed.
    pub airspeed_scale: Option<(f32, f32)>,
}

impl SimDevice {
    pub fn new(device_id: i32) -> Self {
        Self {
            device_id,
            ..Default::default()
        }
    }

    pub fn external(device_id: i32) -> Self {
        Self {
            device_id,
            external_mag: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct SimDevices {
    gyros: [Option<SimDevice>; SENSOR_COUNT_MAX],
    accels: [Option<SimDevice>; SENSOR_COUNT_MAX],
    mags: [Option<SimDevice>; SENSOR_COUNT_MAX],
    baros: [Option<SimDevice>; SENSOR_COUNT_MAX],
    airspeed: Option<SimDevice>,
}

impl SimDevices {
    fn bank_mut(&mut self, kind: SensorKind) -> &mut [Option<SimDevice>; SENSOR_COUNT_MAX] {
        match kind {
            SensorKind::Gyro => &mut self.gyros,
            SensorKind::Accel => &mut self.accels,
            SensorKind::Mag => &mut self.mags,
            SensorKind::Baro => &mut self.baros,
        }
    }
}

#[derive(Clone, Copy)]
enum HandleTarget {
    Slot(SensorKind, usize),
    Airspeed,
}

/// Transient handle onto one simulated device.
pub struct SimHandle<'a> {
    guard: MutexGuard<'a, SimDevices>,
    target: HandleTarget,
}

impl SimHandle<'_> {
    fn device(&self) -> &SimDevice {
        match self.target {
            HandleTarget::Slot(kind, slot) => match kind {
                SensorKind::Gyro => self.guard.gyros[slot].as_ref(),
                SensorKind::Accel => self.guard.accels[slot].as_ref(),
                SensorKind::Mag => self.guard.mags[slot].as_ref(),
                SensorKind::Baro => self.guard.baros[slot].as_ref(),
            }
            .expect("handle onto absent device"),
            HandleTarget::Airspeed => self.guard.airspeed.as_ref().expect("handle onto absent device"),
        }
    }

    fn device_mut(&mut self) -> &mut SimDevice {
        match self.target {
            HandleTarget::Slot(kind, slot) => self.guard.bank_mut(kind)[slot]
                .as_mut()
                .expect("handle onto absent device"),
            HandleTarget::Airspeed => self.guard.airspeed.as_mut().expect("handle onto absent device"),
        }
    }
}

impl DeviceHandle for SimHandle<'_> {
    fn device_id(&self) -> i32 {
        self.device().device_id
    }

    fn apply_calibration(&mut self, scale: &SensorScale) -> Result<(), DeviceError> {
        self.device_mut().applied = Some(*scale);
        Ok(())
    }

    fn is_external_mag(&self) -> bool {
        self.device().external_mag
    }

    fn set_sea_level_pressure(&mut self, pressure_pa: f32) -> Result<(), DeviceError> {
        self.device_mut().sea_level_pa = Some(pressure_pa);
        Ok(())
    }

    fn set_airspeed_scale(&mut self, offset_pa: f32, scale: f32) -> Result<(), DeviceError> {
        self.device_mut().airspeed_scale = Some((offset_pa, scale));
        Ok(())
    }
}

/// Shared raw channel values served by [`SimAdc`].
#[derive(Clone, Default)]
pub struct SimAdcState {
    samples: Arc<Mutex<Vec<AdcSample>>>,
}

impl SimAdcState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces one channel's raw value.
    pub fn set_channel(&self, channel: u8, raw: u16) {
        let mut samples = self.samples.lock().unwrap();
        if let Some(sample) = samples.iter_mut().find(|s| s.channel == channel) {
            sample.raw = raw;
        } else {
            samples.push(AdcSample { channel, raw });
        }
    }
}

/// Simulated one-shot multi-channel ADC.
#[derive(Clone)]
pub struct SimAdc {
    state: SimAdcState,
    airspeed_wired: bool,
}

impl AdcDriver for SimAdc {
    fn read(&mut self, buf: &mut [AdcSample; ADC_MAX_CHANNELS]) -> Result<usize, DeviceError> {
        let samples = self.state.samples.lock().unwrap();
        let count = samples.len().min(ADC_MAX_CHANNELS);
        buf[..count].copy_from_slice(&samples[..count]);
        Ok(count)
    }

    fn battery_voltage_channel(&self) -> u8 {
        ADC_BATTERY_VOLTAGE_CHANNEL
    }

    fn battery_current_channel(&self) -> u8 {
        ADC_BATTERY_CURRENT_CHANNEL
    }

    fn airspeed_channel(&self) -> Option<u8> {
        self.airspeed_wired.then_some(ADC_AIRSPEED_VOLTAGE_CHANNEL)
    }
}

/// Simulated driver registry.
#[derive(Clone, Default)]
pub struct SimRegistry {
    devices: Arc<Mutex<SimDevices>>,
    adc: Option<SimAdcState>,
    airspeed_wired: bool,
}

impl SimRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a device into a class slot.
    pub fn add_device(&self, kind: SensorKind, slot: usize, device: SimDevice) {
        self.devices.lock().unwrap().bank_mut(kind)[slot] = Some(device);
    }

    /// Installs the differential-pressure driver.
    pub fn add_airspeed_device(&self, device: SimDevice) {
        self.devices.lock().unwrap().airspeed = Some(device);
    }

    /// Wires up the ADC; `airspeed_wired` connects the analog airspeed
    /// channel.
    pub fn add_adc(&mut self, state: SimAdcState, airspeed_wired: bool) {
        self.adc = Some(state);
        self.airspeed_wired = airspeed_wired;
    }

    /// Snapshot of one device, for assertions.
    pub fn device(&self, kind: SensorKind, slot: usize) -> Option<SimDevice> {
        let mut devices = self.devices.lock().unwrap();
        devices.bank_mut(kind)[slot].clone()
    }
}

impl DeviceRegistry for SimRegistry {
    type Handle<'a>
        = SimHandle<'a>
    where
        Self: 'a;
    type Adc = SimAdc;

    fn open(&mut self, kind: SensorKind, slot: usize) -> Option<Self::Handle<'_>> {
        if slot >= SENSOR_COUNT_MAX {
            return None;
        }
        let guard = self.devices.lock().unwrap();
        let present = match kind {
            SensorKind::Gyro => guard.gyros[slot].is_some(),
            SensorKind::Accel => guard.accels[slot].is_some(),
            SensorKind::Mag => guard.mags[slot].is_some(),
            SensorKind::Baro => guard.baros[slot].is_some(),
        };
        present.then(|| SimHandle {
            guard,
            target: HandleTarget::Slot(kind, slot),
        })
    }

    fn open_adc(&mut self) -> Option<Self::Adc> {
        self.adc.clone().map(|state| SimAdc {
            state,
            airspeed_wired: self.airspeed_wired,
        })
    }

    fn open_airspeed(&mut self) -> Option<Self::Handle<'_>> {
        let guard = self.devices.lock().unwrap();
        guard.airspeed.is_some().then(|| SimHandle {
            guard,
            target: HandleTarget::Airspeed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_absent_slot() {
        let mut registry = SimRegistry::new();
        assert!(registry.open(SensorKind::Gyro, 0).is_none());
        assert!(registry.open(SensorKind::Gyro, 7).is_none());
    }

    #[test]
    fn test_handle_captures_calibration() {
        let mut registry = SimRegistry::new();
        registry.add_device(SensorKind::Gyro, 0, SimDevice::new(42));

        {
            let mut handle = registry.open(SensorKind::Gyro, 0).unwrap();
            assert_eq!(handle.device_id(), 42);
            handle
                .apply_calibration(&SensorScale {
                    x_offset: 0.1,
                    ..Default::default()
                })
                .unwrap();
        }

        let device = registry.device(SensorKind::Gyro, 0).unwrap();
        assert_eq!(device.applied.unwrap().x_offset, 0.1);
    }

    #[test]
    fn test_adc_serves_channel_values() {
        let state = SimAdcState::new();
        state.set_channel(ADC_BATTERY_VOLTAGE_CHANNEL, 1500);
        state.set_channel(ADC_BATTERY_CURRENT_CHANNEL, 100);

        let mut adc = SimAdc {
            state: state.clone(),
            airspeed_wired: false,
        };
        let mut buf = [AdcSample::default(); ADC_MAX_CHANNELS];
        let count = adc.read(&mut buf).unwrap();
        assert_eq!(count, 2);

        state.set_channel(ADC_BATTERY_VOLTAGE_CHANNEL, 1600);
        adc.read(&mut buf).unwrap();
        assert_eq!(buf[0].raw, 1600);
        assert!(adc.airspeed_channel().is_none());
    }
}
