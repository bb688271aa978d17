//! Shared parameter store
//!
//! Wraps the core [`ParameterStore`] for concurrent access: any thread may
//! read, writes are serialized through the lock. Notifying writes publish a
//! `parameter_update` message so the engine re-runs its parameter pass.

use std::sync::{Arc, RwLock};

use sensorvote_core::msg::ParameterUpdate;
use sensorvote_core::params::{ParamError, ParamValue, ParameterStore};
use sensorvote_core::traits::TimeSource;
use sensorvote_engine::bus::Bus;
use sensorvote_engine::params::{ParamStore, SensorParams};

use crate::bus::MemoryBus;
use crate::time::HostTime;

/// Parameter store shared between the engine, the CLI and tests.
#[derive(Clone)]
pub struct SharedParams {
    store: Arc<RwLock<ParameterStore>>,
    bus: MemoryBus,
    time: HostTime,
}

impl SharedParams {
    /// Creates the store with every contractual parameter registered.
    pub fn new(bus: MemoryBus, time: HostTime) -> Self {
        let mut store = ParameterStore::new();
        SensorParams::register_defaults(&mut store)
            .expect("default parameter set exceeds store capacity");
        Self {
            store: Arc::new(RwLock::new(store)),
            bus,
            time,
        }
    }

    /// Sets a parameter and notifies listeners, as a GCS write would.
    pub fn set(&self, name: &str, value: ParamValue) -> Result<(), ParamError> {
        self.store.write().unwrap().set(name, value)?;
        self.notify();
        Ok(())
    }

    /// Publishes a parameter-update notification.
    pub fn notify(&self) {
        let mut bus = self.bus.clone();
        bus.publish(&ParameterUpdate {
            timestamp: self.time.now_us(),
        });
    }

    /// Raw value access for status output and tests.
    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.store.read().unwrap().get(name)
    }
}

impl ParamStore for SharedParams {
    fn get_i32(&self, name: &str) -> Option<i32> {
        self.store.read().unwrap().get_i32(name)
    }

    fn get_f32(&self, name: &str) -> Option<f32> {
        self.store.read().unwrap().get_f32(name)
    }

    fn set_i32_no_notification(&self, name: &str, value: i32) -> Result<(), ParamError> {
        self.store
            .write()
            .unwrap()
            .set_no_notification(name, ParamValue::Int(value))
    }

    fn contains(&self, name: &str) -> bool {
        self.store.read().unwrap().contains(name)
    }
}
