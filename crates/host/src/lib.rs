//! sensorvote_host - std runtime for the sensorvote engine
//!
//! Provides the platform services the engine needs on a host: an in-memory
//! publish/subscribe bus, a shared parameter store, simulated device
//! registries and synthetic sensor feeders. The `sensorvote` binary wires
//! these into the CLI.

pub mod bus;
pub mod device;
pub mod params;
pub mod sim;
pub mod time;

pub use bus::MemoryBus;
pub use device::{SimAdc, SimDevice, SimRegistry};
pub use params::SharedParams;
pub use time::HostTime;
