//! # VP Runtime Library
//!
//! Exposes the runtime's building blocks for the binary and for tests: the
//! simulated device, the event bus adapter, the in-process client and the
//! wiring that ties them to the broker.
//!
//! ## Modular Structure
//!
//! - `config` - [`RuntimeConfig`] from environment variables
//! - `device` - [`SimulatedDevice`] and the device event pump
//! - `adapters` - [`BusPropertyListener`] onto the shared event bus
//! - `client` - [`ClientConnection`] with awaitable results
//! - `wiring` - [`BrokerRuntime`] startup and shutdown

#![allow(clippy::type_complexity)]

pub mod adapters;
pub mod client;
pub mod config;
pub mod device;
pub mod wiring;

pub use adapters::BusPropertyListener;
pub use client::{ClientConnection, ClientResult};
pub use config::{DeviceConfig, RuntimeConfig};
pub use device::{pump_device_events, DeviceEvent, SimulatedDevice};
pub use wiring::BrokerRuntime;
