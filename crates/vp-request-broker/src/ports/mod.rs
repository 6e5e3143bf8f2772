//! Ports layer (hexagonal architecture).

pub mod inbound;
pub mod outbound;

pub use inbound::{DeviceEventSink, PropertyBrokerApi};
pub use outbound::{ClientChannel, DeviceInterface, PropertyEventListener, ResultCallback};
