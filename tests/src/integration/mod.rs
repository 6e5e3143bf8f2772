//! Cross-crate tests: broker, simulated device and property event bus.

pub mod flows;
pub mod properties;
