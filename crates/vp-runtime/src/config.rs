//! # Runtime Configuration
//!
//! Broker settings plus the knobs of the simulated device and the event bus.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use vp_request_broker::{BrokerConfig, BrokerError, BrokerResult};

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Broker configuration.
    pub broker: BrokerConfig,
    /// Simulated device configuration.
    pub device: DeviceConfig,
    /// Buffer per property event bus subscriber.
    pub bus_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            device: DeviceConfig::default(),
            bus_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Simulated device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Base delay before the device answers a request.
    pub latency: Duration,
    /// Random extra delay added on top of `latency`, up to this much.
    pub jitter: Duration,
    /// Probability in `[0, 1]` that a request is answered with `TryAgain`.
    pub busy_ratio: f64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(20),
            jitter: Duration::from_millis(10),
            busy_ratio: 0.1,
        }
    }
}

impl RuntimeConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Everything [`BrokerConfig::from_env`] reads, plus:
    ///
    /// - `VP_DEVICE_LATENCY_MS`: Simulated device latency (default: 20)
    /// - `VP_DEVICE_JITTER_MS`: Maximum extra latency (default: 10)
    /// - `VP_DEVICE_BUSY_RATIO`: Share of requests answered busy (default: 0.1)
    /// - `VP_BUS_CAPACITY`: Event bus buffer per subscriber (default: 1000)
    pub fn from_env() -> BrokerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> BrokerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| -> BrokerResult<Option<u64>> {
            lookup(key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map_err(|e| BrokerError::InvalidConfig(format!("{key}={raw}: {e}")))
                })
                .transpose()
        };

        let busy_ratio = match lookup("VP_DEVICE_BUSY_RATIO") {
            Some(raw) => raw.trim().parse::<f64>().map_err(|e| {
                BrokerError::InvalidConfig(format!("VP_DEVICE_BUSY_RATIO={raw}: {e}"))
            })?,
            None => defaults.device.busy_ratio,
        };

        let config = Self {
            broker: BrokerConfig::from_lookup(&lookup)?,
            device: DeviceConfig {
                latency: parse("VP_DEVICE_LATENCY_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.device.latency),
                jitter: parse("VP_DEVICE_JITTER_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.device.jitter),
                busy_ratio,
            },
            bus_capacity: parse("VP_BUS_CAPACITY")?
                .map(|v| v as usize)
                .unwrap_or(defaults.bus_capacity),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BrokerResult<()> {
        self.broker.validate()?;
        if !(0.0..=1.0).contains(&self.device.busy_ratio) {
            return Err(BrokerError::InvalidConfig(format!(
                "busy_ratio {} is outside [0, 1]",
                self.device.busy_ratio
            )));
        }
        if self.bus_capacity == 0 {
            return Err(BrokerError::InvalidConfig(
                "bus_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
