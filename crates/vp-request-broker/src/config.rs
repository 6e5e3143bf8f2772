//! Broker configuration.

use crate::error::{BrokerError, BrokerResult};
use serde::{Deserialize, Serialize};
use shared_types::PropertyId;
use std::env;
use std::time::Duration;

/// Configuration for the property request broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Fixed wait before re-issuing a request the device reported busy
    pub retry_backoff: Duration,

    /// How often the broker sweeps its own deadlines
    pub sweep_interval: Duration,

    /// Timeout used by callers that do not pick one
    pub default_timeout: Duration,

    /// `(client_id, device_id)` pairs for properties whose ids differ
    pub property_id_aliases: Vec<(PropertyId, PropertyId)>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            retry_backoff: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(50),
            default_timeout: Duration::from_secs(10),
            property_id_aliases: Vec::new(),
        }
    }
}

impl BrokerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `VP_RETRY_BACKOFF_MS`: Retry backoff (default: 100)
    /// - `VP_SWEEP_INTERVAL_MS`: Deadline sweep interval (default: 50)
    /// - `VP_DEFAULT_TIMEOUT_MS`: Default request timeout (default: 10000)
    /// - `VP_PROPERTY_ALIASES`: `client:device` pairs, comma separated,
    ///   decimal or `0x` hex (default: none)
    pub fn from_env() -> BrokerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> BrokerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, fallback: Duration| -> BrokerResult<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| BrokerError::InvalidConfig(format!("{key}={raw}: {e}"))),
                None => Ok(fallback),
            }
        };

        let config = Self {
            retry_backoff: millis("VP_RETRY_BACKOFF_MS", defaults.retry_backoff)?,
            sweep_interval: millis("VP_SWEEP_INTERVAL_MS", defaults.sweep_interval)?,
            default_timeout: millis("VP_DEFAULT_TIMEOUT_MS", defaults.default_timeout)?,
            property_id_aliases: match lookup("VP_PROPERTY_ALIASES") {
                Some(raw) => parse_aliases(&raw)?,
                None => defaults.property_id_aliases,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the broker cannot run with.
    pub fn validate(&self) -> BrokerResult<()> {
        if self.retry_backoff.is_zero() {
            return Err(BrokerError::InvalidConfig(
                "retry_backoff must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(BrokerError::InvalidConfig(
                "sweep_interval must be greater than zero".to_string(),
            ));
        }
        if self.default_timeout.is_zero() {
            return Err(BrokerError::InvalidConfig(
                "default_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse `client:device[,client:device...]`.
pub fn parse_aliases(raw: &str) -> BrokerResult<Vec<(PropertyId, PropertyId)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (client, device) = pair.split_once(':').ok_or_else(|| {
                BrokerError::InvalidConfig(format!("alias '{pair}' is not client:device"))
            })?;
            Ok((parse_property_id(client)?, parse_property_id(device)?))
        })
        .collect()
}

fn parse_property_id(raw: &str) -> BrokerResult<PropertyId> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        // Property ids use the full 32 bits, so hex parses as unsigned
        Some(hex) => u32::from_str_radix(hex, 16).map(|v| v as PropertyId),
        None => raw.parse::<PropertyId>(),
    };
    parsed.map_err(|e| BrokerError::InvalidConfig(format!("property id '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.retry_backoff, Duration::from_millis(100));
        assert_eq!(config.sweep_interval, Duration::from_millis(50));
        assert_eq!(config.default_timeout, Duration::from_secs(10));
        assert!(config.property_id_aliases.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = BrokerConfig::from_lookup(lookup(&[
            ("VP_RETRY_BACKOFF_MS", "20"),
            ("VP_SWEEP_INTERVAL_MS", "5"),
            ("VP_DEFAULT_TIMEOUT_MS", "750"),
            ("VP_PROPERTY_ALIASES", "0x11:0x21, 7:9"),
        ]))
        .unwrap();

        assert_eq!(config.retry_backoff, Duration::from_millis(20));
        assert_eq!(config.sweep_interval, Duration::from_millis(5));
        assert_eq!(config.default_timeout, Duration::from_millis(750));
        assert_eq!(config.property_id_aliases, vec![(0x11, 0x21), (7, 9)]);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        assert!(BrokerConfig::from_lookup(lookup(&[("VP_RETRY_BACKOFF_MS", "soon")])).is_err());
        assert!(BrokerConfig::from_lookup(lookup(&[("VP_SWEEP_INTERVAL_MS", "0")])).is_err());
        assert!(BrokerConfig::from_lookup(lookup(&[("VP_PROPERTY_ALIASES", "12")])).is_err());
    }

    #[test]
    fn test_parse_full_width_hex_id() {
        let aliases = parse_aliases("0x11400400:0x21400400").unwrap();
        assert_eq!(aliases, vec![(0x1140_0400, 0x2140_0400)]);

        let aliases = parse_aliases("0xF1400400:1").unwrap();
        assert_eq!(aliases[0].0, 0xF140_0400_u32 as PropertyId);
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: BrokerConfig =
            serde_json::from_str(r#"{"property_id_aliases": [[1, 2]]}"#).unwrap();
        assert_eq!(config.property_id_aliases, vec![(1, 2)]);
        assert_eq!(config.retry_backoff, Duration::from_millis(100));
    }
}
