//! Property id translation between client and device id spaces.
//!
//! A handful of properties are exposed to clients under a different id than
//! the device uses. Unmapped ids pass through unchanged in both directions.

use crate::error::{BrokerError, BrokerResult};
use shared_types::PropertyId;
use std::collections::HashMap;

/// Bidirectional client <-> device property id map.
#[derive(Debug, Clone, Default)]
pub struct PropertyIdMapper {
    client_to_device: HashMap<PropertyId, PropertyId>,
    device_to_client: HashMap<PropertyId, PropertyId>,
}

impl PropertyIdMapper {
    /// Build from `(client_id, device_id)` pairs.
    ///
    /// Each side must be unique, otherwise translation would be ambiguous.
    pub fn new(aliases: &[(PropertyId, PropertyId)]) -> BrokerResult<Self> {
        let mut mapper = Self::default();
        for &(client, device) in aliases {
            if mapper.client_to_device.insert(client, device).is_some() {
                return Err(BrokerError::InvalidConfig(format!(
                    "client property {client:#x} is aliased twice"
                )));
            }
            if mapper.device_to_client.insert(device, client).is_some() {
                return Err(BrokerError::InvalidConfig(format!(
                    "device property {device:#x} is aliased twice"
                )));
            }
        }
        Ok(mapper)
    }

    pub fn to_device(&self, client: PropertyId) -> PropertyId {
        self.client_to_device.get(&client).copied().unwrap_or(client)
    }

    pub fn to_client(&self, device: PropertyId) -> PropertyId {
        self.device_to_client.get(&device).copied().unwrap_or(device)
    }

    pub fn is_empty(&self) -> bool {
        self.client_to_device.is_empty()
    }
}
