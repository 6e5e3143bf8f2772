//! # Device Messages
//!
//! Requests the broker issues to a device and the results and pushes a
//! device delivers back. Every request carries the broker's internal id and
//! the time budget left for it.
//!
//! ```text
//! Broker ──get_async/set_async──→ Device
//!        ←──on_get_results/on_set_results── (per id, any order)
//!        ←──on_property_changes── (unsolicited)
//!        ←──on_requests_timeout── (device timer fired first)
//! ```

use crate::entities::{AreaId, InternalRequestId, PropertyId, PropertyKey, PropertyValue, RawValue};
use crate::errors::DeviceStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An async read issued to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceGetRequest {
    /// Broker id to echo back in the result.
    pub request_id: InternalRequestId,
    /// Device-side property id.
    pub property_id: PropertyId,
    /// Area id.
    pub area_id: AreaId,
    /// Time budget left for this request.
    pub timeout: Duration,
}

impl DeviceGetRequest {
    /// The property/area addressed.
    #[must_use]
    pub fn key(&self) -> PropertyKey {
        PropertyKey::new(self.property_id, self.area_id)
    }
}

/// An async write issued to the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSetRequest {
    /// Broker id to echo back in the result.
    pub request_id: InternalRequestId,
    /// Device-side property id.
    pub property_id: PropertyId,
    /// Area id.
    pub area_id: AreaId,
    /// Value to apply.
    pub value: RawValue,
    /// Time budget left for this request.
    pub timeout: Duration,
}

impl DeviceSetRequest {
    /// The property/area addressed.
    #[must_use]
    pub fn key(&self) -> PropertyKey {
        PropertyKey::new(self.property_id, self.area_id)
    }
}

/// Outcome of one async read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceGetResult {
    /// The id from the matching request.
    pub request_id: InternalRequestId,
    /// Request status.
    pub status: DeviceStatus,
    /// The value read, present when `status` is `Ok`.
    pub value: Option<PropertyValue>,
}

impl DeviceGetResult {
    /// A successful read.
    #[must_use]
    pub fn ok(request_id: InternalRequestId, value: PropertyValue) -> Self {
        Self {
            request_id,
            status: DeviceStatus::Ok,
            value: Some(value),
        }
    }

    /// A read that failed with `status`.
    #[must_use]
    pub fn error(request_id: InternalRequestId, status: DeviceStatus) -> Self {
        Self {
            request_id,
            status,
            value: None,
        }
    }
}

/// Outcome of one async write. `Ok` means accepted, not necessarily applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSetResult {
    /// The id from the matching request.
    pub request_id: InternalRequestId,
    /// Request status.
    pub status: DeviceStatus,
}

impl DeviceSetResult {
    /// Create a result.
    #[must_use]
    pub fn new(request_id: InternalRequestId, status: DeviceStatus) -> Self {
        Self { request_id, status }
    }
}

/// A set failure pushed by the device without a request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySetError {
    /// Property identifier.
    pub property_id: PropertyId,
    /// Area identifier.
    pub area_id: AreaId,
    /// Failure status.
    pub status: DeviceStatus,
}
