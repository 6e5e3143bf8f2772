//! # Core Property Entities
//!
//! Defines the addressable units of device state and the values they carry.
//!
//! ## Clusters
//!
//! - **Identity**: `PropertyId`, `AreaId`, `PropertyKey`
//! - **Values**: `RawValue`, `PropertyValue`, `PropertyStatus`
//! - **Requests**: `ClientRequestId`, `InternalRequestId`

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// IDENTITY
// =============================================================================

/// Opaque property identifier.
pub type PropertyId = i32;

/// Opaque area identifier (zone, seat, window...) within a property.
pub type AreaId = i32;

/// Event timestamp in nanoseconds, as reported by the device.
pub type TimestampNanos = i64;

/// Caller-supplied request id. Only unique within one client channel.
pub type ClientRequestId = i32;

/// A property/area pair, the unit that change events and set requests target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKey {
    /// Property identifier.
    pub property_id: PropertyId,
    /// Area identifier.
    pub area_id: AreaId,
}

impl PropertyKey {
    /// Create a new key.
    #[must_use]
    pub const fn new(property_id: PropertyId, area_id: AreaId) -> Self {
        Self {
            property_id,
            area_id,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}/{:#x}", self.property_id, self.area_id)
    }
}

/// Broker-generated request id, unique across all live requests.
///
/// Minted from a monotonically increasing counter and never reused while the
/// request is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalRequestId(u64);

impl InternalRequestId {
    /// Wrap a raw counter value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InternalRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InternalRequestId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// =============================================================================
// VALUES
// =============================================================================

/// The payload of a property value.
///
/// Equality is structural; floats compare with `==`, which is what target
/// matching needs (a device echoes back exactly the value it applied).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    /// Boolean property.
    Bool(bool),
    /// 32-bit integer property.
    Int32(i32),
    /// 32-bit integer vector property.
    Int32Vec(Vec<i32>),
    /// 64-bit integer property.
    Int64(i64),
    /// 64-bit integer vector property.
    Int64Vec(Vec<i64>),
    /// Float property.
    Float(f32),
    /// Float vector property.
    FloatVec(Vec<f32>),
    /// String property.
    String(String),
    /// Opaque byte payload.
    Bytes(Vec<u8>),
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Int32Vec(v) => write!(f, "{v:?}"),
            Self::Int64Vec(v) => write!(f, "{v:?}"),
            Self::FloatVec(v) => write!(f, "{v:?}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Availability of a property value as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PropertyStatus {
    /// The value is valid.
    #[default]
    Available,
    /// The property exists but currently has no value.
    Unavailable,
    /// The device failed to produce a value.
    Error,
}

/// A timestamped value for one property/area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    /// Property identifier.
    pub property_id: PropertyId,
    /// Area identifier.
    pub area_id: AreaId,
    /// Availability of `value`.
    pub status: PropertyStatus,
    /// When the device observed this value.
    pub timestamp: TimestampNanos,
    /// The payload.
    pub value: RawValue,
}

impl PropertyValue {
    /// Create an available value.
    #[must_use]
    pub fn new(
        property_id: PropertyId,
        area_id: AreaId,
        value: RawValue,
        timestamp: TimestampNanos,
    ) -> Self {
        Self {
            property_id,
            area_id,
            status: PropertyStatus::Available,
            timestamp,
            value,
        }
    }

    /// Override the status.
    #[must_use]
    pub fn with_status(mut self, status: PropertyStatus) -> Self {
        self.status = status;
        self
    }

    /// The property/area this value belongs to.
    #[must_use]
    pub fn key(&self) -> PropertyKey {
        PropertyKey::new(self.property_id, self.area_id)
    }

    /// True if the value can be used.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == PropertyStatus::Available
    }
}
