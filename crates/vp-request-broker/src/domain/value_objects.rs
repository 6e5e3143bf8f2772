//! Client-facing requests and results.

use serde::{Deserialize, Serialize};
use shared_types::{
    AreaId, AsyncErrorCode, ClientRequestId, PropertyId, PropertyKey, PropertyValue, RawValue,
    TimestampNanos,
};

/// One read in a client batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetPropertyRequest {
    pub request_id: ClientRequestId,
    pub property_id: PropertyId,
    pub area_id: AreaId,
}

impl GetPropertyRequest {
    pub fn new(request_id: ClientRequestId, property_id: PropertyId, area_id: AreaId) -> Self {
        Self {
            request_id,
            property_id,
            area_id,
        }
    }

    pub fn key(&self) -> PropertyKey {
        PropertyKey::new(self.property_id, self.area_id)
    }
}

/// One write in a client batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPropertyRequest {
    pub request_id: ClientRequestId,
    pub property_id: PropertyId,
    pub area_id: AreaId,
    /// Value the property should end up holding.
    pub value: RawValue,
}

impl SetPropertyRequest {
    pub fn new(
        request_id: ClientRequestId,
        property_id: PropertyId,
        area_id: AreaId,
        value: RawValue,
    ) -> Self {
        Self {
            request_id,
            property_id,
            area_id,
            value,
        }
    }

    pub fn key(&self) -> PropertyKey {
        PropertyKey::new(self.property_id, self.area_id)
    }
}

/// Outcome of one client read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetValueResult {
    pub request_id: ClientRequestId,
    pub result: Result<PropertyValue, AsyncErrorCode>,
}

impl GetValueResult {
    pub fn ok(request_id: ClientRequestId, value: PropertyValue) -> Self {
        Self {
            request_id,
            result: Ok(value),
        }
    }

    pub fn error(request_id: ClientRequestId, code: AsyncErrorCode) -> Self {
        Self {
            request_id,
            result: Err(code),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of one client write.
///
/// On success carries the timestamp of the change event (or initial read)
/// that showed the property at its target value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetValueResult {
    pub request_id: ClientRequestId,
    pub result: Result<TimestampNanos, AsyncErrorCode>,
}

impl SetValueResult {
    pub fn ok(request_id: ClientRequestId, update_timestamp: TimestampNanos) -> Self {
        Self {
            request_id,
            result: Ok(update_timestamp),
        }
    }

    pub fn error(request_id: ClientRequestId, code: AsyncErrorCode) -> Self {
        Self {
            request_id,
            result: Err(code),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_constructors() {
        let value = PropertyValue::new(1, 0, RawValue::Int32(4), 99);
        assert!(GetValueResult::ok(1, value).is_ok());
        assert!(!GetValueResult::error(1, AsyncErrorCode::Timeout).is_ok());

        let ok = SetValueResult::ok(2, 1234);
        assert_eq!(ok.result, Ok(1234));
        assert_eq!(
            SetValueResult::error(2, AsyncErrorCode::NotAvailable).result,
            Err(AsyncErrorCode::NotAvailable)
        );
    }

    #[test]
    fn test_request_keys() {
        assert_eq!(GetPropertyRequest::new(1, 5, 2).key(), PropertyKey::new(5, 2));
        assert_eq!(
            SetPropertyRequest::new(1, 5, 3, RawValue::Bool(true)).key(),
            PropertyKey::new(5, 3)
        );
    }
}
