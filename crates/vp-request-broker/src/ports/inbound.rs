//! # Inbound Ports (Driving Ports)
//!
//! - [`PropertyBrokerApi`]: what clients call
//! - [`DeviceEventSink`]: what the device pushes back
//!
//! Both are implemented by [`crate::PropertyBroker`].

use crate::domain::{GetPropertyRequest, SetPropertyRequest};
use crate::error::BrokerResult;
use crate::ports::outbound::ClientChannel;
use shared_types::{
    ClientRequestId, DeviceGetResult, DeviceSetResult, InternalRequestId, PropertySetError,
    PropertyValue,
};
use std::time::Duration;

/// Client surface of the broker.
///
/// An `Err` means the whole batch was rejected and no result will be
/// delivered for it. `Ok` means every request in the batch will resolve
/// exactly once through the channel's callback (unless cancelled).
pub trait PropertyBrokerApi: Send + Sync {
    /// Read a batch of properties.
    fn get_property_values_async(
        &self,
        channel: &ClientChannel,
        requests: Vec<GetPropertyRequest>,
        timeout: Duration,
    ) -> BrokerResult<()>;

    /// Write a batch of properties.
    ///
    /// A write succeeds once the device acknowledged it and the property was
    /// observed at the target value.
    fn set_property_values_async(
        &self,
        channel: &ClientChannel,
        requests: Vec<SetPropertyRequest>,
        timeout: Duration,
    ) -> BrokerResult<()>;

    /// Cancel live requests of this channel. No result is delivered for them.
    ///
    /// Returns the number of client requests cancelled.
    fn cancel_requests(
        &self,
        channel: &ClientChannel,
        request_ids: &[ClientRequestId],
    ) -> BrokerResult<usize>;
}

/// Device push surface.
pub trait DeviceEventSink: Send + Sync {
    fn on_get_results(&self, results: Vec<DeviceGetResult>);

    fn on_set_results(&self, results: Vec<DeviceSetResult>);

    /// Unsolicited value changes (device property ids).
    fn on_property_changes(&self, values: Vec<PropertyValue>);

    /// The device gave up on these ids.
    fn on_requests_timeout(&self, request_ids: Vec<InternalRequestId>);

    /// Set failures not tied to a request.
    fn on_property_set_errors(&self, errors: Vec<PropertySetError>);
}
