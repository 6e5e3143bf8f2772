//! Recording fakes for the outbound ports.
//!
//! Used by the unit tests in this crate and by the workspace integration
//! tests. They never reply on their own; a test drives the broker's
//! [`crate::ports::DeviceEventSink`] methods directly.

use crate::domain::{GetValueResult, SetValueResult};
use crate::error::{BrokerError, BrokerResult};
use crate::ports::{DeviceInterface, PropertyEventListener, ResultCallback};
use parking_lot::Mutex;
use shared_types::{
    DeviceGetRequest, DeviceSetRequest, InternalRequestId, PropertySetError, PropertyValue,
};
use std::sync::atomic::{AtomicBool, Ordering};

/// Device that records every call.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    gets: Mutex<Vec<Vec<DeviceGetRequest>>>,
    sets: Mutex<Vec<Vec<DeviceSetRequest>>>,
    cancels: Mutex<Vec<InternalRequestId>>,
    reject_gets: AtomicBool,
    reject_sets: AtomicBool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent get calls fail.
    pub fn reject_gets(&self, reject: bool) {
        self.reject_gets.store(reject, Ordering::SeqCst);
    }

    /// Make subsequent set calls fail.
    pub fn reject_sets(&self, reject: bool) {
        self.reject_sets.store(reject, Ordering::SeqCst);
    }

    /// Every get batch, in call order.
    pub fn get_batches(&self) -> Vec<Vec<DeviceGetRequest>> {
        self.gets.lock().clone()
    }

    /// Every set batch, in call order.
    pub fn set_batches(&self) -> Vec<Vec<DeviceSetRequest>> {
        self.sets.lock().clone()
    }

    /// All get requests flattened.
    pub fn get_requests(&self) -> Vec<DeviceGetRequest> {
        self.gets.lock().iter().flatten().cloned().collect()
    }

    /// All set requests flattened.
    pub fn set_requests(&self) -> Vec<DeviceSetRequest> {
        self.sets.lock().iter().flatten().cloned().collect()
    }

    pub fn cancelled(&self) -> Vec<InternalRequestId> {
        self.cancels.lock().clone()
    }
}

impl DeviceInterface for RecordingDevice {
    fn get_async(&self, requests: Vec<DeviceGetRequest>) -> BrokerResult<()> {
        if self.reject_gets.load(Ordering::SeqCst) {
            return Err(BrokerError::DeviceUnavailable("get rejected".to_string()));
        }
        self.gets.lock().push(requests);
        Ok(())
    }

    fn set_async(&self, requests: Vec<DeviceSetRequest>) -> BrokerResult<()> {
        if self.reject_sets.load(Ordering::SeqCst) {
            return Err(BrokerError::DeviceUnavailable("set rejected".to_string()));
        }
        self.sets.lock().push(requests);
        Ok(())
    }

    fn cancel(&self, request_ids: &[InternalRequestId]) {
        self.cancels.lock().extend_from_slice(request_ids);
    }
}

/// Client callback that records every result.
#[derive(Debug, Default)]
pub struct RecordingCallback {
    gets: Mutex<Vec<GetValueResult>>,
    sets: Mutex<Vec<SetValueResult>>,
    dead: AtomicBool,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every later delivery, as a disconnected client would.
    pub fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    pub fn get_results(&self) -> Vec<GetValueResult> {
        self.gets.lock().clone()
    }

    pub fn set_results(&self) -> Vec<SetValueResult> {
        self.sets.lock().clone()
    }

    /// Total results received.
    pub fn total(&self) -> usize {
        self.gets.lock().len() + self.sets.lock().len()
    }
}

impl ResultCallback for RecordingCallback {
    fn on_get_value_results(&self, results: Vec<GetValueResult>) -> BrokerResult<()> {
        if self.dead.load(Ordering::SeqCst) {
            return Err(BrokerError::DeviceUnavailable("client gone".to_string()));
        }
        self.gets.lock().extend(results);
        Ok(())
    }

    fn on_set_value_results(&self, results: Vec<SetValueResult>) -> BrokerResult<()> {
        if self.dead.load(Ordering::SeqCst) {
            return Err(BrokerError::DeviceUnavailable("client gone".to_string()));
        }
        self.sets.lock().extend(results);
        Ok(())
    }
}

/// Listener that records forwarded property events.
#[derive(Debug, Default)]
pub struct RecordingListener {
    changes: Mutex<Vec<PropertyValue>>,
    set_errors: Mutex<Vec<PropertySetError>>,
}

impl RecordingListener {
    pub fn changes(&self) -> Vec<PropertyValue> {
        self.changes.lock().clone()
    }

    pub fn set_errors(&self) -> Vec<PropertySetError> {
        self.set_errors.lock().clone()
    }
}

impl PropertyEventListener for RecordingListener {
    fn on_property_changes(&self, values: &[PropertyValue]) {
        self.changes.lock().extend_from_slice(values);
    }

    fn on_property_set_errors(&self, errors: &[PropertySetError]) {
        self.set_errors.lock().extend_from_slice(errors);
    }
}
