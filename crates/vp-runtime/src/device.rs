//! # Simulated Device
//!
//! In-memory property store behind the broker's [`DeviceInterface`].
//!
//! Every request is answered by its own task after the configured latency.
//! Outcomes are sent as [`DeviceEvent`]s over an unbounded channel; the
//! runtime pumps them into the broker's [`DeviceEventSink`].
//!
//! ```text
//! get_async/set_async ──► spawn per request ──► sleep(latency) ──► DeviceEvent
//!                                  │                                   │
//!                          cancel() aborts                     pump_device_events
//!                                                                      │
//!                                                                      ▼
//!                                                              DeviceEventSink
//! ```
//!
//! A request whose latency exceeds its timeout is reported through
//! `on_requests_timeout` instead of a result. Writes that change the stored
//! value emit a change event; the ack and the change are sent in random
//! order, as real hardware does not order them either.

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use shared_types::{
    DeviceGetRequest, DeviceGetResult, DeviceSetRequest, DeviceSetResult, DeviceStatus,
    InternalRequestId, PropertyKey, PropertySetError, PropertyValue, RawValue, TimestampNanos,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use vp_request_broker::{BrokerError, BrokerResult, DeviceEventSink, DeviceInterface};

use crate::config::DeviceConfig;

/// Everything the device reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    GetResults(Vec<DeviceGetResult>),
    SetResults(Vec<DeviceSetResult>),
    PropertyChanges(Vec<PropertyValue>),
    Timeouts(Vec<InternalRequestId>),
    SetErrors(Vec<PropertySetError>),
}

/// Shared state of the device, owned by the handle and every request task.
struct DeviceState {
    store: RwLock<HashMap<PropertyKey, PropertyValue>>,
    in_flight: Mutex<HashMap<InternalRequestId, JoinHandle<()>>>,
    events: mpsc::UnboundedSender<DeviceEvent>,
}

impl DeviceState {
    fn emit(&self, event: DeviceEvent) {
        if self.events.send(event).is_err() {
            debug!("Device event receiver dropped");
        }
    }

    fn finish(&self, id: InternalRequestId) {
        self.in_flight.lock().remove(&id);
    }

    /// Store `value` and emit a change event if it differs from the old one.
    fn apply_write(&self, key: PropertyKey, value: RawValue) -> Option<PropertyValue> {
        let mut store = self.store.write();
        let current = store.get_mut(&key)?;
        if current.value == value {
            return None;
        }
        current.value = value;
        current.timestamp = now_nanos();
        Some(current.clone())
    }
}

/// Simulated vehicle hardware.
#[derive(Clone)]
pub struct SimulatedDevice {
    config: DeviceConfig,
    state: Arc<DeviceState>,
}

impl SimulatedDevice {
    /// Create a device and the receiver of its events.
    pub fn new(config: DeviceConfig) -> (Self, mpsc::UnboundedReceiver<DeviceEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let device = Self {
            config,
            state: Arc::new(DeviceState {
                store: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                events,
            }),
        };
        (device, receiver)
    }

    /// Add or replace properties without emitting change events.
    pub fn seed(&self, values: impl IntoIterator<Item = PropertyValue>) {
        let mut store = self.state.store.write();
        for value in values {
            store.insert(value.key(), value);
        }
    }

    /// Current stored value.
    pub fn value(&self, key: PropertyKey) -> Option<PropertyValue> {
        self.state.store.read().get(&key).cloned()
    }

    /// Simulate a change that did not come from a set request, such as a
    /// driver turning a knob.
    pub fn inject_change(&self, key: PropertyKey, value: RawValue) {
        if let Some(changed) = self.state.apply_write(key, value) {
            self.state.emit(DeviceEvent::PropertyChanges(vec![changed]));
        }
    }

    /// Report a set failure not tied to any request.
    pub fn inject_set_error(&self, key: PropertyKey, status: DeviceStatus) {
        self.state.emit(DeviceEvent::SetErrors(vec![PropertySetError {
            property_id: key.property_id,
            area_id: key.area_id,
            status,
        }]));
    }

    /// Number of requests the device is still working on.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.lock().len()
    }

    /// Latency for one request and whether to answer busy.
    fn roll(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let jitter_ms = self.config.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..=jitter_ms))
        };
        let busy = rng.gen_bool(self.config.busy_ratio);
        (self.config.latency + extra, busy)
    }

    fn spawn_request<F>(&self, handle: &Handle, id: InternalRequestId, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut in_flight = self.state.in_flight.lock();
        if let Some(previous) = in_flight.insert(id, handle.spawn(task)) {
            // Retries reuse the id; the old attempt was already answered
            previous.abort();
        }
    }
}

impl DeviceInterface for SimulatedDevice {
    fn get_async(&self, requests: Vec<DeviceGetRequest>) -> BrokerResult<()> {
        let handle = Handle::try_current()
            .map_err(|_| BrokerError::DeviceUnavailable("no async runtime".to_string()))?;

        for request in requests {
            let (latency, busy) = self.roll();
            let state = Arc::clone(&self.state);
            let id = request.request_id;
            trace!(internal_id = %id, property = %request.key(), "Device read queued");

            self.spawn_request(&handle, id, async move {
                if latency >= request.timeout {
                    tokio::time::sleep(request.timeout).await;
                    state.emit(DeviceEvent::Timeouts(vec![id]));
                    state.finish(id);
                    return;
                }
                tokio::time::sleep(latency).await;

                let result = if busy {
                    DeviceGetResult::error(id, DeviceStatus::TryAgain)
                } else {
                    match state.store.read().get(&request.key()) {
                        Some(value) => DeviceGetResult::ok(id, value.clone()),
                        None => DeviceGetResult::error(id, DeviceStatus::NotAvailable),
                    }
                };
                state.emit(DeviceEvent::GetResults(vec![result]));
                state.finish(id);
            });
        }
        Ok(())
    }

    fn set_async(&self, requests: Vec<DeviceSetRequest>) -> BrokerResult<()> {
        let handle = Handle::try_current()
            .map_err(|_| BrokerError::DeviceUnavailable("no async runtime".to_string()))?;

        for request in requests {
            let (latency, busy) = self.roll();
            let change_first = rand::thread_rng().gen_bool(0.5);
            let state = Arc::clone(&self.state);
            let id = request.request_id;
            trace!(internal_id = %id, property = %request.key(), "Device write queued");

            self.spawn_request(&handle, id, async move {
                if latency >= request.timeout {
                    tokio::time::sleep(request.timeout).await;
                    state.emit(DeviceEvent::Timeouts(vec![id]));
                    state.finish(id);
                    return;
                }
                tokio::time::sleep(latency).await;

                let key = request.key();
                if busy {
                    state.emit(DeviceEvent::SetResults(vec![DeviceSetResult::new(
                        id,
                        DeviceStatus::TryAgain,
                    )]));
                } else if !state.store.read().contains_key(&key) {
                    warn!(internal_id = %id, property = %key, "Write to unknown property");
                    state.emit(DeviceEvent::SetResults(vec![DeviceSetResult::new(
                        id,
                        DeviceStatus::NotAvailable,
                    )]));
                } else {
                    let ack = DeviceEvent::SetResults(vec![DeviceSetResult::new(
                        id,
                        DeviceStatus::Ok,
                    )]);
                    match state.apply_write(key, request.value) {
                        Some(changed) if change_first => {
                            state.emit(DeviceEvent::PropertyChanges(vec![changed]));
                            state.emit(ack);
                        }
                        Some(changed) => {
                            state.emit(ack);
                            state.emit(DeviceEvent::PropertyChanges(vec![changed]));
                        }
                        // Value already at target, no change event follows
                        None => state.emit(ack),
                    }
                }
                state.finish(id);
            });
        }
        Ok(())
    }

    fn cancel(&self, request_ids: &[InternalRequestId]) {
        let mut in_flight = self.state.in_flight.lock();
        for id in request_ids {
            if let Some(task) = in_flight.remove(id) {
                task.abort();
                debug!(internal_id = %id, "Device request cancelled");
            }
        }
    }
}

/// Forward device events into the broker until the device is dropped.
pub async fn pump_device_events<S>(mut events: mpsc::UnboundedReceiver<DeviceEvent>, sink: S)
where
    S: DeviceEventSink,
{
    while let Some(event) = events.recv().await {
        match event {
            DeviceEvent::GetResults(results) => sink.on_get_results(results),
            DeviceEvent::SetResults(results) => sink.on_set_results(results),
            DeviceEvent::PropertyChanges(values) => sink.on_property_changes(values),
            DeviceEvent::Timeouts(ids) => sink.on_requests_timeout(ids),
            DeviceEvent::SetErrors(errors) => sink.on_property_set_errors(errors),
        }
    }
    debug!("Device event stream closed");
}

fn now_nanos() -> TimestampNanos {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as TimestampNanos)
        .unwrap_or_default()
}
