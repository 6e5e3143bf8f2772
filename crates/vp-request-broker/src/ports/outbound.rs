//! # Outbound Ports (Driven Ports)
//!
//! Interfaces the broker calls out to:
//!
//! - [`DeviceInterface`]: the fire-and-forget device (get/set/cancel)
//! - [`ResultCallback`]: one client's result delivery endpoint
//! - [`PropertyEventListener`]: subscribers of accepted change events
//!
//! All calls are made outside the broker's table lock, with values copied out
//! while it was held, so implementations may call straight back into the
//! broker.

use crate::domain::{ChannelId, GetValueResult, SetValueResult};
use crate::error::BrokerResult;
use shared_types::{
    DeviceGetRequest, DeviceSetRequest, InternalRequestId, PropertySetError, PropertyValue,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Device interface abstraction.
///
/// Every method returns as soon as the batch is handed off; outcomes come
/// back later through [`crate::ports::DeviceEventSink`]. An `Err` means the
/// device refused the whole batch and nothing will be reported for it.
pub trait DeviceInterface: Send + Sync {
    /// Issue a batch of reads.
    fn get_async(&self, requests: Vec<DeviceGetRequest>) -> BrokerResult<()>;

    /// Issue a batch of writes.
    fn set_async(&self, requests: Vec<DeviceSetRequest>) -> BrokerResult<()>;

    /// Tell the device to stop working on these ids. Best effort.
    fn cancel(&self, request_ids: &[InternalRequestId]);
}

/// One client's result sink.
///
/// Each client request id receives exactly one result through these methods.
/// Returning an error marks the channel dead; the broker stops delivering to
/// it.
pub trait ResultCallback: Send + Sync {
    fn on_get_value_results(&self, results: Vec<GetValueResult>) -> BrokerResult<()>;

    fn on_set_value_results(&self, results: Vec<SetValueResult>) -> BrokerResult<()>;
}

/// Receives accepted property events, already in client property ids.
pub trait PropertyEventListener: Send + Sync {
    /// Change events with an available value.
    fn on_property_changes(&self, values: &[PropertyValue]);

    /// Set failures the device pushed without a matching request.
    fn on_property_set_errors(&self, errors: &[PropertySetError]);
}

/// Handle for a client's result channel.
///
/// Cheap to clone; every clone shares the same closed flag.
#[derive(Clone)]
pub struct ClientChannel {
    id: ChannelId,
    callback: Arc<dyn ResultCallback>,
    closed: Arc<AtomicBool>,
}

impl ClientChannel {
    /// Create a channel with a fresh id.
    pub fn new(callback: Arc<dyn ResultCallback>) -> Self {
        Self::with_id(ChannelId::new(), callback)
    }

    /// Create a channel with an id chosen by the transport.
    pub fn with_id(id: ChannelId, callback: Arc<dyn ResultCallback>) -> Self {
        Self {
            id,
            callback,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn callback(&self) -> &Arc<dyn ResultCallback> {
        &self.callback
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for ClientChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientChannel")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
