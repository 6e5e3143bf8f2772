//! # Property Broker Service
//!
//! Implements [`PropertyBrokerApi`] for clients and [`DeviceEventSink`] for
//! the device, on top of one [`PendingRequestTable`] behind one mutex.
//!
//! ## Lifecycle of an entry
//!
//! ```text
//!              submit
//!                │
//!                ▼
//!            ┌────────┐  TryAgain   ┌────────────────┐
//!            │ Issued │ ──────────► │ RetryScheduled │
//!            │        │ ◄────────── │                │
//!            └────────┘   backoff   └────────────────┘
//!      ok /     │    \                      │
//!   complete    │     \ deadline            │ deadline
//!               ▼      ▼                    ▼
//!          Completed  TimedOut ◄────────────┘
//!          Failed     Cancelled
//! ```
//!
//! Every terminal state removes the entry from the table; whichever path
//! removes it first produces the only result for that id.

mod effects;
mod tasks;


use self::effects::Effects;
use crate::config::BrokerConfig;
use crate::domain::{
    BrokerStats, BrokerStatsSnapshot, ChannelId, GetPropertyRequest, PendingRequest,
    PendingRequestTable, PendingSummary, PropertyIdMapper, RequestKind, RequestPhase,
    SetProgress, SetPropertyRequest,
};
use crate::error::{BrokerError, BrokerResult};
use crate::metrics;
use crate::ports::{
    ClientChannel, DeviceEventSink, DeviceInterface, PropertyBrokerApi, PropertyEventListener,
};
use crate::registry::CallbackRegistry;
use parking_lot::{Mutex, RwLock};
use shared_types::{
    AsyncErrorCode, ClientRequestId, DeviceGetRequest, DeviceGetResult, DeviceSetRequest,
    DeviceSetResult, DeviceStatus, InternalRequestId, PropertySetError, PropertyStatus,
    PropertyValue,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// The property request broker.
///
/// Cheap to clone; all clones share the same table and registry.
#[derive(Clone)]
pub struct PropertyBroker {
    inner: Arc<BrokerInner>,
}

pub(crate) struct BrokerInner {
    config: BrokerConfig,
    device: Arc<dyn DeviceInterface>,
    table: Mutex<PendingRequestTable>,
    registry: CallbackRegistry,
    mapper: PropertyIdMapper,
    listener: RwLock<Option<Arc<dyn PropertyEventListener>>>,
    stats: BrokerStats,
}

impl PropertyBroker {
    /// Create a broker in front of `device`.
    pub fn new(config: BrokerConfig, device: Arc<dyn DeviceInterface>) -> BrokerResult<Self> {
        config.validate()?;
        let mapper = PropertyIdMapper::new(&config.property_id_aliases)?;

        info!(
            retry_backoff_ms = config.retry_backoff.as_millis() as u64,
            sweep_interval_ms = config.sweep_interval.as_millis() as u64,
            aliases = config.property_id_aliases.len(),
            "Property broker created"
        );

        Ok(Self {
            inner: Arc::new(BrokerInner {
                config,
                device,
                table: Mutex::new(PendingRequestTable::new()),
                registry: CallbackRegistry::new(),
                mapper,
                listener: RwLock::new(None),
                stats: BrokerStats::default(),
            }),
        })
    }

    /// Install the listener that receives accepted change events and
    /// device-pushed set errors.
    pub fn set_event_listener(&self, listener: Arc<dyn PropertyEventListener>) {
        *self.inner.listener.write() = Some(listener);
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Start the periodic deadline sweeper.
    ///
    /// The task stops on its own once every broker clone is dropped.
    pub fn spawn_deadline_sweeper(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(tasks::deadline_sweeper(weak, self.inner.config.sweep_interval))
    }

    /// Time out every entry whose deadline has passed, right now.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    /// Called by transports when a client channel dies.
    ///
    /// Stops delivery to the channel and rejects further submissions from
    /// it. Its outstanding requests are left to finish or time out; their
    /// results are dropped.
    pub fn on_channel_closed(&self, channel: &ClientChannel) {
        channel.mark_closed();
        let was_registered = self.inner.registry.remove(channel.id());
        info!(
            channel = %channel.id(),
            was_registered = was_registered,
            "Client channel closed"
        );
    }

    /// Number of live table entries (including initial-value reads).
    pub fn pending_count(&self) -> usize {
        self.inner.table.lock().len()
    }

    /// Copy of every live entry, ordered by internal id.
    pub fn pending_snapshot(&self) -> Vec<PendingSummary> {
        let table = self.inner.table.lock();
        let now = Instant::now();
        let mut snapshot: Vec<_> = table
            .iter()
            .map(|request| PendingSummary::from_request(request, now))
            .collect();
        snapshot.sort_by_key(|summary| summary.internal_id);
        snapshot
    }

    pub fn stats(&self) -> BrokerStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of channels with a live dispatcher.
    pub fn registered_channels(&self) -> usize {
        self.inner.registry.len()
    }

    fn check_submission(&self, channel: &ClientChannel, timeout: Duration) -> BrokerResult<()> {
        if timeout.is_zero() {
            return Err(BrokerError::InvalidTimeout(timeout));
        }
        if channel.is_closed() {
            return Err(BrokerError::ChannelClosed(channel.id()));
        }
        Ok(())
    }

    /// Remove entries of a batch the device refused outright.
    fn roll_back(&self, ids: &[InternalRequestId]) {
        let mut table = self.inner.table.lock();
        for &id in ids {
            table.remove(id);
        }
        metrics::set_pending_requests(table.len());
    }
}

impl BrokerInner {
    fn to_device_gets(&self, mut requests: Vec<DeviceGetRequest>) -> Vec<DeviceGetRequest> {
        for request in &mut requests {
            request.property_id = self.mapper.to_device(request.property_id);
        }
        requests
    }

    fn to_device_sets(&self, mut requests: Vec<DeviceSetRequest>) -> Vec<DeviceSetRequest> {
        for request in &mut requests {
            request.property_id = self.mapper.to_device(request.property_id);
        }
        requests
    }

    fn to_client_value(&self, mut value: PropertyValue) -> PropertyValue {
        value.property_id = self.mapper.to_client(value.property_id);
        value
    }

    fn listener(&self) -> Option<Arc<dyn PropertyEventListener>> {
        self.listener.read().clone()
    }
}

/// Reject a batch that reuses a client id, either one already live on the
/// channel or one repeated inside the batch.
fn check_duplicates(
    table: &PendingRequestTable,
    channel: ChannelId,
    ids: impl Iterator<Item = ClientRequestId>,
) -> BrokerResult<()> {
    let mut seen = HashSet::new();
    for client_request_id in ids {
        if !seen.insert(client_request_id) || table.is_client_pending(channel, client_request_id) {
            return Err(BrokerError::DuplicateClientRequestId {
                channel,
                client_request_id,
            });
        }
    }
    Ok(())
}

/// What a read result means for the client.
fn get_outcome(
    status: DeviceStatus,
    value: Option<PropertyValue>,
) -> Result<PropertyValue, AsyncErrorCode> {
    if let Some(code) = status.terminal_error() {
        return Err(code);
    }
    match value {
        Some(value) => match value.status {
            PropertyStatus::Available => Ok(value),
            PropertyStatus::Unavailable => Err(AsyncErrorCode::NotAvailable),
            PropertyStatus::Error => Err(AsyncErrorCode::InternalError),
        },
        None => Err(AsyncErrorCode::InternalError),
    }
}

impl PropertyBrokerApi for PropertyBroker {
    fn get_property_values_async(
        &self,
        channel: &ClientChannel,
        requests: Vec<GetPropertyRequest>,
        timeout: Duration,
    ) -> BrokerResult<()> {
        self.check_submission(channel, timeout)?;
        if requests.is_empty() {
            debug!(channel = %channel.id(), "Empty get batch, nothing to do");
            return Ok(());
        }
        self.inner.registry.register(channel)?;

        let issued: Vec<DeviceGetRequest> = {
            let mut table = self.inner.table.lock();
            check_duplicates(&table, channel.id(), requests.iter().map(|r| r.request_id))?;
            let now = Instant::now();

            let issued: Vec<DeviceGetRequest> = requests
                .iter()
                .map(|request| {
                    let id = table.allocate_id();
                    let inserted = table.insert(PendingRequest::new(
                        request.request_id,
                        id,
                        RequestKind::Get,
                        request.property_id,
                        request.area_id,
                        channel.id(),
                        now,
                        timeout,
                    ));
                    debug_assert!(inserted);
                    DeviceGetRequest {
                        request_id: id,
                        property_id: request.property_id,
                        area_id: request.area_id,
                        timeout,
                    }
                })
                .collect();
            metrics::set_pending_requests(table.len());
            issued
        };

        let ids: Vec<_> = issued.iter().map(|r| r.request_id).collect();
        debug!(
            channel = %channel.id(),
            count = ids.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Issuing get batch"
        );

        if let Err(e) = self.inner.device.get_async(self.inner.to_device_gets(issued)) {
            warn!(channel = %channel.id(), error = %e, "Device rejected get batch");
            self.roll_back(&ids);
            return Err(e);
        }

        BrokerStats::add(&self.inner.stats.total_submitted, ids.len());
        metrics::record_requests_submitted("get", ids.len());
        Ok(())
    }

    fn set_property_values_async(
        &self,
        channel: &ClientChannel,
        requests: Vec<SetPropertyRequest>,
        timeout: Duration,
    ) -> BrokerResult<()> {
        self.check_submission(channel, timeout)?;
        if requests.is_empty() {
            debug!(channel = %channel.id(), "Empty set batch, nothing to do");
            return Ok(());
        }
        self.inner.registry.register(channel)?;

        let mut set_calls = Vec::with_capacity(requests.len());
        let mut initial_reads = Vec::with_capacity(requests.len());
        {
            let mut table = self.inner.table.lock();
            check_duplicates(&table, channel.id(), requests.iter().map(|r| r.request_id))?;
            let now = Instant::now();

            for request in requests {
                let set_id = table.allocate_id();
                let read_id = table.allocate_id();

                let set = PendingRequest::new(
                    request.request_id,
                    set_id,
                    RequestKind::Set {
                        target: request.value.clone(),
                    },
                    request.property_id,
                    request.area_id,
                    channel.id(),
                    now,
                    timeout,
                );
                let initial_read = PendingRequest::new(
                    request.request_id,
                    read_id,
                    RequestKind::GetInitialValueForSet {
                        target: request.value.clone(),
                        paired_set: set_id,
                    },
                    request.property_id,
                    request.area_id,
                    channel.id(),
                    now,
                    timeout,
                );
                let inserted = table.insert(set) && table.insert(initial_read);
                debug_assert!(inserted);

                set_calls.push(DeviceSetRequest {
                    request_id: set_id,
                    property_id: request.property_id,
                    area_id: request.area_id,
                    value: request.value,
                    timeout,
                });
                initial_reads.push(DeviceGetRequest {
                    request_id: read_id,
                    property_id: request.property_id,
                    area_id: request.area_id,
                    timeout,
                });
            }
            metrics::set_pending_requests(table.len());
        }

        let set_ids: Vec<_> = set_calls.iter().map(|r| r.request_id).collect();
        let read_ids: Vec<_> = initial_reads.iter().map(|r| r.request_id).collect();
        debug!(
            channel = %channel.id(),
            count = set_ids.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Issuing set batch"
        );

        if let Err(e) = self.inner.device.set_async(self.inner.to_device_sets(set_calls)) {
            warn!(channel = %channel.id(), error = %e, "Device rejected set batch");
            self.roll_back(&set_ids);
            self.roll_back(&read_ids);
            return Err(e);
        }

        // Writes still complete through change events without the initial read
        if let Err(e) = self.inner.device.get_async(self.inner.to_device_gets(initial_reads)) {
            warn!(
                channel = %channel.id(),
                error = %e,
                "Device rejected initial value reads for set batch"
            );
            self.roll_back(&read_ids);
        }

        BrokerStats::add(&self.inner.stats.total_submitted, set_ids.len());
        metrics::record_requests_submitted("set", set_ids.len());
        Ok(())
    }

    fn cancel_requests(
        &self,
        channel: &ClientChannel,
        request_ids: &[ClientRequestId],
    ) -> BrokerResult<usize> {
        let mut removed_ids = Vec::new();
        let mut cancelled = 0;
        {
            let mut table = self.inner.table.lock();
            for &client_request_id in request_ids {
                let Some(id) = table.lookup_client(channel.id(), client_request_id) else {
                    debug!(
                        channel = %channel.id(),
                        client_request_id = client_request_id,
                        "Cancel for request that is not pending"
                    );
                    continue;
                };

                let mut ids = vec![id];
                ids.extend(table.initial_reads_for(id));
                for id in ids {
                    if table.remove(id).is_some() {
                        removed_ids.push(id);
                    }
                }
                cancelled += 1;
            }
            metrics::set_pending_requests(table.len());
        }

        if !removed_ids.is_empty() {
            self.inner.device.cancel(&removed_ids);
        }
        if cancelled > 0 {
            BrokerStats::add(&self.inner.stats.total_cancelled, cancelled);
            metrics::record_results("cancelled", cancelled);
            debug!(channel = %channel.id(), cancelled = cancelled, "Cancelled requests");
        }
        Ok(cancelled)
    }
}

impl DeviceEventSink for PropertyBroker {
    fn on_get_results(&self, results: Vec<DeviceGetResult>) {
        let inner = &self.inner;
        let mut effects = Effects::default();
        {
            let mut table = inner.table.lock();

            for result in results {
                let id = result.request_id;
                let Some(request) = table.get_mut(id) else {
                    BrokerStats::add(&inner.stats.total_unknown_results, 1);
                    debug!(internal_id = %id, "Get result for unknown or resolved request");
                    continue;
                };
                if request.phase == RequestPhase::RetryScheduled {
                    debug!(internal_id = %id, "Ignoring get result for request awaiting retry");
                    continue;
                }
                if !request.kind.is_get_class() {
                    warn!(internal_id = %id, "Get result delivered for a set request");
                    continue;
                }
                if result.status.is_transient() {
                    request.phase = RequestPhase::RetryScheduled;
                    effects.retries.push(id);
                    continue;
                }

                let Some(request) = table.remove(id) else {
                    continue;
                };
                let value = result.value.map(|v| inner.to_client_value(v));
                let outcome = get_outcome(result.status, value);

                match (&request.kind, outcome) {
                    (RequestKind::Get, Ok(value)) => effects.complete_get(&request, value),
                    (RequestKind::Get, Err(code)) => effects.resolve_error(&request, code),
                    (RequestKind::GetInitialValueForSet { paired_set, .. }, Ok(value)) => {
                        let Some(set) = table.get_mut(*paired_set) else {
                            debug!(internal_id = %id, "Initial value read outlived its set");
                            continue;
                        };
                        match set.observe_value(&value.value, value.timestamp) {
                            SetProgress::Complete(timestamp) => {
                                if let Some(set) = table.remove(*paired_set) {
                                    effects.complete_set(&set, timestamp);
                                }
                            }
                            SetProgress::Waiting => {
                                debug!(
                                    internal_id = %paired_set,
                                    "Property already at target, waiting for set ack"
                                );
                            }
                            SetProgress::Ignored => {
                                debug!(
                                    internal_id = %paired_set,
                                    "Initial value differs from set target"
                                );
                            }
                        }
                    }
                    (RequestKind::GetInitialValueForSet { .. }, Err(code)) => {
                        effects.resolve_error(&request, code)
                    }
                    (RequestKind::Set { .. }, _) => {}
                }
            }
            effects.pending_after = Some(table.len());
        }
        inner.apply(effects);
    }

    fn on_set_results(&self, results: Vec<DeviceSetResult>) {
        let inner = &self.inner;
        let mut effects = Effects::default();
        {
            let mut table = inner.table.lock();

            for result in results {
                let id = result.request_id;
                let Some(request) = table.get_mut(id) else {
                    BrokerStats::add(&inner.stats.total_unknown_results, 1);
                    debug!(internal_id = %id, "Set result for unknown or resolved request");
                    continue;
                };
                if request.phase == RequestPhase::RetryScheduled {
                    debug!(internal_id = %id, "Ignoring set result for request awaiting retry");
                    continue;
                }
                if request.kind.is_get_class() {
                    warn!(internal_id = %id, "Set result delivered for a get request");
                    continue;
                }

                if result.status.is_transient() {
                    request.phase = RequestPhase::RetryScheduled;
                    effects.retries.push(id);
                    continue;
                }

                if let Some(code) = result.status.terminal_error() {
                    if let Some(request) = table.remove(id) {
                        debug!(internal_id = %id, status = ?result.status, "Set failed at device");
                        effects.resolve_error(&request, code);
                    }
                    continue;
                }

                if let SetProgress::Complete(timestamp) = request.acknowledge_set() {
                    if let Some(request) = table.remove(id) {
                        effects.complete_set(&request, timestamp);
                    }
                }
            }
            effects.pending_after = Some(table.len());
        }
        inner.apply(effects);
    }

    fn on_property_changes(&self, values: Vec<PropertyValue>) {
        let inner = &self.inner;
        let values: Vec<PropertyValue> = values
            .into_iter()
            .map(|value| inner.to_client_value(value))
            .filter(|value| {
                if !value.is_available() {
                    debug!(
                        property = %value.key(),
                        status = ?value.status,
                        "Dropping change event without a value"
                    );
                }
                value.is_available()
            })
            .collect();
        if values.is_empty() {
            return;
        }

        let mut effects = Effects::default();
        {
            let mut table = inner.table.lock();
            for value in &values {
                for set_id in table.sets_waiting_for(value.key(), &value.value) {
                    let Some(set) = table.get_mut(set_id) else {
                        continue;
                    };
                    if let SetProgress::Complete(timestamp) =
                        set.observe_value(&value.value, value.timestamp)
                    {
                        if let Some(set) = table.remove(set_id) {
                            effects.complete_set(&set, timestamp);
                        }
                    }
                }
            }
            effects.pending_after = Some(table.len());
        }
        if !effects.is_empty() {
            inner.apply(effects);
        }

        if let Some(listener) = inner.listener() {
            listener.on_property_changes(&values);
        }
    }

    fn on_requests_timeout(&self, request_ids: Vec<InternalRequestId>) {
        let inner = &self.inner;
        let mut effects = Effects::default();
        {
            let mut table = inner.table.lock();
            for id in request_ids {
                match table.remove(id) {
                    Some(request) => {
                        warn!(
                            internal_id = %id,
                            kind = request.kind.label(),
                            property = %request.key(),
                            "Device timed out request"
                        );
                        effects.resolve_error(&request, AsyncErrorCode::Timeout);
                    }
                    None => {
                        BrokerStats::add(&inner.stats.total_unknown_results, 1);
                        debug!(internal_id = %id, "Timeout for unknown or resolved request");
                    }
                }
            }
            effects.pending_after = Some(table.len());
        }
        inner.apply(effects);
    }

    fn on_property_set_errors(&self, errors: Vec<PropertySetError>) {
        let inner = &self.inner;
        let errors: Vec<PropertySetError> = errors
            .into_iter()
            .map(|mut error| {
                error.property_id = inner.mapper.to_client(error.property_id);
                error
            })
            .collect();
        if errors.is_empty() {
            return;
        }

        for error in &errors {
            debug!(
                property_id = error.property_id,
                area_id = error.area_id,
                status = ?error.status,
                "Device reported set error"
            );
        }
        if let Some(listener) = inner.listener() {
            listener.on_property_set_errors(&errors);
        }
    }
}
