//! Side effects collected under the table lock and performed after it.
//!
//! Every handler mutates the table inside one critical section and records
//! what has to happen next in an [`Effects`] value. [`BrokerInner::apply`]
//! then talks to the device, the client channels and the retry timer with
//! the lock released.

use super::BrokerInner;
use crate::domain::{
    BrokerStats, ChannelId, GetValueResult, PendingRequest, RequestKind, SetValueResult,
};
use crate::metrics;
use shared_types::{
    AsyncErrorCode, DeviceGetRequest, DeviceSetRequest, InternalRequestId, PropertyValue,
    TimestampNanos,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Work to do once the table lock is released.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    /// Reads to issue (client property ids).
    pub get_calls: Vec<DeviceGetRequest>,
    /// Writes to issue (client property ids).
    pub set_calls: Vec<DeviceSetRequest>,
    pub cancels: Vec<InternalRequestId>,
    pub get_results: Vec<(ChannelId, GetValueResult)>,
    pub set_results: Vec<(ChannelId, SetValueResult)>,
    pub retries: Vec<InternalRequestId>,
    completed: usize,
    failed: usize,
    timed_out: usize,
    /// Table size at the end of the critical section.
    pub pending_after: Option<usize>,
}

impl Effects {
    pub fn is_empty(&self) -> bool {
        self.get_calls.is_empty()
            && self.set_calls.is_empty()
            && self.cancels.is_empty()
            && self.get_results.is_empty()
            && self.set_results.is_empty()
            && self.retries.is_empty()
    }

    /// Queue a successful read for delivery.
    pub fn complete_get(&mut self, request: &PendingRequest, value: PropertyValue) {
        self.completed += 1;
        self.get_results
            .push((request.channel, GetValueResult::ok(request.client_request_id, value)));
    }

    /// Queue a successful write for delivery.
    pub fn complete_set(&mut self, request: &PendingRequest, timestamp: TimestampNanos) {
        debug!(
            internal_id = %request.internal_id,
            client_request_id = request.client_request_id,
            property = %request.key(),
            timestamp = timestamp,
            "Set completed"
        );
        self.completed += 1;
        self.set_results
            .push((request.channel, SetValueResult::ok(request.client_request_id, timestamp)));
    }

    /// Queue an error for a removed entry.
    ///
    /// Initial-value reads never report to the client.
    pub fn resolve_error(&mut self, request: &PendingRequest, code: AsyncErrorCode) {
        let client_request_id = request.client_request_id;
        match request.kind {
            RequestKind::Get => self
                .get_results
                .push((request.channel, GetValueResult::error(client_request_id, code))),
            RequestKind::Set { .. } => self
                .set_results
                .push((request.channel, SetValueResult::error(client_request_id, code))),
            RequestKind::GetInitialValueForSet { .. } => {
                debug!(
                    internal_id = %request.internal_id,
                    error = %code,
                    "Initial value read for set ended without a value"
                );
                return;
            }
        }

        if code == AsyncErrorCode::Timeout {
            self.timed_out += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Queue a device call for an entry that is (re)entering `Issued`.
    pub fn issue(&mut self, request: &PendingRequest) {
        match &request.kind {
            RequestKind::Set { target } => self.set_calls.push(DeviceSetRequest {
                request_id: request.internal_id,
                property_id: request.property_id,
                area_id: request.area_id,
                value: target.clone(),
                timeout: request.remaining_timeout,
            }),
            RequestKind::Get | RequestKind::GetInitialValueForSet { .. } => {
                self.get_calls.push(DeviceGetRequest {
                    request_id: request.internal_id,
                    property_id: request.property_id,
                    area_id: request.area_id,
                    timeout: request.remaining_timeout,
                })
            }
        }
    }
}

impl BrokerInner {
    /// Perform collected effects. Must be called without the table lock.
    pub(crate) fn apply(self: &Arc<Self>, mut effects: Effects) {
        let get_calls = std::mem::take(&mut effects.get_calls);
        if !get_calls.is_empty() {
            let ids: Vec<_> = get_calls.iter().map(|r| r.request_id).collect();
            if let Err(e) = self.device.get_async(self.to_device_gets(get_calls)) {
                warn!(error = %e, count = ids.len(), "Device rejected re-issued reads");
                self.fail_rejected(&ids);
            }
        }

        let set_calls = std::mem::take(&mut effects.set_calls);
        if !set_calls.is_empty() {
            let ids: Vec<_> = set_calls.iter().map(|r| r.request_id).collect();
            if let Err(e) = self.device.set_async(self.to_device_sets(set_calls)) {
                warn!(error = %e, count = ids.len(), "Device rejected re-issued writes");
                self.fail_rejected(&ids);
            }
        }

        if !effects.cancels.is_empty() {
            self.device.cancel(&effects.cancels);
        }

        self.dispatch_get_results(std::mem::take(&mut effects.get_results));
        self.dispatch_set_results(std::mem::take(&mut effects.set_results));

        if !effects.retries.is_empty() {
            BrokerStats::add(&self.stats.total_retries, effects.retries.len());
            metrics::record_retries(effects.retries.len());
            self.schedule_retry(std::mem::take(&mut effects.retries));
        }

        self.record_outcomes(&effects);
    }

    fn record_outcomes(&self, effects: &Effects) {
        if effects.completed > 0 {
            BrokerStats::add(&self.stats.total_completed, effects.completed);
            metrics::record_results("success", effects.completed);
        }
        if effects.failed > 0 {
            BrokerStats::add(&self.stats.total_failed, effects.failed);
            metrics::record_results("error", effects.failed);
        }
        if effects.timed_out > 0 {
            BrokerStats::add(&self.stats.total_timeouts, effects.timed_out);
            metrics::record_results("timeout", effects.timed_out);
        }
        if let Some(pending) = effects.pending_after {
            metrics::set_pending_requests(pending);
        }
    }

    /// Remove entries whose re-issue the device refused and report them.
    fn fail_rejected(self: &Arc<Self>, ids: &[InternalRequestId]) {
        let mut effects = Effects::default();
        {
            let mut table = self.table.lock();
            for &id in ids {
                if let Some(request) = table.remove(id) {
                    effects.resolve_error(&request, AsyncErrorCode::InternalError);
                }
            }
            effects.pending_after = Some(table.len());
        }
        // Only results remain, so this cannot recurse back here
        self.apply(effects);
    }

    fn dispatch_get_results(&self, results: Vec<(ChannelId, GetValueResult)>) {
        for (channel, batch) in group_by_channel(results) {
            let count = batch.len();
            let Some(dispatcher) = self.registry.get(channel) else {
                self.drop_results(channel, count);
                continue;
            };
            if let Err(e) = dispatcher.deliver_get_results(batch) {
                warn!(channel = %channel, error = %e, "Client channel failed, purging");
                self.registry.remove(channel);
                self.drop_results(channel, count);
            }
        }
    }

    fn dispatch_set_results(&self, results: Vec<(ChannelId, SetValueResult)>) {
        for (channel, batch) in group_by_channel(results) {
            let count = batch.len();
            let Some(dispatcher) = self.registry.get(channel) else {
                self.drop_results(channel, count);
                continue;
            };
            if let Err(e) = dispatcher.deliver_set_results(batch) {
                warn!(channel = %channel, error = %e, "Client channel failed, purging");
                self.registry.remove(channel);
                self.drop_results(channel, count);
            }
        }
    }

    fn drop_results(&self, channel: ChannelId, count: usize) {
        BrokerStats::add(&self.stats.total_dropped_results, count);
        debug!(channel = %channel, count = count, "Dropping results for closed channel");
    }
}

/// Group results per channel, keeping their order within each channel.
fn group_by_channel<T>(results: Vec<(ChannelId, T)>) -> HashMap<ChannelId, Vec<T>> {
    let mut grouped: HashMap<ChannelId, Vec<T>> = HashMap::new();
    for (channel, result) in results {
        grouped.entry(channel).or_default().push(result);
    }
    grouped
}
