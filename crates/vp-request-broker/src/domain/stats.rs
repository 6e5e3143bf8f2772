//! Broker counters and diagnostics snapshots.

use super::channel::ChannelId;
use super::request::{PendingRequest, RequestPhase};
use serde::Serialize;
use shared_types::{AreaId, ClientRequestId, InternalRequestId, PropertyId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Statistics for the broker
#[derive(Debug, Default)]
pub struct BrokerStats {
    /// Client requests accepted
    pub total_submitted: AtomicU64,
    /// Requests resolved successfully
    pub total_completed: AtomicU64,
    /// Requests resolved with a device error
    pub total_failed: AtomicU64,
    /// Requests resolved with a timeout
    pub total_timeouts: AtomicU64,
    /// Requests removed by client cancellation
    pub total_cancelled: AtomicU64,
    /// Transient-busy retries scheduled
    pub total_retries: AtomicU64,
    /// Results not delivered because the channel was gone
    pub total_dropped_results: AtomicU64,
    /// Device results or timeouts for ids no longer in the table
    pub total_unknown_results: AtomicU64,
}

impl BrokerStats {
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> BrokerStatsSnapshot {
        BrokerStatsSnapshot {
            submitted: self.total_submitted.load(Ordering::Relaxed),
            completed: self.total_completed.load(Ordering::Relaxed),
            failed: self.total_failed.load(Ordering::Relaxed),
            timed_out: self.total_timeouts.load(Ordering::Relaxed),
            cancelled: self.total_cancelled.load(Ordering::Relaxed),
            retries: self.total_retries.load(Ordering::Relaxed),
            dropped_results: self.total_dropped_results.load(Ordering::Relaxed),
            unknown_results: self.total_unknown_results.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`BrokerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStatsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub retries: u64,
    pub dropped_results: u64,
    pub unknown_results: u64,
}

impl BrokerStatsSnapshot {
    /// Requests that have reached a final state.
    pub fn resolved(&self) -> u64 {
        self.completed + self.failed + self.timed_out + self.cancelled
    }
}

/// Read-only view of one live entry, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSummary {
    pub internal_id: InternalRequestId,
    pub client_request_id: ClientRequestId,
    pub kind: &'static str,
    pub property_id: PropertyId,
    pub area_id: AreaId,
    pub channel: ChannelId,
    pub phase: RequestPhase,
    pub remaining: Duration,
    pub set_acknowledged: bool,
    pub value_observed_at_target: bool,
}

impl PendingSummary {
    pub fn from_request(request: &PendingRequest, now: Instant) -> Self {
        Self {
            internal_id: request.internal_id,
            client_request_id: request.client_request_id,
            kind: request.kind.label(),
            property_id: request.property_id,
            area_id: request.area_id,
            channel: request.channel,
            phase: request.phase,
            remaining: request.deadline.saturating_duration_since(now),
            set_acknowledged: request.set_acknowledged,
            value_observed_at_target: request.value_observed_at_target,
        }
    }
}
