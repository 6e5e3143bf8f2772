//! Pending request entries.

use super::channel::ChannelId;
use serde::Serialize;
use shared_types::{
    AreaId, ClientRequestId, InternalRequestId, PropertyId, PropertyKey, RawValue, TimestampNanos,
};
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on how far ahead a deadline is placed. Longer client timeouts
/// are accepted and clamped so the deadline stays representable.
pub const MAX_DEADLINE_HORIZON: Duration = Duration::from_secs(86_400 * 365 * 30);

/// What a pending entry is waiting for.
///
/// Only `GetInitialValueForSet` carries a pairing reference, so a plain get
/// can never be mistaken for half of a write.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    /// Client read.
    Get,
    /// Client write, complete once acknowledged and observed at `target`.
    Set { target: RawValue },
    /// Internal read issued alongside every write to catch writes that do
    /// not change the value (no change event would ever arrive).
    GetInitialValueForSet {
        target: RawValue,
        paired_set: InternalRequestId,
    },
}

impl RequestKind {
    /// The value a write is waiting to observe, if any.
    pub fn target(&self) -> Option<&RawValue> {
        match self {
            Self::Get => None,
            Self::Set { target } | Self::GetInitialValueForSet { target, .. } => Some(target),
        }
    }

    /// True for kinds whose results reach the client.
    pub fn is_client_visible(&self) -> bool {
        !matches!(self, Self::GetInitialValueForSet { .. })
    }

    /// True for kinds issued through the device's get call.
    pub fn is_get_class(&self) -> bool {
        !matches!(self, Self::Set { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set { .. } => "set",
            Self::GetInitialValueForSet { .. } => "get_initial_value_for_set",
        }
    }
}

/// Whether an entry is currently at the device or waiting out a backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestPhase {
    Issued,
    RetryScheduled,
}

/// One outstanding get/set operation.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub client_request_id: ClientRequestId,
    pub internal_id: InternalRequestId,
    pub kind: RequestKind,
    /// Client-facing property id.
    pub property_id: PropertyId,
    pub area_id: AreaId,
    pub channel: ChannelId,
    pub deadline: Instant,
    /// Budget handed to the device on the latest issue.
    pub remaining_timeout: Duration,
    pub phase: RequestPhase,
    pub set_acknowledged: bool,
    pub value_observed_at_target: bool,
    pub observed_timestamp: Option<TimestampNanos>,
}

impl PendingRequest {
    /// Create a freshly issued entry.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_request_id: ClientRequestId,
        internal_id: InternalRequestId,
        kind: RequestKind,
        property_id: PropertyId,
        area_id: AreaId,
        channel: ChannelId,
        now: Instant,
        timeout: Duration,
    ) -> Self {
        Self {
            client_request_id,
            internal_id,
            kind,
            property_id,
            area_id,
            channel,
            deadline: now + timeout.min(MAX_DEADLINE_HORIZON),
            remaining_timeout: timeout,
            phase: RequestPhase::Issued,
            set_acknowledged: false,
            value_observed_at_target: false,
            observed_timestamp: None,
        }
    }

    pub fn key(&self) -> PropertyKey {
        PropertyKey::new(self.property_id, self.area_id)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// The internal id of the write this entry reads for, if any.
    pub fn paired_set(&self) -> Option<InternalRequestId> {
        match self.kind {
            RequestKind::GetInitialValueForSet { paired_set, .. } => Some(paired_set),
            _ => None,
        }
    }

    /// Move back to `Issued` with whatever budget is left before the deadline.
    ///
    /// Returns `None` (leaving the entry untouched) if the deadline already
    /// passed.
    pub fn reissue(&mut self, now: Instant) -> Option<Duration> {
        let remaining = self.deadline.saturating_duration_since(now);
        if remaining.is_zero() {
            return None;
        }
        self.phase = RequestPhase::Issued;
        self.remaining_timeout = remaining;
        Some(remaining)
    }
}
