//! Pending Request Table - ground truth for every outstanding operation.
//!
//! The table owns all [`PendingRequest`] entries. It keeps two indices that
//! must always agree with the entry map:
//!
//! | Index | Key | Holds |
//! |-------|-----|-------|
//! | `entries` | internal id | every live entry |
//! | `by_client` | (channel, client id) | client-visible entries only |
//!
//! The table is not thread-safe on its own; the broker keeps it behind a
//! single mutex so the indices are always updated in one critical section.

use super::channel::ChannelId;
use super::request::{PendingRequest, RequestKind};
use shared_types::{ClientRequestId, InternalRequestId, PropertyKey, RawValue};
use std::collections::HashMap;
use tokio::time::Instant;

/// Map from internal request id to request state.
#[derive(Debug, Default)]
pub struct PendingRequestTable {
    entries: HashMap<InternalRequestId, PendingRequest>,
    by_client: HashMap<(ChannelId, ClientRequestId), InternalRequestId>,
    next_id: u64,
}

impl PendingRequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next internal id. Ids are never reused.
    pub fn allocate_id(&mut self) -> InternalRequestId {
        let id = InternalRequestId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert an entry.
    ///
    /// Returns `false` (and leaves the table unchanged) if the internal id or
    /// the client id on that channel is already live.
    pub fn insert(&mut self, request: PendingRequest) -> bool {
        if self.entries.contains_key(&request.internal_id) {
            return false;
        }
        if request.kind.is_client_visible() {
            let client_key = (request.channel, request.client_request_id);
            if self.by_client.contains_key(&client_key) {
                return false;
            }
            self.by_client.insert(client_key, request.internal_id);
        }
        self.entries.insert(request.internal_id, request);
        true
    }

    /// Remove an entry. Removal is the only way an id is retired.
    pub fn remove(&mut self, id: InternalRequestId) -> Option<PendingRequest> {
        let request = self.entries.remove(&id)?;
        if request.kind.is_client_visible() {
            self.by_client
                .remove(&(request.channel, request.client_request_id));
        }
        Some(request)
    }

    pub fn get(&self, id: InternalRequestId) -> Option<&PendingRequest> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: InternalRequestId) -> Option<&mut PendingRequest> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: InternalRequestId) -> bool {
        self.entries.contains_key(&id)
    }

    /// True if `client_request_id` is live on `channel`.
    pub fn is_client_pending(&self, channel: ChannelId, client_request_id: ClientRequestId) -> bool {
        self.by_client.contains_key(&(channel, client_request_id))
    }

    /// Internal id of a live client-visible entry.
    pub fn lookup_client(
        &self,
        channel: ChannelId,
        client_request_id: ClientRequestId,
    ) -> Option<InternalRequestId> {
        self.by_client.get(&(channel, client_request_id)).copied()
    }

    /// Live writes on `key` whose target equals `value`.
    pub fn sets_waiting_for(&self, key: PropertyKey, value: &RawValue) -> Vec<InternalRequestId> {
        let mut ids: Vec<_> = self
            .entries
            .values()
            .filter(|request| {
                request.key() == key
                    && matches!(&request.kind, RequestKind::Set { target } if target == value)
            })
            .map(|request| request.internal_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Initial-value reads paired with the write `set_id`.
    pub fn initial_reads_for(&self, set_id: InternalRequestId) -> Vec<InternalRequestId> {
        self.entries
            .values()
            .filter(|request| request.paired_set() == Some(set_id))
            .map(|request| request.internal_id)
            .collect()
    }

    /// Ids whose deadline is at or before `now`, oldest first.
    pub fn expired(&self, now: Instant) -> Vec<InternalRequestId> {
        let mut ids: Vec<_> = self
            .entries
            .values()
            .filter(|request| request.is_expired(now))
            .map(|request| request.internal_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingRequest> {
        self.entries.values()
    }
}
