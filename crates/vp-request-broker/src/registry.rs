//! Client Callback Registry.
//!
//! Maps each live client channel to exactly one [`ResultDispatcher`].
//! Registration is idempotent per channel; closing a channel purges its
//! entry, after which results addressed to it are dropped at dispatch time.

use crate::domain::{ChannelId, GetValueResult, SetValueResult};
use crate::error::{BrokerError, BrokerResult};
use crate::ports::ClientChannel;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Delivers result batches to one channel's callback.
#[derive(Debug)]
pub struct ResultDispatcher {
    channel: ClientChannel,
    delivered: AtomicU64,
}

impl ResultDispatcher {
    fn new(channel: ClientChannel) -> Self {
        Self {
            channel,
            delivered: AtomicU64::new(0),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel.id()
    }

    /// Results handed to the callback so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn deliver_get_results(&self, results: Vec<GetValueResult>) -> BrokerResult<()> {
        let count = results.len() as u64;
        self.channel.callback().on_get_value_results(results)?;
        self.delivered.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    pub fn deliver_set_results(&self, results: Vec<SetValueResult>) -> BrokerResult<()> {
        let count = results.len() as u64;
        self.channel.callback().on_set_value_results(results)?;
        self.delivered.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }
}

/// Registry of live client channels.
#[derive(Default)]
pub struct CallbackRegistry {
    dispatchers: RwLock<HashMap<ChannelId, Arc<ResultDispatcher>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the dispatcher for a channel, creating it on first use.
    ///
    /// A closed channel is never (re)registered. The closed flag is checked
    /// under the write lock, which `remove` also takes after the flag is set.
    pub fn register(&self, channel: &ClientChannel) -> BrokerResult<Arc<ResultDispatcher>> {
        if let Some(existing) = self.dispatchers.read().get(&channel.id()) {
            return Ok(existing.clone());
        }

        let mut dispatchers = self.dispatchers.write();
        if channel.is_closed() {
            return Err(BrokerError::ChannelClosed(channel.id()));
        }
        let dispatcher = dispatchers
            .entry(channel.id())
            .or_insert_with(|| {
                debug!(channel = %channel.id(), "Registered client channel");
                Arc::new(ResultDispatcher::new(channel.clone()))
            })
            .clone();
        Ok(dispatcher)
    }

    pub fn get(&self, channel: ChannelId) -> Option<Arc<ResultDispatcher>> {
        self.dispatchers.read().get(&channel).cloned()
    }

    /// Drop the channel's dispatcher and mark the channel closed.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove(&self, channel: ChannelId) -> bool {
        let Some(dispatcher) = self.dispatchers.write().remove(&channel) else {
            return false;
        };
        dispatcher.channel.mark_closed();
        debug!(channel = %channel, "Purged client channel");
        true
    }

    pub fn len(&self) -> usize {
        self.dispatchers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatchers.read().is_empty()
    }
}
