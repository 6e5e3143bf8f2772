//! # In-Process Client
//!
//! A [`ResultCallback`] that forwards results into a tokio channel, so async
//! code can await the outcome of the requests it submitted.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use vp_request_broker::{
    BrokerError, BrokerResult, ChannelId, ClientChannel, GetValueResult, ResultCallback,
    SetValueResult,
};

/// One result as seen by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientResult {
    Get(GetValueResult),
    Set(SetValueResult),
}

struct ForwardingCallback {
    channel: ChannelId,
    results: mpsc::UnboundedSender<ClientResult>,
}

impl ForwardingCallback {
    fn forward(&self, results: impl Iterator<Item = ClientResult>) -> BrokerResult<()> {
        for result in results {
            if self.results.send(result).is_err() {
                debug!(channel = %self.channel, "Client receiver dropped");
                return Err(BrokerError::ChannelClosed(self.channel));
            }
        }
        Ok(())
    }
}

impl ResultCallback for ForwardingCallback {
    fn on_get_value_results(&self, results: Vec<GetValueResult>) -> BrokerResult<()> {
        self.forward(results.into_iter().map(ClientResult::Get))
    }

    fn on_set_value_results(&self, results: Vec<SetValueResult>) -> BrokerResult<()> {
        self.forward(results.into_iter().map(ClientResult::Set))
    }
}

/// A connected client: its channel handle plus the results it receives.
pub struct ClientConnection {
    channel: ClientChannel,
    results: mpsc::UnboundedReceiver<ClientResult>,
}

impl ClientConnection {
    pub fn new() -> Self {
        let id = ChannelId::new();
        let (sender, results) = mpsc::unbounded_channel();
        let callback = Arc::new(ForwardingCallback {
            channel: id,
            results: sender,
        });
        Self {
            channel: ClientChannel::with_id(id, callback),
            results,
        }
    }

    /// Handle to pass to the broker's client surface.
    pub fn channel(&self) -> &ClientChannel {
        &self.channel
    }

    /// Next result, or `None` once the broker can no longer deliver any.
    pub async fn next_result(&mut self) -> Option<ClientResult> {
        self.results.recv().await
    }

    /// Collect exactly `count` results.
    pub async fn collect(&mut self, count: usize) -> Vec<ClientResult> {
        let mut collected = Vec::with_capacity(count);
        while collected.len() < count {
            match self.results.recv().await {
                Some(result) => collected.push(result),
                None => break,
            }
        }
        collected
    }
}

impl Default for ClientConnection {
    fn default() -> Self {
        Self::new()
    }
}
