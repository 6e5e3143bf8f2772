//! Error types for the property request broker.
//!
//! These errors are returned synchronously from the client surface, only for
//! batches that cannot be accepted at all. Per-request outcomes (success,
//! device errors, timeouts) travel through the channel's result callback.

use crate::domain::ChannelId;
use shared_types::ClientRequestId;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in the broker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// The caller asked for a zero timeout.
    #[error("Invalid timeout: {0:?} (must be greater than zero)")]
    InvalidTimeout(Duration),

    /// A client request id is already live on the calling channel.
    #[error("Client request id {client_request_id} is already pending on channel {channel}")]
    DuplicateClientRequestId {
        channel: ChannelId,
        client_request_id: ClientRequestId,
    },

    /// The channel was closed; nothing more is accepted from or delivered to it.
    #[error("Channel {0} is closed")]
    ChannelClosed(ChannelId),

    /// The device interface rejected a batch outright.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Invalid broker configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
