//! # Error Types
//!
//! Status codes reported by devices and error codes delivered to clients.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-request status reported by the device interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// The request was accepted (set) or produced a value (get).
    Ok,
    /// Transient: the device is busy, the request should be retried.
    TryAgain,
    /// The property is not available right now.
    NotAvailable,
    /// The device hit an internal failure.
    InternalError,
    /// The device refused access to the property.
    AccessDenied,
}

impl DeviceStatus {
    /// True for statuses that must be retried rather than reported.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::TryAgain)
    }

    /// The client-visible error for a terminal status, `None` for `Ok`/`TryAgain`.
    #[must_use]
    pub fn terminal_error(self) -> Option<AsyncErrorCode> {
        match self {
            Self::Ok | Self::TryAgain => None,
            Self::NotAvailable => Some(AsyncErrorCode::NotAvailable),
            Self::InternalError | Self::AccessDenied => Some(AsyncErrorCode::InternalError),
        }
    }
}

/// Error delivered to a client for a request that did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum AsyncErrorCode {
    /// The device or broker failed internally.
    #[error("internal error")]
    InternalError,

    /// The property is not available.
    #[error("property not available")]
    NotAvailable,

    /// The request did not complete before its deadline.
    #[error("request timed out")]
    Timeout,
}
