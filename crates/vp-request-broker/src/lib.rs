//! # Vehicle Property Request Broker
//!
//! Sits between clients that read and write vehicle properties and a device
//! interface that only offers fire-and-forget async get/set plus unsolicited
//! change notifications.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐ get/set/cancel ┌──────────────────────────────┐  get_async/set_async  ┌──────────┐
//!  │  Client  │ ─────────────► │        PropertyBroker        │ ────────────────────► │  Device  │
//!  │ (channel)│                │  ┌────────────────────────┐  │        cancel         │Interface │
//!  │          │ ◄───────────── │  │ PendingRequestTable    │  │ ◄──────────────────── │          │
//!  └──────────┘ result batches │  │ (one mutex)            │  │ results, changes,     └──────────┘
//!                              │  └────────────────────────┘  │ timeouts, set errors
//!                              │  CallbackRegistry            │
//!                              └──────────────┬───────────────┘
//!                                             │ accepted changes / set errors
//!                                             ▼
//!                                  PropertyEventListener
//! ```
//!
//! ## Guarantees
//!
//! | Property | How |
//! |----------|-----|
//! | One result per client request | removal from the table is the only way out |
//! | Busy devices are invisible | `TryAgain` re-issues after a fixed backoff, same internal id |
//! | Writes are confirmed | a set completes on device ack **and** the value observed at target |
//! | No-op writes complete | every set issues a paired initial-value read |
//! | Deadlines hold | device timeouts plus the broker's own periodic sweep |
//!
//! ## Module Structure
//!
//! - `domain/` - Pending entries, table, correlation, id translation
//! - `ports/` - Client surface, device sink, device/callback/listener traits
//! - `registry` - Channel to dispatcher map
//! - `service/` - [`PropertyBroker`], retries, sweeper
//! - `config` - [`BrokerConfig`]
//! - `metrics` - Optional Prometheus metrics (`metrics` feature)
//! - `testing` - Recording fakes for the outbound ports

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod service;
pub mod testing;

pub use config::BrokerConfig;
pub use domain::{
    BrokerStatsSnapshot, ChannelId, GetPropertyRequest, GetValueResult, PendingSummary,
    PropertyIdMapper, SetPropertyRequest, SetValueResult,
};
pub use error::{BrokerError, BrokerResult};
pub use ports::{
    ClientChannel, DeviceEventSink, DeviceInterface, PropertyBrokerApi, PropertyEventListener,
    ResultCallback,
};
pub use registry::{CallbackRegistry, ResultDispatcher};
pub use service::PropertyBroker;
