//! Domain layer for the property request broker.
//!
//! Pure state: pending entries, their table, set-completion correlation and
//! property id translation. Nothing here performs I/O or spawns tasks.

pub mod channel;
pub mod correlation;
pub mod mapper;
pub mod request;
pub mod stats;
pub mod table;
pub mod value_objects;

pub use channel::ChannelId;
pub use correlation::SetProgress;
pub use mapper::PropertyIdMapper;
pub use request::{PendingRequest, RequestKind, RequestPhase};
pub use stats::{BrokerStats, BrokerStatsSnapshot, PendingSummary};
pub use table::PendingRequestTable;
pub use value_objects::{GetPropertyRequest, GetValueResult, SetPropertyRequest, SetValueResult};
