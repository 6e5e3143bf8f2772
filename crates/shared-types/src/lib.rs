//! # Shared Types Crate
//!
//! This crate contains the property entities, the device request/result
//! messages and the status codes exchanged between the request broker, the
//! property event bus and device implementations.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **Opaque Identity**: Property and area ids are plain integers; nothing in
//!   this crate decides which properties exist.
//! - **Two Id Spaces**: `ClientRequestId` is chosen by callers and only unique
//!   per channel, `InternalRequestId` is minted by the broker and is the only
//!   id a device ever sees.

pub mod device;
pub mod entities;
pub mod errors;

pub use device::*;
pub use entities::*;
pub use errors::*;
