//! # Vehicle Property Broker Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs       # Broker + simulated device + event bus, end to end
//!     └── properties.rs  # proptest: exactly one result per request
//!
//! tests/benches/
//! └── broker_benchmarks.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p vp-tests
//!
//! # By category
//! cargo test -p vp-tests integration::flows
//! cargo test -p vp-tests integration::properties
//!
//! # Benchmarks
//! cargo bench -p vp-tests
//! ```

#![allow(dead_code)]

pub mod integration;
