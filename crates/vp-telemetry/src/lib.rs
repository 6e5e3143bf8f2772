//! # VP Telemetry
//!
//! Logging setup shared by every binary in the workspace.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vp_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::for_component("runtime");
//!     let _guard = init_telemetry(config).expect("Failed to init telemetry");
//!
//!     // Broker logs are now emitted through the global subscriber
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `vehicle-property-broker` | Service name in logs |
//! | `VP_COMPONENT` | (empty) | Component suffix |
//! | `VP_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `VP_CONSOLE_OUTPUT` | `true` | Emit to stdout |
//! | `VP_JSON_LOGS` | `false` (`true` in containers) | JSON lines |
//! | `VP_LOG_SOURCE` | `false` | Include file/line |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::{init_logging, StructuredLogger};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging for the process.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let logger = logging::init_logging(&config)?;
    Ok(TelemetryGuard { logger })
}

/// Guard that keeps telemetry active.
#[derive(Debug)]
pub struct TelemetryGuard {
    logger: StructuredLogger,
}

impl TelemetryGuard {
    /// The installed logger.
    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.logger.service_name(), "Shutting down telemetry...");
    }
}

/// Convenience macro for creating a span with component context.
///
/// # Example
///
/// ```rust,ignore
/// use vp_telemetry::component_span;
///
/// fn handle_batch() {
///     let _span = component_span!("handle_batch", component = "broker", size = 4).entered();
/// }
/// ```
#[macro_export]
macro_rules! component_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
