//! # Vehicle Property Broker Runtime
//!
//! Runs the request broker in front of a simulated device.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry from the environment
//! 2. Load runtime configuration
//! 3. Wire device, broker and event bus, start background tasks
//! 4. Seed the device and run a scripted batch of gets and sets
//! 5. Keep changing the vehicle speed until Ctrl+C
//!
//! ## Demo Properties
//!
//! | Property | Id | Area | Notes |
//! |----------|----|------|-------|
//! | Vehicle speed | `0x0207` | 0 | changes every second |
//! | HVAC fan speed | `0x0500` | 1 | written to a new value |
//! | Door lock | `0x0300` | 1 | written to its current value |

use std::time::Duration;

use anyhow::{Context, Result};
use shared_bus::{EventFilter, EventTopic};
use shared_types::{PropertyKey, PropertyValue, RawValue};
use tracing::{info, warn, Instrument};
use vp_request_broker::{metrics, GetPropertyRequest, SetPropertyRequest};
use vp_runtime::{BrokerRuntime, ClientResult, RuntimeConfig};
use vp_telemetry::{component_span, init_telemetry, log_property_event, TelemetryConfig};

const VEHICLE_SPEED: PropertyKey = PropertyKey::new(0x0207, 0);
const FAN_SPEED: PropertyKey = PropertyKey::new(0x0500, 1);
const DOOR_LOCK: PropertyKey = PropertyKey::new(0x0300, 1);
const UNKNOWN: PropertyKey = PropertyKey::new(0x0999, 0);

#[tokio::main]
async fn main() -> Result<()> {
    let mut telemetry = TelemetryConfig::from_env();
    if telemetry.component.is_empty() {
        telemetry.component = "runtime".to_string();
    }
    let _telemetry = init_telemetry(telemetry).context("Failed to initialize telemetry")?;

    let config = RuntimeConfig::from_env().context("Invalid runtime configuration")?;
    let runtime = BrokerRuntime::start(&config).context("Failed to start broker runtime")?;

    runtime.device().seed([
        seed_value(VEHICLE_SPEED, RawValue::Float(0.0)),
        seed_value(FAN_SPEED, RawValue::Int32(2)),
        seed_value(DOOR_LOCK, RawValue::Bool(true)),
    ]);

    let mut events = runtime.bus().event_stream(EventFilter::topics(vec![EventTopic::All]));
    let bus_logger = tokio::spawn(async move {
        use tokio_stream::StreamExt;
        while let Some(event) = events.next().await {
            let key = event.key();
            log_property_event!(
                info,
                "bus",
                "Bus event",
                key.property_id,
                key.area_id,
                topic = ?event.topic()
            );
        }
    });

    run_demo(&runtime)
        .instrument(component_span!("demo", component = "runtime"))
        .await?;

    info!("Runtime is running. Press Ctrl+C to stop.");
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut speed = 0.0_f32;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                speed = (speed + 7.5) % 130.0;
                runtime.device().inject_change(VEHICLE_SPEED, RawValue::Float(speed));
            }
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                break;
            }
        }
    }

    bus_logger.abort();
    let stats = runtime.shutdown().await;
    info!(resolved = stats.resolved(), "Final broker counters");
    info!("Metrics:\n{}", metrics::encode_metrics());

    Ok(())
}

/// Submit one batch of reads and writes and log every result.
async fn run_demo(runtime: &BrokerRuntime) -> Result<()> {
    let mut client = runtime.connect();

    runtime.get(
        &client,
        vec![
            GetPropertyRequest::new(1, VEHICLE_SPEED.property_id, VEHICLE_SPEED.area_id),
            GetPropertyRequest::new(2, FAN_SPEED.property_id, FAN_SPEED.area_id),
            GetPropertyRequest::new(3, UNKNOWN.property_id, UNKNOWN.area_id),
        ],
    )?;
    runtime.set(
        &client,
        vec![
            SetPropertyRequest::new(
                4,
                FAN_SPEED.property_id,
                FAN_SPEED.area_id,
                RawValue::Int32(5),
            ),
            // Already locked: completes through the initial value read
            SetPropertyRequest::new(
                5,
                DOOR_LOCK.property_id,
                DOOR_LOCK.area_id,
                RawValue::Bool(true),
            ),
        ],
    )?;

    let expected = 5;
    let wait = runtime.default_timeout().saturating_mul(2);
    let results = tokio::time::timeout(wait, client.collect(expected))
        .await
        .context("Demo results did not arrive")?;

    for result in &results {
        match result {
            ClientResult::Get(get) => match &get.result {
                Ok(value) => {
                    info!(request_id = get.request_id, value = %value.value, "Get succeeded")
                }
                Err(code) => warn!(request_id = get.request_id, error = %code, "Get failed"),
            },
            ClientResult::Set(set) => match &set.result {
                Ok(timestamp) => {
                    info!(request_id = set.request_id, timestamp = timestamp, "Set confirmed")
                }
                Err(code) => warn!(request_id = set.request_id, error = %code, "Set failed"),
            },
        }
    }
    if results.len() < expected {
        warn!(received = results.len(), expected = expected, "Demo ended with missing results");
    }

    runtime.disconnect(client);
    Ok(())
}

fn seed_value(key: PropertyKey, value: RawValue) -> PropertyValue {
    PropertyValue::new(key.property_id, key.area_id, value, 0)
}
