//! # Runtime Wiring
//!
//! Builds the broker in front of the simulated device, routes device events
//! back into it and publishes accepted property events on the bus.
//!
//! ```text
//! ClientConnection ──► PropertyBroker ──► SimulatedDevice
//!        ▲                  │   ▲                │
//!        └── results ───────┘   └── pump ◄───────┘ DeviceEvent
//!                           │
//!                           └──► BusPropertyListener ──► InMemoryEventBus
//! ```

use std::sync::Arc;
use std::time::Duration;

use shared_bus::InMemoryEventBus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vp_request_broker::{
    BrokerResult, BrokerStatsSnapshot, GetPropertyRequest, PropertyBroker, PropertyBrokerApi,
    SetPropertyRequest,
};

use crate::adapters::BusPropertyListener;
use crate::client::ClientConnection;
use crate::config::RuntimeConfig;
use crate::device::{pump_device_events, SimulatedDevice};

/// How long shutdown waits for the device event pump.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The running broker with its device, bus and background tasks.
pub struct BrokerRuntime {
    broker: PropertyBroker,
    device: SimulatedDevice,
    bus: Arc<InMemoryEventBus>,
    pump: JoinHandle<()>,
    sweeper: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl BrokerRuntime {
    /// Wire everything together and start the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: &RuntimeConfig) -> BrokerResult<Self> {
        let (device, events) = SimulatedDevice::new(config.device.clone());
        let broker = PropertyBroker::new(config.broker.clone(), Arc::new(device.clone()))?;

        let bus = Arc::new(InMemoryEventBus::with_capacity(config.bus_capacity));
        broker.set_event_listener(Arc::new(BusPropertyListener::new(Arc::clone(&bus))));

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let sink = broker.clone();
        let pump = tokio::spawn(async move {
            tokio::select! {
                _ = pump_device_events(events, sink) => {}
                _ = shutdown_rx.changed() => {
                    info!("Device event pump received shutdown signal");
                }
            }
        });
        let sweeper = broker.spawn_deadline_sweeper();

        info!(
            latency_ms = config.device.latency.as_millis() as u64,
            busy_ratio = config.device.busy_ratio,
            bus_capacity = config.bus_capacity,
            "Broker runtime started"
        );

        Ok(Self {
            broker,
            device,
            bus,
            pump,
            sweeper,
            shutdown_tx,
        })
    }

    pub fn broker(&self) -> &PropertyBroker {
        &self.broker
    }

    pub fn device(&self) -> &SimulatedDevice {
        &self.device
    }

    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// Open a new client connection.
    pub fn connect(&self) -> ClientConnection {
        ClientConnection::new()
    }

    /// Timeout applied by [`Self::get`] and [`Self::set`].
    pub fn default_timeout(&self) -> Duration {
        self.broker.config().default_timeout
    }

    /// Submit reads for `client` with the configured default timeout.
    pub fn get(
        &self,
        client: &ClientConnection,
        requests: Vec<GetPropertyRequest>,
    ) -> BrokerResult<()> {
        self.broker
            .get_property_values_async(client.channel(), requests, self.default_timeout())
    }

    /// Submit writes for `client` with the configured default timeout.
    pub fn set(
        &self,
        client: &ClientConnection,
        requests: Vec<SetPropertyRequest>,
    ) -> BrokerResult<()> {
        self.broker
            .set_property_values_async(client.channel(), requests, self.default_timeout())
    }

    /// Close a client connection and tell the broker about it.
    pub fn disconnect(&self, client: ClientConnection) {
        self.broker.on_channel_closed(client.channel());
    }

    /// Stop the background tasks and return the final counters.
    pub async fn shutdown(self) -> BrokerStatsSnapshot {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, self.pump).await.is_err() {
            warn!("Device event pump did not stop in time");
        }
        self.sweeper.abort();

        let pending = self.broker.pending_count();
        if pending > 0 {
            warn!(pending = pending, "Shutting down with requests still pending");
        }
        let stats = self.broker.stats();
        info!(
            submitted = stats.submitted,
            completed = stats.completed,
            failed = stats.failed,
            timed_out = stats.timed_out,
            retries = stats.retries,
            "Shutdown complete"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientResult;
    use crate::config::DeviceConfig;
    use shared_bus::{EventFilter, PropertyEvent};
    use shared_types::{PropertyKey, PropertyValue, RawValue};
    use shared_types::AsyncErrorCode;
    use vp_request_broker::{BrokerConfig, GetValueResult, SetValueResult};

    const FAN: PropertyKey = PropertyKey::new(0x0500, 1);

    fn config(busy_ratio: f64) -> RuntimeConfig {
        RuntimeConfig {
            device: DeviceConfig {
                latency: Duration::from_millis(5),
                jitter: Duration::ZERO,
                busy_ratio,
            },
            ..RuntimeConfig::default()
        }
    }

    fn seed_fan(runtime: &BrokerRuntime, speed: i32) {
        runtime.device().seed([PropertyValue::new(
            FAN.property_id,
            FAN.area_id,
            RawValue::Int32(speed),
            1,
        )]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_through_runtime() {
        let runtime = BrokerRuntime::start(&config(0.0)).unwrap();
        seed_fan(&runtime, 2);
        let mut client = runtime.connect();

        runtime
            .broker()
            .get_property_values_async(
                client.channel(),
                vec![GetPropertyRequest::new(1, FAN.property_id, FAN.area_id)],
                Duration::from_secs(1),
            )
            .unwrap();

        assert_eq!(
            client.next_result().await,
            Some(ClientResult::Get(GetValueResult::ok(
                1,
                PropertyValue::new(FAN.property_id, FAN.area_id, RawValue::Int32(2), 1)
            )))
        );
        runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_publishes_change_on_bus() {
        let runtime = BrokerRuntime::start(&config(0.0)).unwrap();
        seed_fan(&runtime, 2);
        let mut changes = runtime
            .bus()
            .subscribe(EventFilter::property_area(FAN.property_id, FAN.area_id));
        let mut client = runtime.connect();

        runtime
            .broker()
            .set_property_values_async(
                client.channel(),
                vec![SetPropertyRequest::new(
                    7,
                    FAN.property_id,
                    FAN.area_id,
                    RawValue::Int32(4),
                )],
                Duration::from_secs(1),
            )
            .unwrap();

        let Some(ClientResult::Set(SetValueResult { request_id, result })) =
            client.next_result().await
        else {
            panic!("expected a set result");
        };
        assert_eq!(request_id, 7);
        let timestamp = result.unwrap();

        let Some(PropertyEvent::Changed(value)) = changes.recv().await else {
            panic!("expected a change event");
        };
        assert_eq!(value.value, RawValue::Int32(4));
        assert_eq!(value.timestamp, timestamp);

        let stats = runtime.shutdown().await;
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_rejects_further_requests() {
        let runtime = BrokerRuntime::start(&config(0.0)).unwrap();
        let client = runtime.connect();
        let channel = client.channel().clone();

        runtime.disconnect(client);

        assert!(runtime
            .broker()
            .get_property_values_async(
                &channel,
                vec![GetPropertyRequest::new(1, FAN.property_id, FAN.area_id)],
                Duration::from_secs(1),
            )
            .is_err());
        runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_applies_to_helpers() {
        let config = RuntimeConfig {
            broker: BrokerConfig {
                default_timeout: Duration::from_millis(100),
                ..BrokerConfig::default()
            },
            device: DeviceConfig {
                latency: Duration::from_millis(500),
                jitter: Duration::ZERO,
                busy_ratio: 0.0,
            },
            ..RuntimeConfig::default()
        };
        let runtime = BrokerRuntime::start(&config).unwrap();
        seed_fan(&runtime, 2);
        let mut client = runtime.connect();
        assert_eq!(runtime.default_timeout(), Duration::from_millis(100));

        runtime
            .get(&client, vec![GetPropertyRequest::new(1, FAN.property_id, FAN.area_id)])
            .unwrap();
        runtime
            .set(
                &client,
                vec![SetPropertyRequest::new(2, FAN.property_id, FAN.area_id, RawValue::Int32(3))],
            )
            .unwrap();

        let mut results = client.collect(2).await;
        results.sort_by_key(|result| match result {
            ClientResult::Get(get) => get.request_id,
            ClientResult::Set(set) => set.request_id,
        });
        assert_eq!(
            results,
            vec![
                ClientResult::Get(GetValueResult::error(1, AsyncErrorCode::Timeout)),
                ClientResult::Set(SetValueResult::error(2, AsyncErrorCode::Timeout)),
            ]
        );
        runtime.shutdown().await;
    }
}
