//! # Integration Test Flows
//!
//! Drives the broker through the full runtime: the simulated device answers
//! asynchronously (with latency, busy replies and its own timeouts) and the
//! accepted property events fan out over the shared bus.
//!
//! ## Flows Tested:
//!
//! 1. **Busy device**: every request still gets exactly one result
//! 2. **No-op write**: completes through the initial value read
//! 3. **Slow device**: requests time out once
//! 4. **Cancellation**: cancelled requests never report
//! 5. **Event bus**: changes and set errors reach filtered subscribers
//! 6. **Id translation**: clients never see device property ids

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::time::timeout;

    use shared_bus::{EventFilter, EventTopic, PropertyEvent};
    use shared_types::{
        AsyncErrorCode, DeviceStatus, PropertyKey, PropertySetError, PropertyValue, RawValue,
    };
    use vp_request_broker::{
        BrokerConfig, GetPropertyRequest, PropertyBrokerApi, SetPropertyRequest,
    };
    use vp_runtime::{BrokerRuntime, ClientConnection, ClientResult, DeviceConfig, RuntimeConfig};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const SPEED: PropertyKey = PropertyKey::new(0x0207, 0);
    const LOCK: PropertyKey = PropertyKey::new(0x0300, 1);
    const FAN_PROPERTY: i32 = 0x0500;
    const FAN_AREAS: i32 = 10;
    const SEED_TIMESTAMP: i64 = 42;

    fn runtime_config(latency_ms: u64, busy_ratio: f64) -> RuntimeConfig {
        RuntimeConfig {
            device: DeviceConfig {
                latency: Duration::from_millis(latency_ms),
                jitter: Duration::from_millis(latency_ms / 2),
                busy_ratio,
            },
            ..RuntimeConfig::default()
        }
    }

    /// Start a runtime with a seeded device.
    fn start(config: RuntimeConfig) -> BrokerRuntime {
        let runtime = BrokerRuntime::start(&config).unwrap();
        let mut values = vec![
            seed_value(SPEED, RawValue::Float(50.0)),
            seed_value(LOCK, RawValue::Bool(true)),
        ];
        for area in 0..FAN_AREAS {
            values.push(seed_value(PropertyKey::new(FAN_PROPERTY, area), RawValue::Int32(1)));
        }
        runtime.device().seed(values);
        runtime
    }

    fn seed_value(key: PropertyKey, value: RawValue) -> PropertyValue {
        PropertyValue::new(key.property_id, key.area_id, value, SEED_TIMESTAMP)
    }

    /// Assert nothing else arrives for a while.
    async fn assert_quiet(client: &mut ClientConnection) {
        let extra = timeout(Duration::from_secs(1), client.next_result()).await;
        assert!(extra.is_err(), "unexpected extra result: {extra:?}");
    }

    // =============================================================================
    // REQUEST FLOWS
    // =============================================================================

    /// Test that a busy device never produces duplicate or missing results
    #[tokio::test(start_paused = true)]
    async fn test_busy_device_every_request_answered_once() {
        let runtime = start(runtime_config(10, 0.5));
        let mut client = runtime.connect();
        let broker = runtime.broker();

        let gets: Vec<_> = (0..20)
            .map(|id| GetPropertyRequest::new(id, SPEED.property_id, SPEED.area_id))
            .collect();
        let sets: Vec<_> = (0..FAN_AREAS)
            .map(|area| {
                SetPropertyRequest::new(100 + area, FAN_PROPERTY, area, RawValue::Int32(3))
            })
            .collect();
        broker
            .get_property_values_async(client.channel(), gets, Duration::from_secs(10))
            .unwrap();
        broker
            .set_property_values_async(client.channel(), sets, Duration::from_secs(10))
            .unwrap();

        let results = client.collect(30).await;
        let mut seen: HashMap<i32, usize> = HashMap::new();
        for result in &results {
            let id = match result {
                ClientResult::Get(get) => {
                    assert!(get.is_ok(), "get failed: {get:?}");
                    get.request_id
                }
                ClientResult::Set(set) => {
                    assert!(set.result.is_ok(), "set failed: {set:?}");
                    set.request_id
                }
            };
            *seen.entry(id).or_default() += 1;
        }

        assert_eq!(seen.len(), 30);
        assert!(seen.values().all(|count| *count == 1));
        assert_quiet(&mut client).await;

        for area in 0..FAN_AREAS {
            let stored = runtime.device().value(PropertyKey::new(FAN_PROPERTY, area)).unwrap();
            assert_eq!(stored.value, RawValue::Int32(3));
        }
        let stats = runtime.shutdown().await;
        assert_eq!(stats.completed, 30);
    }

    /// Test that writing the current value completes without a change event
    #[tokio::test(start_paused = true)]
    async fn test_noop_write_completes_through_initial_read() {
        let runtime = start(runtime_config(5, 0.0));
        let mut client = runtime.connect();

        runtime
            .broker()
            .set_property_values_async(
                client.channel(),
                vec![SetPropertyRequest::new(
                    1,
                    LOCK.property_id,
                    LOCK.area_id,
                    RawValue::Bool(true),
                )],
                Duration::from_secs(1),
            )
            .unwrap();

        let Some(ClientResult::Set(result)) = client.next_result().await else {
            panic!("expected a set result");
        };
        assert_eq!(result.result, Ok(SEED_TIMESTAMP));
        runtime.shutdown().await;
    }

    /// Test that an unknown property is reported as not available
    #[tokio::test(start_paused = true)]
    async fn test_unknown_property_not_available() {
        let runtime = start(runtime_config(5, 0.0));
        let mut client = runtime.connect();

        runtime
            .broker()
            .get_property_values_async(
                client.channel(),
                vec![GetPropertyRequest::new(9, 0x0999, 0)],
                Duration::from_secs(1),
            )
            .unwrap();

        let Some(ClientResult::Get(result)) = client.next_result().await else {
            panic!("expected a get result");
        };
        assert_eq!(result.result, Err(AsyncErrorCode::NotAvailable));
        runtime.shutdown().await;
    }

    /// Test that a device slower than the timeout yields exactly one timeout
    #[tokio::test(start_paused = true)]
    async fn test_slow_device_times_out_once() {
        let runtime = start(runtime_config(500, 0.0));
        let mut client = runtime.connect();

        runtime
            .broker()
            .set_property_values_async(
                client.channel(),
                vec![SetPropertyRequest::new(1, FAN_PROPERTY, 0, RawValue::Int32(9))],
                Duration::from_millis(100),
            )
            .unwrap();

        let Some(ClientResult::Set(result)) = client.next_result().await else {
            panic!("expected a set result");
        };
        assert_eq!(result.result, Err(AsyncErrorCode::Timeout));
        assert_quiet(&mut client).await;
        assert_eq!(runtime.broker().pending_count(), 0);
        runtime.shutdown().await;
    }

    /// Test that a cancelled request never reports and the device stops work
    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_never_reports() {
        let runtime = start(runtime_config(200, 0.0));
        let mut client = runtime.connect();
        let broker = runtime.broker();

        broker
            .set_property_values_async(
                client.channel(),
                vec![SetPropertyRequest::new(1, FAN_PROPERTY, 0, RawValue::Int32(9))],
                Duration::from_secs(5),
            )
            .unwrap();
        assert_eq!(runtime.device().in_flight(), 2);

        assert_eq!(broker.cancel_requests(client.channel(), &[1]).unwrap(), 1);

        assert_quiet(&mut client).await;
        assert_eq!(runtime.device().in_flight(), 0);
        assert_eq!(broker.pending_count(), 0);
        let stored = runtime.device().value(PropertyKey::new(FAN_PROPERTY, 0)).unwrap();
        assert_eq!(stored.value, RawValue::Int32(1));
        runtime.shutdown().await;
    }

    // =============================================================================
    // EVENT BUS
    // =============================================================================

    /// Test that subscribers only see the events their filter selects
    #[tokio::test(start_paused = true)]
    async fn test_bus_subscribers_are_filtered() {
        let runtime = start(runtime_config(5, 0.0));
        let mut speed = runtime.bus().subscribe(EventFilter::property(SPEED.property_id));
        let mut set_errors = runtime
            .bus()
            .subscribe(EventFilter::topics(vec![EventTopic::SetError]));

        runtime.device().inject_change(SPEED, RawValue::Float(51.0));
        runtime.device().inject_set_error(LOCK, DeviceStatus::AccessDenied);

        let Some(PropertyEvent::Changed(value)) = speed.recv().await else {
            panic!("expected a change event");
        };
        assert_eq!(value.value, RawValue::Float(51.0));

        assert_eq!(
            set_errors.recv().await,
            Some(PropertyEvent::SetError(PropertySetError {
                property_id: LOCK.property_id,
                area_id: LOCK.area_id,
                status: DeviceStatus::AccessDenied,
            }))
        );
        assert!(speed.try_recv().unwrap().is_none());
        runtime.shutdown().await;
    }

    /// Test that aliased property ids are translated in both directions
    #[tokio::test(start_paused = true)]
    async fn test_aliased_property_round_trip() {
        const CLIENT_ID: i32 = 0x0100;
        const DEVICE_ID: i32 = 0x7100;

        let config = RuntimeConfig {
            broker: BrokerConfig {
                property_id_aliases: vec![(CLIENT_ID, DEVICE_ID)],
                ..BrokerConfig::default()
            },
            ..runtime_config(5, 0.0)
        };
        let runtime = start(config);
        runtime
            .device()
            .seed([PropertyValue::new(DEVICE_ID, 0, RawValue::Int32(1), SEED_TIMESTAMP)]);
        let mut events = runtime.bus().subscribe(EventFilter::property(CLIENT_ID));
        let mut client = runtime.connect();

        runtime
            .broker()
            .set_property_values_async(
                client.channel(),
                vec![SetPropertyRequest::new(1, CLIENT_ID, 0, RawValue::Int32(2))],
                Duration::from_secs(1),
            )
            .unwrap();
        let Some(ClientResult::Set(result)) = client.next_result().await else {
            panic!("expected a set result");
        };
        assert!(result.result.is_ok());

        let Some(PropertyEvent::Changed(value)) = events.recv().await else {
            panic!("expected a change event");
        };
        assert_eq!(value.property_id, CLIENT_ID);
        assert_eq!(
            runtime.device().value(PropertyKey::new(DEVICE_ID, 0)).unwrap().value,
            RawValue::Int32(2)
        );
        runtime.shutdown().await;
    }
}
