//! # Broker Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | Get round trip | submit a batch, deliver every result |
//! | Set correlation | ack + change event against N live writes |
//! | Change fan-in | change events that match no write |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use shared_types::{DeviceGetResult, DeviceSetResult, DeviceStatus, PropertyValue, RawValue};
use vp_request_broker::testing::{RecordingCallback, RecordingDevice};
use vp_request_broker::{
    BrokerConfig, ClientChannel, DeviceEventSink, GetPropertyRequest, PropertyBroker,
    PropertyBrokerApi, SetPropertyRequest,
};

const TIMEOUT: Duration = Duration::from_secs(60);

fn setup() -> (PropertyBroker, Arc<RecordingDevice>, ClientChannel) {
    let device = Arc::new(RecordingDevice::new());
    let broker = PropertyBroker::new(BrokerConfig::default(), device.clone())
        .expect("default config is valid");
    let channel = ClientChannel::new(Arc::new(RecordingCallback::new()));
    (broker, device, channel)
}

// ============================================================================
// GET ROUND TRIP
// ============================================================================

fn bench_get_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("get-round-trip");

    for size in [1, 10, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("batch", size), &size, |b, &size| {
            b.iter(|| {
                let (broker, device, channel) = setup();
                let requests = (0..size)
                    .map(|id| GetPropertyRequest::new(id, 0x0207, 0))
                    .collect();
                broker
                    .get_property_values_async(&channel, requests, TIMEOUT)
                    .expect("batch accepted");

                let results = device
                    .get_requests()
                    .into_iter()
                    .map(|r| {
                        DeviceGetResult::ok(
                            r.request_id,
                            PropertyValue::new(0x0207, 0, RawValue::Float(1.0), 1),
                        )
                    })
                    .collect();
                broker.on_get_results(results);
                black_box(broker.pending_count())
            })
        });
    }
    group.finish();
}

// ============================================================================
// SET CORRELATION
// ============================================================================

fn bench_set_correlation(c: &mut Criterion) {
    let mut group = c.benchmark_group("set-correlation");

    for live in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("live_writes", live), &live, |b, &live| {
            b.iter(|| {
                let (broker, device, channel) = setup();
                let requests = (0..live)
                    .map(|id| SetPropertyRequest::new(id, 0x0500, id, RawValue::Int32(id)))
                    .collect();
                broker
                    .set_property_values_async(&channel, requests, TIMEOUT)
                    .expect("batch accepted");

                let acks = device
                    .set_requests()
                    .into_iter()
                    .map(|r| DeviceSetResult::new(r.request_id, DeviceStatus::Ok))
                    .collect();
                broker.on_set_results(acks);

                let changes = (0..live)
                    .map(|area| PropertyValue::new(0x0500, area, RawValue::Int32(area), 2))
                    .collect();
                broker.on_property_changes(changes);
                black_box(broker.stats().completed)
            })
        });
    }
    group.finish();
}

// ============================================================================
// UNRELATED CHANGE EVENTS
// ============================================================================

fn bench_unmatched_changes(c: &mut Criterion) {
    let mut group = c.benchmark_group("unmatched-changes");
    let mut rng = rand::thread_rng();

    let (broker, _device, channel) = setup();
    let requests = (0..500)
        .map(|id| SetPropertyRequest::new(id, 0x0500, id, RawValue::Int32(-1)))
        .collect();
    broker
        .set_property_values_async(&channel, requests, TIMEOUT)
        .expect("batch accepted");

    let changes: Vec<PropertyValue> = (0..100)
        .map(|_| {
            PropertyValue::new(0x0207, 0, RawValue::Float(rng.gen_range(0.0..130.0)), 1)
        })
        .collect();

    group.throughput(Throughput::Elements(changes.len() as u64));
    group.bench_function("speed_updates_with_500_live_writes", |b| {
        b.iter(|| broker.on_property_changes(black_box(changes.clone())))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_get_round_trip,
    bench_set_correlation,
    bench_unmatched_changes
);
criterion_main!(benches);
