//! # Delivery Properties
//!
//! Property-based checks that a write reports at most one result, whatever
//! order the device delivers its acknowledgement, change events, initial
//! value read and timeouts in, and that the result matches a simple model
//! of the completion rules.

use shared_types::TimestampNanos;

/// One thing the device can do to a pending write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStep {
    /// Set result `Ok`.
    Ack,
    /// Set result `NotAvailable`.
    Reject,
    /// Set result `TryAgain`.
    Busy,
    /// Change event at the target value.
    ChangeAtTarget(TimestampNanos),
    /// Change event at some other value.
    ChangeElsewhere,
    /// Initial value read returning the target.
    ReadAtTarget(TimestampNanos),
    /// Initial value read returning some other value.
    ReadElsewhere,
    /// Device-reported timeout for the write.
    Timeout,
}

/// What the client should have received after a sequence of steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedOutcome {
    Pending,
    Completed(TimestampNanos),
    NotAvailable,
    TimedOut,
}

/// Reference model of one write and its paired initial read.
///
/// `Busy` is ignored here because the step runner only delivers the next
/// step once a retried write is back at the device.
pub fn expected_outcome(steps: &[DeviceStep]) -> ExpectedOutcome {
    let mut acknowledged = false;
    let mut observed: Option<TimestampNanos> = None;
    let mut read_answered = false;

    for step in steps {
        let outcome = match *step {
            DeviceStep::Ack => {
                acknowledged = true;
                observed.map(ExpectedOutcome::Completed)
            }
            DeviceStep::Reject => Some(ExpectedOutcome::NotAvailable),
            DeviceStep::Timeout => Some(ExpectedOutcome::TimedOut),
            DeviceStep::Busy | DeviceStep::ChangeElsewhere => None,
            DeviceStep::ChangeAtTarget(timestamp) => {
                observed = Some(timestamp);
                acknowledged.then_some(ExpectedOutcome::Completed(timestamp))
            }
            DeviceStep::ReadAtTarget(timestamp) if !read_answered => {
                read_answered = true;
                observed = Some(timestamp);
                acknowledged.then_some(ExpectedOutcome::Completed(timestamp))
            }
            DeviceStep::ReadAtTarget(_) | DeviceStep::ReadElsewhere => {
                read_answered = true;
                None
            }
        };
        if let Some(outcome) = outcome {
            return outcome;
        }
    }
    ExpectedOutcome::Pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    use shared_types::{
        AsyncErrorCode, DeviceGetResult, DeviceSetResult, DeviceStatus, PropertyValue, RawValue,
    };
    use vp_request_broker::testing::{RecordingCallback, RecordingDevice};
    use vp_request_broker::{
        BrokerConfig, ClientChannel, DeviceEventSink, GetPropertyRequest, PropertyBroker,
        PropertyBrokerApi, SetPropertyRequest,
    };

    const PROPERTY: i32 = 0x0500;
    const AREA: i32 = 1;
    const TARGET: i32 = 7;

    fn step_strategy() -> impl Strategy<Value = DeviceStep> {
        prop_oneof![
            3 => Just(DeviceStep::Ack),
            1 => Just(DeviceStep::Reject),
            2 => Just(DeviceStep::Busy),
            3 => (1i64..1_000).prop_map(DeviceStep::ChangeAtTarget),
            2 => Just(DeviceStep::ChangeElsewhere),
            2 => (1i64..1_000).prop_map(DeviceStep::ReadAtTarget),
            1 => Just(DeviceStep::ReadElsewhere),
            1 => Just(DeviceStep::Timeout),
        ]
    }

    fn value(v: i32, timestamp: TimestampNanos) -> PropertyValue {
        PropertyValue::new(PROPERTY, AREA, RawValue::Int32(v), timestamp)
    }

    /// Feed `steps` to a fresh broker holding one write, return the results
    /// the client received and the broker.
    fn run_steps(steps: &[DeviceStep]) -> (Arc<RecordingCallback>, PropertyBroker) {
        let device = Arc::new(RecordingDevice::new());
        let broker = PropertyBroker::new(BrokerConfig::default(), device.clone()).unwrap();
        let callback = Arc::new(RecordingCallback::new());
        let channel = ClientChannel::new(callback.clone());

        broker
            .set_property_values_async(
                &channel,
                vec![SetPropertyRequest::new(1, PROPERTY, AREA, RawValue::Int32(TARGET))],
                Duration::from_secs(60),
            )
            .unwrap();
        let set_id = device.set_requests()[0].request_id;
        let read_id = device.get_requests()[0].request_id;

        for step in steps {
            match *step {
                DeviceStep::Ack => {
                    broker.on_set_results(vec![DeviceSetResult::new(set_id, DeviceStatus::Ok)])
                }
                DeviceStep::Reject => broker.on_set_results(vec![DeviceSetResult::new(
                    set_id,
                    DeviceStatus::NotAvailable,
                )]),
                // Without a runtime the retry is re-issued immediately
                DeviceStep::Busy => broker
                    .on_set_results(vec![DeviceSetResult::new(set_id, DeviceStatus::TryAgain)]),
                DeviceStep::ChangeAtTarget(timestamp) => {
                    broker.on_property_changes(vec![value(TARGET, timestamp)])
                }
                DeviceStep::ChangeElsewhere => {
                    broker.on_property_changes(vec![value(TARGET + 1, 1)])
                }
                DeviceStep::ReadAtTarget(timestamp) => broker.on_get_results(vec![
                    DeviceGetResult::ok(read_id, value(TARGET, timestamp)),
                ]),
                DeviceStep::ReadElsewhere => broker.on_get_results(vec![DeviceGetResult::ok(
                    read_id,
                    value(TARGET - 1, 1),
                )]),
                DeviceStep::Timeout => broker.on_requests_timeout(vec![set_id]),
            }
        }
        (callback, broker)
    }

    proptest! {
        /// Property: a write never reports more than once, and what it
        /// reports agrees with the completion model.
        #[test]
        fn prop_set_reports_at_most_once(
            steps in prop::collection::vec(step_strategy(), 0..16)
        ) {
            let (callback, broker) = run_steps(&steps);
            let results = callback.set_results();

            prop_assert!(results.len() <= 1);
            prop_assert!(callback.get_results().is_empty());

            let actual = match results.first().map(|r| r.result) {
                None => ExpectedOutcome::Pending,
                Some(Ok(timestamp)) => ExpectedOutcome::Completed(timestamp),
                Some(Err(AsyncErrorCode::NotAvailable)) => ExpectedOutcome::NotAvailable,
                Some(Err(AsyncErrorCode::Timeout)) => ExpectedOutcome::TimedOut,
                Some(Err(AsyncErrorCode::InternalError)) => {
                    return Err(TestCaseError::fail("unexpected internal error"));
                }
            };
            prop_assert_eq!(actual, expected_outcome(&steps));

            // A resolved write leaves nothing client-visible behind
            if actual != ExpectedOutcome::Pending {
                prop_assert!(broker
                    .pending_snapshot()
                    .iter()
                    .all(|summary| summary.kind == "get_initial_value_for_set"));
            }
        }

        /// Property: every get in a batch is answered exactly once no matter
        /// how often each result is delivered.
        #[test]
        fn prop_get_results_delivered_once(
            deliveries in prop::collection::vec((0usize..8, any::<bool>()), 1..40)
        ) {
            let device = Arc::new(RecordingDevice::new());
            let broker = PropertyBroker::new(BrokerConfig::default(), device.clone()).unwrap();
            let callback = Arc::new(RecordingCallback::new());
            let channel = ClientChannel::new(callback.clone());

            let requests = (0..8)
                .map(|id| GetPropertyRequest::new(id, PROPERTY, AREA))
                .collect();
            broker
                .get_property_values_async(&channel, requests, Duration::from_secs(60))
                .unwrap();
            let ids: Vec<_> = device.get_requests().iter().map(|r| r.request_id).collect();

            let mut answered = std::collections::HashSet::new();
            for (index, ok) in &deliveries {
                let result = if *ok {
                    DeviceGetResult::ok(ids[*index], value(1, 1))
                } else {
                    DeviceGetResult::error(ids[*index], DeviceStatus::InternalError)
                };
                broker.on_get_results(vec![result]);
                answered.insert(*index);
            }

            let results = callback.get_results();
            prop_assert_eq!(results.len(), answered.len());
            prop_assert_eq!(broker.pending_count(), 8 - answered.len());
        }
    }

    #[test]
    fn test_model_examples() {
        use DeviceStep::*;

        assert_eq!(expected_outcome(&[Ack, ChangeAtTarget(5)]), ExpectedOutcome::Completed(5));
        assert_eq!(expected_outcome(&[ChangeAtTarget(5), Ack]), ExpectedOutcome::Completed(5));
        assert_eq!(expected_outcome(&[ReadAtTarget(3), Ack]), ExpectedOutcome::Completed(3));
        assert_eq!(
            expected_outcome(&[ReadElsewhere, ReadAtTarget(3), Ack]),
            ExpectedOutcome::Pending
        );
        assert_eq!(
            expected_outcome(&[ChangeAtTarget(1), ChangeAtTarget(9), Ack]),
            ExpectedOutcome::Completed(9)
        );
        assert_eq!(expected_outcome(&[Ack, Reject]), ExpectedOutcome::NotAvailable);
        assert_eq!(expected_outcome(&[Busy, ChangeElsewhere]), ExpectedOutcome::Pending);
    }
}
