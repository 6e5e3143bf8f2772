//! Timer-driven work: transient-busy retries and the deadline sweeper.

use super::effects::Effects;
use super::BrokerInner;
use crate::domain::RequestPhase;
use shared_types::{AsyncErrorCode, InternalRequestId};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

impl BrokerInner {
    /// Re-issue `ids` after the configured backoff.
    ///
    /// The entries stay in the table (phase `RetryScheduled`) while waiting,
    /// so cancellation, device timeouts and the sweeper all still see them.
    pub(crate) fn schedule_retry(self: &Arc<Self>, ids: Vec<InternalRequestId>) {
        let backoff = self.config.retry_backoff;
        let weak = Arc::downgrade(self);

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(backoff).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.retry(ids);
                    }
                });
            }
            Err(_) => {
                warn!(count = ids.len(), "No async runtime for retry backoff, re-issuing now");
                self.retry(ids);
            }
        }
    }

    /// Move `RetryScheduled` entries back to `Issued`, or time them out if
    /// their deadline passed while waiting.
    pub(crate) fn retry(self: &Arc<Self>, ids: Vec<InternalRequestId>) {
        let mut effects = Effects::default();
        {
            let mut table = self.table.lock();
            let now = Instant::now();

            for id in ids {
                let Some(request) = table.get_mut(id) else {
                    trace!(internal_id = %id, "Retry target already resolved");
                    continue;
                };
                if request.phase != RequestPhase::RetryScheduled {
                    continue;
                }

                match request.reissue(now) {
                    Some(remaining) => {
                        debug!(
                            internal_id = %id,
                            kind = request.kind.label(),
                            remaining_ms = remaining.as_millis() as u64,
                            "Re-issuing request after busy"
                        );
                        effects.issue(request);
                    }
                    None => {
                        if let Some(request) = table.remove(id) {
                            debug!(internal_id = %id, "Deadline passed during retry backoff");
                            effects.resolve_error(&request, AsyncErrorCode::Timeout);
                        }
                    }
                }
            }
            effects.pending_after = Some(table.len());
        }
        self.apply(effects);
    }

    /// Time out every entry whose deadline has passed.
    ///
    /// Returns the number of entries removed.
    pub(crate) fn sweep_expired(self: &Arc<Self>) -> usize {
        let mut effects = Effects::default();
        let removed;
        {
            let mut table = self.table.lock();
            let expired = table.expired(Instant::now());
            removed = expired.len();

            for id in expired {
                let Some(request) = table.remove(id) else {
                    continue;
                };
                warn!(
                    internal_id = %id,
                    client_request_id = request.client_request_id,
                    kind = request.kind.label(),
                    property = %request.key(),
                    "Removing expired pending request"
                );
                // Entries waiting out a backoff are not at the device
                if request.phase == RequestPhase::Issued {
                    effects.cancels.push(id);
                }
                effects.resolve_error(&request, AsyncErrorCode::Timeout);
            }
            effects.pending_after = Some(table.len());
        }

        if removed > 0 {
            self.apply(effects);
        }
        removed
    }
}

/// Background task that sweeps deadlines until the broker is dropped.
pub(crate) async fn deadline_sweeper(inner: Weak<BrokerInner>, interval: Duration) {
    let mut sweep_interval = tokio::time::interval(interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        sweep_interval.tick().await;
        let Some(broker) = inner.upgrade() else {
            debug!("Broker dropped, stopping deadline sweeper");
            break;
        };
        let removed = broker.sweep_expired();
        if removed > 0 {
            debug!(removed = removed, "Swept expired pending requests");
        }
    }
}
