//! # Event Bus Adapter
//!
//! Publishes the broker's accepted property events onto the shared bus so
//! any number of subscribers can filter them by topic and property.

use shared_bus::{EventPublisher, InMemoryEventBus, PropertyEvent};
use shared_types::{PropertySetError, PropertyValue};
use std::sync::Arc;
use tracing::trace;
use vp_request_broker::PropertyEventListener;

/// [`PropertyEventListener`] backed by an [`InMemoryEventBus`].
pub struct BusPropertyListener {
    bus: Arc<InMemoryEventBus>,
}

impl BusPropertyListener {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self { bus }
    }

    fn publish(&self, event: PropertyEvent) {
        let topic = event.topic();
        let key = event.key();
        let receivers = self.bus.publish(event);
        trace!(topic = ?topic, property = %key, receivers = receivers, "Published property event");
    }
}

impl PropertyEventListener for BusPropertyListener {
    fn on_property_changes(&self, values: &[PropertyValue]) {
        for value in values {
            self.publish(PropertyEvent::Changed(value.clone()));
        }
    }

    fn on_property_set_errors(&self, errors: &[PropertySetError]) {
        for error in errors {
            self.publish(PropertyEvent::SetError(*error));
        }
    }
}
