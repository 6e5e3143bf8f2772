//! # Property Events
//!
//! Defines the event types that flow through the bus and the filters
//! subscribers use to select them.

use serde::{Deserialize, Serialize};
use shared_types::{AreaId, PropertyId, PropertyKey, PropertySetError, PropertyValue};

/// All events that can be published to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyEvent {
    /// A property changed value (already translated to client property ids).
    Changed(PropertyValue),

    /// The device reported a set failure for a property/area.
    SetError(PropertySetError),
}

impl PropertyEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::Changed(_) => EventTopic::Change,
            Self::SetError(_) => EventTopic::SetError,
        }
    }

    /// The property/area the event is about.
    #[must_use]
    pub fn key(&self) -> PropertyKey {
        match self {
            Self::Changed(value) => value.key(),
            Self::SetError(error) => PropertyKey::new(error.property_id, error.area_id),
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Value changes.
    Change,
    /// Set errors.
    SetError,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Properties to include, with an optional area. Empty means all.
    pub properties: Vec<(PropertyId, Option<AreaId>)>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            properties: Vec::new(),
        }
    }

    /// Create a filter for every area of one property.
    #[must_use]
    pub fn property(property_id: PropertyId) -> Self {
        Self {
            topics: Vec::new(),
            properties: vec![(property_id, None)],
        }
    }

    /// Create a filter for one property/area.
    #[must_use]
    pub fn property_area(property_id: PropertyId, area_id: AreaId) -> Self {
        Self {
            topics: Vec::new(),
            properties: vec![(property_id, Some(area_id))],
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &PropertyEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let key = event.key();
        let property_match = self.properties.is_empty()
            || self.properties.iter().any(|(property_id, area_id)| {
                *property_id == key.property_id && area_id.map_or(true, |a| a == key.area_id)
            });

        topic_match && property_match
    }
}
