//! Set completion correlation.
//!
//! A write is complete only when two independent signals have both arrived:
//!
//! ```text
//!   set result Ok ───────────► set_acknowledged = true ─────┐
//!                                                          ├──► complete
//!   change event / initial ──► value_observed_at_target ───┘
//!   read equal to target       (timestamp recorded)
//! ```
//!
//! Either signal may come first. Completion is checked on every update, and
//! the caller removes the entry as soon as it reports complete, so a repeated
//! signal can never complete the same write twice.

use super::request::{PendingRequest, RequestKind};
use shared_types::{RawValue, TimestampNanos};

/// What an update did to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetProgress {
    /// Still waiting for the other signal.
    Waiting,
    /// Both signals are in; carries the observed timestamp.
    Complete(TimestampNanos),
    /// The update did not apply (not a write, or value not at target).
    Ignored,
}

impl PendingRequest {
    /// Record the device's acknowledgement of a write.
    pub fn acknowledge_set(&mut self) -> SetProgress {
        if !matches!(self.kind, RequestKind::Set { .. }) {
            return SetProgress::Ignored;
        }
        self.set_acknowledged = true;
        self.set_progress()
    }

    /// Record an observed value for a write.
    ///
    /// A value different from the target leaves the entry untouched; an
    /// earlier observation at the target is not undone. A matching value
    /// overwrites the recorded timestamp, so the latest observation wins.
    pub fn observe_value(&mut self, value: &RawValue, timestamp: TimestampNanos) -> SetProgress {
        let RequestKind::Set { target } = &self.kind else {
            return SetProgress::Ignored;
        };
        if target != value {
            return SetProgress::Ignored;
        }
        self.value_observed_at_target = true;
        self.observed_timestamp = Some(timestamp);
        self.set_progress()
    }

    fn set_progress(&self) -> SetProgress {
        match (self.set_acknowledged, self.observed_timestamp) {
            (true, Some(timestamp)) if self.value_observed_at_target => {
                SetProgress::Complete(timestamp)
            }
            _ => SetProgress::Waiting,
        }
    }
}
