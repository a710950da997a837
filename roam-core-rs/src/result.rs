//! Synchronous outcomes of push operations
//!
//! Every add/update/remove/status call answers immediately, even though the
//! actual transmission happens in a later flush. The outcome says whether
//! the change was accepted, dropped or refused; it never reflects whether a
//! queued change eventually reached the partner.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ids::EventTrackingId;

/// Outcome category of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PushOutcome {
    /// Filtered out or nothing to do
    NoOperation,
    /// Accepted into a queue, flushed later
    Enqueued,
    /// Pushing this category is disabled
    AdminDown,
    Success,
    PartialSuccess,
    Error,
}

impl PushOutcome {
    /// True for outcomes that accepted the change
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            PushOutcome::Enqueued | PushOutcome::Success | PushOutcome::PartialSuccess
        )
    }
}

impl std::fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Human readable warning attached to an outcome or a flush
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Warning(pub String);

impl Warning {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one push call
#[derive(Debug, Clone, PartialEq)]
pub struct PushResult<T> {
    pub sender_id: String,
    pub event_tracking_id: EventTrackingId,
    pub outcome: PushOutcome,
    pub rejected_items: Vec<T>,
    pub description: Option<String>,
    pub warnings: Vec<Warning>,
    pub runtime: Option<Duration>,
}

impl<T> PushResult<T> {
    fn with_outcome(
        sender_id: impl Into<String>,
        event_tracking_id: EventTrackingId,
        outcome: PushOutcome,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            event_tracking_id,
            outcome,
            rejected_items: Vec::new(),
            description: None,
            warnings: Vec::new(),
            runtime: None,
        }
    }

    pub fn no_operation(sender_id: impl Into<String>, event_tracking_id: EventTrackingId) -> Self {
        Self::with_outcome(sender_id, event_tracking_id, PushOutcome::NoOperation)
    }

    pub fn enqueued(sender_id: impl Into<String>, event_tracking_id: EventTrackingId) -> Self {
        Self::with_outcome(sender_id, event_tracking_id, PushOutcome::Enqueued)
    }

    pub fn admin_down(sender_id: impl Into<String>, event_tracking_id: EventTrackingId) -> Self {
        Self::with_outcome(sender_id, event_tracking_id, PushOutcome::AdminDown)
    }

    pub fn success(sender_id: impl Into<String>, event_tracking_id: EventTrackingId) -> Self {
        Self::with_outcome(sender_id, event_tracking_id, PushOutcome::Success)
    }

    pub fn error(
        sender_id: impl Into<String>,
        event_tracking_id: EventTrackingId,
        description: impl Into<String>,
    ) -> Self {
        Self::with_outcome(sender_id, event_tracking_id, PushOutcome::Error)
            .with_description(description)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_warning(mut self, warning: Warning) -> Self {
        self.warnings.push(warning);
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = Warning>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_rejected(mut self, rejected: impl IntoIterator<Item = T>) -> Self {
        self.rejected_items.extend(rejected);
        self
    }

    pub fn with_runtime(mut self, runtime: Duration) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Replace the outcome, keeping everything else
    pub fn map_outcome(mut self, outcome: PushOutcome) -> Self {
        self.outcome = outcome;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let id = EventTrackingId::generate();
        let result: PushResult<u32> = PushResult::enqueued("hubject", id.clone())
            .with_rejected([7])
            .with_warning(Warning::new("filtered 1 item"));

        assert_eq!(result.outcome, PushOutcome::Enqueued);
        assert_eq!(result.event_tracking_id, id);
        assert_eq!(result.rejected_items, vec![7]);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.outcome.is_accepted());
    }

    #[test]
    fn test_error_carries_description() {
        let result: PushResult<()> =
            PushResult::error("hubject", EventTrackingId::generate(), "remote closed");

        assert_eq!(result.outcome, PushOutcome::Error);
        assert_eq!(result.description.as_deref(), Some("remote closed"));
        assert!(!PushOutcome::AdminDown.is_accepted());
    }
}
