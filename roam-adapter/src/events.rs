//! Observable adapter events
//!
//! Flush health is only visible through these events. They are multicast on
//! a broadcast channel: any number of subscribers, and a slow subscriber
//! lags on its own without holding back the others or the adapter.

use chrono::{DateTime, Utc};
use roam_core::Warning;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::scheduler::FlushCycle;

/// Events emitted by an adapter
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// A flush cycle acquired its lock and is about to drain its queues
    FlushStarted {
        sender: String,
        cycle: FlushCycle,
        started: DateTime<Utc>,
        period: Duration,
        run_id: u64,
    },

    /// A flush cycle finished, successfully or not
    FlushFinished {
        sender: String,
        cycle: FlushCycle,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
        duration: Duration,
        period: Duration,
        run_id: u64,
        items: usize,
    },

    /// An executor failed or panicked; `message` is the innermost cause
    Exception {
        timestamp: DateTime<Utc>,
        sender: String,
        cycle: FlushCycle,
        run_id: u64,
        message: String,
    },

    /// Non-fatal problems reported by a component
    Warnings {
        timestamp: DateTime<Utc>,
        component: String,
        method: String,
        warnings: Vec<Warning>,
    },
}

impl AdapterEvent {
    /// Cycle the event belongs to, if any
    pub fn cycle(&self) -> Option<FlushCycle> {
        match self {
            AdapterEvent::FlushStarted { cycle, .. }
            | AdapterEvent::FlushFinished { cycle, .. }
            | AdapterEvent::Exception { cycle, .. } => Some(*cycle),
            AdapterEvent::Warnings { .. } => None,
        }
    }
}

/// Sending side of the event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AdapterEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no subscriber is not an error
    pub fn emit(&self, event: AdapterEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warnings_event() -> AdapterEvent {
        AdapterEvent::Warnings {
            timestamp: Utc::now(),
            component: "hubject".into(),
            method: "send_charge_detail_records".into(),
            warnings: vec![Warning::new("1 record filtered")],
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(4);
        bus.emit(warnings_event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = EventBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(warnings_event());

        assert!(matches!(first.recv().await, Ok(AdapterEvent::Warnings { .. })));
        assert!(matches!(second.recv().await, Ok(AdapterEvent::Warnings { .. })));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block_others() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        for _ in 0..3 {
            bus.emit(warnings_event());
            assert!(fast.recv().await.is_ok());
        }

        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert!(slow.recv().await.is_ok());
    }
}
