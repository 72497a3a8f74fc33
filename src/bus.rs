//! In-process event bus
//!
//! A single broadcast channel fans events out to every live subscriber.
//! Publishing never blocks and never fails: with no subscribers the event
//! is simply dropped, and a slow subscriber loses the oldest events from
//! its own queue rather than stalling the publisher.

use tokio::sync::broadcast;
use tracing::debug;

use crate::model::{AlertCreated, IncidentCreated, TxConfirmed};

/// Events a subscriber can lag behind before losing the oldest
pub const BUS_CAPACITY: usize = 1000;

/// Everything published on the bus, tagged by topic
#[derive(Debug, Clone)]
pub enum BusEvent {
    AlertCreated(AlertCreated),
    IncidentCreated(IncidentCreated),
    TxConfirmed(TxConfirmed),
}

impl BusEvent {
    /// Stable topic name, used in logs and by filtering subscribers
    pub fn topic(&self) -> &'static str {
        match self {
            BusEvent::AlertCreated(_) => "alert.created",
            BusEvent::IncidentCreated(_) => "incident.created",
            BusEvent::TxConfirmed(_) => "ledger.tx.confirmed",
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers. Returns how many
    /// subscribers received it.
    pub fn publish(&self, event: BusEvent) -> usize {
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(n) => {
                debug!("Published {} to {} subscribers", topic, n);
                n
            }
            Err(_) => {
                debug!("Published {} with no subscribers", topic);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_incident_event() -> BusEvent {
        BusEvent::IncidentCreated(IncidentCreated {
            incident_id: "inc-1".into(),
            alert_ids: vec!["a-1".into(), "a-2".into(), "a-3".into()],
            priority: 3,
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let delivered = bus.publish(sample_incident_event());
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic(), "incident.created");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(sample_incident_event()), 0);
    }

    #[tokio::test]
    async fn test_each_subscriber_gets_its_own_copy() {
        let bus = EventBus::new(8);
        let mut rx_a = bus.subscribe();
        let mut rx_b = bus.subscribe();

        assert_eq!(bus.publish(sample_incident_event()), 2);

        assert_eq!(rx_a.recv().await.unwrap().topic(), "incident.created");
        assert_eq!(rx_b.recv().await.unwrap().topic(), "incident.created");
    }

    #[tokio::test]
    async fn test_lagged_subscriber_loses_oldest_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for _ in 0..4 {
            bus.publish(sample_incident_event());
        }

        match rx.recv().await {
            Err(broadcast::error::RecvError::Lagged(missed)) => assert_eq!(missed, 2),
            other => panic!("expected lag error, got {:?}", other),
        }
        // After the lag report the newest events are still readable.
        assert!(rx.recv().await.is_ok());
    }
}
