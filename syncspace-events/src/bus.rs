//! EventBus - subscriber registry and non-blocking delivery

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::{Event, EventFilter, EventType};

/// Fixed capacity of each subscriber's incoming stream.
pub const BUFFER_SIZE: usize = 100;

/// Errors from subscription management.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("subscriber not found: {0}")]
    NotFound(String),
}

struct Subscriber {
    filter: EventFilter,
    tx: mpsc::Sender<Event>,
    dropped: AtomicU64,
}

/// In-process filtered publish/subscribe.
///
/// Internally synchronized; producers and subscribers may call from any
/// thread. The registry lock is never held across a blocking wait: sends
/// use `try_send` and full buffers drop the event for that subscriber.
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Subscriber>>,
    closed: CancellationToken,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            closed: CancellationToken::new(),
        }
    }

    /// Register a subscriber with the given filter.
    ///
    /// Returns the subscriber id and the bounded event stream. A background
    /// task removes the subscription when `cancel` fires; it terminates when
    /// either the token fires or the bus closes.
    pub fn subscribe(
        self: &Arc<Self>,
        filter: EventFilter,
        cancel: CancellationToken,
    ) -> (String, mpsc::Receiver<Event>) {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(BUFFER_SIZE);

        self.subscribers
            .write()
            .expect("event bus lock poisoned")
            .insert(
                id.clone(),
                Subscriber { filter, tx, dropped: AtomicU64::new(0) },
            );

        let bus = self.clone();
        let sub_id = id.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = bus.unsubscribe(&sub_id);
                }
                _ = closed.cancelled() => {}
            }
        });

        tracing::debug!(subscriber_id = %id, "subscriber registered");
        (id, rx)
    }

    /// Remove a subscriber and close its stream.
    pub fn unsubscribe(&self, subscriber_id: &str) -> Result<(), EventBusError> {
        let removed = self
            .subscribers
            .write()
            .expect("event bus lock poisoned")
            .remove(subscriber_id);

        match removed {
            // Dropping the Sender closes the stream.
            Some(sub) => {
                let dropped = sub.dropped.load(Ordering::Relaxed);
                tracing::debug!(subscriber_id, dropped, "subscriber removed");
                Ok(())
            }
            None => Err(EventBusError::NotFound(subscriber_id.to_string())),
        }
    }

    /// Construct an event and deliver it to every matching subscriber.
    ///
    /// Non-blocking per subscriber: a full buffer drops the event for that
    /// subscriber only. Emission never fails the producer.
    pub fn emit(
        &self,
        event_type: EventType,
        space_id: &str,
        payload: HashMap<String, String>,
    ) {
        let event = Event {
            id: Uuid::new_v4().to_string(),
            event_type,
            space_id: space_id.to_string(),
            timestamp: unix_seconds(),
            payload,
        };

        let subscribers = self.subscribers.read().expect("event bus lock poisoned");
        for (id, sub) in subscribers.iter() {
            if !sub.filter.matches(&event) {
                continue;
            }
            if sub.tx.try_send(event.clone()).is_err() {
                let total = sub.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(
                    subscriber_id = %id,
                    event_type = %event.event_type,
                    dropped_total = total,
                    "subscriber buffer full, event dropped"
                );
            }
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("event bus lock poisoned").len()
    }

    /// Close all subscriber streams and clear the registry.
    pub fn close(&self) {
        self.closed.cancel();
        self.subscribers
            .write()
            .expect("event bus lock poisoned")
            .clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_types(types: &[EventType]) -> EventFilter {
        let mut f = EventFilter::any();
        f.types.extend(types.iter().copied());
        f
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let bus = Arc::new(EventBus::new());
        let (_id, mut rx) = bus.subscribe(EventFilter::any(), CancellationToken::new());

        let mut payload = HashMap::new();
        payload.insert("document_id".to_string(), "doc1".to_string());
        bus.emit(EventType::DocumentCreated, "space1", payload);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::DocumentCreated);
        assert_eq!(event.space_id, "space1");
        assert_eq!(event.payload["document_id"], "doc1");
        assert!(!event.id.is_empty());
    }

    #[tokio::test]
    async fn test_filter_excludes_non_matching() {
        let bus = Arc::new(EventBus::new());
        let (_id, mut rx) = bus.subscribe(
            filter_types(&[EventType::DocumentCreated]),
            CancellationToken::new(),
        );

        bus.emit(EventType::SpaceDeleted, "space1", HashMap::new());
        bus.emit(EventType::DocumentCreated, "space1", HashMap::new());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::DocumentCreated);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_stream() {
        let bus = Arc::new(EventBus::new());
        let (id, mut rx) = bus.subscribe(EventFilter::any(), CancellationToken::new());

        bus.unsubscribe(&id).unwrap();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_fails() {
        let bus = Arc::new(EventBus::new());
        assert!(matches!(
            bus.unsubscribe("nope"),
            Err(EventBusError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_buffer_overflow_drops_excess() {
        let bus = Arc::new(EventBus::new());
        let (_id, mut rx) = bus.subscribe(EventFilter::any(), CancellationToken::new());

        for _ in 0..(BUFFER_SIZE + 10) {
            bus.emit(EventType::DocumentUpdated, "space1", HashMap::new());
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, BUFFER_SIZE);
        // A slow subscriber is dropped from delivery, not from the registry.
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_per_subscriber_fifo_order() {
        let bus = Arc::new(EventBus::new());
        let (_id, mut rx) = bus.subscribe(EventFilter::any(), CancellationToken::new());

        for i in 0..10 {
            let mut payload = HashMap::new();
            payload.insert("seq".to_string(), i.to_string());
            bus.emit(EventType::DocumentUpdated, "space1", payload);
        }

        for i in 0..10 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.payload["seq"], i.to_string());
        }
    }

    #[tokio::test]
    async fn test_cancellation_auto_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        let token = CancellationToken::new();
        let (_id, mut rx) = bus.subscribe(EventFilter::any(), token.clone());
        assert_eq!(bus.subscriber_count(), 1);

        token.cancel();
        // The watcher task runs on the runtime; the closed stream is the
        // observable effect.
        assert!(rx.recv().await.is_none());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_close_clears_registry() {
        let bus = Arc::new(EventBus::new());
        let (_a, mut rx_a) = bus.subscribe(EventFilter::any(), CancellationToken::new());
        let (_b, _rx_b) = bus.subscribe(EventFilter::any(), CancellationToken::new());
        assert_eq!(bus.subscriber_count(), 2);

        bus.close();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(rx_a.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_two_subscribers_both_receive() {
        let bus = Arc::new(EventBus::new());
        let (_a, mut rx_a) = bus.subscribe(EventFilter::any(), CancellationToken::new());
        let (_b, mut rx_b) = bus.subscribe(EventFilter::any(), CancellationToken::new());

        bus.emit(EventType::SpaceCreated, "space1", HashMap::new());

        assert_eq!(rx_a.recv().await.unwrap().event_type, EventType::SpaceCreated);
        assert_eq!(rx_b.recv().await.unwrap().event_type, EventType::SpaceCreated);
    }
}
