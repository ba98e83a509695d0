//! Transactional outbox and the relay that drains it onto the event bus.
//!
//! Events are written in the same transaction as the state change that caused
//! them, so a rolled-back operation never announces anything. The relay polls
//! for undispatched messages, publishes them in sequence order and marks them
//! dispatched. A crash between the two steps republishes (at-least-once).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use stockroom_core::OutboxId;
use stockroom_events::{Event, EventBus, EventEnvelope};
use stockroom_inventory::LedgerEvent;

use crate::store::{LedgerStore, StoreError};

/// An event waiting to be committed with its transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: OutboxId,
    pub event_type: String,
    pub event_version: u32,
    pub subject_id: Uuid,
    pub recipient: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl OutboxMessage {
    pub fn from_event(event: &LedgerEvent) -> Result<Self, StoreError> {
        let payload = serde_json::to_value(event).map_err(|e| {
            StoreError::Corrupt(format!(
                "failed to serialize {} payload: {e}",
                event.event_type()
            ))
        })?;

        Ok(Self {
            id: OutboxId::new(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            subject_id: event.subject_id(),
            recipient: event.recipient(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// A committed outbox message with its store-assigned position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOutboxMessage {
    pub sequence: u64,
    pub message: OutboxMessage,
}

impl StoredOutboxMessage {
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        let m = &self.message;
        EventEnvelope::new(
            *m.id.as_uuid(),
            m.event_type.clone(),
            m.subject_id,
            m.recipient.clone(),
            self.sequence,
            m.occurred_at,
            m.payload.clone(),
        )
    }
}

pub struct OutboxRelay<S, B> {
    store: S,
    bus: B,
    batch_size: usize,
}

impl<S, B> OutboxRelay<S, B>
where
    S: LedgerStore + 'static,
    B: EventBus<EventEnvelope<JsonValue>> + 'static,
{
    pub fn new(store: S, bus: B, batch_size: usize) -> Self {
        Self {
            store,
            bus,
            batch_size: batch_size.max(1),
        }
    }

    /// Publish one batch. Returns how many messages were dispatched.
    ///
    /// Stops at the first publish failure so ordering is preserved; the rest
    /// of the batch is retried on the next call.
    #[instrument(skip(self), fields(batch_size = self.batch_size), err)]
    pub async fn drain_once(&self) -> Result<usize, StoreError> {
        let pending = self.store.pending_outbox(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut dispatched = Vec::with_capacity(pending.len());
        for stored in &pending {
            match self.bus.publish(stored.to_envelope()) {
                Ok(()) => dispatched.push(stored.sequence),
                Err(err) => {
                    warn!(
                        sequence = stored.sequence,
                        event_type = %stored.message.event_type,
                        error = ?err,
                        "publish failed; will retry"
                    );
                    break;
                }
            }
        }

        if !dispatched.is_empty() {
            self.store.mark_dispatched(&dispatched, Utc::now()).await?;
            debug!(count = dispatched.len(), "outbox messages dispatched");
        }
        Ok(dispatched.len())
    }

    /// Poll every `interval` until the returned handle is shut down.
    pub fn spawn(self, interval: Duration) -> RelayHandle
    where
        S: Send + Sync,
        B: Send + Sync,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            info!(interval_ms = interval.as_millis() as u64, "outbox relay started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        // Keep draining while full batches come back.
                        loop {
                            match self.drain_once().await {
                                Ok(n) if n == self.batch_size => continue,
                                Ok(_) => break,
                                Err(err) => {
                                    warn!(error = %err, "outbox drain failed");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            info!("outbox relay stopped");
        });

        RelayHandle {
            shutdown: shutdown_tx,
            join,
        }
    }
}

/// Handle to a running relay task.
pub struct RelayHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for the in-flight batch to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.join.await {
            warn!(error = %err, "outbox relay task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use stockroom_core::PartId;
    use stockroom_events::{InMemoryEventBus, Subscription};
    use stockroom_inventory::{NewPart, Part};

    use crate::store::InMemoryLedgerStore;

    fn low_stock_event() -> LedgerEvent {
        let part = Part::register(
            PartId::new(),
            NewPart {
                code: "FLT-20".into(),
                name: "Air filter".into(),
                quantity: 1,
                reorder_level: 2,
                unit_cost: 900,
            },
            Utc::now(),
        )
        .unwrap();
        LedgerEvent::stock_below_reorder_level(&part, Utc::now())
    }

    async fn enqueue(store: &InMemoryLedgerStore, event: &LedgerEvent) {
        let mut tx = store.begin().await.unwrap();
        tx.enqueue(&OutboxMessage::from_event(event).unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[test]
    fn message_carries_event_metadata() {
        let event = low_stock_event();
        let message = OutboxMessage::from_event(&event).unwrap();

        assert_eq!(message.event_type, "part.below_reorder_level");
        assert_eq!(message.event_version, 1);
        assert_eq!(message.subject_id, event.subject_id());
        assert_eq!(message.payload["code"], "FLT-20");
        assert!(message.recipient.is_none());
    }

    #[tokio::test]
    async fn drain_publishes_in_order_and_marks_dispatched() {
        let store = InMemoryLedgerStore::new();
        let bus = Arc::new(InMemoryEventBus::new());
        let subscription: Subscription<EventEnvelope<JsonValue>> = bus.subscribe();

        enqueue(&store, &low_stock_event()).await;
        enqueue(&store, &low_stock_event()).await;

        let relay = OutboxRelay::new(store.clone(), bus.clone(), 10);
        assert_eq!(relay.drain_once().await.unwrap(), 2);
        assert_eq!(relay.drain_once().await.unwrap(), 0);
        assert!(store.outbox().await.is_empty());

        let received = subscription.drain();
        assert_eq!(received.len(), 2);
        assert!(received[0].sequence() < received[1].sequence());
    }

    struct FlakyBus {
        inner: InMemoryEventBus<EventEnvelope<JsonValue>>,
        fail: AtomicBool,
    }

    impl EventBus<EventEnvelope<JsonValue>> for FlakyBus {
        type Error = &'static str;

        fn publish(&self, message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            if self.fail.swap(false, Ordering::SeqCst) {
                return Err("transport down");
            }
            self.inner.publish(message).map_err(|_| "poisoned")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
            self.inner.subscribe()
        }
    }

    #[tokio::test]
    async fn failed_publish_is_retried_on_next_drain() {
        let store = InMemoryLedgerStore::new();
        let bus = Arc::new(FlakyBus {
            inner: InMemoryEventBus::new(),
            fail: AtomicBool::new(true),
        });
        let subscription = bus.subscribe();
        enqueue(&store, &low_stock_event()).await;

        let relay = OutboxRelay::new(store.clone(), bus.clone(), 10);
        assert_eq!(relay.drain_once().await.unwrap(), 0);
        assert_eq!(relay.drain_once().await.unwrap(), 1);
        assert_eq!(subscription.drain().len(), 1);
    }

    #[tokio::test]
    async fn spawned_relay_stops_on_shutdown() {
        let store = InMemoryLedgerStore::new();
        let bus = Arc::new(InMemoryEventBus::new());
        let subscription: Subscription<EventEnvelope<JsonValue>> = bus.subscribe();
        enqueue(&store, &low_stock_event()).await;

        let handle =
            OutboxRelay::new(store.clone(), bus.clone(), 10).spawn(Duration::from_millis(5));
        let envelope = tokio::task::spawn_blocking(move || {
            subscription.recv_timeout(Duration::from_secs(2))
        })
        .await
        .unwrap()
        .unwrap();
        handle.shutdown().await;

        assert_eq!(envelope.event_type(), "part.below_reorder_level");
    }
}
