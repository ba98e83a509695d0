//! Infrastructure wiring: ledger store, event bus, outbox relay and the
//! notification consumer.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;

use stockroom_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockroom_infra::{
    InMemoryLedgerStore, InventoryLedger, LedgerConfig, LedgerSettings, LedgerStore, OutboxRelay,
    PostgresLedgerStore, RelayHandle,
};

pub type SharedStore = Arc<dyn LedgerStore>;
pub type LedgerBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

pub struct AppServices {
    ledger: InventoryLedger<SharedStore>,
    bus: Arc<LedgerBus>,
    outbox_batch_size: usize,
}

impl AppServices {
    pub fn new(store: SharedStore, settings: LedgerSettings, outbox_batch_size: usize) -> Self {
        let bus: Arc<LedgerBus> = Arc::new(InMemoryEventBus::new());
        spawn_notification_log(&bus);
        Self {
            ledger: InventoryLedger::new(store, settings),
            bus,
            outbox_batch_size,
        }
    }

    pub fn ledger(&self) -> &InventoryLedger<SharedStore> {
        &self.ledger
    }

    pub fn bus(&self) -> &Arc<LedgerBus> {
        &self.bus
    }

    /// Start relaying committed outbox rows to the bus.
    pub fn spawn_relay(&self, interval: std::time::Duration) -> RelayHandle {
        OutboxRelay::new(
            self.ledger.store().clone(),
            self.bus.clone(),
            self.outbox_batch_size,
        )
        .spawn(interval)
    }
}

/// Postgres when `DATABASE_URL` is set, otherwise an in-memory store.
pub async fn build_services(config: &LedgerConfig) -> anyhow::Result<AppServices> {
    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let store = PostgresLedgerStore::connect(
                url,
                config.db_max_connections,
                config.lock_timeout,
            )
            .await
            .context("failed to connect to postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to apply ledger schema")?;
            tracing::info!("using postgres ledger store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory ledger store");
            Arc::new(InMemoryLedgerStore::with_lock_timeout(config.lock_timeout))
        }
    };

    Ok(AppServices::new(
        store,
        config.ledger_settings(),
        config.outbox_batch_size,
    ))
}

/// In-memory wiring for dev and tests.
pub fn in_memory_services(settings: LedgerSettings) -> AppServices {
    AppServices::new(
        Arc::new(InMemoryLedgerStore::new()),
        settings,
        LedgerConfig::default().outbox_batch_size,
    )
}

/// Background subscriber: bus -> notification log.
///
/// Mail delivery lives elsewhere; this records who would be notified.
fn spawn_notification_log(bus: &LedgerBus) {
    let sub = bus.subscribe();
    let spawned = std::thread::Builder::new()
        .name("ledger-notifications".to_string())
        .spawn(move || {
            while let Ok(env) = sub.recv() {
                tracing::info!(
                    event_id = %env.event_id(),
                    event_type = env.event_type(),
                    subject_id = %env.subject_id(),
                    recipient = env.recipient().unwrap_or("-"),
                    sequence = env.sequence(),
                    "ledger notification"
                );
            }
            tracing::debug!("notification bus closed");
        });
    if let Err(err) = spawned {
        tracing::error!(error = %err, "failed to start notification consumer");
    }
}
