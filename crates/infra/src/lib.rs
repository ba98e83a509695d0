//! Infrastructure layer: storage, the ledger service, outbox relay, config.

pub mod config;
pub mod ledger;
pub mod outbox;
pub mod store;

pub use config::{ConfigError, LedgerConfig};
pub use ledger::{
    BatchLine, InventoryLedger, LedgerError, LedgerSettings, NewBatch, NewChargeOut, NewDelivery,
};
pub use outbox::{OutboxMessage, OutboxRelay, RelayHandle, StoredOutboxMessage};
pub use store::{
    ChargeOutFilter, DeliveryFilter, FaultPoint, InMemoryLedgerStore, LedgerStore, LedgerTx,
    PostgresLedgerStore, StoreError,
};
