//! The inventory ledger service.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. validate input (no transaction yet)
//! 2. `begin()` a store transaction
//! 3. lock the record being edited, then every part involved in ascending id order
//! 4. compute stock deltas from the before/after snapshots and validate all of
//!    them against the locked quantities
//! 5. write quantities, the record and any outbox events
//! 6. commit, or roll back on any error
//!
//! A failure at any point leaves parts, records and the outbox untouched.

mod charge_outs;
mod deliveries;
mod error;
mod parts;
mod stock;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use stockroom_inventory::{DatePolicy, LedgerEvent, Part, resolve_record_date};

use crate::outbox::OutboxMessage;
use crate::store::{LedgerStore, LedgerTx};

pub use charge_outs::NewChargeOut;
pub use deliveries::{BatchLine, NewBatch, NewDelivery};
pub use error::LedgerError;

/// Behavior switches, usually taken from [`LedgerConfig`](crate::LedgerConfig).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    pub date_policy: DatePolicy,
    /// Queue `part.below_reorder_level` when a debit crosses the reorder level.
    pub low_stock_alerts: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            date_policy: DatePolicy::Lenient,
            low_stock_alerts: true,
        }
    }
}

pub struct InventoryLedger<S> {
    store: S,
    settings: LedgerSettings,
}

impl<S: LedgerStore> InventoryLedger<S> {
    pub fn new(store: S, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> LedgerSettings {
        self.settings
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTx>, LedgerError> {
        self.store.begin().await.map_err(|err| {
            error!(error = %err, "failed to open ledger transaction");
            LedgerError::from(err)
        })
    }

    fn resolve_date(
        &self,
        input: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, LedgerError> {
        let resolved = resolve_record_date(input, self.settings.date_policy, now)?;
        if resolved.fell_back {
            warn!(
                input = input.unwrap_or_default(),
                "unparseable record date; using current time"
            );
        }
        Ok(resolved.at)
    }

    /// Date from a patch. Absent or blank means "leave unchanged".
    fn resolve_patch_date(
        &self,
        input: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, LedgerError> {
        match input.map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => self.resolve_date(Some(raw), now).map(Some),
        }
    }

    /// Queue reorder alerts for parts a debit just pushed to their reorder level.
    async fn alert_low_stock(
        &self,
        tx: &mut dyn LedgerTx,
        crossed: &[Part],
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if !self.settings.low_stock_alerts {
            return Ok(());
        }
        for part in crossed {
            warn!(
                part_id = %part.id,
                code = %part.code,
                quantity = part.quantity,
                reorder_level = part.reorder_level,
                "part at or below reorder level"
            );
            let event = LedgerEvent::stock_below_reorder_level(part, now);
            tx.enqueue(&OutboxMessage::from_event(&event)?).await?;
        }
        Ok(())
    }
}

/// Commit on success, roll back on failure. The body's error wins over a
/// rollback failure.
async fn finish<T>(
    tx: Box<dyn LedgerTx>,
    operation: &'static str,
    result: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match result {
        Ok(value) => {
            tx.commit().await.map_err(|err| {
                error!(operation, error = %err, "ledger commit failed");
                LedgerError::from(err)
            })?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(operation, error = %rollback_err, "ledger rollback failed");
            }
            if let LedgerError::Storage(store_err) = &err {
                error!(operation, error = %store_err, "ledger operation aborted");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests;
