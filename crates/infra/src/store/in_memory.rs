//! In-memory ledger store for tests and local development.
//!
//! A transaction takes the store-wide lock and works on a copy of the record
//! tables; `commit` writes the copy back. Transactions are therefore fully
//! serialized, which is stricter than Postgres row locks but gives the same
//! outcomes. Outbox messages are buffered per transaction and appended on
//! commit, so the outbox is never part of the copy. Dispatched messages are
//! dropped once the relay marks them.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use stockroom_core::{ChargeOutId, DeliveryId, Entity, PartId};
use stockroom_inventory::{ChargeOutRecord, DeliveryRecord, Part};

use super::{ChargeOutFilter, DeliveryFilter, LedgerStore, LedgerTx, StoreError};
use crate::outbox::{OutboxMessage, StoredOutboxMessage};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Write operations that can be made to fail once, for atomicity tests.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FaultPoint {
    SetPartQuantity,
    InsertDelivery,
    UpdateDelivery,
    DeleteDelivery,
    InsertChargeOut,
    UpdateChargeOut,
    DeleteChargeOut,
    Enqueue,
    Commit,
}

#[derive(Debug, Default)]
struct Faults {
    armed: StdMutex<Option<FaultPoint>>,
}

impl Faults {
    fn arm(&self, point: FaultPoint) {
        if let Ok(mut armed) = self.armed.lock() {
            *armed = Some(point);
        }
    }

    fn check(&self, point: FaultPoint) -> Result<(), StoreError> {
        let Ok(mut armed) = self.armed.lock() else {
            return Ok(());
        };
        if *armed == Some(point) {
            *armed = None;
            return Err(StoreError::Unavailable(format!("injected fault at {point:?}")));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Table<E: Entity> {
    rows: HashMap<E::Id, E>,
}

impl<E: Entity> Default for Table<E> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }
}

impl<E: Entity + Clone> Table<E> {
    fn get(&self, id: &E::Id) -> Option<E> {
        self.rows.get(id).cloned()
    }

    fn insert(&mut self, row: &E, table: &str) -> Result<(), StoreError> {
        if self.rows.contains_key(row.id()) {
            return Err(StoreError::Conflict(format!(
                "duplicate key {:?} in {table}",
                row.id()
            )));
        }
        self.rows.insert(*row.id(), row.clone());
        Ok(())
    }

    fn replace(&mut self, row: &E, table: &str) -> Result<(), StoreError> {
        match self.rows.get_mut(row.id()) {
            Some(slot) => {
                *slot = row.clone();
                Ok(())
            }
            None => Err(StoreError::Corrupt(format!(
                "update of missing row {:?} in {table}",
                row.id()
            ))),
        }
    }

    fn remove(&mut self, id: &E::Id) -> bool {
        self.rows.remove(id).is_some()
    }

    fn values(&self) -> impl Iterator<Item = &E> {
        self.rows.values()
    }
}

/// The part of the store a transaction copies.
#[derive(Debug, Clone, Default)]
struct Records {
    parts: Table<Part>,
    deliveries: Table<DeliveryRecord>,
    charge_outs: Table<ChargeOutRecord>,
}

#[derive(Debug, Default)]
struct Outbox {
    pending: VecDeque<StoredOutboxMessage>,
    last_sequence: u64,
}

impl Outbox {
    fn append(&mut self, message: OutboxMessage) {
        self.last_sequence += 1;
        self.pending.push_back(StoredOutboxMessage {
            sequence: self.last_sequence,
            message,
        });
    }
}

#[derive(Debug, Default)]
struct Tables {
    records: Records,
    outbox: Outbox,
}

#[derive(Debug, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
    lock_timeout: Duration,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            faults: Arc::new(Faults::default()),
            lock_timeout,
        }
    }

    /// Make the next call that reaches `point` fail with `StoreError::Unavailable`.
    pub fn fail_next(&self, point: FaultPoint) {
        self.faults.arm(point);
    }

    /// Committed outbox messages the relay has not dispatched yet.
    pub async fn outbox(&self) -> Vec<StoredOutboxMessage> {
        let tables = self.tables.lock().await;
        tables.outbox.pending.iter().cloned().collect()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        let guard = tokio::time::timeout(self.lock_timeout, self.tables.clone().lock_owned())
            .await
            .map_err(|_| {
                StoreError::Timeout(format!(
                    "ledger lock not acquired within {}ms",
                    self.lock_timeout.as_millis()
                ))
            })?;
        let working = guard.records.clone();
        Ok(Box::new(InMemoryTx {
            guard,
            working,
            queued: Vec::new(),
            faults: self.faults.clone(),
        }))
    }

    async fn part(&self, id: PartId) -> Result<Option<Part>, StoreError> {
        Ok(self.tables.lock().await.records.parts.get(&id))
    }

    async fn parts(&self) -> Result<Vec<Part>, StoreError> {
        let tables = self.tables.lock().await;
        let mut parts: Vec<Part> = tables.records.parts.values().cloned().collect();
        parts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(parts)
    }

    async fn low_stock_parts(&self) -> Result<Vec<Part>, StoreError> {
        let mut parts = self.parts().await?;
        parts.retain(Part::is_below_reorder_level);
        Ok(parts)
    }

    async fn delivery(&self, id: DeliveryId) -> Result<Option<DeliveryRecord>, StoreError> {
        Ok(self.tables.lock().await.records.deliveries.get(&id))
    }

    async fn deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> Result<Vec<DeliveryRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<DeliveryRecord> = tables
            .records
            .deliveries
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.delivered_at.cmp(&a.delivered_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn charge_out(&self, id: ChargeOutId) -> Result<Option<ChargeOutRecord>, StoreError> {
        Ok(self.tables.lock().await.records.charge_outs.get(&id))
    }

    async fn charge_outs(
        &self,
        filter: &ChargeOutFilter,
    ) -> Result<Vec<ChargeOutRecord>, StoreError> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<ChargeOutRecord> = tables
            .records
            .charge_outs
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<StoredOutboxMessage>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.outbox.pending.iter().take(limit).cloned().collect())
    }

    async fn mark_dispatched(
        &self,
        sequences: &[u64],
        _at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        tables
            .outbox
            .pending
            .retain(|m| !sequences.contains(&m.sequence));
        Ok(())
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Records,
    queued: Vec<OutboxMessage>,
    faults: Arc<Faults>,
}

#[async_trait]
impl LedgerTx for InMemoryTx {
    async fn lock_part(&mut self, id: PartId) -> Result<Option<Part>, StoreError> {
        Ok(self.working.parts.get(&id))
    }

    async fn find_part_by_code(&mut self, code: &str) -> Result<Option<Part>, StoreError> {
        Ok(self
            .working
            .parts
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn insert_part(&mut self, part: &Part) -> Result<(), StoreError> {
        if self.working.parts.values().any(|p| p.code == part.code) {
            return Err(StoreError::Conflict(format!(
                "part code '{}' already exists",
                part.code
            )));
        }
        self.working.parts.insert(part, "parts")
    }

    async fn update_part(&mut self, part: &Part) -> Result<(), StoreError> {
        let mut row = self
            .working
            .parts
            .get(&part.id)
            .ok_or_else(|| StoreError::Corrupt(format!("update of missing part {}", part.id)))?;
        row.name = part.name.clone();
        row.unit_cost = part.unit_cost;
        row.reorder_level = part.reorder_level;
        row.updated_at = part.updated_at;
        self.working.parts.replace(&row, "parts")
    }

    async fn set_part_quantity(
        &mut self,
        id: PartId,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.faults.check(FaultPoint::SetPartQuantity)?;
        if quantity < 0 {
            return Err(StoreError::Conflict(format!(
                "quantity of part {id} would become {quantity}"
            )));
        }
        let mut row = self
            .working
            .parts
            .get(&id)
            .ok_or_else(|| StoreError::Corrupt(format!("update of missing part {id}")))?;
        row.quantity = quantity;
        row.updated_at = at;
        self.working.parts.replace(&row, "parts")
    }

    async fn lock_delivery(
        &mut self,
        id: DeliveryId,
    ) -> Result<Option<DeliveryRecord>, StoreError> {
        Ok(self.working.deliveries.get(&id))
    }

    async fn insert_delivery(&mut self, record: &DeliveryRecord) -> Result<(), StoreError> {
        self.faults.check(FaultPoint::InsertDelivery)?;
        self.working.deliveries.insert(record, "deliveries")
    }

    async fn update_delivery(&mut self, record: &DeliveryRecord) -> Result<(), StoreError> {
        self.faults.check(FaultPoint::UpdateDelivery)?;
        self.working.deliveries.replace(record, "deliveries")
    }

    async fn delete_delivery(&mut self, id: DeliveryId) -> Result<bool, StoreError> {
        self.faults.check(FaultPoint::DeleteDelivery)?;
        Ok(self.working.deliveries.remove(&id))
    }

    async fn lock_charge_out(
        &mut self,
        id: ChargeOutId,
    ) -> Result<Option<ChargeOutRecord>, StoreError> {
        Ok(self.working.charge_outs.get(&id))
    }

    async fn insert_charge_out(&mut self, record: &ChargeOutRecord) -> Result<(), StoreError> {
        self.faults.check(FaultPoint::InsertChargeOut)?;
        self.working.charge_outs.insert(record, "charge_outs")
    }

    async fn update_charge_out(&mut self, record: &ChargeOutRecord) -> Result<(), StoreError> {
        self.faults.check(FaultPoint::UpdateChargeOut)?;
        self.working.charge_outs.replace(record, "charge_outs")
    }

    async fn delete_charge_out(&mut self, id: ChargeOutId) -> Result<bool, StoreError> {
        self.faults.check(FaultPoint::DeleteChargeOut)?;
        Ok(self.working.charge_outs.remove(&id))
    }

    async fn enqueue(&mut self, message: &OutboxMessage) -> Result<(), StoreError> {
        self.faults.check(FaultPoint::Enqueue)?;
        self.queued.push(message.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.faults.check(FaultPoint::Commit)?;
        let InMemoryTx {
            mut guard,
            working,
            queued,
            ..
        } = *self;
        guard.records = working;
        for message in queued {
            guard.outbox.append(message);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
