//! Ledger persistence.
//!
//! All stock-moving work happens inside a [`LedgerTx`]: rows read through a
//! transaction are locked until it commits or rolls back (`SELECT ... FOR UPDATE`
//! on Postgres, a store-wide lock in memory). Reads on [`LedgerStore`] itself are
//! unlocked snapshots for queries.
//!
//! ## Lock ordering
//!
//! Transactions lock the record they edit first, then every part involved in
//! ascending `PartId` order. Two transactions touching the same parts therefore
//! queue instead of deadlocking.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockroom_core::{BatchId, ChargeOutId, DeliveryId, PartId, StaffId};
use stockroom_inventory::{ChargeOutRecord, DeliveryRecord, DeliveryStatus, Part};

use crate::outbox::{OutboxMessage, StoredOutboxMessage};

mod in_memory;
mod postgres;

pub use in_memory::{FaultPoint, InMemoryLedgerStore};
pub use postgres::PostgresLedgerStore;

/// Storage failures, independent of the backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("timed out waiting for a lock: {0}")]
    Timeout(String),

    /// Serialization failure, deadlock or unique violation. Safe to retry.
    #[error("conflicting concurrent write: {0}")]
    Conflict(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Corrupt(_))
    }
}

/// Query filter for delivery listings. Empty filter lists everything.
///
/// `from` is inclusive, `to` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryFilter {
    pub staff_member_id: Option<StaffId>,
    pub status: Option<DeliveryStatus>,
    pub batch_id: Option<BatchId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DeliveryFilter {
    pub fn matches(&self, record: &DeliveryRecord) -> bool {
        self.staff_member_id
            .is_none_or(|s| record.line.staff_member_id == s)
            && self.status.is_none_or(|s| record.status == s)
            && self.batch_id.is_none_or(|b| record.batch_id == Some(b))
            && in_window(record.delivered_at, self.from, self.to)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChargeOutFilter {
    pub staff_member_id: Option<StaffId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ChargeOutFilter {
    pub fn matches(&self, record: &ChargeOutRecord) -> bool {
        self.staff_member_id
            .is_none_or(|s| record.line.staff_member_id == s)
            && in_window(record.issued_at, self.from, self.to)
    }
}

fn in_window(at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.is_none_or(|f| at >= f) && to.is_none_or(|t| at < t)
}

/// A unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read a part and hold its row lock until the transaction ends.
    async fn lock_part(&mut self, id: PartId) -> Result<Option<Part>, StoreError>;

    async fn find_part_by_code(&mut self, code: &str) -> Result<Option<Part>, StoreError>;

    async fn insert_part(&mut self, part: &Part) -> Result<(), StoreError>;

    /// Persist catalog attributes. Never writes `quantity`.
    async fn update_part(&mut self, part: &Part) -> Result<(), StoreError>;

    async fn set_part_quantity(
        &mut self,
        id: PartId,
        quantity: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn lock_delivery(&mut self, id: DeliveryId)
    -> Result<Option<DeliveryRecord>, StoreError>;

    async fn insert_delivery(&mut self, record: &DeliveryRecord) -> Result<(), StoreError>;

    async fn update_delivery(&mut self, record: &DeliveryRecord) -> Result<(), StoreError>;

    /// Returns `false` if no such delivery existed.
    async fn delete_delivery(&mut self, id: DeliveryId) -> Result<bool, StoreError>;

    async fn lock_charge_out(
        &mut self,
        id: ChargeOutId,
    ) -> Result<Option<ChargeOutRecord>, StoreError>;

    async fn insert_charge_out(&mut self, record: &ChargeOutRecord) -> Result<(), StoreError>;

    async fn update_charge_out(&mut self, record: &ChargeOutRecord) -> Result<(), StoreError>;

    async fn delete_charge_out(&mut self, id: ChargeOutId) -> Result<bool, StoreError>;

    /// Queue an event; it becomes visible to the relay only if this commits.
    async fn enqueue(&mut self, message: &OutboxMessage) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError>;

    async fn part(&self, id: PartId) -> Result<Option<Part>, StoreError>;

    /// All parts, ordered by code.
    async fn parts(&self) -> Result<Vec<Part>, StoreError>;

    /// Parts at or below their reorder level, ordered by code.
    async fn low_stock_parts(&self) -> Result<Vec<Part>, StoreError>;

    async fn delivery(&self, id: DeliveryId) -> Result<Option<DeliveryRecord>, StoreError>;

    /// Newest first.
    async fn deliveries(&self, filter: &DeliveryFilter)
    -> Result<Vec<DeliveryRecord>, StoreError>;

    async fn charge_out(&self, id: ChargeOutId) -> Result<Option<ChargeOutRecord>, StoreError>;

    /// Newest first.
    async fn charge_outs(&self, filter: &ChargeOutFilter)
    -> Result<Vec<ChargeOutRecord>, StoreError>;

    /// Undispatched outbox messages in sequence order.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<StoredOutboxMessage>, StoreError>;

    async fn mark_dispatched(&self, sequences: &[u64], at: DateTime<Utc>)
    -> Result<(), StoreError>;
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, StoreError> {
        (**self).begin().await
    }

    async fn part(&self, id: PartId) -> Result<Option<Part>, StoreError> {
        (**self).part(id).await
    }

    async fn parts(&self) -> Result<Vec<Part>, StoreError> {
        (**self).parts().await
    }

    async fn low_stock_parts(&self) -> Result<Vec<Part>, StoreError> {
        (**self).low_stock_parts().await
    }

    async fn delivery(&self, id: DeliveryId) -> Result<Option<DeliveryRecord>, StoreError> {
        (**self).delivery(id).await
    }

    async fn deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> Result<Vec<DeliveryRecord>, StoreError> {
        (**self).deliveries(filter).await
    }

    async fn charge_out(&self, id: ChargeOutId) -> Result<Option<ChargeOutRecord>, StoreError> {
        (**self).charge_out(id).await
    }

    async fn charge_outs(
        &self,
        filter: &ChargeOutFilter,
    ) -> Result<Vec<ChargeOutRecord>, StoreError> {
        (**self).charge_outs(filter).await
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<StoredOutboxMessage>, StoreError> {
        (**self).pending_outbox(limit).await
    }

    async fn mark_dispatched(
        &self,
        sequences: &[u64],
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).mark_dispatched(sequences, at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockroom_core::{ActorId, DeliveryId};
    use stockroom_inventory::{ItemRef, LedgerLine, RecordContext};
    use uuid::Uuid;

    fn delivery_at(at: DateTime<Utc>, staff: StaffId) -> DeliveryRecord {
        let line = LedgerLine::new(
            ItemRef::ad_hoc("Hinge", None, Uuid::now_v7()),
            0,
            1,
            RecordContext {
                staff_member_id: staff,
                building_id: None,
                cost_center_id: None,
                notes: None,
            },
        )
        .unwrap();
        DeliveryRecord::pending(DeliveryId::new(), None, line, at, ActorId::new(), at)
    }

    #[test]
    fn window_is_half_open() {
        let staff = StaffId::new();
        let from = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();
        let filter = DeliveryFilter {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        };

        assert!(filter.matches(&delivery_at(from, staff)));
        assert!(!filter.matches(&delivery_at(to, staff)));
    }

    #[test]
    fn staff_filter_excludes_other_recipients() {
        let staff = StaffId::new();
        let filter = DeliveryFilter {
            staff_member_id: Some(staff),
            ..Default::default()
        };
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        assert!(filter.matches(&delivery_at(at, staff)));
        assert!(!filter.matches(&delivery_at(at, StaffId::new())));
    }

    #[test]
    fn corrupt_rows_are_not_retryable() {
        assert!(StoreError::Timeout("parts".into()).is_retryable());
        assert!(!StoreError::Corrupt("status".into()).is_retryable());
    }
}
