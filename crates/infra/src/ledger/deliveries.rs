//! Delivery records: create, batch create, edit, delete, confirm, cancel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use stockroom_core::{ActorId, BatchId, DeliveryId};
use stockroom_inventory::{
    Confirmation, DeliveryRecord, LedgerEvent, LedgerLine, LineChanges, LineItem, RecordContext,
    RecordPatch, StockRecord, compute_delta,
};

use super::stock::LockedParts;
use super::{InventoryLedger, LedgerError, finish};
use crate::outbox::OutboxMessage;
use crate::store::{DeliveryFilter, LedgerStore, LedgerTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDelivery {
    pub item: LineItem,
    pub quantity: i64,
    #[serde(flatten)]
    pub context: RecordContext,
    /// `YYYY-MM-DD` or a full timestamp. Missing means now.
    #[serde(default)]
    pub date: Option<String>,
}

/// One cart line of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLine {
    pub item: LineItem,
    pub quantity: i64,
    /// Overrides the batch-wide notes for this line.
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBatch {
    pub lines: Vec<BatchLine>,
    #[serde(flatten)]
    pub context: RecordContext,
    #[serde(default)]
    pub date: Option<String>,
}

pub(super) fn validate_line(item: &LineItem, quantity: i64) -> Result<(), LedgerError> {
    item.validate()?;
    if quantity <= 0 {
        return Err(LedgerError::Validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

impl<S: LedgerStore> InventoryLedger<S> {
    #[instrument(
        skip(self, input),
        fields(part_id = ?input.item.part_id(), quantity = input.quantity, actor_id = %actor),
        err(level = "warn")
    )]
    pub async fn create_delivery(
        &self,
        input: NewDelivery,
        actor: ActorId,
    ) -> Result<DeliveryRecord, LedgerError> {
        validate_line(&input.item, input.quantity)?;
        let now = Utc::now();
        let delivered_at = self.resolve_date(input.date.as_deref(), now)?;

        let mut tx = self.begin().await?;
        let result = async {
            let mut locked = LockedParts::acquire(&mut *tx, input.item.part_id()).await?;
            self.draw_delivery(
                &mut *tx,
                &mut locked,
                None,
                &input.item,
                input.quantity,
                input.context,
                delivered_at,
                actor,
                now,
            )
            .await
        }
        .await;
        let record = finish(tx, "create_delivery", result).await?;

        info!(record_id = %record.id, code = %record.line.item.code(), "delivery created");
        Ok(record)
    }

    /// Create one delivery per line under a shared context, all or nothing.
    #[instrument(
        skip(self, input),
        fields(lines = input.lines.len(), actor_id = %actor),
        err(level = "warn")
    )]
    pub async fn create_batch(
        &self,
        input: NewBatch,
        actor: ActorId,
    ) -> Result<Vec<DeliveryRecord>, LedgerError> {
        if input.lines.is_empty() {
            return Err(LedgerError::Validation(
                "batch must contain at least one line".to_string(),
            ));
        }
        for (index, line) in input.lines.iter().enumerate() {
            validate_line(&line.item, line.quantity).map_err(|err| match err {
                LedgerError::Validation(msg) => {
                    LedgerError::Validation(format!("line {index}: {msg}"))
                }
                other => other,
            })?;
        }
        let now = Utc::now();
        let delivered_at = self.resolve_date(input.date.as_deref(), now)?;
        let batch_id = BatchId::new();

        let mut tx = self.begin().await?;
        let result = async {
            let part_ids = input.lines.iter().filter_map(|l| l.item.part_id());
            let mut locked = LockedParts::acquire(&mut *tx, part_ids).await?;

            let mut records = Vec::with_capacity(input.lines.len());
            for (index, line) in input.lines.iter().enumerate() {
                let context = RecordContext {
                    notes: line.notes.clone().or_else(|| input.context.notes.clone()),
                    ..input.context.clone()
                };
                let record = self
                    .draw_delivery(
                        &mut *tx,
                        &mut locked,
                        Some(batch_id),
                        &line.item,
                        line.quantity,
                        context,
                        delivered_at,
                        actor,
                        now,
                    )
                    .await
                    .inspect_err(|err| warn!(line = index, error = %err, "batch line rejected"))?;
                records.push(record);
            }
            Ok::<_, LedgerError>(records)
        }
        .await;
        let records = finish(tx, "create_batch", result).await?;

        info!(batch_id = %batch_id, records = records.len(), "delivery batch created");
        Ok(records)
    }

    #[instrument(
        skip(self, patch),
        fields(record_id = %id, actor_id = %actor),
        err(level = "warn")
    )]
    pub async fn update_delivery(
        &self,
        id: DeliveryId,
        patch: RecordPatch,
        actor: ActorId,
    ) -> Result<DeliveryRecord, LedgerError> {
        patch.validate()?;
        let now = Utc::now();
        let delivered_at = self.resolve_patch_date(patch.date.as_deref(), now)?;

        let mut tx = self.begin().await?;
        let result = async {
            let before = tx
                .lock_delivery(id)
                .await?
                .ok_or(LedgerError::NotFound("delivery"))?;

            let touches_stock = patch.item.is_some() || patch.quantity.is_some();
            let mut locked = if touches_stock {
                let ids = before
                    .line
                    .item
                    .part_id()
                    .into_iter()
                    .chain(patch.item.as_ref().and_then(LineItem::part_id));
                LockedParts::acquire(&mut *tx, ids).await?
            } else {
                LockedParts::none()
            };

            let item = match &patch.item {
                Some(item) if !before.line.item.refers_to(item) => {
                    Some(locked.resolve_item(item, *before.id.as_uuid())?)
                }
                _ => None,
            };
            let after = before.revise(
                LineChanges::from_patch(&patch, item),
                delivered_at,
                actor,
                now,
            )?;

            let deltas = compute_delta(
                before.stock_snapshot().as_ref(),
                after.stock_snapshot().as_ref(),
            );
            if deltas.is_empty() {
                debug!("no stock movement");
            } else {
                let crossed = locked.apply(&mut *tx, &deltas, now).await?;
                self.alert_low_stock(&mut *tx, &crossed, now).await?;
            }
            tx.update_delivery(&after).await?;
            Ok::<_, LedgerError>(after)
        }
        .await;
        let record = finish(tx, "update_delivery", result).await?;

        info!(record_id = %record.id, quantity = record.line.quantity, "delivery updated");
        Ok(record)
    }

    /// Delete a delivery and credit back whatever stock it still holds.
    #[instrument(skip(self), fields(record_id = %id, actor_id = %actor), err(level = "warn"))]
    pub async fn delete_delivery(&self, id: DeliveryId, actor: ActorId) -> Result<bool, LedgerError> {
        let now = Utc::now();

        let mut tx = self.begin().await?;
        let result = async {
            let before = tx
                .lock_delivery(id)
                .await?
                .ok_or(LedgerError::NotFound("delivery"))?;
            let deltas = compute_delta(before.stock_snapshot().as_ref(), None);
            let mut locked =
                LockedParts::acquire(&mut *tx, deltas.iter().map(|d| d.part_id)).await?;
            locked.apply(&mut *tx, &deltas, now).await?;

            if !tx.delete_delivery(id).await? {
                return Err(LedgerError::NotFound("delivery"));
            }
            Ok(deltas.first().map(|d| d.delta).unwrap_or(0))
        }
        .await;
        let credited = finish(tx, "delete_delivery", result).await?;

        info!(record_id = %id, credited, "delivery deleted");
        Ok(true)
    }

    /// `pending -> delivered`. Stock is untouched; it moved at creation.
    ///
    /// Confirming an already delivered record returns it unchanged.
    #[instrument(
        skip(self, signature),
        fields(record_id = %id, actor_id = %actor),
        err(level = "warn")
    )]
    pub async fn confirm_delivery(
        &self,
        id: DeliveryId,
        signature: Option<String>,
        actor: ActorId,
    ) -> Result<DeliveryRecord, LedgerError> {
        let now = Utc::now();

        let mut tx = self.begin().await?;
        let result = async {
            let mut record = tx
                .lock_delivery(id)
                .await?
                .ok_or(LedgerError::NotFound("delivery"))?;
            let outcome = record.confirm(signature, actor, now)?;
            if outcome == Confirmation::Confirmed {
                tx.update_delivery(&record).await?;
                let event = LedgerEvent::delivery_confirmed(&record, actor);
                tx.enqueue(&OutboxMessage::from_event(&event)?).await?;
            }
            Ok::<_, LedgerError>((record, outcome))
        }
        .await;
        let (record, outcome) = finish(tx, "confirm_delivery", result).await?;

        match outcome {
            Confirmation::Confirmed => info!(record_id = %id, "delivery confirmed"),
            Confirmation::AlreadyConfirmed => debug!(record_id = %id, "delivery already confirmed"),
        }
        Ok(record)
    }

    /// `pending -> cancelled`, crediting the stock back.
    #[instrument(skip(self), fields(record_id = %id, actor_id = %actor), err(level = "warn"))]
    pub async fn cancel_delivery(
        &self,
        id: DeliveryId,
        actor: ActorId,
    ) -> Result<DeliveryRecord, LedgerError> {
        let now = Utc::now();

        let mut tx = self.begin().await?;
        let result = async {
            let mut record = tx
                .lock_delivery(id)
                .await?
                .ok_or(LedgerError::NotFound("delivery"))?;
            let before = record.stock_snapshot();
            record.cancel(actor, now)?;

            let deltas = compute_delta(before.as_ref(), record.stock_snapshot().as_ref());
            let mut locked =
                LockedParts::acquire(&mut *tx, deltas.iter().map(|d| d.part_id)).await?;
            locked.apply(&mut *tx, &deltas, now).await?;

            tx.update_delivery(&record).await?;
            let event = LedgerEvent::delivery_cancelled(&record, actor);
            tx.enqueue(&OutboxMessage::from_event(&event)?).await?;
            Ok::<_, LedgerError>(record)
        }
        .await;
        let record = finish(tx, "cancel_delivery", result).await?;

        info!(record_id = %id, credited = record.line.quantity, "delivery cancelled");
        Ok(record)
    }

    pub async fn delivery(&self, id: DeliveryId) -> Result<DeliveryRecord, LedgerError> {
        self.store
            .delivery(id)
            .await?
            .ok_or(LedgerError::NotFound("delivery"))
    }

    pub async fn deliveries(
        &self,
        filter: &DeliveryFilter,
    ) -> Result<Vec<DeliveryRecord>, LedgerError> {
        Ok(self.store.deliveries(filter).await?)
    }

    /// Build, debit and insert one pending delivery. Parts must be locked.
    #[allow(clippy::too_many_arguments)]
    async fn draw_delivery(
        &self,
        tx: &mut dyn LedgerTx,
        locked: &mut LockedParts,
        batch_id: Option<BatchId>,
        item: &LineItem,
        quantity: i64,
        context: RecordContext,
        delivered_at: DateTime<Utc>,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Result<DeliveryRecord, LedgerError> {
        let id = DeliveryId::new();
        let (item, unit_cost) = locked.resolve_item(item, *id.as_uuid())?;
        let line = LedgerLine::new(item, unit_cost, quantity, context)?;
        let record = DeliveryRecord::pending(id, batch_id, line, delivered_at, actor, now);

        let deltas = compute_delta(None, record.stock_snapshot().as_ref());
        let crossed = locked.apply(tx, &deltas, now).await?;
        tx.insert_delivery(&record).await?;
        self.alert_low_stock(tx, &crossed, now).await?;
        Ok(record)
    }
}
