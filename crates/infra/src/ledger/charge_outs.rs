//! Charge-outs: stock issued against a cost center. Final on creation, so
//! there is no confirm/cancel lifecycle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use stockroom_core::{ActorId, ChargeOutId};
use stockroom_inventory::{
    ChargeOutRecord, LedgerLine, LineChanges, LineItem, RecordContext, RecordPatch, StockRecord,
    compute_delta,
};

use super::deliveries::validate_line;
use super::stock::LockedParts;
use super::{InventoryLedger, LedgerError, finish};
use crate::store::{ChargeOutFilter, LedgerStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChargeOut {
    pub item: LineItem,
    pub quantity: i64,
    #[serde(flatten)]
    pub context: RecordContext,
    #[serde(default)]
    pub date: Option<String>,
}

impl<S: LedgerStore> InventoryLedger<S> {
    #[instrument(
        skip(self, input),
        fields(part_id = ?input.item.part_id(), quantity = input.quantity, actor_id = %actor),
        err(level = "warn")
    )]
    pub async fn create_charge_out(
        &self,
        input: NewChargeOut,
        actor: ActorId,
    ) -> Result<ChargeOutRecord, LedgerError> {
        validate_line(&input.item, input.quantity)?;
        let now = Utc::now();
        let issued_at = self.resolve_date(input.date.as_deref(), now)?;

        let mut tx = self.begin().await?;
        let result = async {
            let mut locked = LockedParts::acquire(&mut *tx, input.item.part_id()).await?;
            let id = ChargeOutId::new();
            let (item, unit_cost) = locked.resolve_item(&input.item, *id.as_uuid())?;
            let line = LedgerLine::new(item, unit_cost, input.quantity, input.context)?;
            let record = ChargeOutRecord::issue(id, line, issued_at, actor, now);

            let deltas = compute_delta(None, record.stock_snapshot().as_ref());
            let crossed = locked.apply(&mut *tx, &deltas, now).await?;
            tx.insert_charge_out(&record).await?;
            self.alert_low_stock(&mut *tx, &crossed, now).await?;
            Ok::<_, LedgerError>(record)
        }
        .await;
        let record = finish(tx, "create_charge_out", result).await?;

        info!(record_id = %record.id, code = %record.line.item.code(), "charge-out created");
        Ok(record)
    }

    #[instrument(
        skip(self, patch),
        fields(record_id = %id, actor_id = %actor),
        err(level = "warn")
    )]
    pub async fn update_charge_out(
        &self,
        id: ChargeOutId,
        patch: RecordPatch,
        actor: ActorId,
    ) -> Result<ChargeOutRecord, LedgerError> {
        patch.validate()?;
        let now = Utc::now();
        let issued_at = self.resolve_patch_date(patch.date.as_deref(), now)?;

        let mut tx = self.begin().await?;
        let result = async {
            let before = tx
                .lock_charge_out(id)
                .await?
                .ok_or(LedgerError::NotFound("charge-out"))?;

            let mut locked = if patch.item.is_some() || patch.quantity.is_some() {
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
            let after = before.revise(LineChanges::from_patch(&patch, item), issued_at, actor, now)?;

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
            tx.update_charge_out(&after).await?;
            Ok::<_, LedgerError>(after)
        }
        .await;
        let record = finish(tx, "update_charge_out", result).await?;

        info!(record_id = %record.id, quantity = record.line.quantity, "charge-out updated");
        Ok(record)
    }

    #[instrument(skip(self), fields(record_id = %id, actor_id = %actor), err(level = "warn"))]
    pub async fn delete_charge_out(
        &self,
        id: ChargeOutId,
        actor: ActorId,
    ) -> Result<bool, LedgerError> {
        let now = Utc::now();

        let mut tx = self.begin().await?;
        let result = async {
            let before = tx
                .lock_charge_out(id)
                .await?
                .ok_or(LedgerError::NotFound("charge-out"))?;
            let deltas = compute_delta(before.stock_snapshot().as_ref(), None);
            let mut locked =
                LockedParts::acquire(&mut *tx, deltas.iter().map(|d| d.part_id)).await?;
            locked.apply(&mut *tx, &deltas, now).await?;

            if !tx.delete_charge_out(id).await? {
                return Err(LedgerError::NotFound("charge-out"));
            }
            Ok(deltas.first().map(|d| d.delta).unwrap_or(0))
        }
        .await;
        let credited = finish(tx, "delete_charge_out", result).await?;

        info!(record_id = %id, credited, "charge-out deleted");
        Ok(true)
    }

    pub async fn charge_out(&self, id: ChargeOutId) -> Result<ChargeOutRecord, LedgerError> {
        self.store
            .charge_out(id)
            .await?
            .ok_or(LedgerError::NotFound("charge-out"))
    }

    pub async fn charge_outs(
        &self,
        filter: &ChargeOutFilter,
    ) -> Result<Vec<ChargeOutRecord>, LedgerError> {
        Ok(self.store.charge_outs(filter).await?)
    }
}
