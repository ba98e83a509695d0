//! Catalog maintenance and stock queries.

use chrono::Utc;
use tracing::{info, instrument};

use stockroom_core::{ActorId, PartId};
use stockroom_inventory::{NewPart, Part, PartPatch};

use super::stock::LockedParts;
use super::{InventoryLedger, LedgerError, finish};
use crate::store::{LedgerStore, LedgerTx};

impl<S: LedgerStore> InventoryLedger<S> {
    #[instrument(
        skip(self, input),
        fields(code = %input.code, actor_id = %actor),
        err(level = "warn")
    )]
    pub async fn create_part(&self, input: NewPart, actor: ActorId) -> Result<Part, LedgerError> {
        let part = Part::register(PartId::new(), input, Utc::now())?;

        let mut tx = self.begin().await?;
        let result = insert_part(&mut *tx, &part).await;
        let part = finish(tx, "create_part", result.map(|()| part)).await?;

        info!(part_id = %part.id, quantity = part.quantity, "part created");
        Ok(part)
    }

    /// Edit catalog attributes. Quantity only moves through the ledger or
    /// [`set_part_quantity`](Self::set_part_quantity).
    #[instrument(skip(self, patch), fields(part_id = %id, actor_id = %actor), err(level = "warn"))]
    pub async fn update_part(
        &self,
        id: PartId,
        patch: PartPatch,
        actor: ActorId,
    ) -> Result<Part, LedgerError> {
        let mut tx = self.begin().await?;
        let result = async {
            let mut part = tx.lock_part(id).await?.ok_or(LedgerError::NotFound("part"))?;
            part.apply_patch(patch, Utc::now())?;
            tx.update_part(&part).await?;
            Ok::<_, LedgerError>(part)
        }
        .await;
        let part = finish(tx, "update_part", result).await?;

        info!(part_id = %part.id, "part updated");
        Ok(part)
    }

    /// Inventory adjustment (stocktake, receiving). Overrides the count
    /// outright instead of applying a delta.
    #[instrument(skip(self), fields(part_id = %id, actor_id = %actor), err(level = "warn"))]
    pub async fn set_part_quantity(
        &self,
        id: PartId,
        quantity: i64,
        actor: ActorId,
    ) -> Result<Part, LedgerError> {
        if quantity < 0 {
            return Err(LedgerError::Validation(
                "quantity cannot be negative".to_string(),
            ));
        }
        let now = Utc::now();

        let mut tx = self.begin().await?;
        let result = async {
            let locked = LockedParts::acquire(&mut *tx, [id]).await?;
            let mut part = locked.get(id)?.clone();
            let was_above = !part.is_below_reorder_level();
            let previous = part.quantity;

            part.override_quantity(quantity, now)?;
            tx.set_part_quantity(id, quantity, now).await?;
            if was_above && part.is_below_reorder_level() {
                self.alert_low_stock(&mut *tx, std::slice::from_ref(&part), now)
                    .await?;
            }
            Ok::<_, LedgerError>((part, previous))
        }
        .await;
        let (part, previous) = finish(tx, "set_part_quantity", result).await?;

        info!(part_id = %id, previous, quantity, "part quantity overridden");
        Ok(part)
    }

    pub async fn part(&self, id: PartId) -> Result<Part, LedgerError> {
        self.store
            .part(id)
            .await?
            .ok_or(LedgerError::NotFound("part"))
    }

    pub async fn parts(&self) -> Result<Vec<Part>, LedgerError> {
        Ok(self.store.parts().await?)
    }

    /// Parts at or below their reorder level.
    pub async fn low_stock_parts(&self) -> Result<Vec<Part>, LedgerError> {
        Ok(self.store.low_stock_parts().await?)
    }
}

async fn insert_part(tx: &mut dyn LedgerTx, part: &Part) -> Result<(), LedgerError> {
    if tx.find_part_by_code(&part.code).await?.is_some() {
        return Err(LedgerError::Validation(format!(
            "part code '{}' already exists",
            part.code
        )));
    }
    tx.insert_part(part).await?;
    Ok(())
}
