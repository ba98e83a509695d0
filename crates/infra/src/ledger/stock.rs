use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use stockroom_core::PartId;
use stockroom_inventory::{AD_HOC_UNIT_COST, ItemRef, LineItem, Part, StockDelta};

use super::LedgerError;
use crate::store::LedgerTx;

/// Parts held under row lock for the rest of a transaction.
pub(super) struct LockedParts {
    parts: BTreeMap<PartId, Part>,
}

impl LockedParts {
    pub(super) fn none() -> Self {
        Self {
            parts: BTreeMap::new(),
        }
    }

    /// Lock every id in ascending order. Unknown ids fail with `NotFound`.
    pub(super) async fn acquire(
        tx: &mut dyn LedgerTx,
        ids: impl IntoIterator<Item = PartId>,
    ) -> Result<Self, LedgerError> {
        let ids: BTreeSet<PartId> = ids.into_iter().collect();
        let mut parts = BTreeMap::new();
        for id in ids {
            let part = tx.lock_part(id).await?.ok_or(LedgerError::NotFound("part"))?;
            parts.insert(id, part);
        }
        Ok(Self { parts })
    }

    pub(super) fn get(&self, id: PartId) -> Result<&Part, LedgerError> {
        self.parts.get(&id).ok_or(LedgerError::NotFound("part"))
    }

    /// Resolve a requested item to what the record stores, plus its unit cost.
    ///
    /// Catalog parts must already be locked. `seed` is the owning record's id
    /// and makes ad-hoc codes unique.
    pub(super) fn resolve_item(
        &self,
        item: &LineItem,
        seed: Uuid,
    ) -> Result<(ItemRef, i64), LedgerError> {
        match item {
            LineItem::Catalog { part_id } => {
                let part = self.get(*part_id)?;
                Ok((ItemRef::catalog(part), part.unit_cost))
            }
            LineItem::AdHoc { name, description } => Ok((
                ItemRef::ad_hoc(name, description.clone(), seed),
                AD_HOC_UNIT_COST,
            )),
        }
    }

    /// Validate every delta against the locked quantities, then write them.
    ///
    /// Nothing is written unless all deltas fit. Returns the parts whose debit
    /// took them from above their reorder level to at or below it.
    pub(super) async fn apply(
        &mut self,
        tx: &mut dyn LedgerTx,
        deltas: &[StockDelta],
        now: DateTime<Utc>,
    ) -> Result<Vec<Part>, LedgerError> {
        let mut next = Vec::with_capacity(deltas.len());
        for d in deltas {
            let part = self.get(d.part_id)?;
            match part.apply_delta(d.delta) {
                Ok(quantity) => next.push((d.part_id, quantity)),
                Err(err) => {
                    warn!(
                        part_id = %d.part_id,
                        requested = -d.delta,
                        available = part.quantity,
                        "insufficient stock"
                    );
                    return Err(err.into());
                }
            }
        }

        let mut crossed = Vec::new();
        for (part_id, quantity) in next {
            tx.set_part_quantity(part_id, quantity, now).await?;
            let part = self
                .parts
                .get_mut(&part_id)
                .ok_or(LedgerError::NotFound("part"))?;
            let was_above = !part.is_below_reorder_level();
            debug!(part_id = %part_id, from = part.quantity, to = quantity, "stock moved");
            part.quantity = quantity;
            part.updated_at = now;
            if was_above && part.is_below_reorder_level() {
                crossed.push(part.clone());
            }
        }
        Ok(crossed)
    }
}
