//! Delivery and charge-out records.
//!
//! Both record kinds draw stock the same way; they differ only in lifecycle.
//! Deliveries start `pending` and are later confirmed or cancelled, charge-outs
//! are final as soon as they are issued.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{
    ActorId, BatchId, BuildingId, ChargeOutId, CostCenterId, DeliveryId, DomainError,
    DomainResult, Entity, StaffId,
};

use crate::delta::RecordSnapshot;
use crate::item::{ItemRef, LineItem};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Active records hold stock; cancelled ones have handed it back.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl core::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown delivery status '{other}'"
            ))),
        }
    }
}

/// Recipient and accounting context shared by the lines of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordContext {
    pub staff_member_id: StaffId,
    #[serde(default)]
    pub building_id: Option<BuildingId>,
    #[serde(default)]
    pub cost_center_id: Option<CostCenterId>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The stock-bearing body of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub item: ItemRef,
    pub quantity: i64,
    /// Price at the time the record was created, in minor units.
    pub unit_cost: i64,
    pub staff_member_id: StaffId,
    pub building_id: Option<BuildingId>,
    pub cost_center_id: Option<CostCenterId>,
    pub notes: Option<String>,
}

impl LedgerLine {
    pub fn new(
        item: ItemRef,
        unit_cost: i64,
        quantity: i64,
        context: RecordContext,
    ) -> DomainResult<Self> {
        ensure_positive_quantity(quantity)?;
        Ok(Self {
            item,
            quantity,
            unit_cost,
            staff_member_id: context.staff_member_id,
            building_id: context.building_id,
            cost_center_id: context.cost_center_id,
            notes: normalize_notes(context.notes),
        })
    }

    fn with_changes(&self, changes: LineChanges) -> DomainResult<Self> {
        let mut next = self.clone();
        if let Some((item, unit_cost)) = changes.item {
            next.item = item;
            next.unit_cost = unit_cost;
        }
        if let Some(quantity) = changes.quantity {
            ensure_positive_quantity(quantity)?;
            next.quantity = quantity;
        }
        if let Some(staff) = changes.staff_member_id {
            next.staff_member_id = staff;
        }
        if let Some(building) = changes.building_id {
            next.building_id = Some(building);
        }
        if let Some(cost_center) = changes.cost_center_id {
            next.cost_center_id = Some(cost_center);
        }
        if let Some(notes) = changes.notes {
            next.notes = normalize_notes(Some(notes));
        }
        Ok(next)
    }
}

/// Partial update as sent by a caller: the item is unresolved and the date is
/// still a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordPatch {
    pub item: Option<LineItem>,
    pub quantity: Option<i64>,
    pub staff_member_id: Option<StaffId>,
    pub building_id: Option<BuildingId>,
    pub cost_center_id: Option<CostCenterId>,
    /// An empty string clears the notes.
    pub notes: Option<String>,
    pub date: Option<String>,
}

impl RecordPatch {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(quantity) = self.quantity {
            ensure_positive_quantity(quantity)?;
        }
        if let Some(item) = &self.item {
            item.validate()?;
        }
        Ok(())
    }
}

/// A `RecordPatch` after item resolution: `item` carries the new reference and
/// its unit-cost snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineChanges {
    pub item: Option<(ItemRef, i64)>,
    pub quantity: Option<i64>,
    pub staff_member_id: Option<StaffId>,
    pub building_id: Option<BuildingId>,
    pub cost_center_id: Option<CostCenterId>,
    pub notes: Option<String>,
}

impl LineChanges {
    /// Carries every non-item field of `patch` over.
    pub fn from_patch(patch: &RecordPatch, item: Option<(ItemRef, i64)>) -> Self {
        Self {
            item,
            quantity: patch.quantity,
            staff_member_id: patch.staff_member_id,
            building_id: patch.building_id,
            cost_center_id: patch.cost_center_id,
            notes: patch.notes.clone(),
        }
    }

    pub fn touches_stock(&self) -> bool {
        self.item.is_some() || self.quantity.is_some()
    }
}

/// Anything that draws on a part's stock.
pub trait StockRecord {
    fn line(&self) -> &LedgerLine;

    fn is_active(&self) -> bool;

    /// The stock this record currently holds, if any.
    fn stock_snapshot(&self) -> Option<RecordSnapshot> {
        if !self.is_active() {
            return None;
        }
        let line = self.line();
        line.item.part_id().map(|part_id| RecordSnapshot {
            part_id,
            quantity: line.quantity,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: DeliveryId,
    pub batch_id: Option<BatchId>,
    #[serde(flatten)]
    pub line: LedgerLine,
    pub status: DeliveryStatus,
    pub delivered_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub signature: Option<String>,
    pub created_by: ActorId,
    pub updated_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn pending(
        id: DeliveryId,
        batch_id: Option<BatchId>,
        line: LedgerLine,
        delivered_at: DateTime<Utc>,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            batch_id,
            line,
            status: DeliveryStatus::Pending,
            delivered_at,
            confirmed_at: None,
            cancelled_at: None,
            signature: None,
            created_by: actor,
            updated_by: actor,
            created_at: now,
            updated_at: now,
        }
    }

    /// Proposed state after an edit. Does not mutate.
    pub fn revise(
        &self,
        changes: LineChanges,
        delivered_at: Option<DateTime<Utc>>,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if self.status == DeliveryStatus::Cancelled && changes.touches_stock() {
            return Err(DomainError::invalid_state(
                "cannot change item or quantity of a cancelled delivery",
            ));
        }
        let mut next = self.clone();
        next.line = self.line.with_changes(changes)?;
        if let Some(at) = delivered_at {
            next.delivered_at = at;
        }
        next.updated_by = actor;
        next.updated_at = now;
        Ok(next)
    }
}

impl StockRecord for DeliveryRecord {
    fn line(&self) -> &LedgerLine {
        &self.line
    }

    fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

impl Entity for DeliveryRecord {
    type Id = DeliveryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeOutRecord {
    pub id: ChargeOutId,
    #[serde(flatten)]
    pub line: LedgerLine,
    pub issued_at: DateTime<Utc>,
    pub created_by: ActorId,
    pub updated_by: ActorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChargeOutRecord {
    pub fn issue(
        id: ChargeOutId,
        line: LedgerLine,
        issued_at: DateTime<Utc>,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            line,
            issued_at,
            created_by: actor,
            updated_by: actor,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn revise(
        &self,
        changes: LineChanges,
        issued_at: Option<DateTime<Utc>>,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut next = self.clone();
        next.line = self.line.with_changes(changes)?;
        if let Some(at) = issued_at {
            next.issued_at = at;
        }
        next.updated_by = actor;
        next.updated_at = now;
        Ok(next)
    }
}

impl StockRecord for ChargeOutRecord {
    fn line(&self) -> &LedgerLine {
        &self.line
    }

    fn is_active(&self) -> bool {
        true
    }
}

impl Entity for ChargeOutRecord {
    type Id = ChargeOutId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn ensure_positive_quantity(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}
