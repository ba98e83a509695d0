use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockroom_core::{ActorId, DeliveryId, PartId, StaffId};
use stockroom_events::Event;

use crate::part::Part;
use crate::record::DeliveryRecord;

/// Event: DeliveryConfirmed (the recipient signed for the items).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfirmed {
    pub delivery_id: DeliveryId,
    pub staff_member_id: StaffId,
    pub item_code: String,
    pub quantity: i64,
    pub signature: Option<String>,
    pub confirmed_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliveryCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCancelled {
    pub delivery_id: DeliveryId,
    pub staff_member_id: StaffId,
    pub item_code: String,
    pub quantity: i64,
    pub cancelled_by: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockBelowReorderLevel (a debit took a part to or under its reorder level).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBelowReorderLevel {
    pub part_id: PartId,
    pub code: String,
    pub quantity: i64,
    pub reorder_level: i64,
    pub occurred_at: DateTime<Utc>,
}

/// The payload is the inner event; `event_type` already names the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgerEvent {
    DeliveryConfirmed(DeliveryConfirmed),
    DeliveryCancelled(DeliveryCancelled),
    StockBelowReorderLevel(StockBelowReorderLevel),
}

impl LedgerEvent {
    pub fn delivery_confirmed(record: &DeliveryRecord, actor: ActorId) -> Self {
        Self::DeliveryConfirmed(DeliveryConfirmed {
            delivery_id: record.id,
            staff_member_id: record.line.staff_member_id,
            item_code: record.line.item.code().to_string(),
            quantity: record.line.quantity,
            signature: record.signature.clone(),
            confirmed_by: actor,
            occurred_at: record.confirmed_at.unwrap_or(record.updated_at),
        })
    }

    pub fn delivery_cancelled(record: &DeliveryRecord, actor: ActorId) -> Self {
        Self::DeliveryCancelled(DeliveryCancelled {
            delivery_id: record.id,
            staff_member_id: record.line.staff_member_id,
            item_code: record.line.item.code().to_string(),
            quantity: record.line.quantity,
            cancelled_by: actor,
            occurred_at: record.cancelled_at.unwrap_or(record.updated_at),
        })
    }

    pub fn stock_below_reorder_level(part: &Part, now: DateTime<Utc>) -> Self {
        Self::StockBelowReorderLevel(StockBelowReorderLevel {
            part_id: part.id,
            code: part.code.clone(),
            quantity: part.quantity,
            reorder_level: part.reorder_level,
            occurred_at: now,
        })
    }

    /// The record or part this event is about.
    pub fn subject_id(&self) -> Uuid {
        match self {
            Self::DeliveryConfirmed(e) => *e.delivery_id.as_uuid(),
            Self::DeliveryCancelled(e) => *e.delivery_id.as_uuid(),
            Self::StockBelowReorderLevel(e) => *e.part_id.as_uuid(),
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::DeliveryConfirmed(_) => "delivery.confirmed",
            Self::DeliveryCancelled(_) => "delivery.cancelled",
            Self::StockBelowReorderLevel(_) => "part.below_reorder_level",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            Self::DeliveryConfirmed(e) => e.occurred_at,
            Self::DeliveryCancelled(e) => e.occurred_at,
            Self::StockBelowReorderLevel(e) => e.occurred_at,
        }
    }

    fn recipient(&self) -> Option<String> {
        match self {
            Self::DeliveryConfirmed(e) => Some(e.staff_member_id.to_string()),
            Self::DeliveryCancelled(e) => Some(e.staff_member_id.to_string()),
            Self::StockBelowReorderLevel(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemRef;
    use crate::record::{LedgerLine, RecordContext};

    #[test]
    fn confirmed_event_is_addressed_to_the_recipient() {
        let staff = StaffId::new();
        let line = LedgerLine::new(
            ItemRef::ad_hoc("Door closer", None, Uuid::now_v7()),
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
        let mut record =
            DeliveryRecord::pending(DeliveryId::new(), None, line, Utc::now(), ActorId::new(), Utc::now());
        record
            .confirm(Some("sig".to_string()), ActorId::new(), Utc::now())
            .unwrap();

        let event = LedgerEvent::delivery_confirmed(&record, ActorId::new());
        assert_eq!(event.event_type(), "delivery.confirmed");
        assert_eq!(event.recipient(), Some(staff.to_string()));
        assert_eq!(event.subject_id(), *record.id.as_uuid());
        assert_eq!(event.occurred_at(), record.confirmed_at.unwrap());
    }
}
