use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Timelike, Utc};
use proptest::prelude::*;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;

use stockroom_core::{ActorId, DeliveryId, PartId, StaffId};
use stockroom_inventory::{
    DatePolicy, DeliveryStatus, LineItem, NewPart, Part, PartPatch, RecordContext, RecordPatch,
};

use super::*;
use crate::store::{DeliveryFilter, FaultPoint, InMemoryLedgerStore, LedgerStore, StoreError};

fn ledger() -> InventoryLedger<InMemoryLedgerStore> {
    InventoryLedger::new(InMemoryLedgerStore::new(), LedgerSettings::default())
}

fn context(staff: StaffId) -> RecordContext {
    RecordContext {
        staff_member_id: staff,
        building_id: None,
        cost_center_id: None,
        notes: None,
    }
}

fn deliver(part_id: PartId, quantity: i64) -> NewDelivery {
    NewDelivery {
        item: LineItem::catalog(part_id),
        quantity,
        context: context(StaffId::new()),
        date: None,
    }
}

fn quantity_patch(quantity: i64) -> RecordPatch {
    RecordPatch {
        quantity: Some(quantity),
        ..Default::default()
    }
}

async fn stock<S: LedgerStore>(ledger: &InventoryLedger<S>, code: &str, quantity: i64) -> Part {
    ledger
        .create_part(
            NewPart {
                code: code.into(),
                name: format!("Part {code}"),
                quantity,
                reorder_level: 0,
                unit_cost: 250,
            },
            ActorId::new(),
        )
        .await
        .unwrap()
}

async fn on_hand<S: LedgerStore>(ledger: &InventoryLedger<S>, id: PartId) -> i64 {
    ledger.part(id).await.unwrap().quantity
}

#[tokio::test]
async fn delivery_lifecycle_scenario() {
    let ledger = ledger();
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 10).await;

    let r1 = ledger.create_delivery(deliver(p.id, 4), actor).await.unwrap();
    assert_eq!(on_hand(&ledger, p.id).await, 6);
    assert_eq!(r1.status, DeliveryStatus::Pending);

    let err = ledger
        .create_delivery(deliver(p.id, 8), actor)
        .await
        .unwrap_err();
    match err {
        LedgerError::InsufficientStock {
            part_id,
            requested,
            available,
        } => {
            assert_eq!(part_id, p.id);
            assert_eq!(requested, 8);
            assert_eq!(available, 6);
        }
        other => panic!("expected insufficient stock, got {other:?}"),
    }
    assert_eq!(on_hand(&ledger, p.id).await, 6);

    ledger
        .update_delivery(r1.id, quantity_patch(2), actor)
        .await
        .unwrap();
    assert_eq!(on_hand(&ledger, p.id).await, 8);

    let confirmed = ledger
        .confirm_delivery(r1.id, Some("J. Doe".into()), actor)
        .await
        .unwrap();
    assert_eq!(confirmed.status, DeliveryStatus::Delivered);
    assert_eq!(on_hand(&ledger, p.id).await, 8);

    assert!(ledger.delete_delivery(r1.id, actor).await.unwrap());
    assert_eq!(on_hand(&ledger, p.id).await, 10);
    assert!(matches!(
        ledger.delivery(r1.id).await,
        Err(LedgerError::NotFound("delivery"))
    ));
}

/// Counts events per level on the current thread.
#[derive(Clone, Default)]
struct LevelCounter {
    warns: Arc<AtomicUsize>,
    errors: Arc<AtomicUsize>,
}

impl<S: tracing::Subscriber> Layer<S> for LevelCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        match *event.metadata().level() {
            tracing::Level::WARN => self.warns.fetch_add(1, Ordering::SeqCst),
            tracing::Level::ERROR => self.errors.fetch_add(1, Ordering::SeqCst),
            _ => 0,
        };
    }
}

#[tokio::test]
async fn caller_errors_log_at_warn_and_storage_failures_at_error() {
    let counter = LevelCounter::default();
    let _guard =
        tracing::subscriber::set_default(tracing_subscriber::registry().with(counter.clone()));

    let store = InMemoryLedgerStore::new();
    let ledger = InventoryLedger::new(store.clone(), LedgerSettings::default());
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 1).await;

    let err = ledger
        .create_delivery(deliver(p.id, 5), actor)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    let err = ledger.delivery(DeliveryId::new()).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    assert!(counter.warns.load(Ordering::SeqCst) > 0);
    assert_eq!(counter.errors.load(Ordering::SeqCst), 0);

    store.fail_next(FaultPoint::Commit);
    let err = ledger
        .create_delivery(deliver(p.id, 1), actor)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
    assert!(counter.errors.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn failed_batch_debits_nothing() {
    let ledger = ledger();
    let a = stock(&ledger, "A", 5).await;
    let b = stock(&ledger, "B", 1).await;

    let batch = NewBatch {
        lines: vec![
            BatchLine {
                item: LineItem::catalog(a.id),
                quantity: 3,
                notes: None,
            },
            BatchLine {
                item: LineItem::catalog(b.id),
                quantity: 5,
                notes: None,
            },
        ],
        context: context(StaffId::new()),
        date: None,
    };

    let err = ledger.create_batch(batch, ActorId::new()).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientStock { part_id, .. } if part_id == b.id));
    assert_eq!(on_hand(&ledger, a.id).await, 5);
    assert_eq!(on_hand(&ledger, b.id).await, 1);
    assert!(ledger.deliveries(&DeliveryFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn batch_lines_share_context_and_are_individually_editable() {
    let ledger = ledger();
    let actor = ActorId::new();
    let a = stock(&ledger, "A", 5).await;
    let staff = StaffId::new();

    let records = ledger
        .create_batch(
            NewBatch {
                lines: vec![
                    BatchLine {
                        item: LineItem::catalog(a.id),
                        quantity: 2,
                        notes: Some("left bay".into()),
                    },
                    BatchLine {
                        item: LineItem::catalog(a.id),
                        quantity: 3,
                        notes: None,
                    },
                    BatchLine {
                        item: LineItem::ad_hoc("Ceiling tile"),
                        quantity: 12,
                        notes: None,
                    },
                ],
                context: RecordContext {
                    notes: Some("3rd floor".into()),
                    ..context(staff)
                },
                date: Some("2025-06-02".into()),
            },
            actor,
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(on_hand(&ledger, a.id).await, 0);
    let batch_id = records[0].batch_id.unwrap();
    assert!(records.iter().all(|r| r.batch_id == Some(batch_id)));
    assert!(records.iter().all(|r| r.line.staff_member_id == staff));
    assert_eq!(records[0].line.notes.as_deref(), Some("left bay"));
    assert_eq!(records[1].line.notes.as_deref(), Some("3rd floor"));

    ledger.delete_delivery(records[1].id, actor).await.unwrap();
    assert_eq!(on_hand(&ledger, a.id).await, 3);

    let listed = ledger
        .deliveries(&DeliveryFilter {
            batch_id: Some(batch_id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn empty_batch_is_rejected_before_any_transaction() {
    let ledger = ledger();
    let err = ledger
        .create_batch(
            NewBatch {
                lines: vec![],
                context: context(StaffId::new()),
                date: None,
            },
            ActorId::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn deleting_twice_credits_once() {
    let ledger = ledger();
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 10).await;
    let r = ledger.create_delivery(deliver(p.id, 7), actor).await.unwrap();

    ledger.delete_delivery(r.id, actor).await.unwrap();
    let err = ledger.delete_delivery(r.id, actor).await.unwrap_err();

    assert!(matches!(err, LedgerError::NotFound("delivery")));
    assert_eq!(on_hand(&ledger, p.id).await, 10);
}

#[tokio::test]
async fn unit_cost_is_snapshotted_at_creation() {
    let ledger = ledger();
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 10).await;
    let r = ledger.create_delivery(deliver(p.id, 1), actor).await.unwrap();
    assert_eq!(r.line.unit_cost, 250);

    ledger
        .update_part(
            p.id,
            PartPatch {
                unit_cost: Some(999),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap();

    assert_eq!(ledger.delivery(r.id).await.unwrap().line.unit_cost, 250);
    let edited = ledger
        .update_delivery(r.id, quantity_patch(2), actor)
        .await
        .unwrap();
    assert_eq!(edited.line.unit_cost, 250);
}

#[tokio::test]
async fn swapping_parts_moves_stock_between_them() {
    let ledger = ledger();
    let actor = ActorId::new();
    let a = stock(&ledger, "A", 10).await;
    let b = stock(&ledger, "B", 10).await;
    let r = ledger.create_delivery(deliver(a.id, 4), actor).await.unwrap();

    let swapped = ledger
        .update_delivery(
            r.id,
            RecordPatch {
                item: Some(LineItem::catalog(b.id)),
                quantity: Some(6),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap();

    assert_eq!(on_hand(&ledger, a.id).await, 10);
    assert_eq!(on_hand(&ledger, b.id).await, 4);
    assert_eq!(swapped.line.item.code(), "B");
}

#[tokio::test]
async fn failed_debit_after_credit_rolls_back_the_credit() {
    let ledger = ledger();
    let actor = ActorId::new();
    let a = stock(&ledger, "A", 10).await;
    let b = stock(&ledger, "B", 2).await;
    let r = ledger.create_delivery(deliver(a.id, 4), actor).await.unwrap();

    let err = ledger
        .update_delivery(
            r.id,
            RecordPatch {
                item: Some(LineItem::catalog(b.id)),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::InsufficientStock { .. }));
    assert_eq!(on_hand(&ledger, a.id).await, 6);
    assert_eq!(on_hand(&ledger, b.id).await, 2);
    assert_eq!(ledger.delivery(r.id).await.unwrap(), r);
}

#[tokio::test]
async fn credit_that_would_overflow_is_rejected_and_rolled_back() {
    let ledger = ledger();
    let actor = ActorId::new();
    let p = stock(&ledger, "BULK", i64::MAX).await;

    // Debits at the top of the range are fine.
    let r = ledger.create_delivery(deliver(p.id, 5), actor).await.unwrap();
    assert_eq!(on_hand(&ledger, p.id).await, i64::MAX - 5);

    ledger.set_part_quantity(p.id, i64::MAX, actor).await.unwrap();

    let err = ledger.delete_delivery(r.id, actor).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)), "got {err:?}");
    assert_eq!(on_hand(&ledger, p.id).await, i64::MAX);
    assert_eq!(ledger.delivery(r.id).await.unwrap(), r);

    let err = ledger.cancel_delivery(r.id, actor).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)), "got {err:?}");
    assert_eq!(
        ledger.delivery(r.id).await.unwrap().status,
        DeliveryStatus::Pending
    );
}

#[tokio::test]
async fn field_only_edits_leave_stock_alone() {
    let ledger = ledger();
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 10).await;
    let r = ledger.create_delivery(deliver(p.id, 4), actor).await.unwrap();

    let edited = ledger
        .update_delivery(
            r.id,
            RecordPatch {
                notes: Some("  left at reception ".into()),
                date: Some("2025-02-03".into()),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap();

    assert_eq!(on_hand(&ledger, p.id).await, 6);
    assert_eq!(edited.line.notes.as_deref(), Some("left at reception"));
    assert_eq!(edited.delivered_at.hour(), 12);
}

#[tokio::test]
async fn write_failures_roll_back_everything() {
    let store = InMemoryLedgerStore::new();
    let ledger = InventoryLedger::new(store.clone(), LedgerSettings::default());
    let actor = ActorId::new();
    let a = stock(&ledger, "A", 10).await;
    let b = stock(&ledger, "B", 10).await;

    // Part written, record insert fails.
    store.fail_next(FaultPoint::InsertDelivery);
    let err = ledger.create_delivery(deliver(a.id, 3), actor).await.unwrap_err();
    assert!(matches!(err, LedgerError::Storage(StoreError::Unavailable(_))));
    assert!(err.is_retryable());
    assert_eq!(on_hand(&ledger, a.id).await, 10);
    assert!(ledger.deliveries(&DeliveryFilter::default()).await.unwrap().is_empty());

    let r = ledger.create_delivery(deliver(a.id, 3), actor).await.unwrap();

    // Both parts written, record update fails.
    store.fail_next(FaultPoint::UpdateDelivery);
    ledger
        .update_delivery(
            r.id,
            RecordPatch {
                item: Some(LineItem::catalog(b.id)),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap_err();
    assert_eq!(on_hand(&ledger, a.id).await, 7);
    assert_eq!(on_hand(&ledger, b.id).await, 10);

    // Quantity write fails before the record is touched.
    store.fail_next(FaultPoint::SetPartQuantity);
    ledger.delete_delivery(r.id, actor).await.unwrap_err();
    assert_eq!(on_hand(&ledger, a.id).await, 7);
    assert!(ledger.delivery(r.id).await.is_ok());

    // Everything written, commit fails.
    store.fail_next(FaultPoint::Commit);
    ledger.cancel_delivery(r.id, actor).await.unwrap_err();
    assert_eq!(on_hand(&ledger, a.id).await, 7);
    assert_eq!(
        ledger.delivery(r.id).await.unwrap().status,
        DeliveryStatus::Pending
    );
    assert!(store.outbox().await.is_empty());
}

#[tokio::test]
async fn cancel_restocks_and_later_delete_adds_nothing() {
    let store = InMemoryLedgerStore::new();
    let ledger = InventoryLedger::new(store.clone(), LedgerSettings::default());
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 10).await;
    let r = ledger.create_delivery(deliver(p.id, 4), actor).await.unwrap();

    let cancelled = ledger.cancel_delivery(r.id, actor).await.unwrap();
    assert_eq!(cancelled.status, DeliveryStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(on_hand(&ledger, p.id).await, 10);

    let err = ledger
        .update_delivery(r.id, quantity_patch(1), actor)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
    assert!(matches!(
        ledger.confirm_delivery(r.id, None, actor).await,
        Err(LedgerError::InvalidState(_))
    ));
    assert!(matches!(
        ledger.cancel_delivery(r.id, actor).await,
        Err(LedgerError::InvalidState(_))
    ));

    ledger.delete_delivery(r.id, actor).await.unwrap();
    assert_eq!(on_hand(&ledger, p.id).await, 10);

    let outbox = store.outbox().await;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].message.event_type, "delivery.cancelled");
}

#[tokio::test]
async fn reconfirming_is_a_no_op() {
    let store = InMemoryLedgerStore::new();
    let ledger = InventoryLedger::new(store.clone(), LedgerSettings::default());
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 10).await;
    let r = ledger.create_delivery(deliver(p.id, 1), actor).await.unwrap();

    let first = ledger
        .confirm_delivery(r.id, Some("first".into()), actor)
        .await
        .unwrap();
    let second = ledger
        .confirm_delivery(r.id, Some("second".into()), ActorId::new())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(second.signature.as_deref(), Some("first"));

    let outbox = store.outbox().await;
    assert_eq!(outbox.len(), 1);
    let message = &outbox[0].message;
    assert_eq!(message.event_type, "delivery.confirmed");
    assert_eq!(message.recipient, Some(r.line.staff_member_id.to_string()));
    assert_eq!(message.payload["signature"], "first");
}

#[tokio::test]
async fn ad_hoc_items_never_move_stock() {
    let ledger = ledger();
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 1).await;

    let r = ledger
        .create_delivery(
            NewDelivery {
                item: LineItem::AdHoc {
                    name: "Brass plaque".into(),
                    description: Some("engraved".into()),
                },
                quantity: 500,
                context: context(StaffId::new()),
                date: None,
            },
            actor,
        )
        .await
        .unwrap();

    assert!(r.line.item.is_ad_hoc());
    assert!(r.line.item.code().starts_with("MANUAL-"));
    assert_eq!(r.line.unit_cost, 0);
    assert_eq!(ledger.parts().await.unwrap(), vec![p.clone()]);

    // Swapping an ad-hoc record onto a catalog part debits it for the first time.
    ledger
        .update_delivery(
            r.id,
            RecordPatch {
                item: Some(LineItem::catalog(p.id)),
                quantity: Some(1),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap();
    assert_eq!(on_hand(&ledger, p.id).await, 0);
}

#[tokio::test]
async fn validation_happens_before_the_store_is_touched() {
    let store = InMemoryLedgerStore::new();
    let ledger = InventoryLedger::new(store.clone(), LedgerSettings::default());
    let p = stock(&ledger, "P", 10).await;

    // A failing commit would surface if a transaction were opened.
    store.fail_next(FaultPoint::Commit);
    let err = ledger
        .create_delivery(deliver(p.id, 0), ActorId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    // The fault is still armed, so the next real transaction trips it.
    let err = ledger
        .create_delivery(deliver(p.id, 1), ActorId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage(_)));
    assert_eq!(on_hand(&ledger, p.id).await, 10);
}

#[tokio::test]
async fn unknown_part_is_not_found() {
    let ledger = ledger();
    let err = ledger
        .create_delivery(deliver(PartId::new(), 1), ActorId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound("part")));
}

#[tokio::test]
async fn strict_policy_rejects_unparseable_dates() {
    let strict = InventoryLedger::new(
        InMemoryLedgerStore::new(),
        LedgerSettings {
            date_policy: DatePolicy::Strict,
            low_stock_alerts: true,
        },
    );
    let p = stock(&strict, "P", 10).await;
    let mut input = deliver(p.id, 1);
    input.date = Some("next tuesday".into());

    let err = strict
        .create_delivery(input.clone(), ActorId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(on_hand(&strict, p.id).await, 10);

    let lenient = ledger();
    let q = stock(&lenient, "Q", 10).await;
    input.item = LineItem::catalog(q.id);
    let before = Utc::now();
    let r = lenient.create_delivery(input, ActorId::new()).await.unwrap();
    assert!(r.delivered_at >= before);
}

#[tokio::test]
async fn monthly_window_uses_noon_normalized_dates() {
    let ledger = ledger();
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 10).await;
    for date in ["2025-01-31", "2025-02-01", "2025-02-28", "2025-03-01"] {
        let mut input = deliver(p.id, 1);
        input.date = Some(date.into());
        ledger.create_delivery(input, actor).await.unwrap();
    }

    let february = ledger
        .deliveries(&DeliveryFilter {
            from: Some(Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(february.len(), 2);
    assert!(february[0].delivered_at > february[1].delivered_at);
}

#[tokio::test]
async fn crossing_the_reorder_level_queues_one_alert() {
    let store = InMemoryLedgerStore::new();
    let ledger = InventoryLedger::new(store.clone(), LedgerSettings::default());
    let actor = ActorId::new();
    let p = ledger
        .create_part(
            NewPart {
                code: "FLT".into(),
                name: "Filter".into(),
                quantity: 6,
                reorder_level: 3,
                unit_cost: 100,
            },
            actor,
        )
        .await
        .unwrap();

    ledger.create_delivery(deliver(p.id, 2), actor).await.unwrap();
    assert!(store.outbox().await.is_empty());

    ledger.create_delivery(deliver(p.id, 1), actor).await.unwrap();
    ledger.create_delivery(deliver(p.id, 1), actor).await.unwrap();

    let outbox = store.outbox().await;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].message.event_type, "part.below_reorder_level");
    assert_eq!(outbox[0].message.payload["quantity"], 3);
    assert_eq!(ledger.low_stock_parts().await.unwrap().len(), 1);
}

#[tokio::test]
async fn alerts_can_be_switched_off() {
    let store = InMemoryLedgerStore::new();
    let ledger = InventoryLedger::new(
        store.clone(),
        LedgerSettings {
            date_policy: DatePolicy::Lenient,
            low_stock_alerts: false,
        },
    );
    let p = stock(&ledger, "P", 1).await;
    ledger
        .create_delivery(deliver(p.id, 1), ActorId::new())
        .await
        .unwrap();
    assert!(store.outbox().await.is_empty());
}

#[tokio::test]
async fn part_catalog_maintenance() {
    let ledger = ledger();
    let actor = ActorId::new();
    let p = stock(&ledger, "P-1", 10).await;

    let err = ledger
        .create_part(
            NewPart {
                code: "P-1".into(),
                name: "Duplicate".into(),
                quantity: 0,
                reorder_level: 0,
                unit_cost: 0,
            },
            actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let adjusted = ledger.set_part_quantity(p.id, 42, actor).await.unwrap();
    assert_eq!(adjusted.quantity, 42);
    assert!(matches!(
        ledger.set_part_quantity(p.id, -1, actor).await,
        Err(LedgerError::Validation(_))
    ));

    let renamed = ledger
        .update_part(
            p.id,
            PartPatch {
                name: Some("Pipe clamp".into()),
                reorder_level: Some(50),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap();
    assert_eq!(renamed.quantity, 42);
    assert_eq!(renamed.name, "Pipe clamp");
    assert_eq!(ledger.low_stock_parts().await.unwrap(), vec![renamed]);
}

#[tokio::test]
async fn charge_outs_follow_the_same_stock_rules() {
    let ledger = ledger();
    let actor = ActorId::new();
    let p = stock(&ledger, "P", 10).await;

    let c = ledger
        .create_charge_out(
            NewChargeOut {
                item: LineItem::catalog(p.id),
                quantity: 4,
                context: context(StaffId::new()),
                date: Some("2025-04-10".into()),
            },
            actor,
        )
        .await
        .unwrap();
    assert_eq!(on_hand(&ledger, p.id).await, 6);
    assert_eq!(c.issued_at.hour(), 12);

    let err = ledger
        .update_charge_out(c.id, quantity_patch(11), actor)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientStock { requested: 7, available: 6, .. }));

    ledger
        .update_charge_out(c.id, quantity_patch(10), actor)
        .await
        .unwrap();
    assert_eq!(on_hand(&ledger, p.id).await, 0);

    assert!(ledger.delete_charge_out(c.id, actor).await.unwrap());
    assert_eq!(on_hand(&ledger, p.id).await, 10);
    assert!(matches!(
        ledger.charge_out(c.id).await,
        Err(LedgerError::NotFound("charge-out"))
    ));
}

#[tokio::test]
async fn charge_out_part_swap_moves_stock_or_rolls_back() {
    let ledger = ledger();
    let actor = ActorId::new();
    let a = stock(&ledger, "A", 10).await;
    let b = stock(&ledger, "B", 10).await;
    let short = stock(&ledger, "C", 1).await;

    let c = ledger
        .create_charge_out(
            NewChargeOut {
                item: LineItem::catalog(a.id),
                quantity: 3,
                context: context(StaffId::new()),
                date: None,
            },
            actor,
        )
        .await
        .unwrap();
    assert_eq!(on_hand(&ledger, a.id).await, 7);

    let swapped = ledger
        .update_charge_out(
            c.id,
            RecordPatch {
                item: Some(LineItem::catalog(b.id)),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap();
    assert_eq!(on_hand(&ledger, a.id).await, 10);
    assert_eq!(on_hand(&ledger, b.id).await, 7);
    assert_eq!(swapped.line.item.code(), "B");

    let err = ledger
        .update_charge_out(
            c.id,
            RecordPatch {
                item: Some(LineItem::catalog(short.id)),
                ..Default::default()
            },
            actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientStock { requested: 3, available: 1, .. }
    ));
    assert_eq!(on_hand(&ledger, b.id).await, 7);
    assert_eq!(on_hand(&ledger, short.id).await, 1);
    assert_eq!(ledger.charge_out(c.id).await.unwrap(), swapped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_debits_never_overdraw() {
    let ledger = Arc::new(ledger());
    let part_id = stock(&*ledger, "P", 5).await.id;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .create_delivery(deliver(part_id, 3), ActorId::new())
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientStock { available, .. }) => assert_eq!(available, 2),
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(on_hand(&*ledger, part_id).await, 2);
}

#[derive(Debug, Clone)]
enum Op {
    Create(i64),
    Update(usize, i64),
    Delete(usize),
    Cancel(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..8).prop_map(Op::Create),
        (any::<usize>(), 1i64..8).prop_map(|(i, q)| Op::Update(i, q)),
        any::<usize>().prop_map(Op::Delete),
        any::<usize>().prop_map(Op::Cancel),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stock_is_conserved_across_any_sequence(initial in 0i64..20, ops in prop::collection::vec(op(), 1..25)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let ledger = ledger();
            let actor = ActorId::new();
            let p = stock(&ledger, "P", initial).await;
            let mut ids = Vec::new();

            for op in ops {
                let before = on_hand(&ledger, p.id).await;
                let outcome = match op {
                    Op::Create(q) => ledger
                        .create_delivery(deliver(p.id, q), actor)
                        .await
                        .map(|r| ids.push(r.id)),
                    Op::Update(i, q) if !ids.is_empty() => ledger
                        .update_delivery(ids[i % ids.len()], quantity_patch(q), actor)
                        .await
                        .map(|_| ()),
                    Op::Delete(i) if !ids.is_empty() => {
                        let id = ids.remove(i % ids.len());
                        ledger.delete_delivery(id, actor).await.map(|_| ())
                    }
                    Op::Cancel(i) if !ids.is_empty() => ledger
                        .cancel_delivery(ids[i % ids.len()], actor)
                        .await
                        .map(|_| ()),
                    _ => Ok(()),
                };

                let after = on_hand(&ledger, p.id).await;
                prop_assert!(after >= 0);
                if outcome.is_err() {
                    prop_assert_eq!(after, before);
                }

                let held: i64 = ledger
                    .deliveries(&DeliveryFilter::default())
                    .await
                    .unwrap()
                    .iter()
                    .filter(|r| r.status.is_active())
                    .map(|r| r.line.quantity)
                    .sum();
                prop_assert_eq!(after, initial - held);
            }
            Ok(())
        })?;
    }
}
