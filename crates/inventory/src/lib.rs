//! Inventory ledger domain module.
//!
//! This crate contains the business rules that keep a part's on-hand quantity
//! consistent with the delivery and charge-out records drawing on it, implemented
//! purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod dates;
pub mod delta;
pub mod events;
pub mod item;
pub mod lifecycle;
pub mod part;
pub mod record;

pub use dates::{DatePolicy, DateResolution, PLAIN_DATE_HOUR_UTC, resolve_record_date};
pub use delta::{RecordSnapshot, StockDelta, compute_delta};
pub use events::{DeliveryCancelled, DeliveryConfirmed, LedgerEvent, StockBelowReorderLevel};
pub use item::{AD_HOC_UNIT_COST, ItemRef, LineItem};
pub use lifecycle::Confirmation;
pub use part::{NewPart, Part, PartPatch};
pub use record::{
    ChargeOutRecord, DeliveryRecord, DeliveryStatus, LedgerLine, LineChanges, RecordContext,
    RecordPatch, StockRecord,
};
