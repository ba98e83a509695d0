//! `stockroom-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the `Entity` trait and the shared error taxonomy.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    ActorId, BatchId, BuildingId, ChargeOutId, CostCenterId, DeliveryId, OutboxId, PartId,
    StaffId,
};
