//! Delivery status transitions.
//!
//! ```text
//! pending ──confirm──▶ delivered      (no stock effect)
//!    │
//!    └────cancel────▶ cancelled       (stock credited back)
//! ```
//!
//! Deletion is not a status: any record can be deleted, and deleting credits back
//! whatever stock the record still holds.

use chrono::{DateTime, Utc};

use stockroom_core::{ActorId, DomainError, DomainResult};

use crate::record::{DeliveryRecord, DeliveryStatus};

/// Outcome of a confirm request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// `pending -> delivered` happened now.
    Confirmed,
    /// Already delivered; nothing was changed.
    AlreadyConfirmed,
}

impl DeliveryRecord {
    /// Marks the delivery as handed over.
    ///
    /// Re-confirming keeps the original signature and timestamp.
    pub fn confirm(
        &mut self,
        signature: Option<String>,
        actor: ActorId,
        now: DateTime<Utc>,
    ) -> DomainResult<Confirmation> {
        match self.status {
            DeliveryStatus::Delivered => Ok(Confirmation::AlreadyConfirmed),
            DeliveryStatus::Cancelled => Err(DomainError::invalid_state(
                "cannot confirm a cancelled delivery",
            )),
            DeliveryStatus::Pending => {
                self.status = DeliveryStatus::Delivered;
                self.confirmed_at = Some(now);
                self.signature = signature
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty());
                self.updated_by = actor;
                self.updated_at = now;
                Ok(Confirmation::Confirmed)
            }
        }
    }

    /// Withdraws a pending delivery. The caller credits the stock back.
    pub fn cancel(&mut self, actor: ActorId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != DeliveryStatus::Pending {
            return Err(DomainError::invalid_state(format!(
                "only pending deliveries can be cancelled (status: {})",
                self.status
            )));
        }
        self.status = DeliveryStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.updated_by = actor;
        self.updated_at = now;
        Ok(())
    }
}
