use thiserror::Error;

use stockroom_core::{DomainError, PartId};

use crate::store::StoreError;

/// Errors returned by [`InventoryLedger`](super::InventoryLedger) operations.
///
/// Every variant except `Storage` is the caller's problem and is never worth
/// retrying as-is. `Storage` errors leave no partial state behind, so retrying
/// the whole operation is safe when [`LedgerError::is_retryable`] says so.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient stock for part {part_id}: requested {requested}, only {available} available")]
    InsufficientStock {
        part_id: PartId,
        requested: i64,
        available: i64,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// How many units were missing, for insufficient-stock errors.
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            Self::InsufficientStock {
                requested,
                available,
                ..
            } => Some(requested - available),
            _ => None,
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => Self::Validation(msg),
            DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::NotFound(what) => Self::NotFound(what),
            DomainError::InsufficientStock {
                part_id,
                requested,
                available,
            } => Self::InsufficientStock {
                part_id,
                requested,
                available,
            },
            DomainError::InvalidState(msg) => Self::InvalidState(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_meaning() {
        let part_id = PartId::new();
        let err = LedgerError::from(DomainError::insufficient_stock(part_id, 8, 6));
        assert_eq!(err.shortfall(), Some(2));
        assert!(!err.is_retryable());

        assert!(matches!(
            LedgerError::from(DomainError::invalid_id("PartId: bad")),
            LedgerError::Validation(_)
        ));
    }

    #[test]
    fn only_transient_storage_failures_are_retryable() {
        assert!(LedgerError::from(StoreError::Conflict("deadlock".into())).is_retryable());
        assert!(!LedgerError::from(StoreError::Corrupt("bad row".into())).is_retryable());
        assert!(!LedgerError::NotFound("delivery").is_retryable());
    }
}
