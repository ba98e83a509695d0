//! Domain error model.

use thiserror::Error;

use crate::id::PartId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// stock sufficiency, lifecycle state). Storage failures belong to the
/// infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced part or record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A debit would drive a part's on-hand quantity below zero.
    #[error("insufficient stock for part {part_id}: requested {requested}, only {available} available")]
    InsufficientStock {
        part_id: PartId,
        requested: i64,
        available: i64,
    },

    /// The requested lifecycle transition is not allowed from the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: &'static str) -> Self {
        Self::NotFound(what)
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn insufficient_stock(part_id: PartId, requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            part_id,
            requested,
            available,
        }
    }

    /// How many units are missing for an `InsufficientStock` failure.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_reports_shortfall() {
        let err = DomainError::insufficient_stock(PartId::new(), 8, 6);
        assert_eq!(err.shortfall(), Some(2));
        assert!(err.to_string().contains("only 6 available"));
    }

    #[test]
    fn shortfall_is_none_for_other_errors() {
        assert_eq!(DomainError::not_found("part").shortfall(), None);
        assert_eq!(DomainError::not_found("part").to_string(), "part not found");
    }
}
