use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, PartId};

/// A catalog part and its on-hand stock.
///
/// `quantity` only moves through ledger deltas (`apply_delta`) or the explicit
/// inventory-adjustment override (`override_quantity`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub code: String,
    pub name: String,
    pub quantity: i64,
    pub reorder_level: i64,
    /// Unit cost in minor currency units.
    pub unit_cost: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a catalog part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPart {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub reorder_level: i64,
    #[serde(default)]
    pub unit_cost: i64,
}

/// Catalog edits. Quantity is deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartPatch {
    pub name: Option<String>,
    pub unit_cost: Option<i64>,
    pub reorder_level: Option<i64>,
}

impl Part {
    pub fn register(id: PartId, input: NewPart, now: DateTime<Utc>) -> DomainResult<Self> {
        let code = input.code.trim();
        if code.is_empty() {
            return Err(DomainError::validation("part code cannot be empty"));
        }
        if input.name.trim().is_empty() {
            return Err(DomainError::validation("part name cannot be empty"));
        }
        ensure_non_negative("quantity", input.quantity)?;
        ensure_non_negative("reorder_level", input.reorder_level)?;
        ensure_non_negative("unit_cost", input.unit_cost)?;

        Ok(Self {
            id,
            code: code.to_string(),
            name: input.name.trim().to_string(),
            quantity: input.quantity,
            reorder_level: input.reorder_level,
            unit_cost: input.unit_cost,
            created_at: now,
            updated_at: now,
        })
    }

    /// Quantity after applying a signed delta, or `InsufficientStock` when the
    /// result would be negative. A result past `i64::MAX` is a validation
    /// error. Does not mutate.
    pub fn apply_delta(&self, delta: i64) -> DomainResult<i64> {
        let next = self.quantity.checked_add(delta).ok_or_else(|| {
            DomainError::validation(format!(
                "quantity of part {} would overflow: {} + {delta}",
                self.code, self.quantity
            ))
        })?;
        if next < 0 {
            return Err(DomainError::insufficient_stock(self.id, -delta, self.quantity));
        }
        Ok(next)
    }

    pub fn is_below_reorder_level(&self) -> bool {
        self.quantity <= self.reorder_level
    }

    pub fn apply_patch(&mut self, patch: PartPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                return Err(DomainError::validation("part name cannot be empty"));
            }
            self.name = name.trim().to_string();
        }
        if let Some(cost) = patch.unit_cost {
            ensure_non_negative("unit_cost", cost)?;
            self.unit_cost = cost;
        }
        if let Some(level) = patch.reorder_level {
            ensure_non_negative("reorder_level", level)?;
            self.reorder_level = level;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Inventory-adjustment path: sets the count outright (stocktake, receiving).
    pub fn override_quantity(&mut self, quantity: i64, now: DateTime<Utc>) -> DomainResult<()> {
        ensure_non_negative("quantity", quantity)?;
        self.quantity = quantity;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Part {
    type Id = PartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn ensure_non_negative(field: &str, value: i64) -> DomainResult<()> {
    if value < 0 {
        return Err(DomainError::validation(format!("{field} cannot be negative")));
    }
    Ok(())
}
