use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockroom_core::{DomainError, DomainResult, PartId};

use crate::part::Part;

/// Unit cost recorded for items that are not in the catalog.
pub const AD_HOC_UNIT_COST: i64 = 0;

const AD_HOC_CODE_PREFIX: &str = "MANUAL-";

/// What a caller asks to deliver or charge out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineItem {
    /// A catalog part; drawing on it moves stock.
    Catalog { part_id: PartId },
    /// A one-off item bought or sourced outside the catalog; never moves stock.
    AdHoc {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl LineItem {
    pub fn catalog(part_id: PartId) -> Self {
        Self::Catalog { part_id }
    }

    pub fn ad_hoc(name: impl Into<String>) -> Self {
        Self::AdHoc {
            name: name.into(),
            description: None,
        }
    }

    pub fn part_id(&self) -> Option<PartId> {
        match self {
            Self::Catalog { part_id } => Some(*part_id),
            Self::AdHoc { .. } => None,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self {
            Self::Catalog { .. } => Ok(()),
            Self::AdHoc { name, .. } if name.trim().is_empty() => {
                Err(DomainError::validation("ad-hoc item name cannot be empty"))
            }
            Self::AdHoc { .. } => Ok(()),
        }
    }
}

/// The item as stored on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemRef {
    Catalog {
        part_id: PartId,
        code: String,
    },
    AdHoc {
        code: String,
        name: String,
        description: Option<String>,
    },
}

impl ItemRef {
    pub fn catalog(part: &Part) -> Self {
        Self::Catalog {
            part_id: part.id,
            code: part.code.clone(),
        }
    }

    /// Ad-hoc item with a synthesized code derived from `seed` (the record id).
    pub fn ad_hoc(name: &str, description: Option<String>, seed: Uuid) -> Self {
        Self::AdHoc {
            code: synthesize_code(seed),
            name: name.trim().to_string(),
            description,
        }
    }

    pub fn part_id(&self) -> Option<PartId> {
        match self {
            Self::Catalog { part_id, .. } => Some(*part_id),
            Self::AdHoc { .. } => None,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Catalog { code, .. } | Self::AdHoc { code, .. } => code,
        }
    }

    pub fn is_ad_hoc(&self) -> bool {
        matches!(self, Self::AdHoc { .. })
    }

    /// Whether `line` names the same thing this reference already points at.
    ///
    /// Ad-hoc lines are always treated as new items.
    pub fn refers_to(&self, line: &LineItem) -> bool {
        match (self, line) {
            (Self::Catalog { part_id, .. }, LineItem::Catalog { part_id: other }) => {
                part_id == other
            }
            _ => false,
        }
    }
}

// The random tail of a UUIDv7; the leading hex digits are a timestamp.
fn synthesize_code(seed: Uuid) -> String {
    let hex = seed.simple().to_string();
    format!("{AD_HOC_CODE_PREFIX}{}", hex[hex.len() - 12..].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_hoc_codes_are_distinct_per_seed() {
        let a = ItemRef::ad_hoc("Ladder rental", None, Uuid::now_v7());
        let b = ItemRef::ad_hoc("Ladder rental", None, Uuid::now_v7());
        assert!(a.code().starts_with("MANUAL-"));
        assert_eq!(a.code().len(), "MANUAL-".len() + 12);
        assert_ne!(a.code(), b.code());
        assert_eq!(a.part_id(), None);
    }

    #[test]
    fn blank_ad_hoc_name_is_rejected() {
        assert!(LineItem::ad_hoc("  ").validate().is_err());
        assert!(LineItem::ad_hoc("Paint").validate().is_ok());
    }

    #[test]
    fn line_items_deserialize_from_tagged_json() {
        let id = PartId::new();
        let json = serde_json::json!({ "kind": "catalog", "part_id": id.to_string() });
        let line: LineItem = serde_json::from_value(json).unwrap();
        assert_eq!(line, LineItem::catalog(id));

        let json = serde_json::json!({ "kind": "ad_hoc", "name": "Gasket" });
        let line: LineItem = serde_json::from_value(json).unwrap();
        assert_eq!(line.part_id(), None);
    }

    #[test]
    fn refers_to_matches_same_catalog_part_only() {
        let id = PartId::new();
        let item = ItemRef::Catalog {
            part_id: id,
            code: "P-1".to_string(),
        };
        assert!(item.refers_to(&LineItem::catalog(id)));
        assert!(!item.refers_to(&LineItem::catalog(PartId::new())));
        assert!(!item.refers_to(&LineItem::ad_hoc("P-1")));
    }
}
