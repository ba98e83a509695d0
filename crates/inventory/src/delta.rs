//! Quantity-delta computation.
//!
//! Given the stock a record held before a mutation and the stock it holds after,
//! produce the signed adjustments each part needs. Positive deltas credit stock
//! back, negative deltas debit it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockroom_core::PartId;

/// Stock held by one active, catalog-backed record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub part_id: PartId,
    pub quantity: i64,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub part_id: PartId,
    pub delta: i64,
}

/// Deltas taking a part from `before` to `after`.
///
/// - create (`before = None`): debit `after.quantity`
/// - delete (`after = None`): credit `before.quantity`
/// - same part: one delta of `before.quantity - after.quantity`
/// - part changed: credit the old part, debit the new one
///
/// Output is ordered by part id (the lock order) and never contains zero deltas.
pub fn compute_delta(
    before: Option<&RecordSnapshot>,
    after: Option<&RecordSnapshot>,
) -> Vec<StockDelta> {
    let mut net = BTreeMap::new();
    if let Some(b) = before {
        *net.entry(b.part_id).or_insert(0) += b.quantity;
    }
    if let Some(a) = after {
        *net.entry(a.part_id).or_insert(0) -= a.quantity;
    }
    net.into_iter()
        .filter(|(_, delta)| *delta != 0)
        .map(|(part_id, delta)| StockDelta { part_id, delta })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn snap(part_id: PartId, quantity: i64) -> RecordSnapshot {
        RecordSnapshot { part_id, quantity }
    }

    #[test]
    fn create_debits_the_new_quantity() {
        let p = PartId::new();
        assert_eq!(
            compute_delta(None, Some(&snap(p, 4))),
            vec![StockDelta { part_id: p, delta: -4 }]
        );
    }

    #[test]
    fn delete_credits_the_old_quantity() {
        let p = PartId::new();
        assert_eq!(
            compute_delta(Some(&snap(p, 4)), None),
            vec![StockDelta { part_id: p, delta: 4 }]
        );
    }

    #[test]
    fn same_part_update_moves_only_the_difference() {
        let p = PartId::new();
        assert_eq!(
            compute_delta(Some(&snap(p, 4)), Some(&snap(p, 2))),
            vec![StockDelta { part_id: p, delta: 2 }]
        );
        assert_eq!(
            compute_delta(Some(&snap(p, 2)), Some(&snap(p, 7))),
            vec![StockDelta { part_id: p, delta: -5 }]
        );
        assert!(compute_delta(Some(&snap(p, 3)), Some(&snap(p, 3))).is_empty());
    }

    #[test]
    fn part_change_credits_old_and_debits_new() {
        let old = PartId::new();
        let new = PartId::new();
        let deltas = compute_delta(Some(&snap(old, 3)), Some(&snap(new, 5)));
        assert_eq!(deltas.len(), 2);
        assert!(deltas.contains(&StockDelta { part_id: old, delta: 3 }));
        assert!(deltas.contains(&StockDelta { part_id: new, delta: -5 }));
        assert!(deltas.windows(2).all(|w| w[0].part_id < w[1].part_id));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create { part: usize, quantity: i64 },
        Update { record: usize, part: usize, quantity: i64 },
        Delete { record: usize },
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..3, 1i64..20).prop_map(|(part, quantity)| Op::Create { part, quantity }),
            (0usize..8, 0usize..3, 1i64..20)
                .prop_map(|(record, part, quantity)| Op::Update { record, part, quantity }),
            (0usize..8).prop_map(|record| Op::Delete { record }),
        ]
    }

    // Applies deltas all-or-nothing, the way a ledger transaction does.
    fn apply(stock: &mut BTreeMap<PartId, i64>, deltas: &[StockDelta]) -> bool {
        let mut next = stock.clone();
        for d in deltas {
            let q = next.get_mut(&d.part_id).unwrap();
            if *q + d.delta < 0 {
                return false;
            }
            *q += d.delta;
        }
        *stock = next;
        true
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: on-hand stock always equals the initial stock minus what the
        /// surviving records hold, and never goes negative.
        #[test]
        fn stock_is_conserved_and_never_negative(
            initial in prop::collection::vec(0i64..30, 3),
            ops in prop::collection::vec(op(), 1..40)
        ) {
            let parts: Vec<PartId> = (0..3).map(|_| PartId::new()).collect();
            let mut stock: BTreeMap<PartId, i64> =
                parts.iter().copied().zip(initial.iter().copied()).collect();
            let mut records: Vec<RecordSnapshot> = Vec::new();

            for op in ops {
                match op {
                    Op::Create { part, quantity } => {
                        let after = snap(parts[part], quantity);
                        if apply(&mut stock, &compute_delta(None, Some(&after))) {
                            records.push(after);
                        }
                    }
                    Op::Update { record, part, quantity } => {
                        if records.is_empty() {
                            continue;
                        }
                        let idx = record % records.len();
                        let after = snap(parts[part], quantity);
                        if apply(&mut stock, &compute_delta(Some(&records[idx]), Some(&after))) {
                            records[idx] = after;
                        }
                    }
                    Op::Delete { record } => {
                        if records.is_empty() {
                            continue;
                        }
                        let idx = record % records.len();
                        prop_assert!(apply(&mut stock, &compute_delta(Some(&records[idx]), None)));
                        records.remove(idx);
                    }
                }

                for (i, part) in parts.iter().enumerate() {
                    let held: i64 = records
                        .iter()
                        .filter(|r| r.part_id == *part)
                        .map(|r| r.quantity)
                        .sum();
                    prop_assert!(stock[part] >= 0);
                    prop_assert_eq!(stock[part], initial[i] - held);
                }
            }
        }
    }
}
