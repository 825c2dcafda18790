//! Nullifier non-existence reads.
//!
//! Proving a value absent takes two half-proofs: a gap in the pending set
//! and a straddling low leaf in the settled tree. The pending set is checked
//! through a hinted sorted permutation so each read's gap is a constant-size
//! comparison instead of a scan.

use ethereum_types::H256;
use merkle_forest::indexed_tree::IndexedLeaf;

use crate::{
    tx::Nullifier,
    validation::{
        hints::{NullifierNonExistenceHints, SortedPendingNullifiers},
        requests::ScopedReadRequest,
        ReadRequestKind, ValidationError,
    },
    world::TreeSnapshot,
};

const CATEGORY: ReadRequestKind = ReadRequestKind::NullifierNonExistent;

/// Checks that `sorted` really is the pending set rearranged into strictly
/// ascending order.
///
/// Equal lengths plus an injective index mapping that preserves values make
/// it a permutation; strict ascent additionally rejects duplicated pending
/// values.
fn verify_sorted_permutation(
    pending: &[Nullifier],
    sorted: &SortedPendingNullifiers,
) -> Result<(), ValidationError> {
    if sorted.sorted_values.len() != pending.len() {
        return Err(ValidationError::PermutationLengthMismatch {
            hinted: sorted.sorted_values.len(),
            pending: pending.len(),
        });
    }
    if sorted.sorted_index_hints.len() != pending.len() {
        return Err(ValidationError::PermutationLengthMismatch {
            hinted: sorted.sorted_index_hints.len(),
            pending: pending.len(),
        });
    }

    let mut seen = vec![false; pending.len()];
    for (position, entry) in pending.iter().enumerate() {
        let hint = sorted.sorted_index_hints[position];
        if hint >= pending.len() || seen[hint] || sorted.sorted_values[hint] != entry.value {
            return Err(ValidationError::BadPermutation { position });
        }
        seen[hint] = true;
    }

    for position in 1..sorted.sorted_values.len() {
        if sorted.sorted_values[position] <= sorted.sorted_values[position - 1] {
            return Err(ValidationError::UnsortedPendingNullifiers { position });
        }
    }
    Ok(())
}

pub(crate) fn validate_nullifier_non_existence(
    requests: &[ScopedReadRequest],
    hints: &NullifierNonExistenceHints,
    pending: &[Nullifier],
    snapshot: TreeSnapshot,
) -> Result<(), ValidationError> {
    if requests.is_empty() {
        return Ok(());
    }

    verify_sorted_permutation(pending, &hints.sorted_pending)?;
    let sorted = &hints.sorted_pending.sorted_values;

    for (index, request) in requests.iter().enumerate() {
        let siloed = request.siloed_value();

        // Gap in the pending set: the hinted insertion point must have
        // strictly-smaller and strictly-larger neighbors.
        let insert_at = *hints
            .next_pending_indices
            .get(index)
            .ok_or(ValidationError::MissingHint {
                category: CATEGORY,
                index,
            })?;
        let gap_holds = insert_at <= sorted.len()
            && (insert_at == 0 || sorted[insert_at - 1] < siloed)
            && (insert_at == sorted.len() || sorted[insert_at] > siloed);
        if !gap_holds {
            return Err(ValidationError::BadPendingGap { index });
        }

        // Absence from the settled tree: a proven low leaf straddling the
        // value.
        let low = hints
            .low_leaf_hints
            .get(index)
            .ok_or(ValidationError::MissingHint {
                category: CATEGORY,
                index,
            })?;
        let straddles = low.low_leaf_preimage.nullifier < siloed
            && (low.low_leaf_preimage.next_nullifier == H256::zero()
                || low.low_leaf_preimage.next_nullifier > siloed);
        if !straddles {
            return Err(ValidationError::BadLowLeaf {
                category: CATEGORY,
                index,
            });
        }
        if !low
            .membership
            .proves(low.low_leaf_preimage.hash(), snapshot.root)
        {
            return Err(ValidationError::BadMembershipProof {
                category: CATEGORY,
                index,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ethereum_types::Address;
    use merkle_forest::indexed_tree::{IndexedTree, NullifierLeafPreimage};

    use super::*;
    use crate::validation::hints::{MembershipHint, NonMembershipHint};

    fn pending_set(values: &[u64]) -> Vec<Nullifier> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Nullifier {
                value: H256::from_low_u64_be(*v),
                counter: i as u32,
            })
            .collect()
    }

    fn sorted_hints_for(pending: &[Nullifier]) -> SortedPendingNullifiers {
        let mut order: Vec<usize> = (0..pending.len()).collect();
        order.sort_by_key(|i| pending[*i].value);

        let mut sorted = SortedPendingNullifiers {
            sorted_values: order.iter().map(|i| pending[*i].value).collect(),
            sorted_index_hints: vec![0; pending.len()],
        };
        for (sorted_position, original) in order.iter().enumerate() {
            sorted.sorted_index_hints[*original] = sorted_position;
        }
        sorted
    }

    #[test]
    fn an_honest_permutation_verifies() {
        let pending = pending_set(&[30, 10, 20]);
        let sorted = sorted_hints_for(&pending);
        assert_eq!(sorted.sorted_values[0], H256::from_low_u64_be(10));
        assert_eq!(verify_sorted_permutation(&pending, &sorted), Ok(()));
    }

    #[test]
    fn a_repeated_index_hint_is_not_a_permutation() {
        let pending = pending_set(&[30, 10]);
        let mut sorted = sorted_hints_for(&pending);
        sorted.sorted_index_hints = vec![1, 1];
        assert_eq!(
            verify_sorted_permutation(&pending, &sorted),
            Err(ValidationError::BadPermutation { position: 1 })
        );
    }

    #[test]
    fn a_descending_pair_is_rejected() {
        let pending = pending_set(&[30, 10]);
        let sorted = SortedPendingNullifiers {
            sorted_values: vec![H256::from_low_u64_be(30), H256::from_low_u64_be(10)],
            sorted_index_hints: vec![0, 1],
        };
        assert_eq!(
            verify_sorted_permutation(&pending, &sorted),
            Err(ValidationError::UnsortedPendingNullifiers { position: 1 })
        );
    }

    #[test]
    fn a_short_hint_is_a_length_mismatch() {
        let pending = pending_set(&[30, 10]);
        let sorted = SortedPendingNullifiers {
            sorted_values: vec![H256::from_low_u64_be(10)],
            sorted_index_hints: vec![1, 0],
        };
        assert_eq!(
            verify_sorted_permutation(&pending, &sorted),
            Err(ValidationError::PermutationLengthMismatch {
                hinted: 1,
                pending: 2,
            })
        );
    }

    #[test]
    fn zero_reads_skip_the_permutation_entirely() {
        let pending = pending_set(&[30, 10]);
        assert_eq!(
            validate_nullifier_non_existence(
                &[],
                &NullifierNonExistenceHints::default(),
                &pending,
                TreeSnapshot::default(),
            ),
            Ok(())
        );
    }

    #[test]
    fn a_value_absent_from_both_sets_verifies() {
        let contract = Address::from_low_u64_be(0xabcd);
        let read = ScopedReadRequest {
            value: H256::from_low_u64_be(42),
            contract_address: contract,
            counter: 5,
        };
        let siloed = read.siloed_value();

        // Pending set of unrelated values.
        let pending = pending_set(&[1000, 2000]);
        let sorted_pending = sorted_hints_for(&pending);
        let insert_at = sorted_pending
            .sorted_values
            .iter()
            .position(|v| *v > siloed)
            .unwrap_or(sorted_pending.sorted_values.len());

        // Settled tree of unrelated values.
        let mut tree: IndexedTree<NullifierLeafPreimage> = IndexedTree::new(8);
        tree.insert(NullifierLeafPreimage::new(H256::from_low_u64_be(3000)))
            .unwrap();
        let snapshot = TreeSnapshot {
            root: tree.root(),
            next_available_leaf_index: tree.size(),
        };
        let low = tree.find_low_leaf(ethereum_types::U256::from_big_endian(siloed.as_bytes()));
        assert!(!low.already_present);
        let low_hint = NonMembershipHint {
            low_leaf_preimage: tree.leaf_preimage(low.index).unwrap(),
            membership: MembershipHint {
                leaf_index: low.index,
                sibling_path: tree.sibling_path(low.index).unwrap(),
            },
        };

        let hints = NullifierNonExistenceHints {
            sorted_pending,
            next_pending_indices: vec![insert_at],
            low_leaf_hints: vec![low_hint],
        };
        assert_eq!(
            validate_nullifier_non_existence(&[read], &hints, &pending, snapshot),
            Ok(())
        );
    }

    #[test]
    fn a_value_sitting_in_the_pending_set_cannot_prove_absence() {
        let read = ScopedReadRequest {
            value: H256::from_low_u64_be(42),
            contract_address: Address::from_low_u64_be(0xabcd),
            counter: 5,
        };
        let pending = vec![Nullifier {
            value: read.siloed_value(),
            counter: 1,
        }];
        let sorted_pending = sorted_hints_for(&pending);

        // No insertion point works when the value itself is pending.
        for insert_at in 0..=pending.len() {
            let hints = NullifierNonExistenceHints {
                sorted_pending: sorted_pending.clone(),
                next_pending_indices: vec![insert_at],
                low_leaf_hints: vec![NonMembershipHint::default()],
            };
            assert_eq!(
                validate_nullifier_non_existence(
                    &[read],
                    &hints,
                    &pending,
                    TreeSnapshot::default()
                ),
                Err(ValidationError::BadPendingGap { index: 0 })
            );
        }
    }

    #[test]
    fn a_low_leaf_that_does_not_straddle_is_rejected() {
        let contract = Address::from_low_u64_be(0xabcd);
        let read = ScopedReadRequest {
            value: H256::from_low_u64_be(42),
            contract_address: contract,
            counter: 5,
        };
        let siloed = read.siloed_value();

        // A leaf whose own value *is* the read value straddles nothing.
        let bad_low = NonMembershipHint {
            low_leaf_preimage: NullifierLeafPreimage::new(siloed),
            membership: MembershipHint::default(),
        };
        let hints = NullifierNonExistenceHints {
            sorted_pending: SortedPendingNullifiers::default(),
            next_pending_indices: vec![0],
            low_leaf_hints: vec![bad_low],
        };
        assert_eq!(
            validate_nullifier_non_existence(&[read], &hints, &[], TreeSnapshot::default()),
            Err(ValidationError::BadLowLeaf {
                category: ReadRequestKind::NullifierNonExistent,
                index: 0,
            })
        );
    }
}
