//! Public-data (storage) reads.
//!
//! A read is satisfied by the latest same-slot write this transaction made
//! before it (pending, subject to the override rule) or by the settled
//! tree. A settled hint either carries the slot's own leaf, whose value
//! must match, or a low leaf proving the slot was never written, in which
//! case the read must have observed zero.

use merkle_forest::indexed_tree::IndexedLeaf;

use crate::{
    tx::OverridablePublicDataWrite,
    validation::{
        hints::PublicDataReadHint, requests::PublicDataRead, ReadRequestKind, ValidationError,
    },
    world::TreeSnapshot,
};

const CATEGORY: ReadRequestKind = ReadRequestKind::PublicData;

pub(crate) fn validate_public_data_reads(
    requests: &[PublicDataRead],
    hints: &[PublicDataReadHint],
    pending_writes: &[OverridablePublicDataWrite],
    snapshot: TreeSnapshot,
) -> Result<(), ValidationError> {
    for (index, request) in requests.iter().enumerate() {
        let hint = hints.get(index).ok_or(ValidationError::MissingHint {
            category: CATEGORY,
            index,
        })?;

        match hint {
            PublicDataReadHint::Pending { write_index } => {
                let satisfied = pending_writes.get(*write_index).is_some_and(|hinted| {
                    hinted.write.leaf_slot == request.leaf_slot
                        && hinted.write.value == request.value
                        && hinted.visible_at(request.counter)
                });
                if !satisfied {
                    return Err(ValidationError::BadPendingWrite {
                        index,
                        hint_index: *write_index,
                    });
                }
            }
            PublicDataReadHint::Settled {
                leaf_preimage,
                membership,
            } => {
                if leaf_preimage.slot == request.leaf_slot {
                    if leaf_preimage.value != request.value {
                        return Err(ValidationError::BadLeafPreimage {
                            category: CATEGORY,
                            index,
                        });
                    }
                } else {
                    // Low leaf: the slot was never written, so the read
                    // must have observed zero.
                    let straddles = leaf_preimage.slot < request.leaf_slot
                        && (leaf_preimage.next_slot.is_zero()
                            || leaf_preimage.next_slot > request.leaf_slot);
                    if !straddles {
                        return Err(ValidationError::BadLowLeaf {
                            category: CATEGORY,
                            index,
                        });
                    }
                    if !request.value.is_zero() {
                        return Err(ValidationError::BadLeafPreimage {
                            category: CATEGORY,
                            index,
                        });
                    }
                }
                if !membership.proves(leaf_preimage.hash(), snapshot.root) {
                    return Err(ValidationError::BadMembershipProof {
                        category: CATEGORY,
                        index,
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ethereum_types::U256;
    use merkle_forest::indexed_tree::{IndexedTree, PublicDataLeafPreimage};

    use super::*;
    use crate::{tx::PublicDataWrite, validation::hints::MembershipHint};

    fn read(slot: u64, value: u64, counter: u32) -> PublicDataRead {
        PublicDataRead {
            leaf_slot: U256::from(slot),
            value: U256::from(value),
            counter,
        }
    }

    fn write(slot: u64, value: u64, counter: u32) -> OverridablePublicDataWrite {
        OverridablePublicDataWrite::new(PublicDataWrite {
            leaf_slot: U256::from(slot),
            value: U256::from(value),
            counter,
        })
    }

    fn settled_tree(slots: &[(u64, u64)]) -> (IndexedTree<PublicDataLeafPreimage>, TreeSnapshot) {
        let mut tree = IndexedTree::new(8);
        tree.extend(
            slots
                .iter()
                .map(|(s, v)| PublicDataLeafPreimage::new(U256::from(*s), U256::from(*v))),
        )
        .unwrap();
        let snapshot = TreeSnapshot {
            root: tree.root(),
            next_available_leaf_index: tree.size(),
        };
        (tree, snapshot)
    }

    fn settled_hint(
        tree: &IndexedTree<PublicDataLeafPreimage>,
        leaf_index: u64,
    ) -> PublicDataReadHint {
        PublicDataReadHint::Settled {
            leaf_preimage: tree.leaf_preimage(leaf_index).unwrap(),
            membership: MembershipHint {
                leaf_index,
                sibling_path: tree.sibling_path(leaf_index).unwrap(),
            },
        }
    }

    #[test]
    fn an_earlier_unoverridden_write_satisfies_a_read() {
        let pending = vec![write(5, 50, 2)];
        let hints = vec![PublicDataReadHint::Pending { write_index: 0 }];

        assert_eq!(
            validate_public_data_reads(
                &[read(5, 50, 7)],
                &hints,
                &pending,
                TreeSnapshot::default()
            ),
            Ok(())
        );
    }

    #[test]
    fn an_overridden_write_cannot_satisfy_a_later_read() {
        let mut overridden = write(5, 50, 2);
        overridden.override_counter = 6;
        let pending = vec![overridden];
        let hints = vec![PublicDataReadHint::Pending { write_index: 0 }];

        // Read at counter 7 sees the counter-6 override, not this write.
        assert_eq!(
            validate_public_data_reads(
                &[read(5, 50, 7)],
                &hints,
                &pending,
                TreeSnapshot::default()
            ),
            Err(ValidationError::BadPendingWrite {
                index: 0,
                hint_index: 0,
            })
        );

        // A read squeezed between the write and its override still sees it.
        assert_eq!(
            validate_public_data_reads(
                &[read(5, 50, 4)],
                &hints,
                &pending,
                TreeSnapshot::default()
            ),
            Ok(())
        );
    }

    #[test]
    fn a_settled_slot_leaf_must_carry_the_read_value() {
        let (tree, snapshot) = settled_tree(&[(5, 50)]);
        let leaf_index = 1;

        assert_eq!(
            validate_public_data_reads(
                &[read(5, 50, 1)],
                &[settled_hint(&tree, leaf_index)],
                &[],
                snapshot
            ),
            Ok(())
        );
        assert_eq!(
            validate_public_data_reads(
                &[read(5, 51, 1)],
                &[settled_hint(&tree, leaf_index)],
                &[],
                snapshot
            ),
            Err(ValidationError::BadLeafPreimage {
                category: ReadRequestKind::PublicData,
                index: 0,
            })
        );
    }

    #[test]
    fn an_unwritten_slot_reads_zero_through_its_low_leaf() {
        let (tree, snapshot) = settled_tree(&[(5, 50), (9, 90)]);
        let low = tree.find_low_leaf(U256::from(7));
        assert!(!low.already_present);

        assert_eq!(
            validate_public_data_reads(
                &[read(7, 0, 1)],
                &[settled_hint(&tree, low.index)],
                &[],
                snapshot
            ),
            Ok(())
        );

        // Claiming a non-zero value for a never-written slot fails.
        assert_eq!(
            validate_public_data_reads(
                &[read(7, 1, 1)],
                &[settled_hint(&tree, low.index)],
                &[],
                snapshot
            ),
            Err(ValidationError::BadLeafPreimage {
                category: ReadRequestKind::PublicData,
                index: 0,
            })
        );
    }

    #[test]
    fn a_leaf_that_does_not_cover_the_slot_is_rejected() {
        let (tree, snapshot) = settled_tree(&[(5, 50), (9, 90)]);

        // The slot-5 leaf does not straddle slot 12; slot 9's does.
        let slot5_index = 1;
        assert_eq!(
            validate_public_data_reads(
                &[read(12, 0, 1)],
                &[settled_hint(&tree, slot5_index)],
                &[],
                snapshot
            ),
            Err(ValidationError::BadLowLeaf {
                category: ReadRequestKind::PublicData,
                index: 0,
            })
        );
    }

    #[test]
    fn a_tampered_membership_proof_is_rejected() {
        let (tree, snapshot) = settled_tree(&[(5, 50)]);
        let mut preimage = tree.leaf_preimage(1).unwrap();
        preimage.value = U256::from(51);
        let hint = PublicDataReadHint::Settled {
            leaf_preimage: preimage,
            membership: MembershipHint {
                leaf_index: 1,
                sibling_path: tree.sibling_path(1).unwrap(),
            },
        };

        assert_eq!(
            validate_public_data_reads(&[read(5, 51, 1)], &[hint], &[], snapshot),
            Err(ValidationError::BadMembershipProof {
                category: ReadRequestKind::PublicData,
                index: 0,
            })
        );
    }
}
