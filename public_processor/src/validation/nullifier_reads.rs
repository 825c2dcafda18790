//! Nullifier existence reads.
//!
//! A read is satisfied either by a nullifier this transaction emitted
//! before the read happened (pending) or by a leaf settled in the nullifier
//! tree, per the hint. The requested value is siloed by the issuing
//! contract before anything is compared.

use merkle_forest::indexed_tree::IndexedLeaf;

use crate::{
    tx::Nullifier,
    validation::{
        hints::NullifierReadHint, requests::ScopedReadRequest, ReadRequestKind, ValidationError,
    },
    world::TreeSnapshot,
};

const CATEGORY: ReadRequestKind = ReadRequestKind::Nullifier;

pub(crate) fn validate_nullifier_reads(
    requests: &[ScopedReadRequest],
    hints: &[NullifierReadHint],
    pending: &[Nullifier],
    snapshot: TreeSnapshot,
) -> Result<(), ValidationError> {
    for (index, request) in requests.iter().enumerate() {
        let hint = hints.get(index).ok_or(ValidationError::MissingHint {
            category: CATEGORY,
            index,
        })?;
        let siloed = request.siloed_value();

        match hint {
            NullifierReadHint::Pending { nullifier_index } => {
                let satisfied = pending.get(*nullifier_index).is_some_and(|pending| {
                    pending.value == siloed && pending.counter < request.counter
                });
                if !satisfied {
                    return Err(ValidationError::BadPendingNullifier {
                        index,
                        hint_index: *nullifier_index,
                    });
                }
            }
            NullifierReadHint::Settled {
                leaf_preimage,
                membership,
            } => {
                if leaf_preimage.nullifier != siloed {
                    return Err(ValidationError::BadLeafPreimage {
                        category: CATEGORY,
                        index,
                    });
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
