//! Hints shipped alongside a transaction to make its claimed reads
//! checkable.
//!
//! Hints carry the witness material (leaf preimages, sibling paths, pending
//! indices) needed to verify a read without searching the trees. They are
//! advisory only: a wrong hint fails validation, it can never make a false
//! claim pass.

use ethereum_types::H256;
use merkle_forest::{
    hashing::{root_from_sibling_path, SiblingPath},
    indexed_tree::{NullifierLeafPreimage, PublicDataLeafPreimage},
};
use serde::{Deserialize, Serialize};

/// A settled leaf's position and sibling path.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MembershipHint {
    /// Index of the leaf being proven.
    pub leaf_index: u64,
    /// Sibling path from that leaf to the root.
    pub sibling_path: SiblingPath,
}

impl MembershipHint {
    /// Whether this hint proves `leaf` sits in a tree with root `root`.
    pub fn proves(&self, leaf: H256, root: H256) -> bool {
        root_from_sibling_path(leaf, self.leaf_index, &self.sibling_path) == root
    }
}

/// Where a claimed nullifier read is satisfied.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum NullifierReadHint {
    /// Satisfied by a nullifier emitted earlier in this transaction.
    Pending {
        /// Index into the pending nullifier set.
        nullifier_index: usize,
    },
    /// Satisfied by a leaf settled in the nullifier tree.
    Settled {
        /// The full preimage of the settled leaf.
        leaf_preimage: NullifierLeafPreimage,
        /// Membership proof for that leaf.
        membership: MembershipHint,
    },
}

/// Witness that a key is absent from the settled nullifier tree: the low
/// leaf whose key range covers it, plus that leaf's membership proof.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NonMembershipHint {
    /// The leaf straddling the absent key.
    pub low_leaf_preimage: NullifierLeafPreimage,
    /// Membership proof for the low leaf.
    pub membership: MembershipHint,
}

/// Where a claimed public-data read is satisfied.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PublicDataReadHint {
    /// Satisfied by a write emitted earlier in this transaction.
    Pending {
        /// Index into the pending write set.
        write_index: usize,
    },
    /// Satisfied by the settled tree, either by the slot's own leaf or by
    /// the low leaf proving the slot was never written.
    Settled {
        /// The settled leaf: the slot's own, or its low leaf.
        leaf_preimage: PublicDataLeafPreimage,
        /// Membership proof for that leaf.
        membership: MembershipHint,
    },
}

/// The pending nullifier set rearranged into ascending order.
///
/// `sorted_values[i]` is the i-th smallest pending value, and
/// `sorted_index_hints[j]` says where pending entry `j` landed in the sorted
/// view. Validation re-derives nothing: it checks the claimed permutation
/// and then uses it.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SortedPendingNullifiers {
    /// The pending values in claimed ascending order.
    pub sorted_values: Vec<H256>,
    /// For each pending-set position, its position in `sorted_values`.
    pub sorted_index_hints: Vec<usize>,
}

/// Hints for the nullifier non-existence reads of one transaction.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NullifierNonExistenceHints {
    /// The sorted view of the pending nullifier set.
    pub sorted_pending: SortedPendingNullifiers,
    /// For each read, the sorted position its value would be inserted at.
    pub next_pending_indices: Vec<usize>,
    /// For each read, the settled-tree low leaf and its proof.
    pub low_leaf_hints: Vec<NonMembershipHint>,
}

/// Every hint one transaction ships, one collection per read category.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TxValidationHints {
    /// Sibling paths for the note-hash reads, in request order.
    pub note_hash_reads: Vec<SiblingPath>,
    /// Sibling paths for the L1-to-L2 message reads, in request order.
    pub l1_to_l2_msg_reads: Vec<SiblingPath>,
    /// Hints for the nullifier reads, in request order.
    pub nullifier_reads: Vec<NullifierReadHint>,
    /// Hints for the nullifier non-existence reads.
    pub nullifier_non_existence: NullifierNonExistenceHints,
    /// Hints for the public-data reads, in request order.
    pub public_data_reads: Vec<PublicDataReadHint>,
}
