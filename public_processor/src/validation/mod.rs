//! Verification of the read requests a transaction claims.
//!
//! Public execution reports what it read; nothing here takes those claims at
//! face value. Every claimed read is re-proven against the pre-transaction
//! state reference (settled reads via Merkle membership, pending reads
//! against the in-transaction side effects), and any mismatch fails the
//! whole transaction. The checks run in a fixed order so the first
//! violation reported is deterministic for a given transaction.

use thiserror::Error;
use tracing::trace;

use crate::{
    tx::{Nullifier, OverridablePublicDataWrite},
    validation::{hints::TxValidationHints, requests::ValidationRequests},
    world::{StateReference, TreeId},
};

pub mod hints;
pub mod requests;

mod nullifier_non_existence;
mod nullifier_reads;
mod public_data_reads;
mod tree_reads;

/// The read-request categories a transaction can claim.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ReadRequestKind {
    /// Existence of a settled note hash.
    NoteHash,
    /// Existence of a nullifier, pending or settled.
    Nullifier,
    /// Absence of a nullifier from both the pending set and the tree.
    NullifierNonExistent,
    /// Existence of a settled L1-to-L2 message.
    L1ToL2Message,
    /// A public-data (storage) slot read.
    PublicData,
}

/// A claimed read that failed verification.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ValidationError {
    /// A request array's claimed length disagrees with its contents or
    /// exceeds the protocol capacity.
    #[error(
        "{category} read-request array is malformed (claimed: {claimed}, len: {len}, capacity: {capacity})"
    )]
    MalformedRequestArray {
        /// The offending category.
        category: ReadRequestKind,
        /// The claimed number of real entries.
        claimed: usize,
        /// The array's actual length.
        len: usize,
        /// The protocol capacity for this category.
        capacity: usize,
    },

    /// An empty entry below the claimed length, or a real entry above it.
    #[error("{category} read request {index} violates the packed-array layout")]
    PackingViolation {
        /// The offending category.
        category: ReadRequestKind,
        /// Position of the offending entry.
        index: usize,
    },

    /// A claimed read with no accompanying hint to verify it against.
    #[error("no hint supplied for {category} read request {index}")]
    MissingHint {
        /// The offending category.
        category: ReadRequestKind,
        /// Position of the unhinted request.
        index: usize,
    },

    /// A hinted sibling path that does not hash up to the tree root.
    #[error("membership proof for {category} read request {index} does not match the tree root")]
    BadMembershipProof {
        /// The offending category.
        category: ReadRequestKind,
        /// Position of the offending request.
        index: usize,
    },

    /// A hinted leaf preimage that does not carry the requested value.
    #[error(
        "hinted leaf preimage for {category} read request {index} does not match the requested value"
    )]
    BadLeafPreimage {
        /// The offending category.
        category: ReadRequestKind,
        /// Position of the offending request.
        index: usize,
    },

    /// A nullifier read pointed at a pending nullifier that does not satisfy
    /// it.
    #[error("nullifier read request {index} does not match pending nullifier {hint_index}")]
    BadPendingNullifier {
        /// Position of the offending request.
        index: usize,
        /// The pending-set index the hint named.
        hint_index: usize,
    },

    /// A public-data read pointed at a pending write that does not satisfy
    /// it.
    #[error("public-data read request {index} does not match pending write {hint_index}")]
    BadPendingWrite {
        /// Position of the offending request.
        index: usize,
        /// The pending-write index the hint named.
        hint_index: usize,
    },

    /// The sorted-pending-nullifier hint covers a different number of values
    /// than are actually pending.
    #[error("sorted pending-nullifier hint covers {hinted} values but {pending} are pending")]
    PermutationLengthMismatch {
        /// Values in the hint.
        hinted: usize,
        /// Values actually pending.
        pending: usize,
    },

    /// The hinted sorted ordering is not strictly ascending.
    #[error("hinted pending-nullifier ordering is not strictly ascending at position {position}")]
    UnsortedPendingNullifiers {
        /// First out-of-order position in the sorted hint.
        position: usize,
    },

    /// The hinted sorted ordering is not a permutation of the pending set.
    #[error("hinted pending-nullifier ordering is not a permutation at position {position}")]
    BadPermutation {
        /// Position in the pending set where the mapping breaks.
        position: usize,
    },

    /// A non-existence read whose value actually sits in the pending set.
    #[error("non-existence read request {index} collides with the pending nullifier set")]
    BadPendingGap {
        /// Position of the offending request.
        index: usize,
    },

    /// A hinted low leaf that does not straddle the value claimed absent.
    #[error(
        "hinted low leaf for {category} read request {index} does not straddle the requested value"
    )]
    BadLowLeaf {
        /// The offending category.
        category: ReadRequestKind,
        /// Position of the offending request.
        index: usize,
    },
}

/// Re-proves every read request a transaction claims.
///
/// Borrows the request arrays, the hints shipped with the transaction, the
/// side effects pending at validation time, and the state reference captured
/// before the transaction touched anything. [`Self::validate`] is read-only
/// and idempotent.
#[derive(Debug)]
pub struct ValidationRequestProcessor<'a> {
    requests: &'a ValidationRequests,
    hints: &'a TxValidationHints,
    pending_nullifiers: &'a [Nullifier],
    pending_writes: &'a [OverridablePublicDataWrite],
    state: &'a StateReference,
}

impl<'a> ValidationRequestProcessor<'a> {
    /// Binds the processor to one transaction's claims and its
    /// pre-transaction state reference.
    pub fn new(
        requests: &'a ValidationRequests,
        hints: &'a TxValidationHints,
        pending_nullifiers: &'a [Nullifier],
        pending_writes: &'a [OverridablePublicDataWrite],
        state: &'a StateReference,
    ) -> Self {
        Self {
            requests,
            hints,
            pending_nullifiers,
            pending_writes,
            state,
        }
    }

    /// Checks packing, then every category in a fixed order. The first
    /// violation found is the one reported.
    pub fn validate(&self) -> Result<(), ValidationError> {
        trace!(
            note_hash = self.requests.array_lengths.note_hash_read_requests,
            nullifier = self.requests.array_lengths.nullifier_read_requests,
            nullifier_non_existent =
                self.requests.array_lengths.nullifier_non_existent_read_requests,
            l1_to_l2_msg = self.requests.array_lengths.l1_to_l2_msg_read_requests,
            public_data = self.requests.array_lengths.public_data_reads,
            "Verifying claimed read requests"
        );

        self.requests.enforce_packing()?;

        tree_reads::validate_tree_leaf_reads(
            ReadRequestKind::NoteHash,
            self.requests.note_hash_reads(),
            &self.hints.note_hash_reads,
            self.state.snapshot_of(TreeId::NoteHash),
        )?;
        tree_reads::validate_tree_leaf_reads(
            ReadRequestKind::L1ToL2Message,
            self.requests.l1_to_l2_msg_reads(),
            &self.hints.l1_to_l2_msg_reads,
            self.state.snapshot_of(TreeId::L1ToL2Message),
        )?;

        nullifier_reads::validate_nullifier_reads(
            self.requests.nullifier_reads(),
            &self.hints.nullifier_reads,
            self.pending_nullifiers,
            self.state.snapshot_of(TreeId::Nullifier),
        )?;
        nullifier_non_existence::validate_nullifier_non_existence(
            self.requests.nullifier_non_existent_reads(),
            &self.hints.nullifier_non_existence,
            self.pending_nullifiers,
            self.state.snapshot_of(TreeId::Nullifier),
        )?;

        public_data_reads::validate_public_data_reads(
            self.requests.public_data_read_entries(),
            &self.hints.public_data_reads,
            self.pending_writes,
            self.state.snapshot_of(TreeId::PublicData),
        )
    }
}
