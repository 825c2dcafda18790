//! Merkle trees for the sequencer's world state.
//!
//! Two shapes cover every protocol tree:
//! - [`append_tree::AppendOnlyTree`] for trees that only ever grow at the
//!   frontier (note hashes, L1-to-L2 messages), and
//! - [`indexed_tree::IndexedTree`] for trees whose leaves form a sorted
//!   linked list over their keys (nullifiers, public data), which is what
//!   makes cheap non-membership proofs possible: the *low leaf* straddling a
//!   missing key is an ordinary membership proof plus two comparisons.
//!
//! Both expose the same read surface (root, size, sibling paths) so the
//! world-state accessor can treat them uniformly.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

use ethereum_types::U256;
use thiserror::Error;

pub mod append_tree;
pub mod hashing;
pub mod indexed_tree;

#[cfg(test)]
pub(crate) mod testing_utils;

/// Stores the result of tree operations. Returns a [TreeError] upon failure.
pub type TreeResult<T> = Result<T, TreeError>;

/// An error type for tree operations.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum TreeError {
    /// A leaf was requested past the end of the tree.
    #[error("leaf index {index} is past the end of the tree (size: {size})")]
    LeafIndexOutOfBounds {
        /// The requested index.
        index: u64,
        /// The number of leaves currently in the tree.
        size: u64,
    },

    /// The tree has no room for another leaf.
    #[error("tree of height {height} is full")]
    TreeFull {
        /// Height of the saturated tree.
        height: usize,
    },

    /// An insertion would duplicate a key that indexed trees require to be
    /// unique.
    #[error("key {0} is already present in the tree")]
    KeyAlreadyPresent(U256),
}
