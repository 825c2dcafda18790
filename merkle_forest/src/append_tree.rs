//! A strictly append-only Merkle tree.
//!
//! Backs the note-hash and L1-to-L2 message trees: leaves are placed at the
//! frontier in arrival order and never moved or removed, so the only
//! mutation is [`AppendOnlyTree::append`].

use ethereum_types::H256;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    hashing::{empty_subtree_roots, fold_levels, sibling_path_from_levels, SiblingPath},
    TreeError, TreeResult,
};

/// An append-only Merkle tree of a fixed height.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AppendOnlyTree {
    height: usize,
    leaves: Vec<H256>,
    zeros: Vec<H256>,
}

impl AppendOnlyTree {
    /// Creates an empty tree of the given height.
    pub fn new(height: usize) -> Self {
        Self {
            height,
            leaves: Vec::new(),
            zeros: empty_subtree_roots(height),
        }
    }

    /// The tree's height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of leaves appended so far, which is also the next available
    /// leaf index.
    pub fn size(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// The leaf at `index`, if one has been appended there.
    pub fn get_leaf(&self, index: u64) -> Option<H256> {
        self.leaves.get(index as usize).copied()
    }

    /// Appends a leaf at the frontier and returns its index.
    pub fn append(&mut self, leaf: H256) -> TreeResult<u64> {
        if self.leaves.len() as u128 >= 1u128 << self.height {
            return Err(TreeError::TreeFull {
                height: self.height,
            });
        }
        let index = self.leaves.len() as u64;
        trace!("Appending leaf {:x} at index {}", leaf, index);
        self.leaves.push(leaf);
        Ok(index)
    }

    /// Appends every leaf in order.
    pub fn extend<I: IntoIterator<Item = H256>>(&mut self, leaves: I) -> TreeResult<()> {
        for leaf in leaves {
            self.append(leaf)?;
        }
        Ok(())
    }

    /// The current root.
    pub fn root(&self) -> H256 {
        let levels = fold_levels(&self.leaves, self.height, &self.zeros);
        levels[self.height]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.height])
    }

    /// The sibling path of an existing leaf.
    pub fn sibling_path(&self, index: u64) -> TreeResult<SiblingPath> {
        if index >= self.size() {
            return Err(TreeError::LeafIndexOutOfBounds {
                index,
                size: self.size(),
            });
        }
        let levels = fold_levels(&self.leaves, self.height, &self.zeros);
        Ok(sibling_path_from_levels(&levels, &self.zeros, index))
    }
}
