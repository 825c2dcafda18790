//! Node hashing shared by every tree shape.
//!
//! Inner nodes are `keccak256(left || right)` over the raw 32-byte children.
//! Absent subtrees hash to the per-depth empty-subtree root rather than
//! being materialized.

use ethereum_types::H256;
use keccak_hash::keccak;
use serde::{Deserialize, Serialize};

/// The hash stored at positions where no leaf has been placed.
pub const EMPTY_LEAF: H256 = H256([0; 32]);

/// Hashes two sibling nodes into their parent.
pub fn hash_pair(left: H256, right: H256) -> H256 {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(left.as_bytes());
    bytes[32..].copy_from_slice(right.as_bytes());
    keccak(bytes)
}

/// Roots of fully-empty subtrees, by depth.
///
/// Index 0 is [`EMPTY_LEAF`]; index `height` is the root of an empty tree of
/// that height.
pub fn empty_subtree_roots(height: usize) -> Vec<H256> {
    let mut roots = Vec::with_capacity(height + 1);
    roots.push(EMPTY_LEAF);
    for depth in 0..height {
        let node = roots[depth];
        roots.push(hash_pair(node, node));
    }
    roots
}

/// The sibling nodes along a leaf-to-root walk, leaf level first.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SiblingPath {
    nodes: Vec<H256>,
}

impl SiblingPath {
    /// Wraps sibling nodes ordered from the leaf level upwards.
    pub fn new(nodes: Vec<H256>) -> Self {
        Self { nodes }
    }

    /// The sibling nodes, leaf level first.
    pub fn nodes(&self) -> &[H256] {
        &self.nodes
    }

    /// Number of levels covered, i.e. the height of the tree the path was
    /// taken from.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the path covers no levels at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Recomputes the root implied by placing `leaf` at `leaf_index` alongside
/// the given sibling path.
///
/// This is the verification half of a membership proof: the caller compares
/// the returned hash against a trusted root.
pub fn root_from_sibling_path(leaf: H256, leaf_index: u64, path: &SiblingPath) -> H256 {
    let mut node = leaf;
    let mut index = leaf_index;
    for sibling in path.nodes() {
        node = if index & 1 == 0 {
            hash_pair(node, *sibling)
        } else {
            hash_pair(*sibling, node)
        };
        index >>= 1;
    }
    node
}

/// Folds leaf hashes into the full stack of node levels, zero-padding odd
/// frontiers. `levels[0]` is the leaves; `levels[height]` holds the root (or
/// nothing, for an empty tree).
pub(crate) fn fold_levels(leaves: &[H256], height: usize, zeros: &[H256]) -> Vec<Vec<H256>> {
    let mut levels = Vec::with_capacity(height + 1);
    levels.push(leaves.to_vec());
    for depth in 0..height {
        let prev = &levels[depth];
        let mut next = Vec::with_capacity((prev.len() + 1) / 2);
        for pair in 0..(prev.len() + 1) / 2 {
            let left = prev[2 * pair];
            let right = prev.get(2 * pair + 1).copied().unwrap_or(zeros[depth]);
            next.push(hash_pair(left, right));
        }
        levels.push(next);
    }
    levels
}

/// Reads the sibling path of `leaf_index` out of folded levels, substituting
/// empty-subtree roots where the frontier has no materialized sibling.
pub(crate) fn sibling_path_from_levels(
    levels: &[Vec<H256>],
    zeros: &[H256],
    leaf_index: u64,
) -> SiblingPath {
    let height = levels.len() - 1;
    let mut nodes = Vec::with_capacity(height);
    let mut index = leaf_index as usize;
    for depth in 0..height {
        let sibling = levels[depth]
            .get(index ^ 1)
            .copied()
            .unwrap_or(zeros[depth]);
        nodes.push(sibling);
        index >>= 1;
    }
    SiblingPath::new(nodes)
}
