//! Indexed Merkle trees.
//!
//! Leaves carry `(key, next_key, next_index)` and form a linked list sorted
//! by key. Membership of a key is a plain Merkle proof of its leaf;
//! *non*-membership of a key is a Merkle proof of the unique *low leaf*
//! whose `key` sits below it and whose `next_key` sits above it (or is the
//! terminal zero). The tree is seeded with a zero-key anchor leaf so a low
//! leaf always exists.

use ethereum_types::{H256, U256};
use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    hashing::{
        empty_subtree_roots, fold_levels, sibling_path_from_levels, SiblingPath, EMPTY_LEAF,
    },
    TreeError, TreeResult,
};

/// A leaf preimage participating in the sorted linked list of an
/// [`IndexedTree`].
pub trait IndexedLeaf: Clone + std::fmt::Debug {
    /// The key this leaf is sorted by.
    fn key(&self) -> U256;

    /// Key of the next-larger leaf, or zero for the terminal leaf.
    fn next_key(&self) -> U256;

    /// Leaf index of the next-larger leaf.
    fn next_index(&self) -> u64;

    /// Repoints this leaf's successor link.
    fn set_next(&mut self, next_key: U256, next_index: u64);

    /// Whether this is the all-zero leaf.
    fn is_empty(&self) -> bool;

    /// The all-zero leaf.
    fn empty() -> Self;

    /// The canonical hash of this preimage as stored in the tree. All-zero
    /// leaves hash to [`EMPTY_LEAF`].
    fn hash(&self) -> H256;
}

/// A nullifier-tree leaf preimage.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NullifierLeafPreimage {
    /// The siloed nullifier stored here.
    pub nullifier: H256,
    /// The next-larger siloed nullifier, or zero at the end of the list.
    pub next_nullifier: H256,
    /// Index of the leaf holding `next_nullifier`.
    pub next_index: u64,
}

impl NullifierLeafPreimage {
    /// A leaf for a fresh nullifier, successor links zeroed.
    pub fn new(nullifier: H256) -> Self {
        Self {
            nullifier,
            ..Default::default()
        }
    }
}

impl IndexedLeaf for NullifierLeafPreimage {
    fn key(&self) -> U256 {
        U256::from_big_endian(self.nullifier.as_bytes())
    }

    fn next_key(&self) -> U256 {
        U256::from_big_endian(self.next_nullifier.as_bytes())
    }

    fn next_index(&self) -> u64 {
        self.next_index
    }

    fn set_next(&mut self, next_key: U256, next_index: u64) {
        let mut bytes = [0u8; 32];
        next_key.to_big_endian(&mut bytes);
        self.next_nullifier = H256(bytes);
        self.next_index = next_index;
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn empty() -> Self {
        Self::default()
    }

    fn hash(&self) -> H256 {
        if self.is_empty() {
            return EMPTY_LEAF;
        }
        let mut bytes = [0u8; 96];
        bytes[..32].copy_from_slice(self.nullifier.as_bytes());
        bytes[32..64].copy_from_slice(self.next_nullifier.as_bytes());
        bytes[88..].copy_from_slice(&self.next_index.to_be_bytes());
        keccak_hash::keccak(bytes)
    }
}

/// A public-data-tree leaf preimage: a storage slot, its value, and the
/// successor link over slots.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PublicDataLeafPreimage {
    /// The storage slot this leaf covers.
    pub slot: U256,
    /// The value settled at that slot.
    pub value: U256,
    /// The next-larger occupied slot, or zero at the end of the list.
    pub next_slot: U256,
    /// Index of the leaf holding `next_slot`.
    pub next_index: u64,
}

impl PublicDataLeafPreimage {
    /// A leaf settling `value` at `slot`, successor links zeroed.
    pub fn new(slot: U256, value: U256) -> Self {
        Self {
            slot,
            value,
            ..Default::default()
        }
    }
}

impl IndexedLeaf for PublicDataLeafPreimage {
    fn key(&self) -> U256 {
        self.slot
    }

    fn next_key(&self) -> U256 {
        self.next_slot
    }

    fn next_index(&self) -> u64 {
        self.next_index
    }

    fn set_next(&mut self, next_key: U256, next_index: u64) {
        self.next_slot = next_key;
        self.next_index = next_index;
    }

    fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn empty() -> Self {
        Self::default()
    }

    fn hash(&self) -> H256 {
        if self.is_empty() {
            return EMPTY_LEAF;
        }
        let mut bytes = [0u8; 128];
        self.slot.to_big_endian(&mut bytes[..32]);
        self.value.to_big_endian(&mut bytes[32..64]);
        self.next_slot.to_big_endian(&mut bytes[64..96]);
        bytes[120..].copy_from_slice(&self.next_index.to_be_bytes());
        keccak_hash::keccak(bytes)
    }
}

/// Location of the closest leaf at or below a queried key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LowLeaf {
    /// Index of the leaf with the largest key not above the query.
    pub index: u64,
    /// Whether that leaf's key equals the query exactly.
    pub already_present: bool,
}

/// An indexed Merkle tree of a fixed height.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IndexedTree<L> {
    height: usize,
    leaves: Vec<L>,
    zeros: Vec<H256>,
}

impl<L: IndexedLeaf> IndexedTree<L> {
    /// Creates a tree holding only the zero-key anchor leaf.
    pub fn new(height: usize) -> Self {
        Self {
            height,
            leaves: vec![L::empty()],
            zeros: empty_subtree_roots(height),
        }
    }

    /// The tree's height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of leaves, anchor included; also the next available index.
    pub fn size(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// The preimage stored at `index`.
    pub fn leaf_preimage(&self, index: u64) -> TreeResult<L> {
        self.leaves
            .get(index as usize)
            .cloned()
            .ok_or(TreeError::LeafIndexOutOfBounds {
                index,
                size: self.size(),
            })
    }

    /// Finds the leaf with the largest key at or below `key`.
    pub fn find_low_leaf(&self, key: U256) -> LowLeaf {
        let mut best = 0usize;
        for (index, leaf) in self.leaves.iter().enumerate() {
            if leaf.key() <= key && leaf.key() >= self.leaves[best].key() {
                best = index;
            }
        }
        LowLeaf {
            index: best as u64,
            already_present: self.leaves[best].key() == key,
        }
    }

    /// Inserts a leaf with a fresh key, linking it into the sorted list.
    ///
    /// The leaf's successor link is overwritten; its key must not already be
    /// in the tree (the zero key is taken by the anchor).
    pub fn insert(&mut self, mut leaf: L) -> TreeResult<u64> {
        let key = leaf.key();
        let low = self.find_low_leaf(key);
        if low.already_present {
            return Err(TreeError::KeyAlreadyPresent(key));
        }
        if self.leaves.len() as u128 >= 1u128 << self.height {
            return Err(TreeError::TreeFull {
                height: self.height,
            });
        }

        let new_index = self.leaves.len() as u64;
        let low_leaf = &mut self.leaves[low.index as usize];
        leaf.set_next(low_leaf.next_key(), low_leaf.next_index());
        low_leaf.set_next(key, new_index);
        trace!("Inserting key {} at index {}", key, new_index);
        self.leaves.push(leaf);
        Ok(new_index)
    }

    /// Inserts every leaf in order.
    pub fn extend<I: IntoIterator<Item = L>>(&mut self, leaves: I) -> TreeResult<()> {
        for leaf in leaves {
            self.insert(leaf)?;
        }
        Ok(())
    }

    /// The current root.
    pub fn root(&self) -> H256 {
        let levels = fold_levels(&self.leaf_hashes(), self.height, &self.zeros);
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
        let levels = fold_levels(&self.leaf_hashes(), self.height, &self.zeros);
        Ok(sibling_path_from_levels(&levels, &self.zeros, index))
    }

    fn leaf_hashes(&self) -> Vec<H256> {
        self.leaves.iter().map(L::hash).collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::{
        hashing::root_from_sibling_path,
        testing_utils::{common_setup, h256},
    };

    fn nullifier_tree(values: &[u64]) -> IndexedTree<NullifierLeafPreimage> {
        let mut tree = IndexedTree::new(8);
        tree.extend(values.iter().map(|v| NullifierLeafPreimage::new(h256(*v))))
            .unwrap();
        tree
    }

    #[test]
    fn insertion_links_leaves_in_key_order() {
        common_setup();

        let tree = nullifier_tree(&[50, 30, 90]);

        // Walk the list from the anchor: 0 -> 30 -> 50 -> 90 -> end.
        let anchor = tree.leaf_preimage(0).unwrap();
        assert_eq!(anchor.next_key(), U256::from(30));
        let l30 = tree.leaf_preimage(anchor.next_index()).unwrap();
        assert_eq!(l30.next_key(), U256::from(50));
        let l50 = tree.leaf_preimage(l30.next_index()).unwrap();
        assert_eq!(l50.next_key(), U256::from(90));
        let l90 = tree.leaf_preimage(l50.next_index()).unwrap();
        assert_eq!(l90.next_key(), U256::zero());
        assert_eq!(l90.next_index(), 0);
    }

    #[test]
    fn low_leaf_queries() {
        common_setup();

        let tree = nullifier_tree(&[50, 30, 90]);

        let low = tree.find_low_leaf(U256::from(40));
        assert!(!low.already_present);
        assert_eq!(
            tree.leaf_preimage(low.index).unwrap().key(),
            U256::from(30)
        );

        let exact = tree.find_low_leaf(U256::from(50));
        assert!(exact.already_present);

        let above_all = tree.find_low_leaf(U256::from(1000));
        assert_eq!(
            tree.leaf_preimage(above_all.index).unwrap().key(),
            U256::from(90)
        );
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        common_setup();

        let mut tree = nullifier_tree(&[50]);
        assert_eq!(
            tree.insert(NullifierLeafPreimage::new(h256(50))),
            Err(TreeError::KeyAlreadyPresent(U256::from(50)))
        );
    }

    #[test]
    fn low_leaf_membership_proves_non_membership() {
        common_setup();

        let tree = nullifier_tree(&[50, 30, 90]);
        let absent = U256::from(60);

        let low = tree.find_low_leaf(absent);
        let preimage = tree.leaf_preimage(low.index).unwrap();
        assert!(preimage.key() < absent);
        assert!(preimage.next_key() > absent);

        let path = tree.sibling_path(low.index).unwrap();
        assert_eq!(
            root_from_sibling_path(preimage.hash(), low.index, &path),
            tree.root()
        );
    }

    #[test]
    fn random_insertions_keep_the_list_sorted() {
        common_setup();

        let mut rng = StdRng::seed_from_u64(0xf0f0);
        let mut tree: IndexedTree<PublicDataLeafPreimage> = IndexedTree::new(12);
        let mut inserted = 0usize;
        while inserted < 100 {
            let slot = U256::from(rng.gen::<u64>());
            if tree
                .insert(PublicDataLeafPreimage::new(slot, U256::from(1)))
                .is_ok()
            {
                inserted += 1;
            }
        }

        let mut seen = 1u64;
        let mut leaf = tree.leaf_preimage(0).unwrap();
        while leaf.next_index() != 0 {
            let next = tree.leaf_preimage(leaf.next_index()).unwrap();
            assert!(next.key() > leaf.key());
            leaf = next;
            seen += 1;
        }
        assert_eq!(seen, tree.size());
    }

    #[test]
    fn value_updates_change_the_root() {
        common_setup();

        let mut a: IndexedTree<PublicDataLeafPreimage> = IndexedTree::new(8);
        let mut b = a.clone();
        a.insert(PublicDataLeafPreimage::new(U256::from(7), U256::from(1)))
            .unwrap();
        b.insert(PublicDataLeafPreimage::new(U256::from(7), U256::from(2)))
            .unwrap();
        assert_ne!(a.root(), b.root());
    }
}
