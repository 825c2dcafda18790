//! World-state access.
//!
//! [`WorldState`] is the seam between the processor and whatever holds the
//! chain's trees: settled tree reads feed hint building and verification,
//! the key-value storage view feeds execution, and the
//! checkpoint/commit surface gives the phase state machine its rollback
//! boundaries. [`InMemoryWorldState`] is the in-process implementation over
//! [`merkle_forest`] trees and an explicit stack of storage snapshots.

use std::collections::BTreeMap;

use anyhow::{bail, Context as _};
use ethereum_types::{H256, U256};
use merkle_forest::{
    append_tree::AppendOnlyTree,
    hashing::SiblingPath,
    indexed_tree::{IndexedTree, LowLeaf, NullifierLeafPreimage, PublicDataLeafPreimage},
};
use serde::{Deserialize, Serialize};
use zk_sequencer_common::{
    L1_TO_L2_MSG_TREE_HEIGHT, NOTE_HASH_TREE_HEIGHT, NULLIFIER_TREE_HEIGHT,
    PUBLIC_DATA_TREE_HEIGHT,
};

/// The four protocol trees.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum TreeId {
    /// The append-only tree of siloed note hashes.
    NoteHash,
    /// The indexed tree of siloed nullifiers.
    Nullifier,
    /// The append-only tree of L1-to-L2 messages.
    L1ToL2Message,
    /// The indexed tree of public-data leaves.
    PublicData,
}

/// Root and size of one tree at a point in time.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TreeSnapshot {
    /// The tree root.
    pub root: H256,
    /// Index the next appended leaf would land at.
    pub next_available_leaf_index: u64,
}

/// Snapshots of all four trees, taken together.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StateReference {
    /// The note-hash tree.
    pub note_hash_tree: TreeSnapshot,
    /// The nullifier tree.
    pub nullifier_tree: TreeSnapshot,
    /// The L1-to-L2 message tree.
    pub l1_to_l2_message_tree: TreeSnapshot,
    /// The public-data tree.
    pub public_data_tree: TreeSnapshot,
}

impl StateReference {
    /// The snapshot of one tree.
    pub fn snapshot_of(&self, tree: TreeId) -> TreeSnapshot {
        match tree {
            TreeId::NoteHash => self.note_hash_tree,
            TreeId::Nullifier => self.nullifier_tree,
            TreeId::L1ToL2Message => self.l1_to_l2_message_tree,
            TreeId::PublicData => self.public_data_tree,
        }
    }
}

/// Access to the chain state a transaction executes against.
///
/// Settled-tree reads serve hint building and proof verification; the
/// storage view and the checkpoint/commit surface serve execution. One
/// uncommitted region and at most one live checkpoint inside it are enough
/// for the three-phase machine: `rollback_to_checkpoint` restores to the
/// most recent checkpoint without consuming it, `commit` and
/// `rollback_to_commit` end the transaction scope.
pub trait WorldState {
    /// Root and size of one tree.
    fn get_tree_snapshot(&self, tree: TreeId) -> anyhow::Result<TreeSnapshot>;

    /// Snapshots of all four trees.
    fn get_state_reference(&self) -> anyhow::Result<StateReference> {
        Ok(StateReference {
            note_hash_tree: self.get_tree_snapshot(TreeId::NoteHash)?,
            nullifier_tree: self.get_tree_snapshot(TreeId::Nullifier)?,
            l1_to_l2_message_tree: self.get_tree_snapshot(TreeId::L1ToL2Message)?,
            public_data_tree: self.get_tree_snapshot(TreeId::PublicData)?,
        })
    }

    /// Sibling path of a settled leaf.
    fn get_sibling_path(&self, tree: TreeId, leaf_index: u64) -> anyhow::Result<SiblingPath>;

    /// Preimage of a settled nullifier-tree leaf.
    fn get_nullifier_leaf_preimage(&self, leaf_index: u64)
        -> anyhow::Result<NullifierLeafPreimage>;

    /// Preimage of a settled public-data-tree leaf.
    fn get_public_data_leaf_preimage(
        &self,
        leaf_index: u64,
    ) -> anyhow::Result<PublicDataLeafPreimage>;

    /// The settled nullifier-tree leaf at or below `siloed_value`.
    fn find_low_nullifier(&self, siloed_value: H256) -> anyhow::Result<LowLeaf>;

    /// The settled public-data-tree leaf at or below `slot`.
    fn find_low_public_data_leaf(&self, slot: U256) -> anyhow::Result<LowLeaf>;

    /// Reads a storage slot through the uncommitted overlay.
    fn storage_read(&self, slot: U256) -> anyhow::Result<U256>;

    /// Writes a storage slot into the uncommitted overlay.
    fn storage_write(&mut self, slot: U256, value: U256) -> anyhow::Result<()>;

    /// Marks the current uncommitted writes as durable relative to later
    /// [`WorldState::rollback_to_checkpoint`] calls.
    fn checkpoint(&mut self) -> anyhow::Result<()>;

    /// Restores the uncommitted region to the most recent checkpoint. The
    /// checkpoint stays live and can be rolled back to again.
    fn rollback_to_checkpoint(&mut self) -> anyhow::Result<()>;

    /// Folds all uncommitted writes into the committed state and drops every
    /// checkpoint.
    fn commit(&mut self) -> anyhow::Result<()>;

    /// Discards all uncommitted writes and every checkpoint.
    fn rollback_to_commit(&mut self) -> anyhow::Result<()>;
}

/// In-memory world state over [`merkle_forest`] trees.
///
/// The settled trees only change at block boundaries (the `settle_*`
/// methods); within a block, transactions work on the layered key-value
/// storage view.
#[derive(Clone, Debug)]
pub struct InMemoryWorldState {
    note_hash_tree: AppendOnlyTree,
    nullifier_tree: IndexedTree<NullifierLeafPreimage>,
    l1_to_l2_message_tree: AppendOnlyTree,
    public_data_tree: IndexedTree<PublicDataLeafPreimage>,
    committed: BTreeMap<U256, U256>,
    working: BTreeMap<U256, U256>,
    snapshots: Vec<BTreeMap<U256, U256>>,
}

impl Default for InMemoryWorldState {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryWorldState {
    /// An empty world state with the protocol tree heights.
    pub fn new() -> Self {
        Self {
            note_hash_tree: AppendOnlyTree::new(NOTE_HASH_TREE_HEIGHT),
            nullifier_tree: IndexedTree::new(NULLIFIER_TREE_HEIGHT),
            l1_to_l2_message_tree: AppendOnlyTree::new(L1_TO_L2_MSG_TREE_HEIGHT),
            public_data_tree: IndexedTree::new(PUBLIC_DATA_TREE_HEIGHT),
            committed: BTreeMap::new(),
            working: BTreeMap::new(),
            snapshots: Vec::new(),
        }
    }

    /// Settles note hashes into the tree, as of a previous block.
    pub fn settle_note_hashes<I: IntoIterator<Item = H256>>(
        &mut self,
        leaves: I,
    ) -> anyhow::Result<()> {
        self.note_hash_tree.extend(leaves)?;
        Ok(())
    }

    /// Settles L1-to-L2 messages into the tree, as of a previous block.
    pub fn settle_l1_to_l2_messages<I: IntoIterator<Item = H256>>(
        &mut self,
        leaves: I,
    ) -> anyhow::Result<()> {
        self.l1_to_l2_message_tree.extend(leaves)?;
        Ok(())
    }

    /// Settles a siloed nullifier into the tree, as of a previous block.
    pub fn settle_nullifier(&mut self, siloed_value: H256) -> anyhow::Result<u64> {
        Ok(self
            .nullifier_tree
            .insert(NullifierLeafPreimage::new(siloed_value))?)
    }

    /// Settles a public-data value, visible both to the tree (for proofs)
    /// and to the key-value view (for execution).
    pub fn settle_public_data(&mut self, slot: U256, value: U256) -> anyhow::Result<u64> {
        let index = self
            .public_data_tree
            .insert(PublicDataLeafPreimage::new(slot, value))?;
        self.committed.insert(slot, value);
        Ok(index)
    }

    /// Number of storage snapshots currently stacked.
    pub fn checkpoint_depth(&self) -> usize {
        self.snapshots.len()
    }
}

impl WorldState for InMemoryWorldState {
    fn get_tree_snapshot(&self, tree: TreeId) -> anyhow::Result<TreeSnapshot> {
        Ok(match tree {
            TreeId::NoteHash => TreeSnapshot {
                root: self.note_hash_tree.root(),
                next_available_leaf_index: self.note_hash_tree.size(),
            },
            TreeId::Nullifier => TreeSnapshot {
                root: self.nullifier_tree.root(),
                next_available_leaf_index: self.nullifier_tree.size(),
            },
            TreeId::L1ToL2Message => TreeSnapshot {
                root: self.l1_to_l2_message_tree.root(),
                next_available_leaf_index: self.l1_to_l2_message_tree.size(),
            },
            TreeId::PublicData => TreeSnapshot {
                root: self.public_data_tree.root(),
                next_available_leaf_index: self.public_data_tree.size(),
            },
        })
    }

    fn get_sibling_path(&self, tree: TreeId, leaf_index: u64) -> anyhow::Result<SiblingPath> {
        let path = match tree {
            TreeId::NoteHash => self.note_hash_tree.sibling_path(leaf_index),
            TreeId::Nullifier => self.nullifier_tree.sibling_path(leaf_index),
            TreeId::L1ToL2Message => self.l1_to_l2_message_tree.sibling_path(leaf_index),
            TreeId::PublicData => self.public_data_tree.sibling_path(leaf_index),
        };
        path.with_context(|| format!("reading a sibling path from the {tree} tree"))
    }

    fn get_nullifier_leaf_preimage(
        &self,
        leaf_index: u64,
    ) -> anyhow::Result<NullifierLeafPreimage> {
        Ok(self.nullifier_tree.leaf_preimage(leaf_index)?)
    }

    fn get_public_data_leaf_preimage(
        &self,
        leaf_index: u64,
    ) -> anyhow::Result<PublicDataLeafPreimage> {
        Ok(self.public_data_tree.leaf_preimage(leaf_index)?)
    }

    fn find_low_nullifier(&self, siloed_value: H256) -> anyhow::Result<LowLeaf> {
        Ok(self
            .nullifier_tree
            .find_low_leaf(U256::from_big_endian(siloed_value.as_bytes())))
    }

    fn find_low_public_data_leaf(&self, slot: U256) -> anyhow::Result<LowLeaf> {
        Ok(self.public_data_tree.find_low_leaf(slot))
    }

    fn storage_read(&self, slot: U256) -> anyhow::Result<U256> {
        Ok(self
            .working
            .get(&slot)
            .or_else(|| self.committed.get(&slot))
            .copied()
            .unwrap_or_default())
    }

    fn storage_write(&mut self, slot: U256, value: U256) -> anyhow::Result<()> {
        self.working.insert(slot, value);
        Ok(())
    }

    fn checkpoint(&mut self) -> anyhow::Result<()> {
        self.snapshots.push(self.working.clone());
        Ok(())
    }

    fn rollback_to_checkpoint(&mut self) -> anyhow::Result<()> {
        match self.snapshots.last() {
            Some(snapshot) => {
                self.working = snapshot.clone();
                Ok(())
            }
            None => bail!("rollback requested with no live checkpoint"),
        }
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.committed.extend(std::mem::take(&mut self.working));
        self.snapshots.clear();
        Ok(())
    }

    fn rollback_to_commit(&mut self) -> anyhow::Result<()> {
        self.working.clear();
        self.snapshots.clear();
        Ok(())
    }
}
