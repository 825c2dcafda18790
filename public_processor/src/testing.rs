//! Deterministic collaborator doubles and fixture builders for
//! `public_processor` unit and integration tests.
//!
//! The processor's collaborators are traits precisely so the state machine
//! can be driven without a real simulator or prover: [`ScriptedExecutor`]
//! replays canned execution results, [`RecordingComposer`] threads claims
//! through unchanged while counting the folding calls, and
//! [`CountingWorldState`] wraps any world state to expose its checkpoint
//! traffic.

use std::collections::VecDeque;

use anyhow::{anyhow, bail};
use ethereum_types::{Address, H256, U256};
use merkle_forest::{
    hashing::SiblingPath,
    indexed_tree::{LowLeaf, NullifierLeafPreimage, PublicDataLeafPreimage},
};

use crate::{
    executor::{ExecutionContext, ExecutionResult, PublicCallExecutor, SimulationError},
    gas::{Gas, GasFees, GasSettings},
    kernel::{KernelCircuitComposer, KernelPublicInputs, ProofArtifact},
    processed_tx::{ProcessedTx, ProcessedTxHandler},
    tx::{EnqueuedPublicCall, Nullifier, Tx, TxHash, TxPhase},
    validation::hints::{
        MembershipHint, NonMembershipHint, NullifierReadHint, PublicDataReadHint,
        SortedPendingNullifiers,
    },
    world::{InMemoryWorldState, TreeId, TreeSnapshot, WorldState},
};

/// What the executor observed for one simulated call.
#[derive(Clone, Debug)]
pub struct ObservedCall {
    /// The call as enqueued.
    pub call: EnqueuedPublicCall,
    /// Gas the processor made available.
    pub available_gas: Gas,
    /// The fee in scope, non-zero only during teardown.
    pub transaction_fee: U256,
    /// First side-effect counter the call was allowed to allocate.
    pub next_side_effect_counter: u32,
    /// Size of the pending nullifier set at call time.
    pub pending_nullifiers: usize,
}

/// Replays a fixed script of execution results, in order, and records what
/// the processor asked for.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: VecDeque<ExecutionResult>,
    /// Everything simulated so far.
    pub observed: Vec<ObservedCall>,
}

impl ScriptedExecutor {
    /// An executor that serves `results` in order and errors once they run
    /// out.
    pub fn new(results: impl IntoIterator<Item = ExecutionResult>) -> Self {
        Self {
            script: results.into_iter().collect(),
            observed: Vec::new(),
        }
    }

    /// Number of calls simulated so far.
    pub fn calls(&self) -> usize {
        self.observed.len()
    }
}

impl PublicCallExecutor for ScriptedExecutor {
    fn simulate(
        &mut self,
        call: &EnqueuedPublicCall,
        ctx: &ExecutionContext<'_>,
    ) -> anyhow::Result<ExecutionResult> {
        self.observed.push(ObservedCall {
            call: call.clone(),
            available_gas: ctx.available_gas,
            transaction_fee: ctx.transaction_fee,
            next_side_effect_counter: ctx.next_side_effect_counter,
            pending_nullifiers: ctx.pending_nullifiers.len(),
        });
        self.script
            .pop_front()
            .ok_or_else(|| anyhow!("the execution script is exhausted"))
    }
}

/// Threads kernel inputs through unchanged while counting the folding
/// calls.
#[derive(Debug, Default)]
pub struct RecordingComposer {
    /// `process_first` calls seen.
    pub first: usize,
    /// `process_inner` calls seen.
    pub inner: usize,
    /// `process_merge` calls seen.
    pub merge: usize,
    /// `process_tail` calls seen.
    pub tail: usize,
}

impl KernelCircuitComposer for RecordingComposer {
    fn process_first(
        &mut self,
        tx: &Tx,
        _result: &ExecutionResult,
    ) -> anyhow::Result<KernelPublicInputs> {
        self.first += 1;
        Ok(tx.public_inputs.clone())
    }

    fn process_inner(
        &mut self,
        prev: KernelPublicInputs,
        _result: &ExecutionResult,
    ) -> anyhow::Result<KernelPublicInputs> {
        self.inner += 1;
        Ok(prev)
    }

    fn process_merge(
        &mut self,
        prev: KernelPublicInputs,
        _result: &ExecutionResult,
    ) -> anyhow::Result<KernelPublicInputs> {
        self.merge += 1;
        Ok(prev)
    }

    fn process_tail(
        &mut self,
        inputs: KernelPublicInputs,
    ) -> anyhow::Result<(KernelPublicInputs, ProofArtifact)> {
        self.tail += 1;
        Ok((inputs, ProofArtifact(vec![0xAA; 4])))
    }
}

/// Wraps a world state and counts the checkpoint and commit traffic.
#[derive(Debug, Default)]
pub struct CountingWorldState<W> {
    inner: W,
    /// `checkpoint` calls seen.
    pub checkpoints: usize,
    /// `rollback_to_checkpoint` calls seen.
    pub checkpoint_rollbacks: usize,
    /// `commit` calls seen.
    pub commits: usize,
    /// `rollback_to_commit` calls seen.
    pub commit_rollbacks: usize,
}

impl<W> CountingWorldState<W> {
    /// Wraps `inner` with zeroed counters.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            checkpoints: 0,
            checkpoint_rollbacks: 0,
            commits: 0,
            commit_rollbacks: 0,
        }
    }

    /// The wrapped world state.
    pub fn inner(&self) -> &W {
        &self.inner
    }

    /// The wrapped world state, mutably, for settling fixtures.
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: WorldState> WorldState for CountingWorldState<W> {
    fn get_tree_snapshot(&self, tree: TreeId) -> anyhow::Result<TreeSnapshot> {
        self.inner.get_tree_snapshot(tree)
    }

    fn get_sibling_path(&self, tree: TreeId, leaf_index: u64) -> anyhow::Result<SiblingPath> {
        self.inner.get_sibling_path(tree, leaf_index)
    }

    fn get_nullifier_leaf_preimage(
        &self,
        leaf_index: u64,
    ) -> anyhow::Result<NullifierLeafPreimage> {
        self.inner.get_nullifier_leaf_preimage(leaf_index)
    }

    fn get_public_data_leaf_preimage(
        &self,
        leaf_index: u64,
    ) -> anyhow::Result<PublicDataLeafPreimage> {
        self.inner.get_public_data_leaf_preimage(leaf_index)
    }

    fn find_low_nullifier(&self, siloed_value: H256) -> anyhow::Result<LowLeaf> {
        self.inner.find_low_nullifier(siloed_value)
    }

    fn find_low_public_data_leaf(&self, slot: U256) -> anyhow::Result<LowLeaf> {
        self.inner.find_low_public_data_leaf(slot)
    }

    fn storage_read(&self, slot: U256) -> anyhow::Result<U256> {
        self.inner.storage_read(slot)
    }

    fn storage_write(&mut self, slot: U256, value: U256) -> anyhow::Result<()> {
        self.inner.storage_write(slot, value)
    }

    fn checkpoint(&mut self) -> anyhow::Result<()> {
        self.checkpoints += 1;
        self.inner.checkpoint()
    }

    fn rollback_to_checkpoint(&mut self) -> anyhow::Result<()> {
        self.checkpoint_rollbacks += 1;
        self.inner.rollback_to_checkpoint()
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.commits += 1;
        self.inner.commit()
    }

    fn rollback_to_commit(&mut self) -> anyhow::Result<()> {
        self.commit_rollbacks += 1;
        self.inner.rollback_to_commit()
    }
}

/// Collects accepted transactions. Set `fail` to make the next delivery
/// error, which the processor treats as fatal for the batch.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    /// Everything delivered so far.
    pub txs: Vec<ProcessedTx>,
    /// Whether the next delivery should error.
    pub fail: bool,
}

impl ProcessedTxHandler for CollectingHandler {
    fn add_new_tx(&mut self, tx: &ProcessedTx) -> anyhow::Result<()> {
        if self.fail {
            bail!("the downstream sink refused the transaction");
        }
        self.txs.push(tx.clone());
        Ok(())
    }
}

/// A transaction with a recognizable hash and an otherwise empty claim.
pub fn txn(seed: u8) -> Tx {
    Tx {
        hash: TxHash(H256::repeat_byte(seed)),
        ..Tx::default()
    }
}

/// An enqueued call in `phase`, requested at `side_effect_counter`.
pub fn call(phase: TxPhase, side_effect_counter: u32) -> EnqueuedPublicCall {
    EnqueuedPublicCall {
        contract_address: Address::repeat_byte(0xC0),
        function_selector: 1,
        args: Vec::new(),
        caller: Address::repeat_byte(0xCA),
        side_effect_counter,
        phase,
    }
}

/// A successful execution result that burned `gas_used`.
pub fn ok_result(gas_used: Gas, end_side_effect_counter: u32) -> ExecutionResult {
    ExecutionResult {
        gas_used,
        end_side_effect_counter,
        ..ExecutionResult::default()
    }
}

/// A reverted execution result.
pub fn reverted_result(reason: &str, gas_used: Gas, end_side_effect_counter: u32) -> ExecutionResult {
    ExecutionResult {
        revert_reason: Some(SimulationError::new(reason)),
        ..ok_result(gas_used, end_side_effect_counter)
    }
}

/// Gas settings with unit prices, symmetric limits and a flat inclusion
/// fee of 1000.
pub fn unit_gas_settings(limit: u64, teardown: u64) -> GasSettings {
    GasSettings {
        gas_limits: Gas::new(limit, limit),
        teardown_gas_limits: Gas::new(teardown, teardown),
        max_fees_per_gas: GasFees::new(U256::one(), U256::one()),
        inclusion_fee: U256::from(1000),
    }
}

/// Sorts a pending nullifier set into the permutation shape the
/// non-existence check verifies.
pub fn sorted_pending_nullifiers(pending: &[Nullifier]) -> SortedPendingNullifiers {
    let mut order: Vec<usize> = (0..pending.len()).collect();
    order.sort_by_key(|&i| pending[i].value);
    let mut sorted_index_hints = vec![0; pending.len()];
    for (sorted_pos, &original) in order.iter().enumerate() {
        sorted_index_hints[original] = sorted_pos;
    }
    SortedPendingNullifiers {
        sorted_values: order.iter().map(|&i| pending[i].value).collect(),
        sorted_index_hints,
    }
}

/// Insertion point of `value` within the sorted pending values.
pub fn pending_insertion_point(sorted: &SortedPendingNullifiers, value: H256) -> usize {
    sorted.sorted_values.partition_point(|&v| v < value)
}

/// The low-leaf hint proving `siloed_value` is absent from the settled
/// nullifier tree.
pub fn low_nullifier_hint(
    world: &InMemoryWorldState,
    siloed_value: H256,
) -> anyhow::Result<NonMembershipHint> {
    let low = world.find_low_nullifier(siloed_value)?;
    Ok(NonMembershipHint {
        low_leaf_preimage: world.get_nullifier_leaf_preimage(low.index)?,
        membership: MembershipHint {
            leaf_index: low.index,
            sibling_path: world.get_sibling_path(TreeId::Nullifier, low.index)?,
        },
    })
}

/// A settled-read hint for the nullifier leaf at `leaf_index`.
pub fn settled_nullifier_hint(
    world: &InMemoryWorldState,
    leaf_index: u64,
) -> anyhow::Result<NullifierReadHint> {
    Ok(NullifierReadHint::Settled {
        leaf_preimage: world.get_nullifier_leaf_preimage(leaf_index)?,
        membership: MembershipHint {
            leaf_index,
            sibling_path: world.get_sibling_path(TreeId::Nullifier, leaf_index)?,
        },
    })
}

/// A settled-read hint for the public-data leaf at `leaf_index`.
pub fn settled_public_data_hint(
    world: &InMemoryWorldState,
    leaf_index: u64,
) -> anyhow::Result<PublicDataReadHint> {
    Ok(PublicDataReadHint::Settled {
        leaf_preimage: world.get_public_data_leaf_preimage(leaf_index)?,
        membership: MembershipHint {
            leaf_index,
            sibling_path: world.get_sibling_path(TreeId::PublicData, leaf_index)?,
        },
    })
}
