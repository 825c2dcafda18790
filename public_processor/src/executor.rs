//! The call-execution seam.
//!
//! The processor never interprets bytecode; it hands each enqueued call and
//! an [`ExecutionContext`] to a [`PublicCallExecutor`] and folds the
//! returned [`ExecutionResult`] tree into the transaction. Results carry
//! everything the processor needs to meter gas, extend the claim, and
//! detect reverts; a nested revert bubbles up through [`ExecutionResult::failure`].

use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    gas::Gas,
    tx::{
        EnqueuedPublicCall, GlobalVariables, NoteHash, Nullifier, PublicDataWrite, TxContext,
        UnencryptedLog,
    },
    validation::requests::{
        PublicDataRead, ScopedReadRequest, TreeLeafReadRequest, ValidationRequestArrayLengths,
    },
};

/// Counts of side effects already accumulated by the transaction, exposed
/// so an executor can stop before overflowing a protocol capacity.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AccumulatedDataArrayLengths {
    /// Note hashes emitted so far.
    pub note_hashes: usize,
    /// Nullifiers emitted so far.
    pub nullifiers: usize,
    /// Storage writes emitted so far.
    pub public_data_writes: usize,
    /// Unencrypted logs emitted so far.
    pub unencrypted_logs: usize,
}

/// Everything one call sees of its enclosing transaction.
#[derive(Clone, Debug)]
pub struct ExecutionContext<'a> {
    /// Block-level values.
    pub globals: GlobalVariables,
    /// Transaction-level terms.
    pub tx_context: TxContext,
    /// Gas remaining for this call.
    pub available_gas: Gas,
    /// The computed transaction fee; non-zero only during teardown.
    pub transaction_fee: U256,
    /// Nullifiers already emitted by this transaction.
    pub pending_nullifiers: &'a [Nullifier],
    /// First side-effect counter this call may use.
    pub next_side_effect_counter: u32,
    /// Read requests already claimed, per category.
    pub validation_request_lengths: ValidationRequestArrayLengths,
    /// Side effects already accumulated, per category.
    pub accumulated_data_lengths: AccumulatedDataArrayLengths,
}

/// A contract-level revert raised during simulation.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[error("{message}")]
pub struct SimulationError {
    /// The revert message, as raised by the contract.
    pub message: String,
}

impl SimulationError {
    /// A revert with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What one simulated call did, nested calls included.
///
/// Effects are the call's *own* (nested calls carry theirs); every entry
/// carries the side-effect counter it was emitted at, so the transaction
/// can rebuild the global order. Nullifiers and note hashes arrive already
/// siloed.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Calls made by this one, in call order.
    pub nested: Vec<ExecutionResult>,
    /// Note hashes emitted by this call.
    pub note_hashes: Vec<NoteHash>,
    /// Nullifiers emitted by this call.
    pub nullifiers: Vec<Nullifier>,
    /// Storage writes emitted by this call.
    pub public_data_writes: Vec<PublicDataWrite>,
    /// Unencrypted logs emitted by this call.
    pub unencrypted_logs: Vec<UnencryptedLog>,
    /// Note-hash reads claimed by this call.
    pub note_hash_read_requests: Vec<TreeLeafReadRequest>,
    /// Nullifier existence reads claimed by this call.
    pub nullifier_read_requests: Vec<ScopedReadRequest>,
    /// Nullifier non-existence reads claimed by this call.
    pub nullifier_non_existent_read_requests: Vec<ScopedReadRequest>,
    /// L1-to-L2 message reads claimed by this call.
    pub l1_to_l2_msg_read_requests: Vec<TreeLeafReadRequest>,
    /// Storage reads claimed by this call.
    pub public_data_reads: Vec<PublicDataRead>,
    /// Gas this call tree consumed.
    pub gas_used: Gas,
    /// First side-effect counter free after this call tree.
    pub end_side_effect_counter: u32,
    /// The revert this call itself raised, if any.
    pub revert_reason: Option<SimulationError>,
}

impl ExecutionResult {
    /// The first revert in this call tree, the call's own before nested
    /// ones.
    pub fn failure(&self) -> Option<&SimulationError> {
        self.revert_reason
            .as_ref()
            .or_else(|| self.nested.iter().find_map(ExecutionResult::failure))
    }

    /// This call and every nested call, depth first.
    pub fn flattened(&self) -> Vec<&ExecutionResult> {
        let mut all = vec![self];
        for nested in &self.nested {
            all.extend(nested.flattened());
        }
        all
    }
}

/// Simulates one enqueued public call against the current world state.
pub trait PublicCallExecutor {
    /// Runs the call, returning its full result tree. `Err` means the
    /// simulator itself broke, not that the contract reverted.
    fn simulate(
        &mut self,
        call: &EnqueuedPublicCall,
        ctx: &ExecutionContext<'_>,
    ) -> anyhow::Result<ExecutionResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_nested_revert_bubbles_up() {
        let mut inner = ExecutionResult::default();
        inner.revert_reason = Some(SimulationError::new("nested opcode failure"));
        let mut outer = ExecutionResult::default();
        outer.nested = vec![ExecutionResult::default(), inner];

        assert_eq!(
            outer.failure().map(|e| e.message.as_str()),
            Some("nested opcode failure")
        );
        assert!(ExecutionResult::default().failure().is_none());
    }

    #[test]
    fn flattening_is_depth_first() {
        let tag = |counter: u32| ExecutionResult {
            end_side_effect_counter: counter,
            ..Default::default()
        };
        let tree = ExecutionResult {
            nested: vec![
                ExecutionResult {
                    nested: vec![tag(2)],
                    ..tag(1)
                },
                tag(3),
            ],
            ..tag(0)
        };

        let order: Vec<u32> = tree
            .flattened()
            .into_iter()
            .map(|r| r.end_side_effect_counter)
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }
}
