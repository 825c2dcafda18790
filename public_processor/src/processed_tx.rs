//! What leaves the processor: accepted transactions for the block builder,
//! rejected ones for resubmission or debugging.

use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{
    error::TxProcessingError,
    gas::{Gas, PerPhaseGas},
    kernel::{KernelPublicInputs, ProofArtifact},
    tx::{PublicDataWrite, Tx, TxHash, UnencryptedLog},
};

/// An accepted transaction with its sealed claim, proof artifact, and the
/// effects a block builder consumes directly.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProcessedTx {
    /// The transaction hash.
    pub hash: TxHash,
    /// The sealed kernel claim.
    pub public_inputs: KernelPublicInputs,
    /// Logs that survived their phase, in counter order.
    pub unencrypted_logs: Vec<UnencryptedLog>,
    /// Proof of the public execution.
    pub proof: ProofArtifact,
    /// Actual gas consumption per phase.
    pub gas_used: PerPhaseGas,
    /// Billed gas: non-teardown actuals plus the full teardown allocation
    /// when a teardown call exists.
    pub total_gas_used: Gas,
    /// Surviving storage writes in counter order, fee write last.
    pub public_data_writes: Vec<PublicDataWrite>,
    /// Account the fee was debited from, if any.
    pub fee_payer: Option<Address>,
    /// The fee charged.
    pub transaction_fee: U256,
}

/// A rejected transaction and why. Rejection leaves no world-state
/// mutation behind.
#[derive(Debug)]
pub struct FailedTx {
    /// The transaction as submitted.
    pub tx: Tx,
    /// What rejected it.
    pub error: TxProcessingError,
}

/// Downstream consumer of accepted transactions.
///
/// Called exactly once per accepted transaction, after its world-state
/// commit. An error here poisons the batch: `process` stops and surfaces
/// it.
pub trait ProcessedTxHandler {
    /// Takes ownership of the outcome downstream.
    fn add_new_tx(&mut self, tx: &ProcessedTx) -> anyhow::Result<()>;
}
