//! Transaction-level failure reporting.
//!
//! One attempt at one transaction either accepts it or produces a
//! [`TxProcessingError`]: the underlying reason plus whatever positional
//! context (hash, batch index, phase) the processor had when it gave up.
//! These errors reject the transaction, never the batch.

use ethereum_types::{Address, U256};
use thiserror::Error;

use crate::{
    executor::SimulationError,
    tx::{TxHash, TxPhase},
    validation::ValidationError,
};

/// Why a transaction was rejected, and where processing stood at the time.
#[derive(Debug)]
pub struct TxProcessingError {
    tx_hash: Option<TxHash>,
    txn_idx: Option<usize>,
    phase: Option<TxPhase>,
    reason: TxErrorReason,
}

impl std::fmt::Display for TxProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "Error processing transaction: {}\n{}{}{}",
            self.reason,
            optional_field("Tx hash", self.tx_hash),
            optional_field("Txn idx", self.txn_idx),
            optional_field("Phase", self.phase),
        )
    }
}

impl std::error::Error for TxProcessingError {}

impl TxProcessingError {
    /// Creates a new TxProcessingError with the mandatory reason.
    pub(crate) fn new(reason: TxErrorReason) -> Self {
        Self {
            tx_hash: None,
            txn_idx: None,
            phase: None,
            reason,
        }
    }

    /// Builder method to set tx_hash
    pub(crate) fn tx_hash(&mut self, tx_hash: TxHash) -> &mut Self {
        self.tx_hash = Some(tx_hash);
        self
    }

    /// Builder method to set txn_idx
    pub(crate) fn txn_idx(&mut self, txn_idx: usize) -> &mut Self {
        self.txn_idx = Some(txn_idx);
        self
    }

    /// Builder method to set phase
    pub(crate) fn phase(&mut self, phase: TxPhase) -> &mut Self {
        self.phase = Some(phase);
        self
    }

    /// The underlying rejection reason.
    pub fn reason(&self) -> &TxErrorReason {
        &self.reason
    }

    /// The phase processing stood in when it gave up, if it got that far.
    pub fn failed_phase(&self) -> Option<TxPhase> {
        self.phase
    }
}

fn optional_field<T: std::fmt::Debug>(label: &str, value: Option<T>) -> String {
    value.map_or(String::new(), |v| format!("{}: {:?}\n", label, v))
}

/// The rejection reasons a transaction can hit.
#[derive(Debug, Error)]
pub enum TxErrorReason {
    /// The batch-level validator refused the transaction before execution.
    #[error("Rejected by the batch validator: {0}")]
    ValidatorRejected(String),

    /// The declared fee payer cannot cover the required fee.
    #[error("Fee payer {payer:?} holds {balance} but the transaction requires {required}")]
    InsufficientFeeBalance {
        /// The declared fee payer.
        payer: Address,
        /// Their current balance.
        balance: U256,
        /// The fee they would have to cover.
        required: U256,
    },

    /// A non-revertible setup call reverted.
    #[error("Setup phase reverted: {0}")]
    SetupReverted(SimulationError),

    /// A claimed read failed verification.
    #[error("Read-request validation failed: {0}")]
    ValidationFailed(ValidationError),

    /// A collaborator broke, or an internal bound was violated.
    #[error("Internal error: {0:#}")]
    Internal(anyhow::Error),
}
