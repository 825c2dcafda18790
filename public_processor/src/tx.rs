//! Transaction-side data: what arrives from the private domain and what the
//! enqueued public calls look like.

use ethereum_types::{Address, H256, U256};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    gas::{GasFees, GasSettings},
    kernel::KernelPublicInputs,
    validation::hints::TxValidationHints,
};

/// The transaction hash fixed by the private kernel.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct TxHash(pub H256);

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The three public execution phases.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize, strum::Display,
)]
#[strum(serialize_all = "kebab-case")]
pub enum TxPhase {
    /// Non-revertible calls. A failure here rejects the transaction.
    Setup,
    /// Revertible calls. A failure here is absorbed and the tx continues.
    AppLogic,
    /// The single fee-paying call with its own gas allocation.
    Teardown,
}

/// A public call the private kernel committed to.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct EnqueuedPublicCall {
    /// The contract to execute.
    pub contract_address: Address,
    /// Selector of the entry point within that contract.
    pub function_selector: u32,
    /// Packed call arguments.
    pub args: Vec<H256>,
    /// The calling address the execution observes.
    pub caller: Address,
    /// Side-effect counter assigned to the call itself; everything the call
    /// emits gets counters above this.
    pub side_effect_counter: u32,
    /// The phase this call was enqueued for.
    pub phase: TxPhase,
}

/// A single storage write, identified by its side-effect counter.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PublicDataWrite {
    /// The public-data tree slot written to.
    pub leaf_slot: U256,
    /// The value written.
    pub value: U256,
    /// Side-effect counter at which the write happened.
    pub counter: u32,
}

/// A storage write plus the counter of the later write (if any) that
/// overrode it within the same transaction.
///
/// `override_counter == 0` means the write was never overridden. A read may
/// only be satisfied by a write that happened before it and was not yet
/// overridden at the read's counter.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OverridablePublicDataWrite {
    /// The underlying write.
    pub write: PublicDataWrite,
    /// Counter of the overriding write, or 0.
    pub override_counter: u32,
}

impl OverridablePublicDataWrite {
    /// A write that nothing has overridden yet.
    pub fn new(write: PublicDataWrite) -> Self {
        Self {
            write,
            override_counter: 0,
        }
    }

    /// Whether a read at `read_counter` observes this write.
    pub fn visible_at(&self, read_counter: u32) -> bool {
        self.write.counter < read_counter
            && (self.override_counter == 0 || self.override_counter > read_counter)
    }
}

/// A siloed note hash emitted by a call.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct NoteHash {
    /// The siloed note hash.
    pub value: H256,
    /// Side-effect counter at which it was emitted.
    pub counter: u32,
}

/// A siloed nullifier emitted by a call.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Nullifier {
    /// The siloed nullifier.
    pub value: H256,
    /// Side-effect counter at which it was emitted.
    pub counter: u32,
}

/// An unencrypted log emitted by a public call.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct UnencryptedLog {
    /// The emitting contract.
    pub contract_address: Address,
    /// Raw log payload.
    pub data: Vec<u8>,
    /// Side-effect counter at which the log was emitted.
    pub counter: u32,
}

/// Block-level values every public call executes under.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GlobalVariables {
    /// The chain being built for.
    pub chain_id: u64,
    /// Protocol version.
    pub version: u64,
    /// Height of the block under construction.
    pub block_number: u64,
    /// Timestamp of the block under construction.
    pub timestamp: u64,
    /// Address credited with the block's fees.
    pub fee_recipient: Address,
    /// Current per-dimension gas prices.
    pub gas_fees: GasFees,
}

/// Transaction-scoped execution terms.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TxContext {
    /// The chain the transaction was signed for.
    pub chain_id: u64,
    /// Protocol version the transaction was signed for.
    pub version: u64,
    /// The gas terms committed to by the sender.
    pub gas_settings: GasSettings,
}

/// A transaction as handed to the public processor: the private kernel's
/// claimed public inputs plus the public calls it enqueued. Immutable once
/// constructed.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Tx {
    /// The transaction hash.
    pub hash: TxHash,
    /// The private kernel's claimed outputs, which public execution extends.
    pub public_inputs: KernelPublicInputs,
    /// Setup and app-logic calls, in no particular order.
    pub enqueued_calls: Vec<EnqueuedPublicCall>,
    /// The optional teardown call.
    pub teardown_call: Option<EnqueuedPublicCall>,
    /// Nondeterministic hints backing this transaction's read requests.
    pub validation_hints: TxValidationHints,
}

impl Tx {
    /// The enqueued calls of one phase, in ascending counter order.
    pub fn phase_calls(&self, phase: TxPhase) -> Vec<&EnqueuedPublicCall> {
        match phase {
            TxPhase::Teardown => self.teardown_call.iter().collect(),
            _ => self
                .enqueued_calls
                .iter()
                .filter(|call| call.phase == phase)
                .sorted_by_key(|call| call.side_effect_counter)
                .collect(),
        }
    }

    /// The declared fee payer, if any.
    pub fn fee_payer(&self) -> Option<Address> {
        self.public_inputs.fee_payer
    }

    /// The gas terms this transaction committed to.
    pub fn gas_settings(&self) -> &GasSettings {
        &self.public_inputs.constants.tx_context.gas_settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_visibility_honors_counters_and_overrides() {
        let write = |counter, override_counter| OverridablePublicDataWrite {
            write: PublicDataWrite {
                leaf_slot: U256::from(1),
                value: U256::from(2),
                counter,
            },
            override_counter,
        };

        // Never overridden: visible to any later read.
        assert!(write(5, 0).visible_at(6));
        assert!(!write(5, 0).visible_at(5));
        assert!(!write(5, 0).visible_at(4));

        // Overridden at 9: visible only to reads in (5, 9).
        assert!(write(5, 9).visible_at(8));
        assert!(!write(5, 9).visible_at(9));
        assert!(!write(5, 9).visible_at(10));
    }
}
