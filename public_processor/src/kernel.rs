//! The evolving kernel claim and the composer that folds public execution
//! into it.
//!
//! `KernelPublicInputs` is what the transaction asserts about itself. It
//! arrives seeded by the private kernel and grows as each public call is
//! folded in; the tail step freezes it and produces the proof artifact. The
//! processor owns the authoritative copy and overwrites the claim's
//! observable fields before sealing, so a composer cannot smuggle effects
//! past the phase machine.

use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::{
    executor::ExecutionResult,
    gas::Gas,
    tx::{
        NoteHash, Nullifier, OverridablePublicDataWrite, PublicDataWrite, Tx, TxContext,
        UnencryptedLog,
    },
    validation::requests::ValidationRequests,
    world::StateReference,
};

/// Which phases of a transaction reverted.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum RevertCode {
    /// Every phase succeeded.
    #[default]
    Ok,
    /// App-logic reverted; setup and teardown stood.
    AppLogicReverted,
    /// Teardown reverted; setup and app-logic stood.
    TeardownReverted,
    /// App-logic and teardown both reverted.
    BothReverted,
}

impl RevertCode {
    /// The code for a given pair of phase outcomes.
    pub fn combine(app_logic_reverted: bool, teardown_reverted: bool) -> Self {
        match (app_logic_reverted, teardown_reverted) {
            (false, false) => RevertCode::Ok,
            (true, false) => RevertCode::AppLogicReverted,
            (false, true) => RevertCode::TeardownReverted,
            (true, true) => RevertCode::BothReverted,
        }
    }

    /// Whether no phase reverted.
    pub fn is_ok(&self) -> bool {
        *self == RevertCode::Ok
    }
}

/// The immutable part of the claim: the state the transaction was built
/// against and the terms it committed to.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TxConstants {
    /// State reference the private kernel proved against.
    pub historical_state: StateReference,
    /// Chain, version and gas terms.
    pub tx_context: TxContext,
}

/// Side effects accumulated by one phase.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PhaseEffects {
    /// Note hashes emitted, in counter order.
    pub note_hashes: Vec<NoteHash>,
    /// Nullifiers emitted, in counter order.
    pub nullifiers: Vec<Nullifier>,
    /// Storage writes emitted, in counter order.
    pub public_data_writes: Vec<OverridablePublicDataWrite>,
    /// Unencrypted logs emitted, in counter order.
    pub unencrypted_logs: Vec<UnencryptedLog>,
    /// Gas consumed by the phase.
    pub gas_used: Gas,
}

impl PhaseEffects {
    /// Drops everything the phase accumulated.
    pub fn clear(&mut self) {
        self.note_hashes.clear();
        self.nullifiers.clear();
        self.public_data_writes.clear();
        self.unencrypted_logs.clear();
        self.gas_used = Gas::empty();
    }
}

/// The claim a transaction makes about its own execution, extended call by
/// call until the tail seals it.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct KernelPublicInputs {
    /// The immutable constants.
    pub constants: TxConstants,
    /// Every read the transaction claims, with claimed lengths.
    pub validation_requests: ValidationRequests,
    /// Effects of the setup phase (seeded with the private kernel's
    /// non-revertible effects).
    pub setup: PhaseEffects,
    /// Effects of the app-logic phase (seeded with the private kernel's
    /// revertible effects).
    pub app_logic: PhaseEffects,
    /// Effects of the teardown phase.
    pub teardown: PhaseEffects,
    /// Gas consumed outside teardown, private execution included.
    pub gas_used: Gas,
    /// Gas consumed inside teardown.
    pub teardown_gas_used: Gas,
    /// Which phases reverted.
    pub revert_code: RevertCode,
    /// Account the fee is debited from, if any.
    pub fee_payer: Option<Address>,
    /// The fee actually charged; set at the tail.
    pub transaction_fee: U256,
    /// The balance debit recording the fee, merged into an existing pending
    /// write or carried separately here.
    pub fee_write: Option<PublicDataWrite>,
}

impl KernelPublicInputs {
    /// All surviving storage writes in counter order, fee write last.
    pub fn final_public_data_writes(&self) -> Vec<PublicDataWrite> {
        self.setup
            .public_data_writes
            .iter()
            .chain(&self.app_logic.public_data_writes)
            .chain(&self.teardown.public_data_writes)
            .map(|overridable| overridable.write)
            .chain(self.fee_write)
            .collect()
    }
}

/// An opaque proof of one transaction's public execution.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ProofArtifact(pub Vec<u8>);

/// Folds executed public calls into the kernel claim.
///
/// The processor drives one instance through a fixed call pattern per
/// transaction: `process_first` for the first executed setup call,
/// `process_inner` for the remaining setup calls, `process_merge` for every
/// executed app-logic and teardown call (a reverting call included), and a
/// single `process_tail` over the processor-assembled final inputs for any
/// transaction that executed at least one call.
pub trait KernelCircuitComposer {
    /// Seeds the public kernel inputs from the private claim and the first
    /// executed setup call.
    fn process_first(
        &mut self,
        tx: &Tx,
        result: &ExecutionResult,
    ) -> anyhow::Result<KernelPublicInputs>;

    /// Folds a further setup call into the claim.
    fn process_inner(
        &mut self,
        prev: KernelPublicInputs,
        result: &ExecutionResult,
    ) -> anyhow::Result<KernelPublicInputs>;

    /// Folds an app-logic or teardown call into the claim.
    fn process_merge(
        &mut self,
        prev: KernelPublicInputs,
        result: &ExecutionResult,
    ) -> anyhow::Result<KernelPublicInputs>;

    /// Seals the final claim and produces the proof artifact.
    fn process_tail(
        &mut self,
        inputs: KernelPublicInputs,
    ) -> anyhow::Result<(KernelPublicInputs, ProofArtifact)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_codes_combine_per_phase() {
        assert_eq!(RevertCode::combine(false, false), RevertCode::Ok);
        assert_eq!(
            RevertCode::combine(true, false),
            RevertCode::AppLogicReverted
        );
        assert_eq!(
            RevertCode::combine(false, true),
            RevertCode::TeardownReverted
        );
        assert_eq!(RevertCode::combine(true, true), RevertCode::BothReverted);
        assert!(RevertCode::Ok.is_ok());
        assert!(!RevertCode::BothReverted.is_ok());
    }

    #[test]
    fn final_writes_keep_phase_order_and_end_with_the_fee() {
        let write = |slot: u64, counter: u32| OverridablePublicDataWrite {
            write: PublicDataWrite {
                leaf_slot: U256::from(slot),
                value: U256::from(1),
                counter,
            },
            override_counter: 0,
        };

        let mut inputs = KernelPublicInputs::default();
        inputs.setup.public_data_writes = vec![write(1, 1)];
        inputs.app_logic.public_data_writes = vec![write(2, 5), write(3, 6)];
        inputs.fee_write = Some(PublicDataWrite {
            leaf_slot: U256::from(9),
            value: U256::from(100),
            counter: 7,
        });

        let finals = inputs.final_public_data_writes();
        assert_eq!(
            finals.iter().map(|w| w.leaf_slot.as_u64()).collect::<Vec<_>>(),
            vec![1, 2, 3, 9]
        );
    }
}
