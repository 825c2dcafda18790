//! Per-transaction bookkeeping.
//!
//! [`TxExecutionState`] is the processor's authoritative record of what a
//! transaction has done so far: per-phase effects seeded from the private
//! kernel's claim, the accumulated read requests, gas actuals, and the
//! side-effect counter. The kernel claim threaded through the composer is
//! advisory until the processor seals it from this state.

use anyhow::ensure;
use ethereum_types::{Address, U256};
use itertools::chain;
use zk_sequencer_common::{
    MAX_NOTE_HASHES_PER_TX, MAX_NULLIFIERS_PER_TX, MAX_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX,
    MAX_UNENCRYPTED_LOGS_PER_TX,
};

use crate::{
    executor::{AccumulatedDataArrayLengths, ExecutionResult},
    gas::{Gas, PerPhaseGas},
    kernel::{KernelPublicInputs, PhaseEffects, RevertCode, TxConstants},
    tx::{Nullifier, OverridablePublicDataWrite, PublicDataWrite, Tx, TxPhase},
    validation::requests::{ValidationRequestArrayLengths, ValidationRequests},
};

/// The side effects, requests, counters and gas of one transaction in
/// flight.
#[derive(Debug)]
pub(crate) struct TxExecutionState {
    constants: TxConstants,
    fee_payer: Option<Address>,
    validation_requests: ValidationRequests,
    setup: PhaseEffects,
    app_logic: PhaseEffects,
    teardown: PhaseEffects,
    /// Actual consumption per public phase; survives phase discards (a
    /// reverted phase is still billed for what it burned).
    actual_gas: PerPhaseGas,
    /// Private consumption plus setup and app-logic actuals.
    gas_used: Gas,
    /// Teardown actuals, accounted inside the fixed allocation.
    teardown_gas_used: Gas,
    next_side_effect_counter: u32,
    request_mark: ValidationRequestArrayLengths,
    fee_write: Option<PublicDataWrite>,
}

impl TxExecutionState {
    /// Seeds the state from the private kernel's claim.
    pub(crate) fn new(tx: &Tx) -> Self {
        let inputs = &tx.public_inputs;
        Self {
            constants: inputs.constants,
            fee_payer: inputs.fee_payer,
            validation_requests: inputs.validation_requests.clone(),
            setup: inputs.setup.clone(),
            app_logic: inputs.app_logic.clone(),
            teardown: inputs.teardown.clone(),
            actual_gas: PerPhaseGas::default(),
            gas_used: inputs.gas_used,
            teardown_gas_used: Gas::empty(),
            next_side_effect_counter: starting_counter(tx),
            request_mark: inputs.validation_requests.array_lengths,
            fee_write: None,
        }
    }

    /// Marks the request arrays so a later [`Self::discard_phase`] can
    /// rewind what the phase appended.
    pub(crate) fn begin_phase(&mut self) {
        self.request_mark = self.validation_requests.array_lengths;
    }

    /// Folds one executed call tree into the phase: effects, read requests,
    /// gas, and the counter high-water mark. Capacity overflows surface as
    /// errors, rejecting the transaction.
    pub(crate) fn absorb(&mut self, phase: TxPhase, result: &ExecutionResult) -> anyhow::Result<()> {
        for call in result.flattened() {
            let effects = self.phase_effects_mut(phase);
            effects.note_hashes.extend(call.note_hashes.iter().copied());
            effects.nullifiers.extend(call.nullifiers.iter().copied());
            effects.public_data_writes.extend(
                call.public_data_writes
                    .iter()
                    .copied()
                    .map(OverridablePublicDataWrite::new),
            );
            effects
                .unencrypted_logs
                .extend(call.unencrypted_logs.iter().cloned());

            for request in &call.note_hash_read_requests {
                self.validation_requests.append_note_hash_read(*request)?;
            }
            for request in &call.nullifier_read_requests {
                self.validation_requests.append_nullifier_read(*request)?;
            }
            for request in &call.nullifier_non_existent_read_requests {
                self.validation_requests
                    .append_nullifier_non_existent_read(*request)?;
            }
            for request in &call.l1_to_l2_msg_read_requests {
                self.validation_requests.append_l1_to_l2_msg_read(*request)?;
            }
            for request in &call.public_data_reads {
                self.validation_requests.append_public_data_read(*request)?;
            }
        }

        let effects = self.phase_effects_mut(phase);
        effects.note_hashes.sort_by_key(|n| n.counter);
        effects.nullifiers.sort_by_key(|n| n.counter);
        effects.public_data_writes.sort_by_key(|w| w.write.counter);
        effects.unencrypted_logs.sort_by_key(|l| l.counter);
        effects.gas_used = effects.gas_used.add(result.gas_used);
        self.enforce_effect_capacities()?;

        let actual = match phase {
            TxPhase::Setup => &mut self.actual_gas.setup,
            TxPhase::AppLogic => &mut self.actual_gas.app_logic,
            TxPhase::Teardown => &mut self.actual_gas.teardown,
        };
        *actual = actual.add(result.gas_used);
        if phase == TxPhase::Teardown {
            self.teardown_gas_used = self.teardown_gas_used.add(result.gas_used);
        } else {
            self.gas_used = self.gas_used.add(result.gas_used);
        }

        self.next_side_effect_counter = self
            .next_side_effect_counter
            .max(result.end_side_effect_counter);
        self.recompute_override_counters();
        Ok(())
    }

    /// Drops everything a failed phase accumulated: its effects and logs,
    /// and the read requests appended since [`Self::begin_phase`]. Gas
    /// actuals stay, reverted execution is still billed.
    pub(crate) fn discard_phase(&mut self, phase: TxPhase) {
        self.phase_effects_mut(phase).clear();
        self.validation_requests.truncate_to(self.request_mark);
        self.recompute_override_counters();
    }

    /// Nullifiers pending across all phases, in counter order.
    pub(crate) fn pending_nullifiers(&self) -> Vec<Nullifier> {
        chain!(
            &self.setup.nullifiers,
            &self.app_logic.nullifiers,
            &self.teardown.nullifiers,
        )
        .copied()
        .collect()
    }

    /// Storage writes pending across all phases, in counter order.
    pub(crate) fn pending_public_data_writes(&self) -> Vec<OverridablePublicDataWrite> {
        chain!(
            &self.setup.public_data_writes,
            &self.app_logic.public_data_writes,
            &self.teardown.public_data_writes,
        )
        .copied()
        .collect()
    }

    /// Records the fee debit: overwrites the latest surviving write to the
    /// balance slot in place, or carries a fresh write when no call touched
    /// the slot.
    pub(crate) fn record_fee_payment(&mut self, balance_slot: U256, new_balance: U256) {
        let latest_same_slot = chain!(
            &mut self.setup.public_data_writes,
            &mut self.app_logic.public_data_writes,
            &mut self.teardown.public_data_writes,
        )
        .filter(|w| w.write.leaf_slot == balance_slot)
        .max_by_key(|w| w.write.counter);

        match latest_same_slot {
            Some(write) => write.write.value = new_balance,
            None => {
                let counter = self.next_side_effect_counter;
                self.next_side_effect_counter += 1;
                self.fee_write = Some(PublicDataWrite {
                    leaf_slot: balance_slot,
                    value: new_balance,
                    counter,
                });
            }
        }
    }

    /// Overwrites the observable fields of a composer-threaded claim with
    /// this state's authoritative values.
    pub(crate) fn seal_public_inputs(
        &self,
        mut inputs: KernelPublicInputs,
        revert_code: RevertCode,
        transaction_fee: U256,
    ) -> KernelPublicInputs {
        inputs.constants = self.constants;
        inputs.validation_requests = self.validation_requests.clone();
        inputs.setup = self.setup.clone();
        inputs.app_logic = self.app_logic.clone();
        inputs.teardown = self.teardown.clone();
        inputs.gas_used = self.gas_used;
        inputs.teardown_gas_used = self.teardown_gas_used;
        inputs.revert_code = revert_code;
        inputs.fee_payer = self.fee_payer;
        inputs.transaction_fee = transaction_fee;
        inputs.fee_write = self.fee_write;
        inputs
    }

    pub(crate) fn validation_requests(&self) -> &ValidationRequests {
        &self.validation_requests
    }

    pub(crate) fn request_lengths(&self) -> ValidationRequestArrayLengths {
        self.validation_requests.array_lengths
    }

    pub(crate) fn accumulated_data_lengths(&self) -> AccumulatedDataArrayLengths {
        AccumulatedDataArrayLengths {
            note_hashes: self.setup.note_hashes.len()
                + self.app_logic.note_hashes.len()
                + self.teardown.note_hashes.len(),
            nullifiers: self.setup.nullifiers.len()
                + self.app_logic.nullifiers.len()
                + self.teardown.nullifiers.len(),
            public_data_writes: self.setup.public_data_writes.len()
                + self.app_logic.public_data_writes.len()
                + self.teardown.public_data_writes.len(),
            unencrypted_logs: self.setup.unencrypted_logs.len()
                + self.app_logic.unencrypted_logs.len()
                + self.teardown.unencrypted_logs.len(),
        }
    }

    pub(crate) fn next_side_effect_counter(&self) -> u32 {
        self.next_side_effect_counter
    }

    pub(crate) fn gas_used(&self) -> Gas {
        self.gas_used
    }

    pub(crate) fn actual_gas(&self) -> PerPhaseGas {
        self.actual_gas
    }

    fn phase_effects_mut(&mut self, phase: TxPhase) -> &mut PhaseEffects {
        match phase {
            TxPhase::Setup => &mut self.setup,
            TxPhase::AppLogic => &mut self.app_logic,
            TxPhase::Teardown => &mut self.teardown,
        }
    }

    fn enforce_effect_capacities(&self) -> anyhow::Result<()> {
        let lengths = self.accumulated_data_lengths();
        ensure!(
            lengths.note_hashes <= MAX_NOTE_HASHES_PER_TX,
            "too many note hashes (capacity: {MAX_NOTE_HASHES_PER_TX})",
        );
        ensure!(
            lengths.nullifiers <= MAX_NULLIFIERS_PER_TX,
            "too many nullifiers (capacity: {MAX_NULLIFIERS_PER_TX})",
        );
        ensure!(
            lengths.public_data_writes <= MAX_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX,
            "too many public data writes (capacity: {MAX_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX})",
        );
        ensure!(
            lengths.unencrypted_logs <= MAX_UNENCRYPTED_LOGS_PER_TX,
            "too many unencrypted logs (capacity: {MAX_UNENCRYPTED_LOGS_PER_TX})",
        );
        Ok(())
    }

    /// Recomputes every pending write's override counter from the current
    /// surviving writes: the smallest later same-slot counter, or 0.
    fn recompute_override_counters(&mut self) {
        let keys: Vec<(U256, u32)> = chain!(
            &self.setup.public_data_writes,
            &self.app_logic.public_data_writes,
            &self.teardown.public_data_writes,
        )
        .map(|w| (w.write.leaf_slot, w.write.counter))
        .collect();

        for write in chain!(
            &mut self.setup.public_data_writes,
            &mut self.app_logic.public_data_writes,
            &mut self.teardown.public_data_writes,
        ) {
            write.override_counter = keys
                .iter()
                .filter(|(slot, counter)| {
                    *slot == write.write.leaf_slot && *counter > write.write.counter
                })
                .map(|(_, counter)| *counter)
                .min()
                .unwrap_or(0);
        }
    }
}

/// First side-effect counter public execution may allocate: one past
/// everything the claim and the enqueued calls already used.
fn starting_counter(tx: &Tx) -> u32 {
    let inputs = &tx.public_inputs;
    let effects_max = [&inputs.setup, &inputs.app_logic, &inputs.teardown]
        .into_iter()
        .flat_map(|effects| {
            chain!(
                effects.note_hashes.iter().map(|n| n.counter),
                effects.nullifiers.iter().map(|n| n.counter),
                effects.public_data_writes.iter().map(|w| w.write.counter),
                effects.unencrypted_logs.iter().map(|l| l.counter),
            )
        })
        .max()
        .unwrap_or(0);
    let requests = &inputs.validation_requests;
    let requests_max = chain!(
        requests.note_hash_reads().iter().map(|r| r.counter),
        requests.nullifier_reads().iter().map(|r| r.counter),
        requests
            .nullifier_non_existent_reads()
            .iter()
            .map(|r| r.counter),
        requests.l1_to_l2_msg_reads().iter().map(|r| r.counter),
        requests.public_data_read_entries().iter().map(|r| r.counter),
    )
    .max()
    .unwrap_or(0);
    let calls_max = tx
        .enqueued_calls
        .iter()
        .chain(&tx.teardown_call)
        .map(|call| call.side_effect_counter)
        .max()
        .unwrap_or(0);

    effects_max
        .max(requests_max)
        .max(calls_max)
        .saturating_add(1)
}
