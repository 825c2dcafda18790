//! The public transaction processor.
//!
//! Drives each transaction through the three-phase machine: SETUP
//! (non-revertible), APP_LOGIC (revertible), TEARDOWN (fixed gas
//! allocation), with the world-state checkpoint stack marking the revert
//! boundaries. Every executed call is folded into the kernel claim, every
//! claimed read is re-proven, and exactly one `ProcessedTx` or `FailedTx`
//! leaves per attempted transaction. Per-transaction failures never abort
//! the batch; only a poisoned world state or a sink error does.

use anyhow::{anyhow, Context as _};
use ethereum_types::U256;
use tracing::{debug, info, warn};
use zk_sequencer_common::fee_payer_balance_slot;

use crate::{
    context::TxExecutionState,
    error::{TxErrorReason, TxProcessingError},
    executor::{ExecutionContext, ExecutionResult, PublicCallExecutor},
    gas::Gas,
    kernel::{KernelCircuitComposer, KernelPublicInputs, ProofArtifact, RevertCode},
    processed_tx::{FailedTx, ProcessedTx, ProcessedTxHandler},
    tx::{EnqueuedPublicCall, GlobalVariables, Tx, TxPhase},
    validation::{ValidationError, ValidationRequestProcessor},
    world::{StateReference, WorldState},
};

/// Verdict of the optional pre-execution admission check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxValidatorOutcome {
    /// Attempt the transaction.
    Accepted,
    /// Skip it, with a reason for the submitter.
    Rejected(String),
}

/// Batch-level admission check, run before a transaction touches anything.
pub trait TxValidator {
    /// Decides whether the transaction should be attempted at all.
    fn validate(&self, tx: &Tx) -> anyhow::Result<TxValidatorOutcome>;
}

/// How one transaction attempt ended, before the uniform rollback is
/// applied.
enum TxAttemptError {
    /// The transaction is rejected; the batch goes on.
    Rejected(Box<TxProcessingError>),
    /// The world state or the sink is no longer trustworthy; the batch
    /// dies.
    Fatal(anyhow::Error),
}

/// The phase-based transaction processor.
///
/// Borrows its collaborators for the duration of a batch: the world state
/// it checkpoints and commits, the executor that simulates calls, and the
/// composer that folds them into kernel claims.
pub struct PublicProcessor<'a> {
    world: &'a mut dyn WorldState,
    executor: &'a mut dyn PublicCallExecutor,
    composer: &'a mut dyn KernelCircuitComposer,
    globals: GlobalVariables,
}

impl<'a> PublicProcessor<'a> {
    /// Binds the processor to its collaborators and the block being built.
    pub fn new(
        world: &'a mut dyn WorldState,
        executor: &'a mut dyn PublicCallExecutor,
        composer: &'a mut dyn KernelCircuitComposer,
        globals: GlobalVariables,
    ) -> Self {
        Self {
            world,
            executor,
            composer,
            globals,
        }
    }

    /// Processes transactions strictly in order until the input is
    /// exhausted or `max_accepted` have been accepted.
    ///
    /// Failures do not count against the limit; transactions beyond the
    /// cutoff are never attempted and appear in neither output. `Err` is
    /// reserved for a poisoned world state or a sink failure; a rejected
    /// transaction lands in the second list instead.
    pub fn process(
        &mut self,
        txs: &[Tx],
        max_accepted: usize,
        handler: &mut dyn ProcessedTxHandler,
        validator: Option<&dyn TxValidator>,
    ) -> anyhow::Result<(Vec<ProcessedTx>, Vec<FailedTx>)> {
        let mut accepted = Vec::new();
        let mut failed = Vec::new();

        for (txn_idx, tx) in txs.iter().enumerate() {
            if accepted.len() == max_accepted {
                debug!(
                    "Reached the limit of {max_accepted} accepted transactions; leaving {} queued",
                    txs.len() - txn_idx
                );
                break;
            }

            match self.process_tx(tx, txn_idx, validator) {
                Ok(processed) => {
                    handler
                        .add_new_tx(&processed)
                        .context("handing an accepted transaction downstream")?;
                    info!(
                        tx = %processed.hash,
                        revert_code = ?processed.public_inputs.revert_code,
                        fee = %processed.transaction_fee,
                        "Accepted transaction"
                    );
                    accepted.push(processed);
                }
                Err(TxAttemptError::Rejected(error)) => {
                    warn!(tx = %tx.hash, %error, "Rejected transaction");
                    failed.push(FailedTx {
                        tx: tx.clone(),
                        error: *error,
                    });
                }
                Err(TxAttemptError::Fatal(err)) => return Err(err),
            }
        }

        Ok((accepted, failed))
    }

    /// Attempts one transaction and applies the uniform rejection path: any
    /// rejection after the admission check rolls the world state back to
    /// the last commit, exactly once.
    fn process_tx(
        &mut self,
        tx: &Tx,
        txn_idx: usize,
        validator: Option<&dyn TxValidator>,
    ) -> Result<ProcessedTx, TxAttemptError> {
        if let Some(validator) = validator {
            match validator.validate(tx) {
                Ok(TxValidatorOutcome::Accepted) => {}
                Ok(TxValidatorOutcome::Rejected(reason)) => {
                    return Err(rejected(tx, txn_idx, TxErrorReason::ValidatorRejected(reason)));
                }
                Err(err) => return Err(rejected(tx, txn_idx, TxErrorReason::Internal(err))),
            }
        }

        match self.attempt(tx, txn_idx) {
            Err(TxAttemptError::Rejected(error)) => {
                if let Err(rollback_err) = self.world.rollback_to_commit() {
                    return Err(TxAttemptError::Fatal(
                        rollback_err.context("rolling back a rejected transaction"),
                    ));
                }
                Err(TxAttemptError::Rejected(error))
            }
            other => other,
        }
    }

    /// The per-transaction state machine. Any `Rejected` return leaves
    /// uncommitted writes behind for [`Self::process_tx`] to discard.
    fn attempt(&mut self, tx: &Tx, txn_idx: usize) -> Result<ProcessedTx, TxAttemptError> {
        let gas_settings = *tx.gas_settings();

        // Fee-payer precheck against the worst-case fee.
        let fee_payer_slot = match tx.fee_payer() {
            Some(payer) => {
                let slot = fee_payer_balance_slot(payer);
                let balance = self
                    .world
                    .storage_read(slot)
                    .map_err(|err| rejected(tx, txn_idx, TxErrorReason::Internal(err)))?;
                let required = gas_settings.fee_limit();
                if balance < required {
                    return Err(rejected(
                        tx,
                        txn_idx,
                        TxErrorReason::InsufficientFeeBalance {
                            payer,
                            balance,
                            required,
                        },
                    ));
                }
                Some((payer, slot))
            }
            None => None,
        };

        // Every read this transaction claims is verified against the state
        // as it stood here.
        let state_ref = self
            .world
            .get_state_reference()
            .map_err(|err| rejected(tx, txn_idx, TxErrorReason::Internal(err)))?;

        let mut state = TxExecutionState::new(tx);
        let mut kernel_output = tx.public_inputs.clone();
        let mut any_call_executed = false;
        let mut app_logic_reverted = false;
        let mut teardown_reverted = false;

        let app_calls = tx.phase_calls(TxPhase::AppLogic);
        let has_app = !app_calls.is_empty();
        let has_teardown = tx.teardown_call.is_some();

        // SETUP: non-revertible. Any failure, revert or validation, rejects
        // the whole transaction; the failing call is never folded.
        let setup_calls = tx.phase_calls(TxPhase::Setup);
        let ran_setup = !setup_calls.is_empty();
        if ran_setup {
            debug!(tx = %tx.hash, calls = setup_calls.len(), "Entering setup");
            state.begin_phase();
            for call in setup_calls {
                let available = gas_settings.gas_limits.sub(state.gas_used());
                let result = self
                    .simulate_call(tx, call, &state, available, U256::zero())
                    .map_err(|err| {
                        rejected_in_phase(tx, txn_idx, TxPhase::Setup, TxErrorReason::Internal(err))
                    })?;

                if let Some(revert) = result.failure() {
                    return Err(rejected_in_phase(
                        tx,
                        txn_idx,
                        TxPhase::Setup,
                        TxErrorReason::SetupReverted(revert.clone()),
                    ));
                }

                state.absorb(TxPhase::Setup, &result).map_err(|err| {
                    rejected_in_phase(tx, txn_idx, TxPhase::Setup, TxErrorReason::Internal(err))
                })?;
                self.apply_writes(&result).map_err(|err| {
                    rejected_in_phase(tx, txn_idx, TxPhase::Setup, TxErrorReason::Internal(err))
                })?;

                kernel_output = if any_call_executed {
                    self.composer.process_inner(kernel_output, &result)
                } else {
                    self.composer.process_first(tx, &result)
                }
                .map_err(|err| {
                    rejected_in_phase(tx, txn_idx, TxPhase::Setup, TxErrorReason::Internal(err))
                })?;
                any_call_executed = true;
            }

            verify_read_requests(&state, tx, &state_ref).map_err(|err| {
                rejected_in_phase(
                    tx,
                    txn_idx,
                    TxPhase::Setup,
                    TxErrorReason::ValidationFailed(err),
                )
            })?;
        }

        // Setup's effects become durable relative to later phase rollbacks.
        if has_app || has_teardown {
            self.world
                .checkpoint()
                .map_err(|err| rejected(tx, txn_idx, TxErrorReason::Internal(err)))?;
        }

        // APP_LOGIC: revertible. A revert or validation failure discards
        // the phase and carries on to teardown; the reverting call is still
        // folded.
        if has_app {
            debug!(tx = %tx.hash, calls = app_calls.len(), "Entering app-logic");
            state.begin_phase();
            for call in app_calls {
                let available = gas_settings.gas_limits.sub(state.gas_used());
                let result = self
                    .simulate_call(tx, call, &state, available, U256::zero())
                    .map_err(|err| {
                        rejected_in_phase(
                            tx,
                            txn_idx,
                            TxPhase::AppLogic,
                            TxErrorReason::Internal(err),
                        )
                    })?;
                let reverts = result.failure().cloned();

                state.absorb(TxPhase::AppLogic, &result).map_err(|err| {
                    rejected_in_phase(tx, txn_idx, TxPhase::AppLogic, TxErrorReason::Internal(err))
                })?;

                if let Some(revert) = reverts {
                    debug!(tx = %tx.hash, %revert, "App-logic reverted");
                    self.rollback_phase(&mut state, TxPhase::AppLogic)
                        .map_err(TxAttemptError::Fatal)?;
                    app_logic_reverted = true;
                } else {
                    self.apply_writes(&result).map_err(|err| {
                        rejected_in_phase(
                            tx,
                            txn_idx,
                            TxPhase::AppLogic,
                            TxErrorReason::Internal(err),
                        )
                    })?;
                }

                kernel_output = self
                    .composer
                    .process_merge(kernel_output, &result)
                    .map_err(|err| {
                        rejected_in_phase(
                            tx,
                            txn_idx,
                            TxPhase::AppLogic,
                            TxErrorReason::Internal(err),
                        )
                    })?;
                any_call_executed = true;

                if app_logic_reverted {
                    break;
                }
            }

            if !app_logic_reverted {
                if let Err(err) = verify_read_requests(&state, tx, &state_ref) {
                    debug!(tx = %tx.hash, %err, "App-logic read requests failed verification");
                    self.rollback_phase(&mut state, TxPhase::AppLogic)
                        .map_err(TxAttemptError::Fatal)?;
                    app_logic_reverted = true;
                }
            }
        }

        // The savepoint advances past surviving app-logic writes, so a
        // teardown failure discards only teardown's own.
        if !app_logic_reverted && has_app && has_teardown {
            self.world
                .checkpoint()
                .map_err(|err| rejected(tx, txn_idx, TxErrorReason::Internal(err)))?;
        }

        // TEARDOWN: at most one call, its own gas allocation, the actual
        // fee in scope.
        let transaction_fee = transaction_fee(&state, tx, has_teardown);
        if let Some(call) = &tx.teardown_call {
            debug!(tx = %tx.hash, fee = %transaction_fee, "Entering teardown");
            state.begin_phase();
            let result = self
                .simulate_call(tx, call, &state, gas_settings.teardown_gas_limits, transaction_fee)
                .map_err(|err| {
                    rejected_in_phase(tx, txn_idx, TxPhase::Teardown, TxErrorReason::Internal(err))
                })?;
            let reverts = result.failure().cloned();

            state.absorb(TxPhase::Teardown, &result).map_err(|err| {
                rejected_in_phase(tx, txn_idx, TxPhase::Teardown, TxErrorReason::Internal(err))
            })?;

            if let Some(revert) = reverts {
                debug!(tx = %tx.hash, %revert, "Teardown reverted");
                self.rollback_phase(&mut state, TxPhase::Teardown)
                    .map_err(TxAttemptError::Fatal)?;
                teardown_reverted = true;
            } else {
                self.apply_writes(&result).map_err(|err| {
                    rejected_in_phase(tx, txn_idx, TxPhase::Teardown, TxErrorReason::Internal(err))
                })?;
                if let Err(err) = verify_read_requests(&state, tx, &state_ref) {
                    debug!(tx = %tx.hash, %err, "Teardown read requests failed verification");
                    self.rollback_phase(&mut state, TxPhase::Teardown)
                        .map_err(TxAttemptError::Fatal)?;
                    teardown_reverted = true;
                }
            }

            kernel_output = self
                .composer
                .process_merge(kernel_output, &result)
                .map_err(|err| {
                    rejected_in_phase(tx, txn_idx, TxPhase::Teardown, TxErrorReason::Internal(err))
                })?;
            any_call_executed = true;
        }

        // Finalize: settle the fee, seal the claim, prove, commit.
        let revert_code = RevertCode::combine(app_logic_reverted, teardown_reverted);

        if let Some((payer, slot)) = fee_payer_slot {
            let balance = self
                .world
                .storage_read(slot)
                .map_err(|err| rejected(tx, txn_idx, TxErrorReason::Internal(err)))?;
            if balance < transaction_fee {
                return Err(rejected(
                    tx,
                    txn_idx,
                    TxErrorReason::InsufficientFeeBalance {
                        payer,
                        balance,
                        required: transaction_fee,
                    },
                ));
            }
            let new_balance = balance - transaction_fee;
            state.record_fee_payment(slot, new_balance);
            self.world
                .storage_write(slot, new_balance)
                .map_err(|err| rejected(tx, txn_idx, TxErrorReason::Internal(err)))?;
        }

        let assembled = state.seal_public_inputs(kernel_output, revert_code, transaction_fee);
        let (final_inputs, proof) = if any_call_executed {
            self.composer
                .process_tail(assembled)
                .map_err(|err| rejected(tx, txn_idx, TxErrorReason::Internal(err)))?
        } else {
            (assembled, ProofArtifact::default())
        };

        self.world
            .commit()
            .map_err(|err| TxAttemptError::Fatal(err.context("committing an accepted transaction")))?;

        Ok(assemble_processed_tx(
            tx,
            &state,
            final_inputs,
            proof,
            transaction_fee,
            has_teardown,
        ))
    }

    /// Runs one enqueued call through the executor and checks it stayed
    /// within its gas.
    fn simulate_call(
        &mut self,
        tx: &Tx,
        call: &EnqueuedPublicCall,
        state: &TxExecutionState,
        available_gas: Gas,
        transaction_fee: U256,
    ) -> anyhow::Result<ExecutionResult> {
        let pending_nullifiers = state.pending_nullifiers();
        let ctx = ExecutionContext {
            globals: self.globals,
            tx_context: tx.public_inputs.constants.tx_context,
            available_gas,
            transaction_fee,
            pending_nullifiers: &pending_nullifiers,
            next_side_effect_counter: state.next_side_effect_counter(),
            validation_request_lengths: state.request_lengths(),
            accumulated_data_lengths: state.accumulated_data_lengths(),
        };
        let result = self.executor.simulate(call, &ctx)?;
        if !available_gas.covers(&result.gas_used) {
            return Err(anyhow!(
                "executor consumed {:?} with only {:?} available",
                result.gas_used,
                available_gas
            ));
        }
        Ok(result)
    }

    /// Applies a successful call tree's storage writes, in counter order.
    fn apply_writes(&mut self, result: &ExecutionResult) -> anyhow::Result<()> {
        let mut writes: Vec<_> = result
            .flattened()
            .into_iter()
            .flat_map(|call| &call.public_data_writes)
            .collect();
        writes.sort_by_key(|write| write.counter);
        for write in writes {
            self.world.storage_write(write.leaf_slot, write.value)?;
        }
        Ok(())
    }

    /// Reverts a failed phase: world state back to the savepoint, effects
    /// and appended requests dropped. A rollback that itself fails poisons
    /// the batch.
    fn rollback_phase(
        &mut self,
        state: &mut TxExecutionState,
        phase: TxPhase,
    ) -> anyhow::Result<()> {
        self.world
            .rollback_to_checkpoint()
            .with_context(|| format!("rolling back the {phase} phase"))?;
        state.discard_phase(phase);
        Ok(())
    }
}

/// Re-proves every read request accumulated so far against the
/// pre-transaction state.
fn verify_read_requests(
    state: &TxExecutionState,
    tx: &Tx,
    state_ref: &StateReference,
) -> Result<(), ValidationError> {
    let pending_nullifiers = state.pending_nullifiers();
    let pending_writes = state.pending_public_data_writes();
    ValidationRequestProcessor::new(
        state.validation_requests(),
        &tx.validation_hints,
        &pending_nullifiers,
        &pending_writes,
        state_ref,
    )
    .validate()
}

/// The fee actually charged: inclusion fee plus billed gas at the accepted
/// prices. Billed gas includes the full teardown allocation when a teardown
/// call exists, regardless of what teardown actually burns.
fn transaction_fee(state: &TxExecutionState, tx: &Tx, has_teardown: bool) -> U256 {
    let settings = tx.gas_settings();
    let billed = billed_gas(state, tx, has_teardown);
    settings
        .inclusion_fee
        .saturating_add(billed.compute_fee(&settings.max_fees_per_gas))
}

fn billed_gas(state: &TxExecutionState, tx: &Tx, has_teardown: bool) -> Gas {
    if has_teardown {
        state
            .gas_used()
            .add(tx.gas_settings().teardown_gas_limits)
    } else {
        state.gas_used()
    }
}

fn assemble_processed_tx(
    tx: &Tx,
    state: &TxExecutionState,
    final_inputs: KernelPublicInputs,
    proof: ProofArtifact,
    transaction_fee: U256,
    has_teardown: bool,
) -> ProcessedTx {
    let unencrypted_logs = final_inputs
        .setup
        .unencrypted_logs
        .iter()
        .chain(&final_inputs.app_logic.unencrypted_logs)
        .chain(&final_inputs.teardown.unencrypted_logs)
        .cloned()
        .collect();
    let public_data_writes = final_inputs.final_public_data_writes();

    ProcessedTx {
        hash: tx.hash,
        unencrypted_logs,
        proof,
        gas_used: state.actual_gas(),
        total_gas_used: billed_gas(state, tx, has_teardown),
        public_data_writes,
        fee_payer: tx.fee_payer(),
        transaction_fee,
        public_inputs: final_inputs,
    }
}

fn rejected(tx: &Tx, txn_idx: usize, reason: TxErrorReason) -> TxAttemptError {
    let mut error = TxProcessingError::new(reason);
    error.tx_hash(tx.hash).txn_idx(txn_idx);
    TxAttemptError::Rejected(Box::new(error))
}

fn rejected_in_phase(
    tx: &Tx,
    txn_idx: usize,
    phase: TxPhase,
    reason: TxErrorReason,
) -> TxAttemptError {
    let mut error = TxProcessingError::new(reason);
    error.tx_hash(tx.hash).txn_idx(txn_idx).phase(phase);
    TxAttemptError::Rejected(Box::new(error))
}
