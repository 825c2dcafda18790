//! Public-phase transaction processing for the sequencer.
//!
//! A transaction arrives as a *claim*: the private kernel's public inputs
//! (side effects, read requests, gas already consumed) plus the public calls
//! it enqueued. This crate drives each claim through the three public
//! phases and re-proves everything the claim asserts.
//!
//! 1. **Setup** runs the non-revertible calls. Any failure rejects the
//!    transaction outright.
//! 2. **App-logic** runs the revertible calls. A failure here unwinds the
//!    phase against a world-state checkpoint and the transaction continues.
//! 3. **Teardown** runs the single fee-paying call under its own gas
//!    allocation, with the computed transaction fee in scope.
//!
//! After every phase that executed at least one call, the validation
//! request processor ([`validation`]) re-proves the accumulated read
//! requests against the pre-transaction state reference: settled reads by
//! Merkle membership, pending reads against the transaction's own side
//! effects, and non-existence reads by low-leaf straddling plus a verified
//! sorted permutation of the pending nullifier set. Nothing a transaction
//! claims is taken at face value.
//!
//! Execution and proving stay behind seams: [`world::WorldState`] owns the
//! chain state, [`executor::PublicCallExecutor`] simulates calls, and
//! [`kernel::KernelCircuitComposer`] folds the results into the kernel
//! claim. [`testing`] carries deterministic doubles for all three.

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]

mod context;
pub mod error;
pub mod executor;
pub mod gas;
pub mod kernel;
pub mod processed_tx;
pub mod processor;
pub mod testing;
pub mod tx;
pub mod validation;
pub mod world;

// Public re-exports of the pipeline surface.
pub use processed_tx::{FailedTx, ProcessedTx, ProcessedTxHandler};
pub use processor::{PublicProcessor, TxValidator, TxValidatorOutcome};
