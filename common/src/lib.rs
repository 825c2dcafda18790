use ethereum_types::{Address, H256, U256};
use keccak_hash::keccak;

/// Maximum number of note-hash read requests a transaction may accumulate
/// across its private claim and all public calls.
pub const MAX_NOTE_HASH_READ_REQUESTS_PER_TX: usize = 16;

/// Maximum number of nullifier read requests per transaction.
pub const MAX_NULLIFIER_READ_REQUESTS_PER_TX: usize = 16;

/// Maximum number of nullifier non-existence read requests per transaction.
pub const MAX_NULLIFIER_NON_EXISTENT_READ_REQUESTS_PER_TX: usize = 16;

/// Maximum number of L1-to-L2 message read requests per transaction.
pub const MAX_L1_TO_L2_MSG_READ_REQUESTS_PER_TX: usize = 16;

/// Maximum number of public-data (storage) read requests per transaction.
pub const MAX_PUBLIC_DATA_READS_PER_TX: usize = 16;

/// Maximum number of application-issued public-data writes per transaction.
pub const MAX_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX: usize = 32;

/// Writes reserved for protocol bookkeeping on top of the application quota.
/// Today this is the fee-payer balance update alone, appended at slot index
/// [`MAX_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX`] when no application write to the
/// balance slot exists to merge into.
pub const PROTOCOL_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX: usize = 1;

/// Total capacity of the per-transaction public-data write array.
pub const MAX_TOTAL_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX: usize =
    MAX_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX + PROTOCOL_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX;

/// Maximum number of note hashes a transaction may emit.
pub const MAX_NOTE_HASHES_PER_TX: usize = 64;

/// Maximum number of nullifiers a transaction may emit.
pub const MAX_NULLIFIERS_PER_TX: usize = 64;

/// Maximum number of unencrypted log entries a transaction may emit.
pub const MAX_UNENCRYPTED_LOGS_PER_TX: usize = 8;

/// Depth of the note-hash tree.
pub const NOTE_HASH_TREE_HEIGHT: usize = 32;

/// Depth of the nullifier tree.
pub const NULLIFIER_TREE_HEIGHT: usize = 20;

/// Depth of the L1-to-L2 message tree.
pub const L1_TO_L2_MSG_TREE_HEIGHT: usize = 16;

/// Depth of the public-data tree.
pub const PUBLIC_DATA_TREE_HEIGHT: usize = 40;

/// Storage slot of the balance map inside the protocol fee contract.
const FEE_BALANCE_MAP_SLOT: u64 = 1;

/// Widens a 20-byte address into the 32-byte field representation used by
/// hashing and storage-slot derivation.
pub fn address_to_field(address: Address) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_bytes());
    H256(bytes)
}

/// Silos a nullifier under its emitting contract, so that no two contracts
/// can produce colliding entries in the nullifier tree.
pub fn silo_nullifier(contract_address: Address, nullifier: H256) -> H256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(address_to_field(contract_address).as_bytes());
    preimage[32..].copy_from_slice(nullifier.as_bytes());
    keccak(preimage)
}

/// Public-data tree slot holding `fee_payer`'s fee balance.
pub fn fee_payer_balance_slot(fee_payer: Address) -> U256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(address_to_field(fee_payer).as_bytes());
    preimage[56..].copy_from_slice(&FEE_BALANCE_MAP_SLOT.to_be_bytes());
    U256::from_big_endian(keccak(preimage).as_bytes())
}

#[test]
fn test_write_array_capacity() {
    assert_eq!(
        MAX_TOTAL_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX,
        MAX_PUBLIC_DATA_UPDATE_REQUESTS_PER_TX + 1
    );
}

#[test]
fn test_silo_nullifier_is_contract_scoped() {
    let value = H256::from_low_u64_be(7);
    let a = silo_nullifier(Address::from_low_u64_be(1), value);
    let b = silo_nullifier(Address::from_low_u64_be(2), value);
    assert_ne!(a, b);
    assert_eq!(a, silo_nullifier(Address::from_low_u64_be(1), value));
}

#[test]
fn test_fee_balance_slots_are_distinct_per_payer() {
    let a = fee_payer_balance_slot(Address::from_low_u64_be(1));
    let b = fee_payer_balance_slot(Address::from_low_u64_be(2));
    assert_ne!(a, b);
}

#[test]
fn test_address_widening_is_value_preserving() {
    let address = Address::from_low_u64_be(0xdead);
    assert_eq!(
        U256::from_big_endian(address_to_field(address).as_bytes()),
        U256::from(0xdeadu64)
    );
}
