//! Read-request verification end to end: honest hints built from a real
//! world state must verify, and each way a hint can lie must be caught.

use ethereum_types::{Address, H256, U256};
use public_processor::{
    testing::{
        low_nullifier_hint, pending_insertion_point, settled_nullifier_hint,
        settled_public_data_hint, sorted_pending_nullifiers,
    },
    tx::{Nullifier, OverridablePublicDataWrite, PublicDataWrite},
    validation::{
        hints::{NullifierNonExistenceHints, NullifierReadHint, PublicDataReadHint, TxValidationHints},
        requests::{PublicDataRead, ScopedReadRequest, TreeLeafReadRequest, ValidationRequests},
        ReadRequestKind, ValidationError, ValidationRequestProcessor,
    },
    world::{InMemoryWorldState, TreeId, WorldState},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use zk_sequencer_common::{silo_nullifier, MAX_PUBLIC_DATA_READS_PER_TX};

fn contract() -> Address {
    Address::repeat_byte(0xC0)
}

fn scoped(value: H256, counter: u32) -> ScopedReadRequest {
    ScopedReadRequest {
        value,
        contract_address: contract(),
        counter,
    }
}

#[test]
fn honest_hints_verify_across_every_category() {
    let mut world = InMemoryWorldState::new();

    let notes = [H256::repeat_byte(0xA1), H256::repeat_byte(0xA2)];
    world.settle_note_hashes(notes).unwrap();
    let message = H256::repeat_byte(0xB1);
    world.settle_l1_to_l2_messages([message]).unwrap();

    let spent = H256::repeat_byte(0x11);
    let spent_index = world.settle_nullifier(silo_nullifier(contract(), spent)).unwrap();

    let slot = U256::from(700);
    let slot_index = world.settle_public_data(slot, U256::from(7000)).unwrap();

    let state_ref = world.get_state_reference().unwrap();

    let mut requests = ValidationRequests::default();
    requests
        .append_note_hash_read(TreeLeafReadRequest {
            value: notes[1],
            leaf_index: 1,
            counter: 1,
        })
        .unwrap();
    requests
        .append_l1_to_l2_msg_read(TreeLeafReadRequest {
            value: message,
            leaf_index: 0,
            counter: 2,
        })
        .unwrap();
    requests.append_nullifier_read(scoped(spent, 3)).unwrap();
    requests
        .append_nullifier_non_existent_read(scoped(H256::repeat_byte(0x42), 4))
        .unwrap();
    requests
        .append_public_data_read(PublicDataRead {
            leaf_slot: slot,
            value: U256::from(7000),
            counter: 5,
        })
        .unwrap();

    let absent = silo_nullifier(contract(), H256::repeat_byte(0x42));
    let hints = TxValidationHints {
        note_hash_reads: vec![world.get_sibling_path(TreeId::NoteHash, 1).unwrap()],
        l1_to_l2_msg_reads: vec![world.get_sibling_path(TreeId::L1ToL2Message, 0).unwrap()],
        nullifier_reads: vec![settled_nullifier_hint(&world, spent_index).unwrap()],
        nullifier_non_existence: NullifierNonExistenceHints {
            sorted_pending: sorted_pending_nullifiers(&[]),
            next_pending_indices: vec![0],
            low_leaf_hints: vec![low_nullifier_hint(&world, absent).unwrap()],
        },
        public_data_reads: vec![settled_public_data_hint(&world, slot_index).unwrap()],
    };

    let processor = ValidationRequestProcessor::new(&requests, &hints, &[], &[], &state_ref);
    assert_eq!(processor.validate(), Ok(()));
    // Validation is read-only; a second pass sees the same picture.
    assert_eq!(processor.validate(), Ok(()));
}

#[test]
fn pending_effects_satisfy_nullifier_and_storage_reads() {
    let world = InMemoryWorldState::new();
    let state_ref = world.get_state_reference().unwrap();

    let emitted = H256::repeat_byte(0x21);
    let pending_nullifiers = vec![Nullifier {
        value: silo_nullifier(contract(), emitted),
        counter: 1,
    }];
    let pending_writes = vec![OverridablePublicDataWrite::new(PublicDataWrite {
        leaf_slot: U256::from(9),
        value: U256::from(90),
        counter: 2,
    })];

    let mut requests = ValidationRequests::default();
    requests.append_nullifier_read(scoped(emitted, 5)).unwrap();
    requests
        .append_public_data_read(PublicDataRead {
            leaf_slot: U256::from(9),
            value: U256::from(90),
            counter: 6,
        })
        .unwrap();

    let hints = TxValidationHints {
        nullifier_reads: vec![NullifierReadHint::Pending { nullifier_index: 0 }],
        public_data_reads: vec![PublicDataReadHint::Pending { write_index: 0 }],
        ..TxValidationHints::default()
    };

    assert_eq!(
        ValidationRequestProcessor::new(
            &requests,
            &hints,
            &pending_nullifiers,
            &pending_writes,
            &state_ref
        )
        .validate(),
        Ok(())
    );
}

#[test]
fn a_shuffled_pending_set_still_proves_non_existence() {
    let mut world = InMemoryWorldState::new();
    world
        .settle_nullifier(silo_nullifier(contract(), H256::repeat_byte(0x01)))
        .unwrap();
    world
        .settle_nullifier(silo_nullifier(contract(), H256::repeat_byte(0x02)))
        .unwrap();
    let state_ref = world.get_state_reference().unwrap();

    // Pending nullifiers land in counter order, not value order.
    let mut rng = StdRng::seed_from_u64(7);
    let pending: Vec<Nullifier> = (0..12)
        .map(|counter| Nullifier {
            value: H256(rng.gen()),
            counter,
        })
        .collect();

    let target = H256::repeat_byte(0x42);
    let siloed = silo_nullifier(contract(), target);

    let mut requests = ValidationRequests::default();
    requests
        .append_nullifier_non_existent_read(scoped(target, 20))
        .unwrap();

    let sorted_pending = sorted_pending_nullifiers(&pending);
    let insert_at = pending_insertion_point(&sorted_pending, siloed);
    let hints = TxValidationHints {
        nullifier_non_existence: NullifierNonExistenceHints {
            sorted_pending,
            next_pending_indices: vec![insert_at],
            low_leaf_hints: vec![low_nullifier_hint(&world, siloed).unwrap()],
        },
        ..TxValidationHints::default()
    };

    assert_eq!(
        ValidationRequestProcessor::new(&requests, &hints, &pending, &[], &state_ref).validate(),
        Ok(())
    );
}

#[test]
fn a_duplicated_permutation_index_is_rejected() {
    let world = InMemoryWorldState::new();
    let state_ref = world.get_state_reference().unwrap();

    let pending: Vec<Nullifier> = [0x30u8, 0x10, 0x20]
        .iter()
        .enumerate()
        .map(|(i, byte)| Nullifier {
            value: H256::repeat_byte(*byte),
            counter: i as u32,
        })
        .collect();

    let mut requests = ValidationRequests::default();
    requests
        .append_nullifier_non_existent_read(scoped(H256::repeat_byte(0x42), 9))
        .unwrap();

    let siloed = silo_nullifier(contract(), H256::repeat_byte(0x42));
    let mut sorted_pending = sorted_pending_nullifiers(&pending);
    sorted_pending.sorted_index_hints[1] = sorted_pending.sorted_index_hints[0];
    let insert_at = pending_insertion_point(&sorted_pending, siloed);
    let hints = TxValidationHints {
        nullifier_non_existence: NullifierNonExistenceHints {
            sorted_pending,
            next_pending_indices: vec![insert_at],
            low_leaf_hints: vec![low_nullifier_hint(&world, siloed).unwrap()],
        },
        ..TxValidationHints::default()
    };

    assert_eq!(
        ValidationRequestProcessor::new(&requests, &hints, &pending, &[], &state_ref).validate(),
        Err(ValidationError::BadPermutation { position: 1 })
    );
}

#[test]
fn the_first_violation_in_category_order_is_the_one_reported() {
    let world = InMemoryWorldState::new();
    let state_ref = world.get_state_reference().unwrap();

    // Two unhinted reads in different categories: note hashes are checked
    // first, so that is the failure surfaced.
    let mut requests = ValidationRequests::default();
    requests
        .append_note_hash_read(TreeLeafReadRequest {
            value: H256::repeat_byte(0x01),
            leaf_index: 0,
            counter: 1,
        })
        .unwrap();
    requests
        .append_public_data_read(PublicDataRead {
            leaf_slot: U256::from(5),
            value: U256::from(50),
            counter: 2,
        })
        .unwrap();

    let hints = TxValidationHints::default();
    assert_eq!(
        ValidationRequestProcessor::new(&requests, &hints, &[], &[], &state_ref).validate(),
        Err(ValidationError::MissingHint {
            category: ReadRequestKind::NoteHash,
            index: 0,
        })
    );
}

#[test]
fn packing_is_enforced_before_any_proof_work() {
    let world = InMemoryWorldState::new();
    let state_ref = world.get_state_reference().unwrap();

    let mut requests = ValidationRequests::default();
    requests
        .append_note_hash_read(TreeLeafReadRequest {
            value: H256::repeat_byte(0x01),
            leaf_index: 0,
            counter: 1,
        })
        .unwrap();
    // A claimed length with no entries behind it.
    requests.array_lengths.public_data_reads = 2;

    let hints = TxValidationHints::default();
    assert_eq!(
        ValidationRequestProcessor::new(&requests, &hints, &[], &[], &state_ref).validate(),
        Err(ValidationError::MalformedRequestArray {
            category: ReadRequestKind::PublicData,
            claimed: 2,
            len: 0,
            capacity: MAX_PUBLIC_DATA_READS_PER_TX,
        })
    );
}

#[test]
fn a_sibling_path_goes_stale_when_the_tree_grows() {
    let mut world = InMemoryWorldState::new();
    world.settle_note_hashes([H256::repeat_byte(0xA1)]).unwrap();
    let stale_path = world.get_sibling_path(TreeId::NoteHash, 0).unwrap();

    world.settle_note_hashes([H256::repeat_byte(0xA2)]).unwrap();
    let state_ref = world.get_state_reference().unwrap();

    let mut requests = ValidationRequests::default();
    requests
        .append_note_hash_read(TreeLeafReadRequest {
            value: H256::repeat_byte(0xA1),
            leaf_index: 0,
            counter: 1,
        })
        .unwrap();

    let hints = TxValidationHints {
        note_hash_reads: vec![stale_path],
        ..TxValidationHints::default()
    };
    assert_eq!(
        ValidationRequestProcessor::new(&requests, &hints, &[], &[], &state_ref).validate(),
        Err(ValidationError::BadMembershipProof {
            category: ReadRequestKind::NoteHash,
            index: 0,
        })
    );
}

#[test]
fn hints_round_trip_through_serde() {
    let mut world = InMemoryWorldState::new();
    world.settle_note_hashes([H256::repeat_byte(0xA1)]).unwrap();
    let spent_index = world
        .settle_nullifier(silo_nullifier(contract(), H256::repeat_byte(0x11)))
        .unwrap();
    let slot_index = world
        .settle_public_data(U256::from(700), U256::from(7000))
        .unwrap();

    let pending = vec![
        Nullifier {
            value: H256::repeat_byte(0x30),
            counter: 0,
        },
        Nullifier {
            value: H256::repeat_byte(0x10),
            counter: 1,
        },
    ];
    let hints = TxValidationHints {
        note_hash_reads: vec![world.get_sibling_path(TreeId::NoteHash, 0).unwrap()],
        l1_to_l2_msg_reads: Vec::new(),
        nullifier_reads: vec![
            settled_nullifier_hint(&world, spent_index).unwrap(),
            NullifierReadHint::Pending { nullifier_index: 1 },
        ],
        nullifier_non_existence: NullifierNonExistenceHints {
            sorted_pending: sorted_pending_nullifiers(&pending),
            next_pending_indices: vec![1],
            low_leaf_hints: vec![
                low_nullifier_hint(&world, H256::repeat_byte(0x42)).unwrap()
            ],
        },
        public_data_reads: vec![
            settled_public_data_hint(&world, slot_index).unwrap(),
            PublicDataReadHint::Pending { write_index: 0 },
        ],
    };

    let encoded = serde_json::to_string(&hints).unwrap();
    let decoded: TxValidationHints = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, hints);
}
