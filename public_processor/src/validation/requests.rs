//! Read-request shapes and the claimed request arrays.
//!
//! Requests arrive as fixed-capacity arrays plus a claimed length per
//! category. Entries below the claimed length must be real, entries above it
//! must be the category default; that packing invariant is enforced before
//! anything else is checked, never assumed.

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use zk_sequencer_common::{
    silo_nullifier, MAX_L1_TO_L2_MSG_READ_REQUESTS_PER_TX, MAX_NOTE_HASH_READ_REQUESTS_PER_TX,
    MAX_NULLIFIER_NON_EXISTENT_READ_REQUESTS_PER_TX, MAX_NULLIFIER_READ_REQUESTS_PER_TX,
    MAX_PUBLIC_DATA_READS_PER_TX,
};

use crate::validation::{ReadRequestKind, ValidationError};

/// A claimed read of a leaf that settled in an append-only tree.
///
/// The value is already siloed; `leaf_index` is the membership-path
/// candidate the hint's sibling path is checked against.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TreeLeafReadRequest {
    /// The leaf value claimed to exist.
    pub value: H256,
    /// Where in the tree it is claimed to sit.
    pub leaf_index: u64,
    /// Side-effect counter at which the read was issued.
    pub counter: u32,
}

impl TreeLeafReadRequest {
    pub(crate) fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A claimed read scoped to the contract that issued it; the checked value
/// is the siloed combination of the two.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ScopedReadRequest {
    /// The unsiloed value the contract asked about.
    pub value: H256,
    /// The issuing contract.
    pub contract_address: Address,
    /// Side-effect counter at which the read was issued.
    pub counter: u32,
}

impl ScopedReadRequest {
    /// The value as it would appear in the nullifier tree.
    pub fn siloed_value(&self) -> H256 {
        silo_nullifier(self.contract_address, self.value)
    }

    pub(crate) fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A claimed read of a public-data (storage) slot.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PublicDataRead {
    /// The slot read from.
    pub leaf_slot: U256,
    /// The value claimed to have been observed.
    pub value: U256,
    /// Side-effect counter at which the read was issued.
    pub counter: u32,
}

impl PublicDataRead {
    pub(crate) fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Claimed number of real entries per request category.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ValidationRequestArrayLengths {
    /// Real entries in the note-hash read array.
    pub note_hash_read_requests: usize,
    /// Real entries in the nullifier read array.
    pub nullifier_read_requests: usize,
    /// Real entries in the nullifier non-existence read array.
    pub nullifier_non_existent_read_requests: usize,
    /// Real entries in the L1-to-L2 message read array.
    pub l1_to_l2_msg_read_requests: usize,
    /// Real entries in the public-data read array.
    pub public_data_reads: usize,
}

/// The five claimed read-request arrays and their lengths.
///
/// Seeded from the private kernel's claim and extended as public calls
/// accumulate further reads.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ValidationRequests {
    /// Note-hash reads against the note-hash tree.
    pub note_hash_read_requests: Vec<TreeLeafReadRequest>,
    /// Nullifier existence reads.
    pub nullifier_read_requests: Vec<ScopedReadRequest>,
    /// Nullifier non-existence reads.
    pub nullifier_non_existent_read_requests: Vec<ScopedReadRequest>,
    /// L1-to-L2 message reads against the message tree.
    pub l1_to_l2_msg_read_requests: Vec<TreeLeafReadRequest>,
    /// Public-data (storage) reads.
    pub public_data_reads: Vec<PublicDataRead>,
    /// Claimed real-entry counts for all of the above.
    pub array_lengths: ValidationRequestArrayLengths,
}

impl ValidationRequests {
    /// The real note-hash reads, claimed padding excluded.
    pub fn note_hash_reads(&self) -> &[TreeLeafReadRequest] {
        &self.note_hash_read_requests[..self.array_lengths.note_hash_read_requests]
    }

    /// The real nullifier reads.
    pub fn nullifier_reads(&self) -> &[ScopedReadRequest] {
        &self.nullifier_read_requests[..self.array_lengths.nullifier_read_requests]
    }

    /// The real nullifier non-existence reads.
    pub fn nullifier_non_existent_reads(&self) -> &[ScopedReadRequest] {
        &self.nullifier_non_existent_read_requests
            [..self.array_lengths.nullifier_non_existent_read_requests]
    }

    /// The real L1-to-L2 message reads.
    pub fn l1_to_l2_msg_reads(&self) -> &[TreeLeafReadRequest] {
        &self.l1_to_l2_msg_read_requests[..self.array_lengths.l1_to_l2_msg_read_requests]
    }

    /// The real public-data reads.
    pub fn public_data_read_entries(&self) -> &[PublicDataRead] {
        &self.public_data_reads[..self.array_lengths.public_data_reads]
    }

    /// Checks every category's packing invariant: claimed lengths within
    /// capacity and consistent with the arrays, real entries non-empty,
    /// padding exactly the default value.
    pub fn enforce_packing(&self) -> Result<(), ValidationError> {
        check_packing(
            ReadRequestKind::NoteHash,
            &self.note_hash_read_requests,
            self.array_lengths.note_hash_read_requests,
            MAX_NOTE_HASH_READ_REQUESTS_PER_TX,
            TreeLeafReadRequest::is_empty,
        )?;
        check_packing(
            ReadRequestKind::Nullifier,
            &self.nullifier_read_requests,
            self.array_lengths.nullifier_read_requests,
            MAX_NULLIFIER_READ_REQUESTS_PER_TX,
            ScopedReadRequest::is_empty,
        )?;
        check_packing(
            ReadRequestKind::NullifierNonExistent,
            &self.nullifier_non_existent_read_requests,
            self.array_lengths.nullifier_non_existent_read_requests,
            MAX_NULLIFIER_NON_EXISTENT_READ_REQUESTS_PER_TX,
            ScopedReadRequest::is_empty,
        )?;
        check_packing(
            ReadRequestKind::L1ToL2Message,
            &self.l1_to_l2_msg_read_requests,
            self.array_lengths.l1_to_l2_msg_read_requests,
            MAX_L1_TO_L2_MSG_READ_REQUESTS_PER_TX,
            TreeLeafReadRequest::is_empty,
        )?;
        check_packing(
            ReadRequestKind::PublicData,
            &self.public_data_reads,
            self.array_lengths.public_data_reads,
            MAX_PUBLIC_DATA_READS_PER_TX,
            PublicDataRead::is_empty,
        )
    }

    /// Appends a note-hash read accumulated from public execution.
    pub fn append_note_hash_read(&mut self, request: TreeLeafReadRequest) -> anyhow::Result<()> {
        append_request(
            &mut self.note_hash_read_requests,
            &mut self.array_lengths.note_hash_read_requests,
            MAX_NOTE_HASH_READ_REQUESTS_PER_TX,
            ReadRequestKind::NoteHash,
            request,
        )
    }

    /// Appends a nullifier read accumulated from public execution.
    pub fn append_nullifier_read(&mut self, request: ScopedReadRequest) -> anyhow::Result<()> {
        append_request(
            &mut self.nullifier_read_requests,
            &mut self.array_lengths.nullifier_read_requests,
            MAX_NULLIFIER_READ_REQUESTS_PER_TX,
            ReadRequestKind::Nullifier,
            request,
        )
    }

    /// Appends a nullifier non-existence read accumulated from public
    /// execution.
    pub fn append_nullifier_non_existent_read(
        &mut self,
        request: ScopedReadRequest,
    ) -> anyhow::Result<()> {
        append_request(
            &mut self.nullifier_non_existent_read_requests,
            &mut self.array_lengths.nullifier_non_existent_read_requests,
            MAX_NULLIFIER_NON_EXISTENT_READ_REQUESTS_PER_TX,
            ReadRequestKind::NullifierNonExistent,
            request,
        )
    }

    /// Appends an L1-to-L2 message read accumulated from public execution.
    pub fn append_l1_to_l2_msg_read(&mut self, request: TreeLeafReadRequest) -> anyhow::Result<()> {
        append_request(
            &mut self.l1_to_l2_msg_read_requests,
            &mut self.array_lengths.l1_to_l2_msg_read_requests,
            MAX_L1_TO_L2_MSG_READ_REQUESTS_PER_TX,
            ReadRequestKind::L1ToL2Message,
            request,
        )
    }

    /// Appends a public-data read accumulated from public execution.
    pub fn append_public_data_read(&mut self, request: PublicDataRead) -> anyhow::Result<()> {
        append_request(
            &mut self.public_data_reads,
            &mut self.array_lengths.public_data_reads,
            MAX_PUBLIC_DATA_READS_PER_TX,
            ReadRequestKind::PublicData,
            request,
        )
    }

    /// Rewinds every category to previously captured lengths, dropping the
    /// requests a discarded phase accumulated.
    pub fn truncate_to(&mut self, lengths: ValidationRequestArrayLengths) {
        truncate_category(
            &mut self.note_hash_read_requests,
            &mut self.array_lengths.note_hash_read_requests,
            lengths.note_hash_read_requests,
        );
        truncate_category(
            &mut self.nullifier_read_requests,
            &mut self.array_lengths.nullifier_read_requests,
            lengths.nullifier_read_requests,
        );
        truncate_category(
            &mut self.nullifier_non_existent_read_requests,
            &mut self.array_lengths.nullifier_non_existent_read_requests,
            lengths.nullifier_non_existent_read_requests,
        );
        truncate_category(
            &mut self.l1_to_l2_msg_read_requests,
            &mut self.array_lengths.l1_to_l2_msg_read_requests,
            lengths.l1_to_l2_msg_read_requests,
        );
        truncate_category(
            &mut self.public_data_reads,
            &mut self.array_lengths.public_data_reads,
            lengths.public_data_reads,
        );
    }
}

fn check_packing<T: Default + PartialEq>(
    category: ReadRequestKind,
    entries: &[T],
    claimed: usize,
    capacity: usize,
    is_empty: impl Fn(&T) -> bool,
) -> Result<(), ValidationError> {
    if claimed > entries.len() || entries.len() > capacity {
        return Err(ValidationError::MalformedRequestArray {
            category,
            claimed,
            len: entries.len(),
            capacity,
        });
    }
    for (index, entry) in entries.iter().enumerate() {
        if is_empty(entry) != (index >= claimed) {
            return Err(ValidationError::PackingViolation { category, index });
        }
    }
    Ok(())
}

fn append_request<T>(
    entries: &mut Vec<T>,
    claimed: &mut usize,
    capacity: usize,
    category: ReadRequestKind,
    request: T,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        *claimed < capacity,
        "too many {category} read requests (capacity: {capacity})",
    );
    // Overwrite claimed padding if present, otherwise grow the array.
    if *claimed < entries.len() {
        entries[*claimed] = request;
    } else {
        entries.push(request);
    }
    *claimed += 1;
    Ok(())
}

fn truncate_category<T: Default>(entries: &mut Vec<T>, claimed: &mut usize, target: usize) {
    for entry in entries.iter_mut().skip(target) {
        *entry = T::default();
    }
    *claimed = target;
}
