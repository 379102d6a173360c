// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use super::{
    hash::Hash,
    milestone_index::MilestoneIndex,
    ternary::{self, TernaryError, Trit},
};

/// Number of trits in a signature message fragment.
pub const SIGNATURE_FRAGMENT_TRIT_LENGTH: usize = 6561;
/// Number of trits in the obsolete tag.
pub const TAG_TRIT_LENGTH: usize = 81;
/// Number of trits of the encoded value.
pub const VALUE_TRIT_LENGTH: usize = 81;
/// Number of trits of the encoded timestamp and bundle indexes.
pub const INDEX_TRIT_LENGTH: usize = 27;
/// Largest timestamp or bundle index that fits into [`INDEX_TRIT_LENGTH`] balanced trits.
pub const MAX_INDEX_VALUE: u64 = 3_812_798_742_493;
/// Number of trits hashed into the bundle hash per transaction.
pub const ESSENCE_TRIT_LENGTH: usize =
    Hash::TRIT_LENGTH + VALUE_TRIT_LENGTH + TAG_TRIT_LENGTH + 3 * INDEX_TRIT_LENGTH;

const SIGNATURE_FRAGMENT_PACKED_LENGTH: usize = ternary::packed_len(SIGNATURE_FRAGMENT_TRIT_LENGTH);
const TAG_PACKED_LENGTH: usize = ternary::packed_len(TAG_TRIT_LENGTH);

/// The 81-trit obsolete tag. Milestones carry their index here.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag([Trit; TAG_TRIT_LENGTH]);

impl Tag {
    /// Builds a tag from exactly 81 trits.
    pub fn from_trits(trits: &[Trit]) -> Result<Self, TernaryError> {
        if trits.len() != TAG_TRIT_LENGTH {
            return Err(TernaryError::InvalidLength {
                expected: TAG_TRIT_LENGTH,
                actual: trits.len(),
            });
        }
        ternary::validate_trits(trits)?;
        let mut tag = [0; TAG_TRIT_LENGTH];
        tag.copy_from_slice(trits);
        Ok(Self(tag))
    }

    /// Encodes a milestone index into a tag.
    pub fn from_milestone_index(index: MilestoneIndex) -> Self {
        let mut tag = [0; TAG_TRIT_LENGTH];
        // 81 trits hold any u32.
        if let Some(trits) = ternary::int_to_trits(index.0 as i64, TAG_TRIT_LENGTH) {
            tag.copy_from_slice(&trits);
        }
        Self(tag)
    }

    /// The tag's trits.
    pub fn trits(&self) -> &[Trit; TAG_TRIT_LENGTH] {
        &self.0
    }

    /// Interprets the tag as a milestone index, if it holds a non-negative integer that fits one.
    pub fn milestone_index(&self) -> Option<MilestoneIndex> {
        ternary::trits_to_int(&self.0)
            .and_then(|value| u32::try_from(value).ok())
            .map(MilestoneIndex)
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self([0; TAG_TRIT_LENGTH])
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", ternary::trits_to_trytes(&self.0))
    }
}

/// A legacy ternary transaction. Immutable once stored.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub hash: Hash,
    pub signature_message_fragment: Vec<Trit>,
    pub address: Hash,
    pub value: i64,
    pub obsolete_tag: Tag,
    pub timestamp: u64,
    pub current_index: u64,
    pub last_index: u64,
    pub bundle: Hash,
    pub trunk: Hash,
    pub branch: Hash,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            hash: Hash::null(),
            signature_message_fragment: vec![0; SIGNATURE_FRAGMENT_TRIT_LENGTH],
            address: Hash::null(),
            value: 0,
            obsolete_tag: Tag::default(),
            timestamp: 0,
            current_index: 0,
            last_index: 0,
            bundle: Hash::null(),
            trunk: Hash::null(),
            branch: Hash::null(),
        }
    }
}

impl Transaction {
    /// The length of the binary record.
    pub const RECORD_LENGTH: usize = 5 * Hash::LENGTH + SIGNATURE_FRAGMENT_PACKED_LENGTH + TAG_PACKED_LENGTH + 4 * 8;

    /// The first transaction of a bundle.
    pub fn is_tail(&self) -> bool {
        self.current_index == 0
    }

    /// The last transaction of a bundle.
    pub fn is_head(&self) -> bool {
        self.current_index == self.last_index
    }

    /// The milestone index carried in the obsolete tag.
    pub fn milestone_index(&self) -> Option<MilestoneIndex> {
        self.obsolete_tag.milestone_index()
    }

    /// The trits that contribute to the bundle hash.
    pub fn essence_trits(&self) -> Result<Vec<Trit>, TernaryError> {
        let mut essence = Vec::with_capacity(ESSENCE_TRIT_LENGTH);
        essence.extend_from_slice(&self.address.trits());
        essence.extend(int_trits(self.value, VALUE_TRIT_LENGTH)?);
        essence.extend_from_slice(self.obsolete_tag.trits());
        for field in [self.timestamp, self.current_index, self.last_index] {
            let value = i64::try_from(field).map_err(|_| TernaryError::Overflow(INDEX_TRIT_LENGTH))?;
            essence.extend(int_trits(value, INDEX_TRIT_LENGTH)?);
        }
        Ok(essence)
    }

    /// Encodes the transaction into its fixed-length binary record.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::RECORD_LENGTH);
        bytes.extend_from_slice(self.hash.as_bytes());
        bytes.extend(ternary::encode_t5b1(&self.signature_message_fragment));
        bytes.extend_from_slice(self.address.as_bytes());
        bytes.extend_from_slice(&self.value.to_le_bytes());
        bytes.extend(ternary::encode_t5b1(self.obsolete_tag.trits()));
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.current_index.to_le_bytes());
        bytes.extend_from_slice(&self.last_index.to_le_bytes());
        bytes.extend_from_slice(self.bundle.as_bytes());
        bytes.extend_from_slice(self.trunk.as_bytes());
        bytes.extend_from_slice(self.branch.as_bytes());
        bytes
    }

    /// Decodes a transaction from its binary record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TernaryError> {
        if bytes.len() != Self::RECORD_LENGTH {
            return Err(TernaryError::InvalidLength {
                expected: Self::RECORD_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut reader = Reader(bytes);
        Ok(Self {
            hash: Hash::from_bytes(reader.take(Hash::LENGTH))?,
            signature_message_fragment: ternary::decode_t5b1(
                reader.take(SIGNATURE_FRAGMENT_PACKED_LENGTH),
                SIGNATURE_FRAGMENT_TRIT_LENGTH,
            )?,
            address: Hash::from_bytes(reader.take(Hash::LENGTH))?,
            value: i64::from_le_bytes(reader.array()),
            obsolete_tag: Tag::from_trits(&ternary::decode_t5b1(reader.take(TAG_PACKED_LENGTH), TAG_TRIT_LENGTH)?)?,
            timestamp: u64::from_le_bytes(reader.array()),
            current_index: u64::from_le_bytes(reader.array()),
            last_index: u64::from_le_bytes(reader.array()),
            bundle: Hash::from_bytes(reader.take(Hash::LENGTH))?,
            trunk: Hash::from_bytes(reader.take(Hash::LENGTH))?,
            branch: Hash::from_bytes(reader.take(Hash::LENGTH))?,
        })
    }
}

fn int_trits(value: i64, len: usize) -> Result<Vec<Trit>, TernaryError> {
    ternary::int_to_trits(value, len).ok_or(TernaryError::Overflow(len))
}

/// Cursor over a record whose total length was checked up front.
struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> &'a [u8] {
        let (head, tail) = self.0.split_at(len);
        self.0 = tail;
        head
    }

    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0; N];
        out.copy_from_slice(self.take(N));
        out
    }
}
