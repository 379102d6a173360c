// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module containing the bundle aggregate, its assembly from the tangle and its validation.

mod assembler;
mod validator;

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::RwLock;

pub use self::{
    assembler::BundleAssembler,
    validator::{check_bundle_integrity, BundleValidator, InvalidBundleError},
};
use crate::{
    storage::{StorableObject, StorageError},
    types::{Hash, MilestoneIndex},
};

/// The per-address balance mutation of a bundle.
pub type LedgerChanges = BTreeMap<Hash, i64>;

/// The flags kept in a bundle's metadata byte, by bit position.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BundleFlag {
    Solid = 0,
    Valid = 1,
    Confirmed = 2,
    IsMilestone = 3,
    IsValueSpam = 4,
    ValidStrictSemantics = 5,
    Conflicting = 6,
}

/// The bundle metadata word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BundleMetadata(u8);

impl BundleMetadata {
    /// Whether `flag` is set.
    pub fn has(self, flag: BundleFlag) -> bool {
        self.0 & (1 << flag as u8) != 0
    }

    /// Sets `flag` to `value`.
    pub fn set(&mut self, flag: BundleFlag, value: bool) {
        if value {
            self.0 |= 1 << flag as u8;
        } else {
            self.0 &= !(1 << flag as u8);
        }
    }

    /// The raw byte.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl From<u8> for BundleMetadata {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

/// An atomic group of transactions, keyed by its tail transaction.
///
/// Everything except the metadata flags and the ledger changes is write-once.
#[derive(Debug)]
pub struct Bundle {
    tail: Hash,
    hash: Hash,
    head: Hash,
    last_index: u64,
    transactions: Vec<Hash>,
    metadata: RwLock<BundleMetadata>,
    confirmation_index: RwLock<MilestoneIndex>,
    ledger_changes: RwLock<LedgerChanges>,
    modified: AtomicBool,
}

impl Bundle {
    const HEADER_LENGTH: usize = 1 + 3 * 8 + 4 + 2 * Hash::LENGTH;
    const CHANGE_LENGTH: usize = Hash::LENGTH + 8;

    pub(crate) fn new(hash: Hash, head: Hash, last_index: u64, transactions: Vec<Hash>) -> Option<Self> {
        let tail = *transactions.first()?;
        Some(Self {
            tail,
            hash,
            head,
            last_index,
            transactions,
            metadata: Default::default(),
            confirmation_index: Default::default(),
            ledger_changes: Default::default(),
            modified: AtomicBool::new(false),
        })
    }

    /// The hash of the tail transaction.
    pub fn tail(&self) -> &Hash {
        &self.tail
    }

    /// The bundle hash shared by all members.
    pub fn hash(&self) -> &Hash {
        &self.hash
    }

    /// The hash of the head transaction, or the null hash if assembly stopped before reaching it.
    pub fn head(&self) -> &Hash {
        &self.head
    }

    /// The declared last index.
    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    /// Member transaction hashes, ordered tail to head.
    pub fn transactions(&self) -> &[Hash] {
        &self.transactions
    }

    /// Whether every declared member is present.
    pub fn is_complete(&self) -> bool {
        Some(self.transactions.len() as u64) == self.last_index.checked_add(1)
    }

    /// The current metadata.
    pub fn metadata(&self) -> BundleMetadata {
        *self.metadata.read()
    }

    /// Whether `flag` is set.
    pub fn has_flag(&self, flag: BundleFlag) -> bool {
        self.metadata.read().has(flag)
    }

    /// Sets `flag` to `value`. Returns `false` if it already had that value.
    pub fn set_flag(&self, flag: BundleFlag, value: bool) -> bool {
        if self.metadata.read().has(flag) == value {
            return false;
        }
        let mut metadata = self.metadata.write();
        if metadata.has(flag) == value {
            return false;
        }
        metadata.set(flag, value);
        self.modified.store(true, Ordering::SeqCst);
        true
    }

    #[allow(missing_docs)]
    pub fn is_solid(&self) -> bool {
        self.has_flag(BundleFlag::Solid)
    }

    #[allow(missing_docs)]
    pub fn is_valid(&self) -> bool {
        self.has_flag(BundleFlag::Valid)
    }

    #[allow(missing_docs)]
    pub fn is_confirmed(&self) -> bool {
        self.has_flag(BundleFlag::Confirmed)
    }

    /// The milestone that confirmed the bundle.
    pub fn confirmation_index(&self) -> Option<MilestoneIndex> {
        self.is_confirmed().then(|| *self.confirmation_index.read())
    }

    /// Flags the bundle as confirmed by the milestone at `index`.
    pub(crate) fn confirm(&self, index: MilestoneIndex) {
        *self.confirmation_index.write() = index;
        self.set_flag(BundleFlag::Confirmed, true);
        self.modified.store(true, Ordering::SeqCst);
    }

    #[allow(missing_docs)]
    pub fn is_milestone(&self) -> bool {
        self.has_flag(BundleFlag::IsMilestone)
    }

    #[allow(missing_docs)]
    pub fn is_value_spam(&self) -> bool {
        self.has_flag(BundleFlag::IsValueSpam)
    }

    #[allow(missing_docs)]
    pub fn is_valid_strict_semantics(&self) -> bool {
        self.has_flag(BundleFlag::ValidStrictSemantics)
    }

    #[allow(missing_docs)]
    pub fn is_conflicting(&self) -> bool {
        self.has_flag(BundleFlag::Conflicting)
    }

    /// The computed ledger mutation. Empty until calculated or for value-spam bundles.
    pub fn ledger_changes(&self) -> LedgerChanges {
        self.ledger_changes.read().clone()
    }

    pub(crate) fn set_ledger_changes(&self, changes: LedgerChanges) {
        *self.ledger_changes.write() = changes;
        self.modified.store(true, Ordering::SeqCst);
    }
}

impl StorableObject for Bundle {
    const KIND: &'static str = "bundle";

    fn key(&self) -> Vec<u8> {
        self.tail.as_bytes().to_vec()
    }

    fn to_bytes(&self) -> Vec<u8> {
        let changes = self.ledger_changes.read();
        let mut bytes = Vec::with_capacity(
            Self::HEADER_LENGTH + self.transactions.len() * Hash::LENGTH + changes.len() * Self::CHANGE_LENGTH,
        );
        bytes.push(self.metadata().bits());
        bytes.extend_from_slice(&self.last_index.to_le_bytes());
        bytes.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&(changes.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&self.confirmation_index.read().0.to_le_bytes());
        bytes.extend_from_slice(self.hash.as_bytes());
        bytes.extend_from_slice(self.head.as_bytes());
        for hash in &self.transactions {
            bytes.extend_from_slice(hash.as_bytes());
        }
        for (address, delta) in changes.iter() {
            bytes.extend_from_slice(address.as_bytes());
            bytes.extend_from_slice(&delta.to_le_bytes());
        }
        bytes
    }

    fn from_bytes(key: &[u8], value: &[u8]) -> Result<Self, StorageError> {
        if value.len() < Self::HEADER_LENGTH {
            return Err(StorageError::malformed(Self::KIND, "record shorter than header"));
        }
        let read_u64 = |offset: usize| {
            let mut buf = [0; 8];
            buf.copy_from_slice(&value[offset..offset + 8]);
            u64::from_le_bytes(buf)
        };
        let metadata = BundleMetadata::from(value[0]);
        let last_index = read_u64(1);
        let tx_count = read_u64(9) as usize;
        let changes_count = read_u64(17) as usize;
        let expected = tx_count
            .checked_mul(Hash::LENGTH)
            .and_then(|txs| changes_count.checked_mul(Self::CHANGE_LENGTH)?.checked_add(txs))
            .and_then(|body| body.checked_add(Self::HEADER_LENGTH));
        if expected != Some(value.len()) {
            return Err(StorageError::malformed(
                Self::KIND,
                format!("record length {} does not match its counts", value.len()),
            ));
        }
        let mut confirmation_index = [0; 4];
        confirmation_index.copy_from_slice(&value[25..29]);
        let mut offset = 29;
        let hash = Hash::from_bytes(&value[offset..offset + Hash::LENGTH])?;
        offset += Hash::LENGTH;
        let head = Hash::from_bytes(&value[offset..offset + Hash::LENGTH])?;
        offset += Hash::LENGTH;

        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            transactions.push(Hash::from_bytes(&value[offset..offset + Hash::LENGTH])?);
            offset += Hash::LENGTH;
        }
        let mut changes = LedgerChanges::new();
        for _ in 0..changes_count {
            let address = Hash::from_bytes(&value[offset..offset + Hash::LENGTH])?;
            offset += Hash::LENGTH;
            changes.insert(address, read_u64(offset) as i64);
            offset += 8;
        }

        let bundle = Self::new(hash, head, last_index, transactions)
            .ok_or_else(|| StorageError::malformed(Self::KIND, "bundle without transactions"))?;
        if bundle.tail.as_bytes()[..] != *key {
            return Err(StorageError::malformed(Self::KIND, "tail does not match the record key"));
        }
        *bundle.metadata.write() = metadata;
        *bundle.confirmation_index.write() = MilestoneIndex(u32::from_le_bytes(confirmation_index));
        *bundle.ledger_changes.write() = changes;
        Ok(bundle)
    }

    fn is_modified(&self) -> bool {
        self.modified.load(Ordering::SeqCst)
    }

    fn set_modified(&self, modified: bool) {
        self.modified.store(modified, Ordering::SeqCst)
    }
}
