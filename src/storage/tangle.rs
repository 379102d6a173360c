// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tracing::instrument;

use super::{prefix, CachedObject, KeyValueStore, ObjectStorage, StorableObject, StorageError};
use crate::{
    bundle::Bundle,
    milestone::Milestone,
    types::{ternary, Hash, MilestoneIndex, Transaction, MAX_INDEX_VALUE, SIGNATURE_FRAGMENT_TRIT_LENGTH},
};

/// A guard on a cached [`Transaction`].
pub type CachedTransaction = CachedObject<Transaction>;
/// A guard on a cached [`Bundle`].
pub type CachedBundle = CachedObject<Bundle>;
/// A guard on a cached [`Milestone`].
pub type CachedMilestone = CachedObject<Milestone>;

impl StorableObject for Transaction {
    const KIND: &'static str = "transaction";

    fn key(&self) -> Vec<u8> {
        self.hash.as_bytes().to_vec()
    }

    fn to_bytes(&self) -> Vec<u8> {
        Transaction::to_bytes(self)
    }

    fn from_bytes(key: &[u8], value: &[u8]) -> Result<Self, StorageError> {
        let transaction = Transaction::from_bytes(value)?;
        if transaction.hash.as_bytes()[..] != *key {
            return Err(StorageError::malformed(Self::KIND, "hash does not match the record key"));
        }
        Ok(transaction)
    }
}

/// The transaction, approver, bundle, milestone and spent address stores.
pub struct TangleStorage {
    backend: Arc<dyn KeyValueStore>,
    transactions: ObjectStorage<Transaction>,
    bundles: ObjectStorage<Bundle>,
    milestones: ObjectStorage<Milestone>,
}

impl TangleStorage {
    /// Creates the stores on top of `backend`.
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            transactions: ObjectStorage::new(prefix::TRANSACTIONS, backend.clone()),
            bundles: ObjectStorage::new(prefix::BUNDLES, backend.clone()),
            milestones: ObjectStorage::new(prefix::MILESTONES, backend.clone()),
            backend,
        }
    }

    /// The underlying key-value store.
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// The transaction object storage.
    pub fn transactions(&self) -> &ObjectStorage<Transaction> {
        &self.transactions
    }

    /// The bundle object storage.
    pub fn bundles(&self) -> &ObjectStorage<Bundle> {
        &self.bundles
    }

    /// The milestone object storage.
    pub fn milestones(&self) -> &ObjectStorage<Milestone> {
        &self.milestones
    }

    fn approver_key(approvee: &Hash, approver: &Hash) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + 2 * Hash::LENGTH);
        key.push(prefix::APPROVERS);
        key.extend_from_slice(approvee.as_bytes());
        key.extend_from_slice(approver.as_bytes());
        key
    }

    fn spent_address_key(address: &Hash) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + Hash::LENGTH);
        key.push(prefix::SPENT_ADDRESSES);
        key.extend_from_slice(address.as_bytes());
        key
    }

    /// Stores a transaction and indexes it as approver of its trunk and branch.
    ///
    /// Returns `None` if the transaction was already stored.
    #[instrument(skip_all, fields(hash = %transaction.hash), err, level = "trace")]
    pub fn store_transaction(&self, transaction: Transaction) -> Result<Option<CachedTransaction>, StorageError> {
        let hash = transaction.hash;
        if transaction.signature_message_fragment.len() != SIGNATURE_FRAGMENT_TRIT_LENGTH {
            return Err(StorageError::invalid_transaction(
                hash,
                format!(
                    "signature message fragment has {} trits",
                    transaction.signature_message_fragment.len()
                ),
            ));
        }
        if let Err(e) = ternary::validate_trits(&transaction.signature_message_fragment) {
            return Err(StorageError::invalid_transaction(hash, format!("signature message fragment: {e}")));
        }
        if transaction.last_index > MAX_INDEX_VALUE || transaction.current_index > transaction.last_index {
            return Err(StorageError::invalid_transaction(
                hash,
                format!(
                    "bundle index {} of {} is out of range",
                    transaction.current_index, transaction.last_index
                ),
            ));
        }
        let (trunk, branch) = (transaction.trunk, transaction.branch);
        let stored = self.transactions.store_if_absent(transaction)?;
        if stored.is_some() {
            self.backend.set(&Self::approver_key(&trunk, &hash), &[])?;
            if branch != trunk {
                self.backend.set(&Self::approver_key(&branch, &hash), &[])?;
            }
        }
        Ok(stored)
    }

    /// Loads a transaction.
    pub fn transaction(&self, hash: &Hash) -> Result<Option<CachedTransaction>, StorageError> {
        self.transactions.load(hash.as_bytes())
    }

    /// Returns whether a transaction is stored.
    pub fn contains_transaction(&self, hash: &Hash) -> Result<bool, StorageError> {
        self.transactions.contains(hash.as_bytes())
    }

    /// Returns the hashes of all stored transactions that reference `hash` as trunk or branch.
    pub fn approvers(&self, hash: &Hash) -> Result<Vec<Hash>, StorageError> {
        let mut key_prefix = Vec::with_capacity(1 + Hash::LENGTH);
        key_prefix.push(prefix::APPROVERS);
        key_prefix.extend_from_slice(hash.as_bytes());
        self.backend
            .scan_prefix(&key_prefix)?
            .into_iter()
            .map(|(key, _)| Ok(Hash::from_bytes(&key[key_prefix.len()..])?))
            .collect()
    }

    /// Stores a bundle unless a bundle with the same tail exists. Returns `None` if it did.
    pub fn store_bundle(&self, bundle: Bundle) -> Result<Option<CachedBundle>, StorageError> {
        self.bundles.store_if_absent(bundle)
    }

    /// Loads the bundle whose tail is `tail`.
    pub fn bundle(&self, tail: &Hash) -> Result<Option<CachedBundle>, StorageError> {
        self.bundles.load(tail.as_bytes())
    }

    /// Returns whether a bundle with this tail exists.
    pub fn contains_bundle(&self, tail: &Hash) -> Result<bool, StorageError> {
        self.bundles.contains(tail.as_bytes())
    }

    /// Stores a milestone unless one exists at its index. Returns `None` if it did.
    pub fn store_milestone(&self, milestone: Milestone) -> Result<Option<CachedMilestone>, StorageError> {
        self.milestones.store_if_absent(milestone)
    }

    /// Loads the milestone at `index`.
    pub fn milestone(&self, index: MilestoneIndex) -> Result<Option<CachedMilestone>, StorageError> {
        self.milestones.load(&index.to_le_bytes())
    }

    /// Returns whether a milestone exists at `index`.
    pub fn contains_milestone(&self, index: MilestoneIndex) -> Result<bool, StorageError> {
        self.milestones.contains(&index.to_le_bytes())
    }

    /// Adds `address` to the spent address set. Returns `false` if it was already present.
    pub fn mark_address_spent(&self, address: &Hash) -> Result<bool, StorageError> {
        let key = Self::spent_address_key(address);
        if self.backend.contains(&key)? {
            return Ok(false);
        }
        self.backend.set(&key, &[])?;
        Ok(true)
    }

    /// Returns whether `address` was ever spent from.
    pub fn was_address_spent(&self, address: &Hash) -> Result<bool, StorageError> {
        self.backend.contains(&Self::spent_address_key(address))
    }

    /// Writes back every modified cached object.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.transactions.flush()?;
        self.bundles.flush()?;
        self.milestones.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::MemoryStore;

    fn hash(tryte: &str) -> Hash {
        Hash::from_trytes(&tryte.repeat(81)).unwrap()
    }

    #[test]
    fn approvers_are_indexed() {
        let storage = TangleStorage::new(Arc::new(MemoryStore::new()));
        let tx = Transaction {
            hash: hash("A"),
            trunk: hash("T"),
            branch: hash("B"),
            ..Default::default()
        };
        assert!(storage.store_transaction(tx.clone()).unwrap().is_some());
        assert!(storage.store_transaction(tx).unwrap().is_none());
        assert_eq!(storage.approvers(&hash("T")).unwrap(), vec![hash("A")]);
        assert_eq!(storage.approvers(&hash("B")).unwrap(), vec![hash("A")]);
        assert!(storage.approvers(&hash("A")).unwrap().is_empty());
        assert_eq!(storage.transactions().consumers(hash("A").as_bytes()), 0);
    }

    #[test]
    fn rejects_short_signature_fragment() {
        let storage = TangleStorage::new(Arc::new(MemoryStore::new()));
        let tx = Transaction {
            hash: hash("A"),
            signature_message_fragment: vec![0; 10],
            ..Default::default()
        };
        assert!(matches!(
            storage.store_transaction(tx),
            Err(StorageError::InvalidTransaction { .. })
        ));
    }

    #[test]
    fn rejects_invalid_fragment_trits() {
        let storage = TangleStorage::new(Arc::new(MemoryStore::new()));
        let mut tx = Transaction {
            hash: hash("A"),
            ..Default::default()
        };
        tx.signature_message_fragment[7] = 5;
        let err = storage.store_transaction(tx).unwrap_err();
        assert!(!err.is_fatal());
        assert!(!storage.contains_transaction(&hash("A")).unwrap());
    }

    #[test]
    fn rejects_out_of_range_indexes() {
        let storage = TangleStorage::new(Arc::new(MemoryStore::new()));
        for (current_index, last_index) in [(0, u64::MAX), (0, MAX_INDEX_VALUE + 1), (3, 2)] {
            let tx = Transaction {
                hash: hash("A"),
                current_index,
                last_index,
                ..Default::default()
            };
            assert!(matches!(
                storage.store_transaction(tx),
                Err(StorageError::InvalidTransaction { .. })
            ));
        }
        let tx = Transaction {
            hash: hash("A"),
            current_index: MAX_INDEX_VALUE,
            last_index: MAX_INDEX_VALUE,
            ..Default::default()
        };
        assert!(storage.store_transaction(tx).unwrap().is_some());
    }

    #[test]
    fn spent_addresses() {
        let storage = TangleStorage::new(Arc::new(MemoryStore::new()));
        assert!(!storage.was_address_spent(&hash("S")).unwrap());
        assert!(storage.mark_address_spent(&hash("S")).unwrap());
        assert!(!storage.mark_address_spent(&hash("S")).unwrap());
        assert!(storage.was_address_spent(&hash("S")).unwrap());
    }
}
