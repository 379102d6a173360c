// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::StorageError;

/// A single write in a [`Batch`].
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOperation {
    Set { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A set of writes that is applied atomically.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    operations: Vec<BatchOperation>,
}

impl Batch {
    /// Queues an upsert.
    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.operations.push(BatchOperation::Set {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Queues a deletion.
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.operations.push(BatchOperation::Delete { key: key.into() });
    }

    /// The number of queued writes.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether no writes are queued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl IntoIterator for Batch {
    type Item = BatchOperation;
    type IntoIter = std::vec::IntoIter<BatchOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

/// A byte-oriented key-value store backing all persisted records.
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns whether `key` is present.
    fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// Upserts a single entry.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError>;

    /// Removes a single entry.
    fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// Returns every entry whose key starts with `prefix`, ordered by key.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;

    /// Removes every entry whose key starts with `prefix`.
    fn delete_prefix(&self, prefix: &[u8]) -> Result<(), StorageError>;

    /// Applies all writes of `batch` atomically.
    fn apply(&self, batch: Batch) -> Result<(), StorageError>;
}

/// An in-memory [`KeyValueStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.entries.read().contains_key(key))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn delete_prefix(&self, prefix: &[u8]) -> Result<(), StorageError> {
        self.entries.write().retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }

    fn apply(&self, batch: Batch) -> Result<(), StorageError> {
        let mut entries = self.entries.write();
        for operation in batch {
            match operation {
                BatchOperation::Set { key, value } => {
                    entries.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}
