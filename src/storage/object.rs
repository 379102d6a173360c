// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashMap, fmt, ops::Deref, sync::Arc};

use parking_lot::Mutex;
use tracing::error;

use super::{KeyValueStore, StorageError};

/// A record that can be kept in an [`ObjectStorage`].
pub trait StorableObject: Sized + Send + Sync + 'static {
    /// Record kind used in diagnostics.
    const KIND: &'static str;

    /// The key of the record, without the storage prefix.
    fn key(&self) -> Vec<u8>;

    /// Encodes the record value.
    fn to_bytes(&self) -> Vec<u8>;

    /// Decodes a record from its key and value.
    fn from_bytes(key: &[u8], value: &[u8]) -> Result<Self, StorageError>;

    /// Whether the in-memory object diverged from its persisted form.
    fn is_modified(&self) -> bool {
        false
    }

    /// Marks the object as (un)modified.
    fn set_modified(&self, _modified: bool) {}
}

struct CacheEntry<T> {
    object: Arc<T>,
    consumers: usize,
}

struct Inner<T> {
    prefix: u8,
    backend: Arc<dyn KeyValueStore>,
    cache: Mutex<HashMap<Vec<u8>, CacheEntry<T>>>,
}

impl<T: StorableObject> Inner<T> {
    fn storage_key(&self, key: &[u8]) -> Vec<u8> {
        let mut storage_key = Vec::with_capacity(key.len() + 1);
        storage_key.push(self.prefix);
        storage_key.extend_from_slice(key);
        storage_key
    }

    fn write_back(&self, object: &T) -> Result<(), StorageError> {
        if object.is_modified() {
            self.backend.set(&self.storage_key(&object.key()), &object.to_bytes())?;
            object.set_modified(false);
        }
        Ok(())
    }

    fn release(&self, key: &[u8], object: &Arc<T>) {
        let mut cache = self.cache.lock();
        // Guards of deleted objects are detached from the cache.
        if let Some(entry) = cache.get_mut(key).filter(|entry| Arc::ptr_eq(&entry.object, object)) {
            entry.consumers -= 1;
            if entry.consumers == 0 {
                if let Some(entry) = cache.remove(key) {
                    if let Err(e) = self.write_back(&entry.object) {
                        error!(kind = T::KIND, "failed to persist released object: {}", e);
                    }
                }
            }
        }
    }
}

/// Caches decoded records of one kind on top of a [`KeyValueStore`].
///
/// Objects are handed out as [`CachedObject`] guards. An object stays cached while at least one guard is alive and
/// is written back when the last guard of a modified object is dropped.
pub struct ObjectStorage<T: StorableObject> {
    inner: Arc<Inner<T>>,
}

impl<T: StorableObject> ObjectStorage<T> {
    /// Creates a storage for records under `prefix`.
    pub fn new(prefix: u8, backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                prefix,
                backend,
                cache: Default::default(),
            }),
        }
    }

    fn guard(&self, key: Vec<u8>, object: Arc<T>) -> CachedObject<T> {
        CachedObject {
            key,
            object,
            storage: self.inner.clone(),
        }
    }

    /// Loads the object stored under `key`.
    pub fn load(&self, key: &[u8]) -> Result<Option<CachedObject<T>>, StorageError> {
        let mut cache = self.inner.cache.lock();
        if let Some(entry) = cache.get_mut(key) {
            entry.consumers += 1;
            let object = entry.object.clone();
            return Ok(Some(self.guard(key.to_vec(), object)));
        }
        match self.inner.backend.get(&self.inner.storage_key(key))? {
            Some(value) => {
                let object = Arc::new(T::from_bytes(key, &value)?);
                cache.insert(
                    key.to_vec(),
                    CacheEntry {
                        object: object.clone(),
                        consumers: 1,
                    },
                );
                Ok(Some(self.guard(key.to_vec(), object)))
            }
            None => Ok(None),
        }
    }

    /// Returns whether an object is stored under `key`.
    pub fn contains(&self, key: &[u8]) -> Result<bool, StorageError> {
        if self.inner.cache.lock().contains_key(key) {
            return Ok(true);
        }
        self.inner.backend.contains(&self.inner.storage_key(key))
    }

    /// Persists `object` unless its key is already taken. Returns `None` if it was.
    pub fn store_if_absent(&self, object: T) -> Result<Option<CachedObject<T>>, StorageError> {
        let key = object.key();
        let mut cache = self.inner.cache.lock();
        let storage_key = self.inner.storage_key(&key);
        if cache.contains_key(&key) || self.inner.backend.contains(&storage_key)? {
            return Ok(None);
        }
        self.inner.backend.set(&storage_key, &object.to_bytes())?;
        object.set_modified(false);
        let object = Arc::new(object);
        cache.insert(
            key.clone(),
            CacheEntry {
                object: object.clone(),
                consumers: 1,
            },
        );
        Ok(Some(self.guard(key, object)))
    }

    /// Removes the persisted object. Live guards keep their in-memory copy, which is no longer written back.
    pub fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut cache = self.inner.cache.lock();
        if let Some(entry) = cache.get(key) {
            entry.object.set_modified(false);
        }
        cache.remove(key);
        self.inner.backend.delete(&self.inner.storage_key(key))
    }

    /// Writes back every modified object that is currently cached.
    pub fn flush(&self) -> Result<(), StorageError> {
        let cache = self.inner.cache.lock();
        for entry in cache.values() {
            self.inner.write_back(&entry.object)?;
        }
        Ok(())
    }

    /// The number of live guards for `key`.
    pub fn consumers(&self, key: &[u8]) -> usize {
        self.inner.cache.lock().get(key).map_or(0, |entry| entry.consumers)
    }

    /// The number of objects currently held in memory.
    pub fn cached(&self) -> usize {
        self.inner.cache.lock().len()
    }
}

/// A reference-counted handle to a cached object. Cloning retains, dropping releases.
pub struct CachedObject<T: StorableObject> {
    key: Vec<u8>,
    object: Arc<T>,
    storage: Arc<Inner<T>>,
}

impl<T: StorableObject> Deref for CachedObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl<T: StorableObject> Clone for CachedObject<T> {
    fn clone(&self) -> Self {
        let mut cache = self.storage.cache.lock();
        if let Some(entry) = cache.get_mut(&self.key) {
            if Arc::ptr_eq(&entry.object, &self.object) {
                entry.consumers += 1;
            }
        }
        Self {
            key: self.key.clone(),
            object: self.object.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<T: StorableObject> Drop for CachedObject<T> {
    fn drop(&mut self) {
        self.storage.release(&self.key, &self.object);
    }
}

impl<T: StorableObject + fmt::Debug> fmt::Debug for CachedObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.object.fmt(f)
    }
}
