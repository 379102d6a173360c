// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module containing the balance ledger, its per-milestone diffs and white-flag confirmation.

mod whiteflag;

use std::{collections::BTreeMap, sync::Arc};

use derive_more::{Deref, DerefMut, From};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::{debug, instrument};

pub(crate) use self::whiteflag::white_flag;
use crate::{
    error::CorruptionError,
    storage::{prefix, Batch, KeyValueStore, StorageError},
    types::{Hash, MilestoneIndex},
};

const BALANCE_KEY: &[u8] = b"balance";
const SNAPSHOT_BALANCE_KEY: &[u8] = b"sb";
const DIFF_KEY: &[u8] = b"diff";
const LEDGER_INDEX_KEY: &[u8] = b"ledgerMilestoneIndex";
const SNAPSHOT_INDEX_KEY: &[u8] = b"snapshotMilestoneIndex";

/// Unsigned balances by address. Addresses without balance are absent.
pub type Balances = BTreeMap<Hash, u64>;

/// The signed balance mutation of one milestone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deref, DerefMut, From)]
pub struct LedgerDiff(BTreeMap<Hash, i64>);

impl LedgerDiff {
    /// The sum of all deltas. Zero for every diff the ledger accepts.
    pub fn sum(&self) -> i128 {
        self.0.values().map(|delta| *delta as i128).sum()
    }
}

impl FromIterator<(Hash, i64)> for LedgerDiff {
    fn from_iter<I: IntoIterator<Item = (Hash, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Corruption(#[from] CorruptionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("target index {target} is newer than the solid index {solid}")]
    TargetIndexTooNew { target: MilestoneIndex, solid: MilestoneIndex },
    #[error("target index {target} is older than the snapshot index {snapshot}")]
    TargetIndexTooOld {
        target: MilestoneIndex,
        snapshot: MilestoneIndex,
    },
    #[error("ledger index must advance beyond {current}, got {index}")]
    IndexNotAdvancing { index: MilestoneIndex, current: MilestoneIndex },
    #[error("balances sum to {actual}, expected the total supply {expected}")]
    InvalidBalances { expected: u64, actual: u128 },
}

impl LedgerError {
    /// Whether the error signals corrupted ledger state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Corruption(_) | Self::Storage(_))
    }
}

/// The milestone indexes the persisted ledger refers to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerIndexes {
    /// The milestone whose diff was applied last.
    pub ledger: MilestoneIndex,
    /// The milestone of the stored snapshot balances.
    pub snapshot: MilestoneIndex,
}

/// Owns the balance table, the per-milestone diffs and the snapshot balances.
///
/// Multi-step operations run on a [`LedgerReadGuard`] or [`LedgerWriteGuard`], which hold the ledger lock for their
/// whole lifetime.
pub struct LedgerStateManager {
    backend: Arc<dyn KeyValueStore>,
    total_supply: u64,
    indexes: RwLock<LedgerIndexes>,
}

fn key(parts: &[&[u8]]) -> Vec<u8> {
    let mut key = vec![prefix::LEDGER];
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

fn read_index(backend: &dyn KeyValueStore, name: &[u8]) -> Result<MilestoneIndex, StorageError> {
    match backend.get(&key(&[name]))? {
        Some(value) => {
            let bytes = value
                .as_slice()
                .try_into()
                .map_err(|_| StorageError::malformed("ledger index", "value is not a 4 byte index"))?;
            Ok(MilestoneIndex::from_le_bytes(bytes))
        }
        None => Ok(MilestoneIndex(0)),
    }
}

fn decode_address(key: &[u8], key_prefix_len: usize) -> Result<Hash, StorageError> {
    Ok(Hash::from_bytes(&key[key_prefix_len..])?)
}

fn decode_u64(kind: &'static str, value: &[u8]) -> Result<u64, StorageError> {
    let bytes = value
        .try_into()
        .map_err(|_| StorageError::malformed(kind, "value is not 8 bytes"))?;
    Ok(u64::from_le_bytes(bytes))
}

impl LedgerStateManager {
    /// Opens the ledger stored in `backend`.
    pub fn new(backend: Arc<dyn KeyValueStore>, total_supply: u64) -> Result<Self, LedgerError> {
        let indexes = LedgerIndexes {
            ledger: read_index(backend.as_ref(), LEDGER_INDEX_KEY)?,
            snapshot: read_index(backend.as_ref(), SNAPSHOT_INDEX_KEY)?,
        };
        Ok(Self {
            backend,
            total_supply,
            indexes: RwLock::new(indexes),
        })
    }

    /// Acquires the ledger for reading.
    pub fn read(&self) -> LedgerReadGuard<'_> {
        LedgerReadGuard {
            manager: self,
            indexes: self.indexes.read(),
        }
    }

    /// Acquires the ledger exclusively.
    pub fn write(&self) -> LedgerWriteGuard<'_> {
        LedgerWriteGuard {
            manager: self,
            indexes: self.indexes.write(),
        }
    }

    /// The current ledger and snapshot indexes.
    pub fn indexes(&self) -> LedgerIndexes {
        *self.indexes.read()
    }

    /// The balance of `address` together with the ledger index it refers to.
    pub fn balance(&self, address: &Hash) -> Result<(u64, MilestoneIndex), LedgerError> {
        let ledger = self.read();
        Ok((ledger.balance(address)?, ledger.ledger_index()))
    }

    /// The diff applied at `index`.
    pub fn ledger_diff(&self, index: MilestoneIndex) -> Result<LedgerDiff, LedgerError> {
        self.read().ledger_diff(index)
    }

    /// Reconstructs the balances at `target`. See [`LedgerReadGuard::ledger_state_for_milestone`].
    pub fn ledger_state_for_milestone(
        &self,
        target: MilestoneIndex,
        solid: MilestoneIndex,
    ) -> Result<(Balances, MilestoneIndex), LedgerError> {
        self.read().ledger_state_for_milestone(target, solid)
    }

    /// The stored snapshot balances and their milestone index.
    pub fn snapshot_balances(&self) -> Result<(Balances, MilestoneIndex), LedgerError> {
        self.read().snapshot_balances()
    }

    fn balance_of(&self, address: &Hash) -> Result<u64, LedgerError> {
        match self.backend.get(&key(&[BALANCE_KEY, address.as_bytes()]))? {
            Some(value) => Ok(decode_u64("balance", &value)?),
            None => Ok(0),
        }
    }

    fn scan_balances(&self, key_prefix: &[u8]) -> Result<Balances, LedgerError> {
        let key_prefix = key(&[key_prefix]);
        let mut balances = Balances::new();
        for (key, value) in self.backend.scan_prefix(&key_prefix)? {
            balances.insert(
                decode_address(&key, key_prefix.len())?,
                decode_u64("balance", &value)?,
            );
        }
        Ok(balances)
    }

    fn diff_at(&self, index: MilestoneIndex) -> Result<LedgerDiff, LedgerError> {
        let key_prefix = key(&[DIFF_KEY, &index.to_le_bytes()]);
        let mut diff = LedgerDiff::default();
        for (key, value) in self.backend.scan_prefix(&key_prefix)? {
            diff.insert(
                decode_address(&key, key_prefix.len())?,
                decode_u64("ledger diff", &value)? as i64,
            );
        }
        Ok(diff)
    }

    fn check_supply(&self, balances: &Balances, index: MilestoneIndex) -> Result<(), CorruptionError> {
        let actual = balances.values().map(|balance| *balance as u128).sum::<u128>();
        if actual != self.total_supply as u128 {
            return Err(CorruptionError::SupplyMismatch {
                index,
                expected: self.total_supply,
                actual,
            });
        }
        Ok(())
    }

    fn reconstruct(
        &self,
        indexes: &LedgerIndexes,
        target: MilestoneIndex,
        solid: MilestoneIndex,
    ) -> Result<(Balances, MilestoneIndex), LedgerError> {
        let target = if target.0 == 0 { solid } else { target };
        if target > solid {
            return Err(LedgerError::TargetIndexTooNew { target, solid });
        }
        if target < indexes.snapshot {
            return Err(LedgerError::TargetIndexTooOld {
                target,
                snapshot: indexes.snapshot,
            });
        }
        if indexes.ledger != solid {
            return Err(CorruptionError::LedgerIndexMismatch {
                ledger: indexes.ledger,
                solid,
            }
            .into());
        }

        let mut balances = self.scan_balances(BALANCE_KEY)?;
        self.check_supply(&balances, indexes.ledger)?;
        let mut index = indexes.ledger;
        while index > target {
            for (address, delta) in self.diff_at(index)?.iter() {
                let previous = balances.get(address).copied().unwrap_or_default() as i128 - *delta as i128;
                if previous < 0 {
                    return Err(CorruptionError::NegativeBalance {
                        address: *address,
                        index,
                    }
                    .into());
                }
                if previous == 0 {
                    balances.remove(address);
                } else {
                    balances.insert(*address, previous as u64);
                }
            }
            index = MilestoneIndex(index.0 - 1);
            self.check_supply(&balances, index)?;
        }
        Ok((balances, target))
    }
}

/// Shared access to the ledger. Writers wait until the guard is dropped.
pub struct LedgerReadGuard<'a> {
    manager: &'a LedgerStateManager,
    indexes: RwLockReadGuard<'a, LedgerIndexes>,
}

impl<'a> LedgerReadGuard<'a> {
    /// The milestone whose diff was applied last.
    pub fn ledger_index(&self) -> MilestoneIndex {
        self.indexes.ledger
    }

    /// The balance of `address`, zero if absent.
    pub fn balance(&self, address: &Hash) -> Result<u64, LedgerError> {
        self.manager.balance_of(address)
    }

    /// Every non-zero balance.
    pub fn balances(&self) -> Result<Balances, LedgerError> {
        self.manager.scan_balances(BALANCE_KEY)
    }

    /// The diff applied at `index`, empty if none was.
    pub fn ledger_diff(&self, index: MilestoneIndex) -> Result<LedgerDiff, LedgerError> {
        self.manager.diff_at(index)
    }

    /// Reconstructs the balances at `target` by reverting diffs from the current ledger index.
    ///
    /// A `target` of zero selects `solid`. The ledger must be at `solid`, and every intermediate state must sum to
    /// the total supply.
    pub fn ledger_state_for_milestone(
        &self,
        target: MilestoneIndex,
        solid: MilestoneIndex,
    ) -> Result<(Balances, MilestoneIndex), LedgerError> {
        self.manager.reconstruct(&self.indexes, target, solid)
    }

    /// The stored snapshot balances and their milestone index.
    pub fn snapshot_balances(&self) -> Result<(Balances, MilestoneIndex), LedgerError> {
        Ok((self.manager.scan_balances(SNAPSHOT_BALANCE_KEY)?, self.indexes.snapshot))
    }
}

/// Exclusive access to the ledger.
pub struct LedgerWriteGuard<'a> {
    manager: &'a LedgerStateManager,
    indexes: RwLockWriteGuard<'a, LedgerIndexes>,
}

impl<'a> LedgerWriteGuard<'a> {
    /// The milestone whose diff was applied last.
    pub fn ledger_index(&self) -> MilestoneIndex {
        self.indexes.ledger
    }

    /// The balance of `address`, zero if absent.
    pub fn balance(&self, address: &Hash) -> Result<u64, LedgerError> {
        self.manager.balance_of(address)
    }

    /// Applies the mutation of milestone `index` and advances the ledger index.
    ///
    /// The diff must sum to zero and may not drive any balance negative. Balances that reach zero are removed.
    #[instrument(skip_all, fields(index = %index), err, level = "trace")]
    pub fn apply_ledger_diff(&mut self, diff: &LedgerDiff, index: MilestoneIndex) -> Result<(), LedgerError> {
        if index <= self.indexes.ledger {
            return Err(LedgerError::IndexNotAdvancing {
                index,
                current: self.indexes.ledger,
            });
        }
        let sum = diff.sum();
        if sum != 0 {
            return Err(CorruptionError::UnbalancedDiff { index, sum }.into());
        }

        let mut batch = Batch::default();
        for (address, delta) in diff.iter().filter(|(_, delta)| **delta != 0) {
            let balance = self.manager.balance_of(address)? as i128 + *delta as i128;
            let balance_key = key(&[BALANCE_KEY, address.as_bytes()]);
            if balance < 0 {
                return Err(CorruptionError::NegativeBalance {
                    address: *address,
                    index,
                }
                .into());
            } else if balance == 0 {
                batch.delete(balance_key);
            } else {
                let balance = u64::try_from(balance).map_err(|_| CorruptionError::SupplyMismatch {
                    index,
                    expected: self.manager.total_supply,
                    actual: balance as u128,
                })?;
                batch.set(balance_key, balance.to_le_bytes());
            }
            batch.set(
                key(&[DIFF_KEY, &index.to_le_bytes(), address.as_bytes()]),
                delta.to_le_bytes(),
            );
        }
        batch.set(key(&[LEDGER_INDEX_KEY]), index.to_le_bytes());
        self.manager.backend.apply(batch)?;

        self.indexes.ledger = index;
        debug!(%index, addresses = diff.len(), "applied ledger diff");
        Ok(())
    }

    /// Replaces the current balances wholesale and sets the ledger index to `index`.
    #[instrument(skip_all, fields(index = %index), err, level = "trace")]
    pub fn store_balances(&mut self, balances: &Balances, index: MilestoneIndex) -> Result<(), LedgerError> {
        self.replace(BALANCE_KEY, LEDGER_INDEX_KEY, balances, index)?;
        self.indexes.ledger = index;
        Ok(())
    }

    /// Replaces the snapshot balances wholesale.
    #[instrument(skip_all, fields(index = %index), err, level = "trace")]
    pub fn store_snapshot_balances(&mut self, balances: &Balances, index: MilestoneIndex) -> Result<(), LedgerError> {
        self.replace(SNAPSHOT_BALANCE_KEY, SNAPSHOT_INDEX_KEY, balances, index)?;
        self.indexes.snapshot = index;
        Ok(())
    }

    fn replace(
        &self,
        key_prefix: &[u8],
        index_key: &[u8],
        balances: &Balances,
        index: MilestoneIndex,
    ) -> Result<(), LedgerError> {
        let total = balances.values().map(|balance| *balance as u128).sum::<u128>();
        if total != self.manager.total_supply as u128 {
            return Err(LedgerError::InvalidBalances {
                expected: self.manager.total_supply,
                actual: total,
            });
        }
        let backend = &self.manager.backend;
        backend.delete_prefix(&key(&[key_prefix]))?;
        backend.delete(&key(&[index_key]))?;

        let mut batch = Batch::default();
        for (address, balance) in balances.iter().filter(|(_, balance)| **balance != 0) {
            batch.set(key(&[key_prefix, address.as_bytes()]), balance.to_le_bytes());
        }
        batch.set(key(&[index_key]), index.to_le_bytes());
        backend.apply(batch)?;
        Ok(())
    }
}
