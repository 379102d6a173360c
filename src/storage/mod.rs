// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! Module that contains the storage backends and the cached object stores.

mod error;
mod kv;
mod object;
mod tangle;

pub use self::{
    error::StorageError,
    kv::{Batch, BatchOperation, KeyValueStore, MemoryStore},
    object::{CachedObject, ObjectStorage, StorableObject},
    tangle::{CachedBundle, CachedMilestone, CachedTransaction, TangleStorage},
};

/// Key prefixes of the record kinds sharing one key-value store.
pub mod prefix {
    /// Transaction records keyed by hash.
    pub const TRANSACTIONS: u8 = 1;
    /// Approver index entries keyed by approvee and approver hash.
    pub const APPROVERS: u8 = 2;
    /// Bundle records keyed by tail hash.
    pub const BUNDLES: u8 = 3;
    /// Milestone records keyed by little-endian index.
    pub const MILESTONES: u8 = 4;
    /// Spent address entries keyed by address.
    pub const SPENT_ADDRESSES: u8 = 5;
    /// Ledger balances, diffs and indexes.
    pub const LEDGER: u8 = 6;
}
