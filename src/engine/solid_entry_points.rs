// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{Hash, MilestoneIndex};

/// Transactions at the lower boundary of the retained history, with the milestone index that confirmed them.
///
/// The null hash is always an entry point.
#[derive(Debug, Default)]
pub struct SolidEntryPoints {
    entries: RwLock<HashMap<Hash, MilestoneIndex>>,
}

impl SolidEntryPoints {
    /// Returns whether `hash` is an entry point.
    pub fn contains(&self, hash: &Hash) -> bool {
        hash.is_null() || self.entries.read().contains_key(hash)
    }

    /// The index of the milestone that confirmed `hash`.
    pub fn index(&self, hash: &Hash) -> Option<MilestoneIndex> {
        if hash.is_null() {
            return Some(MilestoneIndex(0));
        }
        self.entries.read().get(hash).copied()
    }

    /// Adds an entry point.
    pub fn add(&self, hash: Hash, index: MilestoneIndex) {
        self.entries.write().insert(hash, index);
    }

    /// Replaces all entry points.
    pub fn replace(&self, entries: impl IntoIterator<Item = (Hash, MilestoneIndex)>) {
        *self.entries.write() = entries.into_iter().collect();
    }

    /// The number of explicit entry points.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether only the implicit null entry point exists.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
