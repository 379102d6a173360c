// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, warn};

use super::Bundle;
use crate::{
    engine::ConsensusContext,
    error::{ConsensusError, CorruptionError},
    storage::{CachedBundle, CachedTransaction},
    types::Hash,
};

/// Collects the members of a bundle by walking trunk references from its tail.
pub struct BundleAssembler {
    ctx: Arc<ConsensusContext>,
}

impl BundleAssembler {
    #[allow(missing_docs)]
    pub fn new(ctx: Arc<ConsensusContext>) -> Self {
        Self { ctx }
    }

    /// Assembles and stores the bundles that start at `start`, returning the newly stored ones.
    ///
    /// A non-tail start resolves the tails of its bundle instances through the approvers index. A missing trunk
    /// aborts assembly without storing anything, unless `is_known_tail` states that every member must be present,
    /// in which case the gap is a [`CorruptionError`].
    pub fn try_construct_bundle(&self, start: &Hash, is_known_tail: bool) -> Result<Vec<CachedBundle>, ConsensusError> {
        let storage = self.ctx.storage();
        let start_tx = match storage.transaction(start)? {
            Some(tx) => tx,
            None if is_known_tail => return Err(CorruptionError::MissingTransaction(*start).into()),
            None => return Ok(Vec::new()),
        };

        if !start_tx.is_tail() {
            let mut bundles = Vec::new();
            for tail in self.find_tails(&start_tx)? {
                bundles.extend(self.try_construct_bundle(&tail, false)?);
            }
            return Ok(bundles);
        }

        if storage.contains_bundle(start)? {
            return Ok(Vec::new());
        }

        let (members, head) = match self.collect_members(&start_tx)? {
            Some(collected) => collected,
            None if is_known_tail => return Err(CorruptionError::UnassemblableSolidTail(*start).into()),
            None => return Ok(Vec::new()),
        };

        let Some(bundle) = Bundle::new(start_tx.bundle, head, start_tx.last_index, members) else {
            return Ok(Vec::new());
        };
        match storage.store_bundle(bundle)? {
            Some(bundle) => {
                debug!(
                    tail = %bundle.tail(),
                    complete = bundle.is_complete(),
                    "assembled bundle of {} transactions",
                    bundle.transactions().len()
                );
                Ok(vec![bundle])
            }
            None => Ok(Vec::new()),
        }
    }

    /// Walks approvers back to the tails of every bundle instance containing `tx`.
    fn find_tails(&self, tx: &CachedTransaction) -> Result<Vec<Hash>, ConsensusError> {
        let storage = self.ctx.storage();
        let mut tails = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![tx.clone()];
        while let Some(current) = stack.pop() {
            for approver in storage.approvers(&current.hash)? {
                if !visited.insert(approver) {
                    continue;
                }
                let Some(approver) = storage.transaction(&approver)? else {
                    continue;
                };
                if approver.bundle != current.bundle
                    || approver.trunk != current.hash
                    || approver.current_index.checked_add(1) != Some(current.current_index)
                {
                    continue;
                }
                if approver.is_tail() {
                    tails.push(approver.hash);
                } else {
                    stack.push(approver);
                }
            }
        }
        Ok(tails)
    }

    /// Follows trunks from `tail` until the head, returning the member hashes and the head hash.
    ///
    /// Returns `None` if a trunk transaction is not stored yet. A member with a different bundle hash ends the walk
    /// early, leaving the bundle incomplete.
    fn collect_members(&self, tail: &CachedTransaction) -> Result<Option<(Vec<Hash>, Hash)>, ConsensusError> {
        let storage = self.ctx.storage();
        let mut members = vec![tail.hash];
        let mut head = tail.is_head().then_some(tail.hash);
        let mut current = tail.clone();

        while head.is_none() && (members.len() as u64) <= tail.last_index {
            // Genesis references itself.
            if current.trunk == current.hash {
                break;
            }
            let Some(trunk) = storage.transaction(&current.trunk)? else {
                return Ok(None);
            };
            if trunk.bundle != tail.bundle {
                warn!(
                    tail = %tail.hash,
                    member = %trunk.hash,
                    "bundle hash changes within the trunk chain"
                );
                break;
            }
            if members.contains(&trunk.hash) {
                break;
            }
            members.push(trunk.hash);
            if trunk.is_head() {
                head = Some(trunk.hash);
            }
            current = trunk;
        }

        Ok(Some((members, head.unwrap_or_else(Hash::null))))
    }
}
