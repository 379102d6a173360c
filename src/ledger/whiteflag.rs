// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::{BTreeMap, HashSet};

use tracing::trace;

use super::{LedgerDiff, LedgerWriteGuard};
use crate::{
    engine::{ConfirmationSummary, ConsensusContext},
    error::{ConsensusError, CorruptionError},
    storage::CachedBundle,
    types::{Hash, MilestoneIndex},
};

/// The bundles a milestone confirms and the ledger mutation they induce.
pub(crate) struct WhiteFlagOutcome {
    pub(crate) diff: LedgerDiff,
    /// Newly confirmed bundles in confirmation order, the milestone bundle last.
    pub(crate) bundles: Vec<CachedBundle>,
    /// The subset of `bundles` that conflicted with the ledger.
    pub(crate) conflicting: Vec<CachedBundle>,
    pub(crate) summary: ConfirmationSummary,
}

enum Visit {
    Enter(Hash),
    Exit(CachedBundle),
}

/// Walks the past cone of the milestone at `tail` in post-order, trunk before branch, and derives the mutation of
/// every bundle not confirmed before.
///
/// Bundles that would overdraw an address against the ledger and the mutations accumulated so far are reported as
/// conflicting and contribute nothing. Flags are left to the caller, which sets them once the diff is applied.
pub(crate) fn white_flag(
    ctx: &ConsensusContext,
    ledger: &LedgerWriteGuard<'_>,
    index: MilestoneIndex,
    tail: &Hash,
) -> Result<WhiteFlagOutcome, ConsensusError> {
    let storage = ctx.storage();
    let mut mutations = BTreeMap::<Hash, i64>::new();
    let mut summary = ConfirmationSummary {
        index,
        ..Default::default()
    };
    let mut bundles = Vec::new();
    let mut conflicting_bundles = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![Visit::Enter(*tail)];

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(hash) => {
                if ctx.solid_entry_points().contains(&hash) || !visited.insert(hash) {
                    continue;
                }
                let tx = storage
                    .transaction(&hash)?
                    .ok_or(CorruptionError::MissingTransaction(hash))?;
                if !tx.is_tail() {
                    return Err(CorruptionError::ApprovedNonTail { index, hash }.into());
                }
                let bundle = storage.bundle(&hash)?.ok_or(CorruptionError::MissingBundle(hash))?;
                if bundle.is_confirmed() {
                    continue;
                }
                // The milestone bundle itself only has to be valid.
                if !bundle.is_valid() || (hash != *tail && !bundle.is_valid_strict_semantics()) {
                    return Err(CorruptionError::ApprovedInvalidBundle { index, tail: hash }.into());
                }
                let head = storage
                    .transaction(bundle.head())?
                    .ok_or(CorruptionError::MissingTransaction(*bundle.head()))?;
                stack.push(Visit::Exit(bundle));
                stack.push(Visit::Enter(head.branch));
                stack.push(Visit::Enter(head.trunk));
            }
            Visit::Exit(bundle) => {
                let tail = *bundle.tail();
                let changes = bundle.ledger_changes();
                if bundle.is_value_spam() || changes.is_empty() {
                    summary.excluded_zero_value.push(tail);
                } else {
                    let mut conflicting = false;
                    for (address, delta) in &changes {
                        let balance = ledger.balance(address)? as i128
                            + mutations.get(address).copied().unwrap_or_default() as i128
                            + *delta as i128;
                        if balance < 0 {
                            conflicting = true;
                            break;
                        }
                    }
                    if conflicting {
                        trace!(%index, %tail, "bundle conflicts with the ledger");
                        summary.excluded_conflicting.push(tail);
                        conflicting_bundles.push(bundle.clone());
                    } else {
                        for (address, delta) in changes {
                            let mutation = mutations.entry(address).or_default();
                            *mutation = mutation.saturating_add(delta);
                        }
                        summary.included.push(tail);
                    }
                }
                bundles.push(bundle);
            }
        }
    }

    let diff = mutations
        .into_iter()
        .filter(|(_, delta)| *delta != 0)
        .collect::<LedgerDiff>();
    summary.mutated_addresses = diff.len();
    Ok(WhiteFlagOutcome {
        diff,
        bundles,
        conflicting: conflicting_bundles,
        summary,
    })
}
