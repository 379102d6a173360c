// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;

use super::ConsensusContext;
use crate::{
    error::{ConsensusError, CorruptionError},
    types::{Hash, MilestoneIndex},
};

/// The oldest milestone index the unconfirmed past cone of `start` is rooted in.
///
/// The walk stops at confirmed bundles, which contribute their confirmation index, and at solid entry points, which
/// contribute the index that confirmed them.
pub(crate) fn oldest_root_index(ctx: &ConsensusContext, start: &Hash) -> Result<MilestoneIndex, ConsensusError> {
    let storage = ctx.storage();
    let mut oldest: Option<MilestoneIndex> = None;
    let mut visited = HashSet::new();
    let mut stack = vec![*start];

    while let Some(hash) = stack.pop() {
        if !visited.insert(hash) {
            continue;
        }
        let root = match ctx.solid_entry_points().index(&hash) {
            Some(index) => Some(index),
            None => {
                let tx = storage
                    .transaction(&hash)?
                    .ok_or(CorruptionError::MissingTransaction(hash))?;
                let confirmed = if tx.is_tail() {
                    storage.bundle(&hash)?.and_then(|bundle| bundle.confirmation_index())
                } else {
                    None
                };
                if confirmed.is_none() {
                    stack.push(tx.trunk);
                    stack.push(tx.branch);
                }
                confirmed
            }
        };
        if let Some(index) = root {
            oldest = Some(oldest.map_or(index, |oldest| oldest.min(index)));
        }
    }
    Ok(oldest.unwrap_or_default())
}

/// Whether approving `parents` would reference a cone rooted `below_max_depth` or more milestones below the solid
/// milestone. Parents for which `skip` holds are not inspected.
pub(crate) fn is_below_max_depth(
    ctx: &ConsensusContext,
    parents: &[Hash],
    skip: impl Fn(&Hash) -> bool,
) -> Result<bool, ConsensusError> {
    let solid = ctx.solid_milestone_index();
    let below_max_depth = ctx.config().tipsel.below_max_depth;
    for parent in parents.iter().filter(|parent| !skip(*parent)) {
        let root = oldest_root_index(ctx, parent)?;
        if solid.0.saturating_sub(root.0) >= below_max_depth {
            return Ok(true);
        }
    }
    Ok(false)
}
