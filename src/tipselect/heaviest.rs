// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Instant,
};

use parking_lot::{Mutex, RwLock};
use rand::{seq::SliceRandom, Rng};
use tracing::debug;

use super::{BitSet, HeaviestSelectorConfig, TipSelectionError};
use crate::types::Hash;

/// A solid message as seen by the selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageMetadata {
    /// The message (tail transaction) hash.
    pub message_id: Hash,
    /// The messages it approves.
    pub parents: Vec<Hash>,
}

#[derive(Debug)]
struct TrackedMessage {
    message_id: Hash,
    /// Positions of every tracked message in this message's past cone, including itself.
    refs: RwLock<BitSet>,
}

#[derive(Default)]
struct State {
    tracked: HashMap<Hash, (usize, Arc<TrackedMessage>)>,
    tips: BTreeMap<usize, Arc<TrackedMessage>>,
}

/// Picks the tips whose past cones cover the most messages not referenced by a checkpoint yet.
pub struct HeaviestSelector {
    config: HeaviestSelectorConfig,
    state: Mutex<State>,
}

impl HeaviestSelector {
    #[allow(missing_docs)]
    pub fn new(config: HeaviestSelectorConfig) -> Self {
        Self {
            config,
            state: Default::default(),
        }
    }

    /// Tracks a newly solid message, returning the number of tracked messages.
    ///
    /// Messages must arrive in solidification order. Parents that were tips stop being tips.
    pub fn on_new_solid_message(&self, metadata: &MessageMetadata) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.tracked.contains_key(&metadata.message_id) {
            return state.tracked.len();
        }

        let position = state.tracked.len();
        let mut refs = BitSet::with_capacity(position + 1);
        refs.insert(position);
        for parent in &metadata.parents {
            if let Some((parent_position, parent)) = state.tracked.get(parent) {
                refs.union_with(&parent.refs.read());
                state.tips.remove(parent_position);
            }
        }

        let message = Arc::new(TrackedMessage {
            message_id: metadata.message_id,
            refs: RwLock::new(refs),
        });
        state.tips.insert(position, message.clone());
        state.tracked.insert(metadata.message_id, (position, message));
        state.tracked.len()
    }

    /// Whether `message_id` is tracked.
    pub fn is_tracked(&self, message_id: &Hash) -> bool {
        self.state.lock().tracked.contains_key(message_id)
    }

    /// The number of tracked messages.
    pub fn tracked_messages(&self) -> usize {
        self.state.lock().tracked.len()
    }

    /// The number of current tips.
    pub fn tips(&self) -> usize {
        self.state.lock().tips.len()
    }

    /// Forgets every tracked message.
    pub fn reset(&self) {
        *self.state.lock() = State::default();
    }

    /// Selects at least `min_required` tips, heaviest branch first, followed by random tips.
    ///
    /// Selection runs on a snapshot of the current tips taken under the lock. Past the configured timeout the round
    /// stops as soon as `min_required` tips are chosen. A non-empty result resets the tracked state.
    pub fn select_tips(&self, min_required: usize) -> Result<Vec<Hash>, TipSelectionError> {
        let mut pool = self.state.lock().tips.values().cloned().collect::<Vec<_>>();
        if pool.is_empty() {
            return Err(TipSelectionError::NoTipsAvailable);
        }

        let deadline = Instant::now() + self.config.heaviest_branch_selection_timeout;
        let mut rng = rand::thread_rng();
        let mut selected = Vec::new();

        while selected.len() < self.config.max_heaviest_branch_tips_per_checkpoint {
            let Some((position, count)) = heaviest(&pool, &mut rng) else {
                break;
            };
            if selected.len() >= min_required
                && (count < self.config.min_heaviest_branch_unreferenced_messages_threshold || Instant::now() > deadline)
            {
                break;
            }
            let tip = pool.swap_remove(position);
            reference_tip(&pool, &tip);
            selected.push(tip.message_id);
        }

        if selected.is_empty() {
            return Err(TipSelectionError::NoTipsAvailable);
        }
        let heaviest_tips = selected.len();

        for _ in 0..self.config.random_tips_per_checkpoint {
            if pool.is_empty() {
                break;
            }
            let tip = pool.swap_remove(rng.gen_range(0..pool.len()));
            reference_tip(&pool, &tip);
            selected.push(tip.message_id);
        }

        debug!(
            heaviest = heaviest_tips,
            random = selected.len() - heaviest_tips,
            "selected tips"
        );
        self.reset();
        Ok(selected)
    }
}

/// The position in `pool` of a tip with the most references, ties broken at random, and its reference count.
fn heaviest(pool: &[Arc<TrackedMessage>], rng: &mut impl Rng) -> Option<(usize, usize)> {
    let counts = pool.iter().map(|tip| tip.refs.read().count_ones()).collect::<Vec<_>>();
    let max = *counts.iter().max()?;
    let candidates = counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == max)
        .map(|(position, _)| position)
        .collect::<Vec<_>>();
    candidates.choose(rng).map(|position| (*position, max))
}

/// Removes the cone of `tip` from every remaining tip so it is not counted twice.
fn reference_tip(pool: &[Arc<TrackedMessage>], tip: &TrackedMessage) {
    let refs = tip.refs.read();
    for other in pool {
        other.refs.write().difference_with(&refs);
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashSet, time::Duration};

    use super::*;

    fn id(n: u32) -> Hash {
        Hash::from_trits(&crate::types::ternary::int_to_trits(n as i64 + 1, Hash::TRIT_LENGTH).unwrap()).unwrap()
    }

    fn config() -> HeaviestSelectorConfig {
        HeaviestSelectorConfig {
            heaviest_branch_selection_timeout: Duration::from_secs(10),
            ..Default::default()
        }
    }

    fn chain(selector: &HeaviestSelector, ids: impl Iterator<Item = u32>) -> Hash {
        let mut parent = Hash::null();
        for n in ids {
            selector.on_new_solid_message(&MessageMetadata {
                message_id: id(n),
                parents: vec![parent, parent],
            });
            parent = id(n);
        }
        parent
    }

    #[test]
    fn tracks_cones() {
        let selector = HeaviestSelector::new(config());
        chain(&selector, 0..5);
        assert_eq!(selector.tracked_messages(), 5);
        assert_eq!(selector.tips(), 1);
        assert_eq!(
            selector.on_new_solid_message(&MessageMetadata {
                message_id: id(4),
                parents: vec![id(3)],
            }),
            5
        );

        let state = selector.state.lock();
        let (_, tip) = &state.tracked[&id(4)];
        assert_eq!(tip.refs.read().count_ones(), 5);
    }

    #[test]
    fn reference_tip_subtracts_cones() {
        let selector = HeaviestSelector::new(config());
        let a = chain(&selector, 0..3);
        selector.on_new_solid_message(&MessageMetadata {
            message_id: id(10),
            parents: vec![id(1), a],
        });
        selector.on_new_solid_message(&MessageMetadata {
            message_id: id(11),
            parents: vec![id(0)],
        });

        let pool = selector.state.lock().tips.values().cloned().collect::<Vec<_>>();
        let (tip, rest): (Vec<_>, Vec<_>) = pool.into_iter().partition(|tip| tip.message_id == id(10));
        reference_tip(&rest, &tip[0]);
        let tip_refs = tip[0].refs.read();
        for other in &rest {
            assert!(other.refs.read().is_disjoint(&tip_refs));
            assert_eq!(other.refs.read().count_ones(), 1);
        }
    }

    #[test]
    fn single_chain_yields_its_tip() {
        let selector = HeaviestSelector::new(config());
        let last = chain(&selector, 0..50);
        assert_eq!(selector.select_tips(1).unwrap(), vec![last]);
        assert_eq!(selector.tracked_messages(), 0);
        assert_eq!(selector.select_tips(1), Err(TipSelectionError::NoTipsAvailable));
    }

    #[test]
    fn two_chains_yield_both_tips() {
        let selector = HeaviestSelector::new(config());
        let a = chain(&selector, 0..30);
        let b = chain(&selector, 100..130);
        let tips = selector.select_tips(2).unwrap().into_iter().collect::<HashSet<_>>();
        assert_eq!(tips, [a, b].into_iter().collect());
    }

    #[test]
    fn random_tips_are_appended() {
        let selector = HeaviestSelector::new(HeaviestSelectorConfig {
            random_tips_per_checkpoint: 2,
            ..config()
        });
        let heavy = chain(&selector, 0..30);
        chain(&selector, 100..101);
        chain(&selector, 200..201);
        chain(&selector, 300..301);

        let tips = selector.select_tips(1).unwrap();
        assert_eq!(tips.len(), 3);
        assert_eq!(tips[0], heavy);
    }
}
