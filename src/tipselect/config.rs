// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[allow(missing_docs)]
pub const DEFAULT_UNREFERENCED_MESSAGES_THRESHOLD: usize = 20;
#[allow(missing_docs)]
pub const DEFAULT_MAX_TIPS_PER_CHECKPOINT: usize = 10;
#[allow(missing_docs)]
pub const DEFAULT_RANDOM_TIPS_PER_CHECKPOINT: usize = 3;
#[allow(missing_docs)]
pub const DEFAULT_BELOW_MAX_DEPTH: u32 = 15;
#[allow(missing_docs)]
pub const DEFAULT_SELECTION_TIMEOUT: Duration = Duration::from_millis(100);

/// Configuration of the heaviest branch tip selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaviestSelectorConfig {
    /// Below this many newly referenced messages a tip is not worth referencing.
    pub min_heaviest_branch_unreferenced_messages_threshold: usize,
    /// Upper bound of heaviest branch tips per round.
    pub max_heaviest_branch_tips_per_checkpoint: usize,
    /// Number of random tips added after the heaviest branch tips.
    pub random_tips_per_checkpoint: usize,
    /// Tips whose unconfirmed past cone reaches this many milestones below the solid milestone are not tracked.
    pub below_max_depth: u32,
    /// Time budget of a selection round.
    #[serde(with = "humantime_serde")]
    pub heaviest_branch_selection_timeout: Duration,
}

impl Default for HeaviestSelectorConfig {
    fn default() -> Self {
        Self {
            min_heaviest_branch_unreferenced_messages_threshold: DEFAULT_UNREFERENCED_MESSAGES_THRESHOLD,
            max_heaviest_branch_tips_per_checkpoint: DEFAULT_MAX_TIPS_PER_CHECKPOINT,
            random_tips_per_checkpoint: DEFAULT_RANDOM_TIPS_PER_CHECKPOINT,
            below_max_depth: DEFAULT_BELOW_MAX_DEPTH,
            heaviest_branch_selection_timeout: DEFAULT_SELECTION_TIMEOUT,
        }
    }
}
