// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    crypto::wots::{MAX_SECURITY_LEVEL, SEGMENTS_PER_FRAGMENT},
    tipselect::HeaviestSelectorConfig,
    types::{Hash, MilestoneIndex},
};

#[allow(missing_docs)]
pub const DEFAULT_SECURITY_LEVEL: u8 = 2;
#[allow(missing_docs)]
pub const DEFAULT_MERKLE_TREE_DEPTH: u8 = 24;
#[allow(missing_docs)]
pub const DEFAULT_TOTAL_SUPPLY: u64 = 2_779_530_283_277_761;
#[allow(missing_docs)]
pub const DEFAULT_SPENT_ADDRESSES_ENABLED: bool = true;

#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineConfigError {
    #[error("coordinator security level {0} is outside 1..=3")]
    SecurityLevel(u8),
    #[error("merkle tree depth {0} is outside 1..=27")]
    MerkleTreeDepth(u8),
    #[error("total supply must not be zero")]
    TotalSupply,
    #[error("at least one heaviest branch tip per checkpoint is required")]
    MaxTipsPerCheckpoint,
    #[error("below max depth must not be zero")]
    BelowMaxDepth,
}

/// The coordinator whose milestones are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// The Merkle root address of the coordinator.
    pub address: Hash,
    /// Number of signature transactions per milestone.
    pub security_level: u8,
    /// Depth of the coordinator's Merkle tree.
    pub merkle_tree_depth: u8,
}

impl CoordinatorConfig {
    /// Milestone indexes must stay below `2^depth`.
    pub fn max_milestone_index(&self) -> u64 {
        1u64 << self.merkle_tree_depth
    }

    /// Returns whether `index` can be issued by a tree of this depth.
    pub fn is_index_in_range(&self, index: MilestoneIndex) -> bool {
        (index.0 as u64) < self.max_milestone_index()
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            address: Hash::null(),
            security_level: DEFAULT_SECURITY_LEVEL,
            merkle_tree_depth: DEFAULT_MERKLE_TREE_DEPTH,
        }
    }
}

/// Ledger parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// The fixed number of tokens all balances sum to.
    pub total_supply: u64,
    /// Whether addresses spent from are recorded.
    pub spent_addresses_enabled: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            total_supply: DEFAULT_TOTAL_SUPPLY,
            spent_addresses_enabled: DEFAULT_SPENT_ADDRESSES_ENABLED,
        }
    }
}

/// Configuration of the consensus engine. Loaded once and immutable afterwards.
#[derive(Clone, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// The milestone issuer.
    pub coordinator: CoordinatorConfig,
    /// Ledger parameters.
    pub ledger: LedgerConfig,
    /// Tip selection parameters.
    pub tipsel: HeaviestSelectorConfig,
}

impl EngineConfig {
    /// Checks the parameters the engine relies on.
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        let security = self.coordinator.security_level;
        if security == 0 || security as usize > MAX_SECURITY_LEVEL {
            return Err(EngineConfigError::SecurityLevel(security));
        }
        let depth = self.coordinator.merkle_tree_depth;
        if depth == 0 || depth as usize > SEGMENTS_PER_FRAGMENT {
            return Err(EngineConfigError::MerkleTreeDepth(depth));
        }
        if self.ledger.total_supply == 0 {
            return Err(EngineConfigError::TotalSupply);
        }
        if self.tipsel.max_heaviest_branch_tips_per_checkpoint == 0 {
            return Err(EngineConfigError::MaxTipsPerCheckpoint);
        }
        if self.tipsel.below_max_depth == 0 {
            return Err(EngineConfigError::BelowMaxDepth);
        }
        Ok(())
    }
}
