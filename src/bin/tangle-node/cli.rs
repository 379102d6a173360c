// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use tangle_consensus::types::Hash;

use crate::config::{ConfigError, NodeConfig};

/// Consensus node of a ternary tangle network
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct ClArgs {
    /// The location of the configuration file.
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<String>,
    /// The Merkle root address of the coordinator.
    #[arg(long = "coordinator.address", env = "COORDINATOR_ADDRESS")]
    pub coordinator_address: Option<Hash>,
    /// The number of signature transactions per milestone.
    #[arg(long = "coordinator.security-level", env = "COORDINATOR_SECURITY_LEVEL")]
    pub security_level: Option<u8>,
    /// The depth of the coordinator's Merkle tree.
    #[arg(long = "coordinator.merkle-tree-depth", env = "COORDINATOR_MERKLE_TREE_DEPTH")]
    pub merkle_tree_depth: Option<u8>,
}

impl ClArgs {
    /// Get a config file with CLI args applied.
    pub fn get_config(&self) -> Result<NodeConfig, ConfigError> {
        let mut config = self
            .config
            .as_ref()
            .map(NodeConfig::from_file)
            .transpose()?
            .unwrap_or_default();

        if let Some(address) = self.coordinator_address {
            config.engine.coordinator.address = address;
        }
        if let Some(security_level) = self.security_level {
            config.engine.coordinator.security_level = security_level;
        }
        if let Some(depth) = self.merkle_tree_depth {
            config.engine.coordinator.merkle_tree_depth = depth;
        }

        Ok(config)
    }
}
